// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Schema-driven row serialization.
//!
//! Wire layout of one row, per `spec.md` §3:
//!
//! ```text
//! [flag: 1][length: 2 LE][payload: length]
//! ```
//!
//! `flag` is `b'A'` (active) or `b'D'` (deleted/tombstone). `length` is the
//! payload byte count. The payload concatenates column values in schema
//! order using the per-type encoding in [`crate::schema::DataType`].

use crate::schema::{DataType, Schema, Value};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

/// Flag byte for an active (live) row
pub const FLAG_ACTIVE: u8 = b'A';
/// Flag byte for a tombstoned row
pub const FLAG_DELETED: u8 = b'D';

/// Error during row serialization
#[derive(Debug)]
pub enum EncodeError {
    /// I/O error writing to the output buffer
    Io(std::io::Error),

    /// A value does not fit its declared column type (e.g. an int out of
    /// the signed 32-bit range)
    ValueOutOfRange {
        /// Offending column
        column: String,
    },

    /// The serialized payload of a single row exceeds 65535 bytes
    PayloadTooLarge {
        /// Actual encoded length
        length: usize,
    },
}

impl std::fmt::Display for EncodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "{e}"),
            Self::ValueOutOfRange { column } => {
                write!(f, "value for column `{column}` does not fit its declared type")
            }
            Self::PayloadTooLarge { length } => {
                write!(f, "row payload of {length} bytes exceeds the 65535 byte limit")
            }
        }
    }
}

impl From<std::io::Error> for EncodeError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl std::error::Error for EncodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::ValueOutOfRange { .. } | Self::PayloadTooLarge { .. } => None,
        }
    }
}

/// Error during row deserialization
#[derive(Debug)]
pub enum DecodeError {
    /// I/O error reading from the input buffer
    Io(std::io::Error),

    /// The header byte was neither `b'A'` nor `b'D'`
    InvalidFlag(u8),

    /// Raised when a row's declared payload length runs past the end of a
    /// single block because the row was split across block boundaries.
    /// The caller should concatenate `additional_needed_blocks` more whole
    /// blocks onto the buffer and retry.
    IncompleteBlock {
        /// Number of additional whole blocks required to hold the row
        additional_needed_blocks: u32,
    },
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "{e}"),
            Self::InvalidFlag(b) => write!(f, "invalid row flag byte {b:#x}"),
            Self::IncompleteBlock {
                additional_needed_blocks,
            } => write!(
                f,
                "row straddles a block boundary, {additional_needed_blocks} more block(s) needed"
            ),
        }
    }
}

impl From<std::io::Error> for DecodeError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl std::error::Error for DecodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::InvalidFlag(_) | Self::IncompleteBlock { .. } => None,
        }
    }
}

/// A fully materialized row: an ordered tuple of values matching a [`Schema`]
#[derive(Clone, Debug, PartialEq)]
pub struct Row {
    /// Column values, in schema order
    pub values: Vec<Value>,
}

impl Row {
    /// Wraps an ordered tuple of values as a row.
    #[must_use]
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }
}

/// `(block_index, offset)` — the block and intra-block byte offset of a
/// row's flag byte. This is the value B+-tree leaf entries carry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RowPointer {
    /// Block holding the row
    pub block_index: u32,
    /// Byte offset of the flag byte within the block
    pub offset: u16,
}

impl RowPointer {
    /// Wire size of a serialized row pointer: 4-byte block index + 2-byte offset
    pub const SERIALIZED_LEN: usize = 6;

    /// Builds a pointer.
    #[must_use]
    pub fn new(block_index: u32, offset: u16) -> Self {
        Self { block_index, offset }
    }

    pub(crate) fn encode_into<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        w.write_u32::<LittleEndian>(self.block_index)?;
        w.write_u16::<LittleEndian>(self.offset)?;
        Ok(())
    }

    pub(crate) fn decode_from<R: Read>(r: &mut R) -> std::io::Result<Self> {
        let block_index = r.read_u32::<LittleEndian>()?;
        let offset = r.read_u16::<LittleEndian>()?;
        Ok(Self { block_index, offset })
    }
}

/// One deserialized row, plus the offset (of its flag byte) it was found at
/// within the buffer passed to [`deserialize`].
#[derive(Clone, Debug, PartialEq)]
pub struct DeserializedRow {
    /// The row's values
    pub row: Row,
    /// Offset of the row's flag byte within the input buffer
    pub offset: usize,
}

/// Serializes `rows` against `schema`, emitting the concatenation of
/// per-row `[flag][length][payload]` records (spec.md §3, §4.2).
pub fn serialize(schema: &Schema, rows: &[Row]) -> Result<Vec<u8>, EncodeError> {
    let mut out = Vec::new();
    for row in rows {
        let mut payload = Vec::new();
        for (column, value) in schema.columns().iter().zip(row.values.iter()) {
            column
                .data_type
                .encode(value, &mut payload)
                .map_err(|_| EncodeError::ValueOutOfRange {
                    column: column.name.clone(),
                })?;
        }
        if payload.len() > u16::MAX as usize {
            return Err(EncodeError::PayloadTooLarge {
                length: payload.len(),
            });
        }
        out.write_u8(FLAG_ACTIVE)?;
        out.write_u16::<LittleEndian>(payload.len() as u16)?;
        out.write_all(&payload)?;
    }
    Ok(out)
}

/// Serializes `rows` with an explicit flag per row (used to re-serialize a
/// block after marking some rows as tombstones; `rows[i].1 == FLAG_DELETED`
/// preserves the row byte-present but invisible to [`deserialize`]).
pub fn serialize_with_flags(
    schema: &Schema,
    rows: &[(Row, u8)],
) -> Result<Vec<u8>, EncodeError> {
    let mut out = Vec::new();
    for (row, flag) in rows {
        let mut payload = Vec::new();
        for (column, value) in schema.columns().iter().zip(row.values.iter()) {
            column
                .data_type
                .encode(value, &mut payload)
                .map_err(|_| EncodeError::ValueOutOfRange {
                    column: column.name.clone(),
                })?;
        }
        if payload.len() > u16::MAX as usize {
            return Err(EncodeError::PayloadTooLarge {
                length: payload.len(),
            });
        }
        out.write_u8(*flag)?;
        out.write_u16::<LittleEndian>(payload.len() as u16)?;
        out.write_all(&payload)?;
    }
    Ok(out)
}

/// Walks `bytes`, decoding active rows in schema order and skipping
/// tombstoned ones. Stops cleanly at the end of the buffer, unless a row's
/// declared payload runs past the end of the buffer while straddling a
/// block boundary, in which case [`DecodeError::IncompleteBlock`] is
/// raised carrying the number of additional whole blocks the caller needs
/// to append before retrying.
///
/// `block_size` is the caller's fixed block size; it is used only to
/// compute `additional_needed_blocks`. Pass `0` if the buffer is known to
/// never be a single in-progress block (e.g. it is already a full
/// reassembled multi-block run), which disables the incomplete-block
/// distinction and simply truncates at the buffer end.
pub fn deserialize(
    schema: &Schema,
    bytes: &[u8],
    block_size: usize,
) -> Result<Vec<DeserializedRow>, DecodeError> {
    let mut out = Vec::new();
    let mut pointer = 0usize;

    while pointer + 3 <= bytes.len() {
        let flag = bytes[pointer];
        if flag != FLAG_ACTIVE && flag != FLAG_DELETED {
            break;
        }
        let length = u16::from_le_bytes([bytes[pointer + 1], bytes[pointer + 2]]) as usize;
        let payload_start = pointer + 3;
        let payload_end = payload_start + length;

        if payload_end > bytes.len() {
            if block_size > 0 {
                let missing = payload_end - bytes.len();
                let additional_needed_blocks =
                    ((missing + block_size - 1) / block_size).max(1) as u32;
                return Err(DecodeError::IncompleteBlock {
                    additional_needed_blocks,
                });
            }
            break;
        }

        if flag == FLAG_DELETED {
            pointer = payload_end;
            continue;
        }

        let payload = &bytes[payload_start..payload_end];
        let mut cursor = payload;
        let mut values = Vec::with_capacity(schema.columns().len());
        for column in schema.columns() {
            let value = column
                .data_type
                .decode(&mut cursor)
                .map_err(DecodeError::Io)?;
            values.push(value);
        }

        out.push(DeserializedRow {
            row: Row::new(values),
            offset: pointer,
        });
        pointer = payload_end;
    }

    Ok(out)
}
