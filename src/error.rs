// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::row::codec::{DecodeError, EncodeError};

/// Represents errors that can occur anywhere in the storage core
#[derive(Debug)]
pub enum Error {
    /// I/O error
    Io(std::io::Error),

    /// Row serialization failed
    Encode(EncodeError),

    /// Row deserialization failed
    Decode(DecodeError),

    /// A table, column or index name could not be resolved, or a value did
    /// not match the declared column/key type
    Schema(SchemaError),

    /// An insert collided with an existing key in a unique index
    UniqueViolation {
        /// Name of the violated index
        index: String,
        /// Offending key, formatted for diagnostics
        key: String,
    },

    /// JSON (de)serialization of a catalog or index metadata file failed
    Json(serde_json::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Encode(e) => write!(f, "encode error: {e}"),
            Self::Decode(e) => write!(f, "decode error: {e}"),
            Self::Schema(e) => write!(f, "schema error: {e}"),
            Self::UniqueViolation { index, key } => {
                write!(f, "unique index violation on `{index}` for key {key}")
            }
            Self::Json(e) => write!(f, "catalog/metadata JSON error: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Encode(e) => Some(e),
            Self::Decode(e) => Some(e),
            Self::Schema(e) => Some(e),
            Self::Json(e) => Some(e),
            Self::UniqueViolation { .. } => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<EncodeError> for Error {
    fn from(value: EncodeError) -> Self {
        Self::Encode(value)
    }
}

impl From<DecodeError> for Error {
    fn from(value: DecodeError) -> Self {
        Self::Decode(value)
    }
}

impl From<SchemaError> for Error {
    fn from(value: SchemaError) -> Self {
        Self::Schema(value)
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

/// Schema-level error: unknown table/column, type mismatch, or an
/// inconsistency between a declared and on-disk key type descriptor
#[derive(Debug)]
pub enum SchemaError {
    /// No catalog entry for this table name
    UnknownTable(String),

    /// The table has no column with this name
    UnknownColumn {
        /// Table the lookup was performed against
        table: String,
        /// Missing column name
        column: String,
    },

    /// A schema declared the same column name more than once
    DuplicateColumn {
        /// Table the schema belongs to
        table: String,
        /// Column name that appeared more than once
        column: String,
    },

    /// A declared `char`/`varchar` length exceeds the 65535 wire limit
    LengthOutOfRange {
        /// Offending column
        column: String,
        /// Declared length
        length: usize,
    },

    /// An index's persisted key-type descriptor does not match what the
    /// catalog says the indexed column's type is
    KeyTypeMismatch {
        /// Index name
        index: String,
        /// Type recorded in the index metadata file
        stored: String,
        /// Type derived from the table's current catalog entry
        expected: String,
    },

    /// No index is registered under this name
    UnknownIndex(String),
}

impl std::fmt::Display for SchemaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownTable(t) => write!(f, "unknown table `{t}`"),
            Self::UnknownColumn { table, column } => {
                write!(f, "unknown column `{column}` on table `{table}`")
            }
            Self::DuplicateColumn { table, column } => {
                write!(f, "table `{table}` declares column `{column}` more than once")
            }
            Self::LengthOutOfRange { column, length } => write!(
                f,
                "column `{column}` declares length {length}, which exceeds 65535"
            ),
            Self::KeyTypeMismatch {
                index,
                stored,
                expected,
            } => write!(
                f,
                "index `{index}` key type mismatch: on-disk descriptor says `{stored}`, catalog says `{expected}`"
            ),
            Self::UnknownIndex(name) => write!(f, "unknown index `{name}`"),
        }
    }
}

impl std::error::Error for SchemaError {}

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, Error>;
