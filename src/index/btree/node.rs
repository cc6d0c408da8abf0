// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! On-disk layout of one B+-tree node (spec.md §3).
//!
//! One node occupies exactly one block:
//!
//! ```text
//! Header (16 bytes): next_leaf:4, parent:4, num_keys:2, is_leaf:1 ('L'|'I'), is_root:1 ('R'|'N'), padding:4
//! Body: num_keys key records (length:2 + per-component encoded bytes), then:
//!   - leaf:     num_keys row pointers (6 bytes each)
//!   - internal: num_keys+1 child block indices (4 bytes each)
//! ```

use crate::index::IndexKey;
use crate::row::RowPointer;
use crate::schema::DataType;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read, Write};

/// Serialized header size in bytes.
pub const HEADER_SIZE: usize = 16;

/// Header of a B+-tree node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NodeHeader {
    /// Block index of the next leaf in the sorted leaf chain, `0` if none
    /// (only meaningful on leaves; block 0 is never a leaf, so `0` is an
    /// unambiguous sentinel).
    pub next_leaf: u32,
    /// Block index of the parent node, `0` for the root.
    pub parent: u32,
    /// Number of keys stored in this node.
    pub num_keys: u16,
    /// Whether this node is a leaf.
    pub is_leaf: bool,
    /// Whether this node is the current root.
    pub is_root: bool,
}

impl NodeHeader {
    fn encode_into<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        w.write_u32::<LittleEndian>(self.next_leaf)?;
        w.write_u32::<LittleEndian>(self.parent)?;
        w.write_u16::<LittleEndian>(self.num_keys)?;
        w.write_u8(if self.is_leaf { b'L' } else { b'I' })?;
        w.write_u8(if self.is_root { b'R' } else { b'N' })?;
        w.write_u32::<LittleEndian>(0)?; // padding
        Ok(())
    }

    fn decode_from<R: Read>(r: &mut R) -> std::io::Result<Self> {
        let next_leaf = r.read_u32::<LittleEndian>()?;
        let parent = r.read_u32::<LittleEndian>()?;
        let num_keys = r.read_u16::<LittleEndian>()?;
        let is_leaf = r.read_u8()? == b'L';
        let is_root = r.read_u8()? == b'R';
        let mut padding = [0u8; 4];
        r.read_exact(&mut padding)?;
        Ok(Self {
            next_leaf,
            parent,
            num_keys,
            is_leaf,
            is_root,
        })
    }
}

/// The leaf-vs-internal pointer variant (spec.md §9 design note: a node's
/// pointer list is a variant dispatched on `is_leaf`, not a union of int
/// and struct-pointer).
#[derive(Clone, Debug, PartialEq)]
pub enum Pointers {
    /// Leaf node: one row pointer per key.
    Leaf(Vec<RowPointer>),
    /// Internal node: `keys.len() + 1` child block indices.
    Internal(Vec<u32>),
}

/// One fully materialized B+-tree node.
#[derive(Clone, Debug, PartialEq)]
pub struct Node {
    /// Node header
    pub header: NodeHeader,
    /// Ordered keys
    pub keys: Vec<IndexKey>,
    /// Leaf row-pointers or internal child block indices
    pub pointers: Pointers,
}

impl Node {
    /// Builds an empty leaf node.
    #[must_use]
    pub fn new_leaf(is_root: bool) -> Self {
        Self {
            header: NodeHeader {
                next_leaf: 0,
                parent: 0,
                num_keys: 0,
                is_leaf: true,
                is_root,
            },
            keys: Vec::new(),
            pointers: Pointers::Leaf(Vec::new()),
        }
    }

    /// Builds an internal node from keys and child pointers.
    #[must_use]
    pub fn new_internal(keys: Vec<IndexKey>, children: Vec<u32>, is_root: bool) -> Self {
        debug_assert_eq!(children.len(), keys.len() + 1);
        Self {
            header: NodeHeader {
                next_leaf: 0,
                parent: 0,
                num_keys: keys.len() as u16,
                is_leaf: false,
                is_root,
            },
            keys,
            pointers: Pointers::Internal(children),
        }
    }

    fn encode_key(key: &IndexKey, key_types: &[DataType]) -> std::io::Result<Vec<u8>> {
        let mut payload = Vec::new();
        for (value, ty) in key.0.iter().zip(key_types) {
            ty.encode(value, &mut payload)?;
        }
        Ok(payload)
    }

    fn decode_key<R: Read>(r: &mut R, key_types: &[DataType]) -> std::io::Result<IndexKey> {
        let mut values = Vec::with_capacity(key_types.len());
        for ty in key_types {
            values.push(ty.decode(r)?);
        }
        Ok(IndexKey::new(values))
    }

    /// Serializes this node to exactly one block's worth of bytes (callers
    /// are responsible for checking [`Self::serialized_len`] against the
    /// block size and zero-padding beyond it; `BlockIo::write` already
    /// zero-pads).
    pub fn encode(&self, key_types: &[DataType]) -> crate::Result<Vec<u8>> {
        let mut out = Vec::new();
        self.header.encode_into(&mut out)?;

        for key in &self.keys {
            let payload = Self::encode_key(key, key_types)?;
            out.write_u16::<LittleEndian>(payload.len() as u16)?;
            out.write_all(&payload)?;
        }

        match &self.pointers {
            Pointers::Leaf(pointers) => {
                for p in pointers {
                    p.encode_into(&mut out)?;
                }
            }
            Pointers::Internal(children) => {
                for c in children {
                    out.write_u32::<LittleEndian>(*c)?;
                }
            }
        }

        Ok(out)
    }

    /// Deserializes one node from a block's bytes.
    pub fn decode(bytes: &[u8], key_types: &[DataType]) -> crate::Result<Self> {
        let mut cursor = Cursor::new(bytes);
        let header = NodeHeader::decode_from(&mut cursor)?;

        let mut keys = Vec::with_capacity(header.num_keys as usize);
        for _ in 0..header.num_keys {
            let len = cursor.read_u16::<LittleEndian>()? as usize;
            let pos = cursor.position() as usize;
            let mut key_reader = Cursor::new(&bytes[pos..pos + len]);
            keys.push(Self::decode_key(&mut key_reader, key_types)?);
            cursor.set_position((pos + len) as u64);
        }

        let pointers = if header.is_leaf {
            let mut pointers = Vec::with_capacity(header.num_keys as usize);
            for _ in 0..header.num_keys {
                pointers.push(RowPointer::decode_from(&mut cursor)?);
            }
            Pointers::Leaf(pointers)
        } else {
            let mut children = Vec::with_capacity(header.num_keys as usize + 1);
            for _ in 0..=header.num_keys {
                children.push(cursor.read_u32::<LittleEndian>()?);
            }
            Pointers::Internal(children)
        };

        Ok(Self {
            header,
            keys,
            pointers,
        })
    }

    /// Serialized size in bytes, as would be produced by [`Self::encode`].
    #[must_use]
    pub fn serialized_len(&self, key_types: &[DataType]) -> usize {
        let mut len = HEADER_SIZE;
        for key in &self.keys {
            let encoded = Self::encode_key(key, key_types).unwrap_or_default();
            len += 2 + encoded.len();
        }
        len += match &self.pointers {
            Pointers::Leaf(pointers) => pointers.len() * RowPointer::SERIALIZED_LEN,
            Pointers::Internal(children) => children.len() * 4,
        };
        len
    }

    /// Whether inserting one more `(key, _)` entry would exceed `block_size`
    /// once re-serialized (spec.md §4.3: "a node is full when adding
    /// another key would make its serialized size exceed the block size").
    #[must_use]
    pub fn would_overflow_with(&self, extra_key: &IndexKey, key_types: &[DataType], block_size: usize) -> bool {
        let extra_key_bytes = 2 + Self::encode_key(extra_key, key_types).unwrap_or_default().len();
        let extra_pointer_bytes = match &self.pointers {
            Pointers::Leaf(_) => RowPointer::SERIALIZED_LEN,
            Pointers::Internal(_) => 4,
        };
        self.serialized_len(key_types) + extra_key_bytes + extra_pointer_bytes > block_size
    }
}
