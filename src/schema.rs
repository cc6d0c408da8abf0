// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Column types and table schemas.
//!
//! `DataType` is a closed, tagged sum (int/float/char/varchar) with
//! per-variant validate/encode/decode behavior, per the design note in
//! `spec.md` §9. A single tag byte (`{i, f, c, v}`) identifies a variant in
//! persisted key-type descriptors (`spec.md` §3, index metadata).

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::io::{Read, Write};

use crate::error::SchemaError;

/// A column's declared type. `char(N)`/`varchar(N)` carry their declared
/// maximum length (`N <= 65535`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DataType {
    /// 4-byte signed little-endian integer
    Int,
    /// 4-byte IEEE-754 little-endian float
    Float,
    /// Fixed-width UTF-8, zero-padded/truncated to exactly `N` bytes.
    /// `N` is validated to fit in 16 bits by [`Schema::new`]; stored as
    /// `u32` so an oversized declaration can be rejected rather than
    /// silently truncated at construction time.
    Char(u32),
    /// Length-prefixed (2-byte LE) UTF-8, truncated to at most `N` bytes.
    /// Same `u32` storage/validation rationale as [`DataType::Char`].
    Varchar(u32),
}

/// Wire shape of a [`DataType`] in the catalog JSON: `{"type": "...",
/// "length": N}` (spec.md §6), flattened into the enclosing `Column`. A
/// derived internally-tagged enum can't produce this — serde's `tag = ...`
/// representation requires every variant to serialize as a map, but a
/// newtype variant wrapping a bare `u32` does not, so `Char`/`Varchar` are
/// handled by hand here instead.
#[derive(Serialize, Deserialize)]
struct DataTypeRepr {
    #[serde(rename = "type")]
    type_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    length: Option<u32>,
}

impl Serialize for DataType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        DataTypeRepr {
            type_name: self.name().to_string(),
            length: self.declared_length(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for DataType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let repr = DataTypeRepr::deserialize(deserializer)?;
        match repr.type_name.as_str() {
            "int" => Ok(Self::Int),
            "float" => Ok(Self::Float),
            "char" => Ok(Self::Char(repr.length.unwrap_or(0))),
            "varchar" => Ok(Self::Varchar(repr.length.unwrap_or(0))),
            other => Err(serde::de::Error::custom(format!("unknown column type `{other}`"))),
        }
    }
}

/// The single-byte tag used in on-disk key-type descriptors
impl DataType {
    /// Returns the `{i, f, c, v}` tag byte for this type.
    #[must_use]
    pub fn tag(self) -> u8 {
        match self {
            Self::Int => b'i',
            Self::Float => b'f',
            Self::Char(_) => b'c',
            Self::Varchar(_) => b'v',
        }
    }

    /// Human-readable name, matching the catalog JSON's `type` strings.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Int => "int",
            Self::Float => "float",
            Self::Char(_) => "char",
            Self::Varchar(_) => "varchar",
        }
    }

    /// Declared max length for `char`/`varchar`, `None` for `int`/`float`.
    #[must_use]
    pub fn declared_length(self) -> Option<u32> {
        match self {
            Self::Char(n) | Self::Varchar(n) => Some(n),
            Self::Int | Self::Float => None,
        }
    }

    /// Encoded byte size, when statically known (int/float/char are
    /// fixed-width; varchar's size depends on the value).
    #[must_use]
    pub fn fixed_encoded_size(self) -> Option<usize> {
        match self {
            Self::Int | Self::Float => Some(4),
            Self::Char(n) => Some(n as usize),
            Self::Varchar(_) => None,
        }
    }

    /// Encodes `value` into `writer`, matching this column's wire format.
    pub fn encode<W: Write>(self, value: &Value, writer: &mut W) -> std::io::Result<()> {
        match (self, value) {
            (Self::Int, Value::Int(v)) => writer.write_i32::<LittleEndian>(*v),
            (Self::Float, Value::Float(v)) => writer.write_f32::<LittleEndian>(*v),
            (Self::Char(n), Value::Text(s)) => {
                let mut buf = vec![0u8; n as usize];
                let bytes = s.as_bytes();
                let take = bytes.len().min(n as usize);
                buf[..take].copy_from_slice(&bytes[..take]);
                writer.write_all(&buf)
            }
            (Self::Varchar(n), Value::Text(s)) => {
                let bytes = s.as_bytes();
                let take = bytes.len().min(n as usize);
                writer.write_u16::<LittleEndian>(take as u16)?;
                writer.write_all(&bytes[..take])
            }
            _ => Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "value does not match declared column type",
            )),
        }
    }

    /// Decodes one value of this type from `reader`.
    pub fn decode<R: Read>(self, reader: &mut R) -> std::io::Result<Value> {
        match self {
            Self::Int => Ok(Value::Int(reader.read_i32::<LittleEndian>()?)),
            Self::Float => Ok(Value::Float(reader.read_f32::<LittleEndian>()?)),
            Self::Char(n) => {
                let mut buf = vec![0u8; n as usize];
                reader.read_exact(&mut buf)?;
                let trimmed = buf
                    .iter()
                    .position(|&b| b == 0)
                    .map_or(buf.len(), |i| i);
                let s = String::from_utf8_lossy(&buf[..trimmed]).into_owned();
                Ok(Value::Text(s))
            }
            Self::Varchar(_) => {
                let len = reader.read_u16::<LittleEndian>()? as usize;
                let mut buf = vec![0u8; len];
                reader.read_exact(&mut buf)?;
                Ok(Value::Text(String::from_utf8_lossy(&buf).into_owned()))
            }
        }
    }

    /// Default value used to impute a missing non-auto-increment column on
    /// insert: `0`/`0.0` for numeric types, empty string for text types.
    #[must_use]
    pub fn default_value(self) -> Value {
        match self {
            Self::Int => Value::Int(0),
            Self::Float => Value::Float(0.0),
            Self::Char(_) | Self::Varchar(_) => Value::Text(String::new()),
        }
    }
}

/// A runtime column value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// Signed 32-bit integer
    Int(i32),
    /// 32-bit float
    Float(f32),
    /// UTF-8 text (used for both `char` and `varchar` columns)
    Text(String),
}

impl Value {
    /// Returns this value's first-class ordering key for index comparisons.
    /// Ordering across heterogeneous `Value`s is total: `Int < Float < Text`
    /// only matters if a caller compares mismatched types, which the index
    /// layer never does (keys are typed by column).
    #[must_use]
    pub fn cmp_key(&self) -> OrdKey<'_> {
        match self {
            Self::Int(v) => OrdKey::Int(*v),
            Self::Float(v) => OrdKey::Float(*v),
            Self::Text(s) => OrdKey::Text(s),
        }
    }
}

/// Comparable projection of a [`Value`], used for index key ordering.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum OrdKey<'a> {
    /// Integer comparison key
    Int(i32),
    /// Float comparison key (NaN sorts as equal to itself, never produced
    /// by this codec in practice since floats come from user input)
    Float(f32),
    /// Text comparison key
    Text(&'a str),
}

impl PartialOrd for OrdKey<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a.partial_cmp(b),
            (Self::Float(a), Self::Float(b)) => a.partial_cmp(b),
            (Self::Text(a), Self::Text(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

/// One column of a [`Schema`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Column {
    /// Column name, unique within the schema
    pub name: String,
    /// Column type
    #[serde(flatten)]
    pub data_type: DataType,
}

impl Column {
    /// Builds a column.
    #[must_use]
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

/// An ordered sequence of columns, with an optional auto-increment column.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    name: String,
    columns: Vec<Column>,
    auto_increment_column: Option<String>,
}

impl Schema {
    /// Builds and validates a schema: column names must be unique, declared
    /// char/varchar lengths must fit in 16 bits, and at most one column may
    /// be marked auto-increment.
    pub fn new(
        name: impl Into<String>,
        columns: Vec<Column>,
        auto_increment_column: Option<String>,
    ) -> Result<Self, SchemaError> {
        let name = name.into();

        let mut seen_names: Vec<&str> = Vec::with_capacity(columns.len());
        for column in &columns {
            if seen_names.contains(&column.name.as_str()) {
                return Err(SchemaError::DuplicateColumn {
                    table: name,
                    column: column.name.clone(),
                });
            }
            seen_names.push(&column.name);
        }

        for column in &columns {
            if let Some(length) = column.data_type.declared_length() {
                if length as usize > 65535 {
                    return Err(SchemaError::LengthOutOfRange {
                        column: column.name.clone(),
                        length: length as usize,
                    });
                }
            }
        }

        if let Some(auto_col) = &auto_increment_column {
            if !columns.iter().any(|c| &c.name == auto_col) {
                return Err(SchemaError::UnknownColumn {
                    table: name,
                    column: auto_col.clone(),
                });
            }
        }

        Ok(Self {
            name,
            columns,
            auto_increment_column,
        })
    }

    /// Table name this schema belongs to.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ordered columns.
    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// The auto-increment column's name, if any.
    #[must_use]
    pub fn auto_increment_column(&self) -> Option<&str> {
        self.auto_increment_column.as_deref()
    }

    /// Index of a column by name.
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Looks up a column by name.
    pub fn column(&self, name: &str) -> Result<&Column, SchemaError> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| SchemaError::UnknownColumn {
                table: self.name.clone(),
                column: name.to_string(),
            })
    }
}
