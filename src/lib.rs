// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

#![doc(
    html_favicon_url = "",
    html_logo_url = ""
)]
#![forbid(unsafe_code)]
#![deny(clippy::all, missing_docs, clippy::cargo)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::indexing_slicing)]
#![warn(clippy::pedantic, clippy::nursery)]
#![warn(clippy::expect_used)]
#![allow(clippy::missing_const_for_fn)]
#![warn(clippy::multiple_crate_versions)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::module_name_repetitions)]

//! A block-oriented, single-node relational storage engine core.
//!
//! The storage stack is layered the same way the rest of this workspace
//! layers its LSM-tree engine: a fixed-size paged file underneath
//! ([`block_io`]), a schema-driven binary row format on top of it
//! ([`schema`], [`row`]), a B+-tree secondary index built out of the same
//! paged file abstraction ([`index`]), and a façade that ties a table
//! catalog, an index registry, and per-table data files together into one
//! read/write/delete surface ([`catalog`], [`index_controller`],
//! [`storage_engine`]).
//!
//! ```
//! use storage_core::schema::{Column, DataType, Schema};
//! use storage_core::storage_engine::{Retrieval, StorageEngine, WriteRequest};
//!
//! # fn main() -> storage_core::Result<()> {
//! let dir = tempfile::tempdir()?;
//! let mut engine = StorageEngine::open(dir.path())?;
//!
//! let schema = Schema::new(
//!     "users",
//!     vec![
//!         Column::new("id", DataType::Int),
//!         Column::new("name", DataType::Varchar(32)),
//!     ],
//!     Some("id".into()),
//! )?;
//! engine.create_table(schema)?;
//!
//! engine.write_block(WriteRequest {
//!     table: "users".into(),
//!     columns: vec!["name".into()],
//!     rows: vec![vec![storage_core::schema::Value::Text("ada".into())]],
//! })?;
//!
//! let rows = engine.read_block(Retrieval {
//!     table: "users".into(),
//!     columns: vec!["id".into(), "name".into()],
//!     conditions: vec![],
//! })?;
//! assert_eq!(rows.len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod block_io;
pub mod catalog;
pub mod error;
pub mod index;
pub mod index_controller;
pub mod row;
pub mod schema;
pub mod storage_engine;

pub use error::{Error, Result};

pub use block_io::{BlockIo, BLOCK_SIZE};
pub use catalog::Catalog;
pub use index::{Condition, Index, IndexEntry, IndexKey, Operator};
pub use index_controller::IndexController;
pub use row::{Row, RowPointer};
pub use schema::{Column, DataType, Schema, Value};
pub use storage_engine::{Deletion, Retrieval, Stats, StorageEngine, WriteRequest};
