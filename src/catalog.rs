// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Table catalog: loads/saves table schemas (spec.md §2, §6).
//!
//! The catalog JSON is a plain `{table_name: entry}` map, persisted
//! write-to-temp-and-rename the same way [`crate::index_controller`]
//! persists its metadata.

use crate::error::SchemaError;
use crate::schema::{Column, Schema};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// One catalog entry: everything the core needs to open a table's data
/// file and interpret its rows.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Path to the table's data file
    pub file_path: PathBuf,
    /// Hint used by `get_stats`' rows-per-block estimate; updated on writes
    pub row_size: usize,
    /// Column definitions, in schema order
    pub columns: Vec<Column>,
    /// Name of the auto-increment column, if any. Not part of spec.md §6's
    /// column-object shape; kept as a sibling field on the table entry
    /// since auto-increment is a schema-level, not column-level, fact.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_increment_column: Option<String>,
}

/// In-memory table catalog, persisted as JSON.
#[derive(Debug, Default)]
pub struct Catalog {
    path: PathBuf,
    entries: BTreeMap<String, CatalogEntry>,
}

impl Catalog {
    /// Loads the catalog from `path`, or starts empty if the file doesn't
    /// exist yet.
    pub fn open(path: impl Into<PathBuf>) -> crate::Result<Self> {
        let path = path.into();
        let entries = if path.exists() {
            let bytes = std::fs::read(&path)?;
            serde_json::from_slice(&bytes)?
        } else {
            BTreeMap::new()
        };
        log::debug!("loaded catalog with {} table(s) from {}", entries.len(), path.display());
        Ok(Self { path, entries })
    }

    /// Atomically rewrites the catalog file: write to a temp file in the
    /// same directory, then rename over the target.
    pub fn save(&self) -> crate::Result<()> {
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut tmp, &self.entries)?;
        tmp.persist(&self.path)
            .map_err(|e| crate::Error::Io(e.error))?;
        Ok(())
    }

    /// Creates or replaces a table's schema entry (duplicate create
    /// replaces, per spec.md §4.5).
    pub fn create_table(
        &mut self,
        schema: &Schema,
        file_path: impl Into<PathBuf>,
    ) -> crate::Result<()> {
        let entry = CatalogEntry {
            file_path: file_path.into(),
            row_size: estimated_row_size(schema),
            columns: schema.columns().to_vec(),
            auto_increment_column: schema.auto_increment_column().map(str::to_string),
        };
        log::info!("creating table `{}`", schema.name());
        self.entries.insert(schema.name().to_string(), entry);
        self.save()
    }

    /// Soft-drops a table: removes the catalog entry, leaves the data file
    /// on disk.
    pub fn drop_table(&mut self, name: &str) -> crate::Result<()> {
        if self.entries.remove(name).is_none() {
            return Err(SchemaError::UnknownTable(name.to_string()).into());
        }
        log::info!("dropping table `{name}` (soft drop, file left on disk)");
        self.save()
    }

    /// Looks up a table's catalog entry.
    pub fn entry(&self, name: &str) -> crate::Result<&CatalogEntry> {
        self.entries
            .get(name)
            .ok_or_else(|| SchemaError::UnknownTable(name.to_string()).into())
    }

    /// Reconstructs a [`Schema`] from the catalog entry for `name`.
    pub fn schema(&self, name: &str) -> crate::Result<Schema> {
        let entry = self.entry(name)?;
        Ok(Schema::new(
            name,
            entry.columns.clone(),
            entry.auto_increment_column.clone(),
        )?)
    }

    /// Updates the `row_size` hint for a table (called by the engine after
    /// writes, to keep `get_stats` estimates current).
    pub fn update_row_size_hint(&mut self, name: &str, row_size: usize) -> crate::Result<()> {
        let entry = self
            .entries
            .get_mut(name)
            .ok_or_else(|| SchemaError::UnknownTable(name.to_string()))?;
        entry.row_size = row_size;
        self.save()
    }

    /// All table names currently in the catalog.
    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

fn estimated_row_size(schema: &Schema) -> usize {
    schema
        .columns()
        .iter()
        .map(|c| c.data_type.fixed_encoded_size().unwrap_or(16))
        .sum::<usize>()
        + 3 // flag + length header
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::DataType;
    use test_log::test;

    fn sample_schema() -> Schema {
        Schema::new(
            "users",
            vec![
                Column::new("id", DataType::Int),
                Column::new("name", DataType::Varchar(32)),
            ],
            Some("id".into()),
        )
        .unwrap()
    }

    #[test]
    fn create_and_reload_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let catalog_path = dir.path().join("catalog.json");

        let mut catalog = Catalog::open(&catalog_path).unwrap();
        catalog
            .create_table(&sample_schema(), dir.path().join("users.dat"))
            .unwrap();

        let reloaded = Catalog::open(&catalog_path).unwrap();
        let entry = reloaded.entry("users").unwrap();
        assert_eq!(entry.columns.len(), 2);
        assert_eq!(entry.columns[0].name, "id");
    }

    #[test]
    fn drop_table_removes_entry_but_is_soft() {
        let dir = tempfile::tempdir().unwrap();
        let catalog_path = dir.path().join("catalog.json");
        let data_path = dir.path().join("users.dat");

        let mut catalog = Catalog::open(&catalog_path).unwrap();
        catalog.create_table(&sample_schema(), &data_path).unwrap();
        std::fs::write(&data_path, b"not empty").unwrap();

        catalog.drop_table("users").unwrap();
        assert!(catalog.entry("users").is_err());
        assert!(data_path.exists(), "soft drop must not remove the data file");
    }

    #[test]
    fn unknown_table_is_a_schema_error() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Catalog::open(dir.path().join("catalog.json")).unwrap();
        assert!(catalog.entry("ghost").is_err());
    }
}
