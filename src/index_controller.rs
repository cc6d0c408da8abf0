// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Process-wide index registry (spec.md §4.4).
//!
//! Owns every loaded [`BTreeIndex`] and a metadata file describing how to
//! reopen them. Metadata is persisted write-to-temp-and-rename, the same
//! discipline [`crate::catalog::Catalog`] uses for the table catalog.

use crate::catalog::Catalog;
use crate::error::SchemaError;
use crate::index::btree::BTreeIndex;
use crate::schema::DataType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// The only index kind this core implements.
pub const INDEX_TYPE_BTREE: &str = "BTREE";

/// One entry of the index metadata file (spec.md §6).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IndexMetadata {
    /// Path to the index's own block file
    pub file_path: PathBuf,
    /// Table this index is built against
    pub table: String,
    /// Indexed columns, in key order
    pub columns: Vec<String>,
    /// Column types, parallel to `columns`
    pub key_type: Vec<String>,
    /// Whether the index rejects duplicate keys
    pub unique: bool,
    /// Index kind; always `"BTREE"` for this core
    #[serde(rename = "type")]
    pub index_type: String,
}

/// Canonical index name: `{table}_{column}_{type}` (spec.md §6). Composite
/// indexes are named after their first (leading) column, matching how
/// `search_condition` already privileges the first key component.
#[must_use]
pub fn canonical_name(table: &str, first_column: &str, index_type: &str) -> String {
    format!("{table}_{first_column}_{index_type}")
}

/// Registry of loaded indexes, keyed by canonical name.
pub struct IndexController {
    metadata_path: PathBuf,
    index_dir: PathBuf,
    metadata: BTreeMap<String, IndexMetadata>,
    indexes: BTreeMap<String, BTreeIndex>,
}

impl IndexController {
    /// Loads the metadata file at `metadata_path` (or starts empty) and
    /// opens every declared index's file, validating its on-disk key-type
    /// descriptor against the metadata.
    pub fn open(metadata_path: impl Into<PathBuf>, index_dir: impl Into<PathBuf>) -> crate::Result<Self> {
        let metadata_path = metadata_path.into();
        let index_dir = index_dir.into();

        let metadata: BTreeMap<String, IndexMetadata> = if metadata_path.exists() {
            let bytes = std::fs::read(&metadata_path)?;
            serde_json::from_slice(&bytes)?
        } else {
            BTreeMap::new()
        };

        let mut indexes = BTreeMap::new();
        for (name, entry) in &metadata {
            let key_types = parse_key_types(&entry.key_type)?;
            let index = BTreeIndex::open(&entry.file_path, entry.columns.clone(), key_types, entry.unique)?;
            indexes.insert(name.clone(), index);
        }

        log::debug!("loaded {} index(es) from {}", metadata.len(), metadata_path.display());
        Ok(Self {
            metadata_path,
            index_dir,
            metadata,
            indexes,
        })
    }

    fn save_metadata(&self) -> crate::Result<()> {
        let dir = self.metadata_path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut tmp, &self.metadata)?;
        tmp.persist(&self.metadata_path)
            .map_err(|e| crate::Error::Io(e.error))?;
        Ok(())
    }

    /// Creates a new B+-tree index over `columns` of `table`, builds it
    /// from `rows` (a full table scan), and persists its metadata. Rolls
    /// back (drops the in-memory entry and deletes the index file) if any
    /// step after file creation fails.
    pub fn set_index(
        &mut self,
        catalog: &Catalog,
        table: &str,
        columns: Vec<String>,
        unique: bool,
        rows: impl IntoIterator<Item = (crate::index::IndexKey, crate::row::RowPointer)>,
    ) -> crate::Result<String> {
        let schema = catalog.schema(table)?;
        let key_types = columns
            .iter()
            .map(|c| Ok(schema.column(c)?.data_type))
            .collect::<crate::Result<Vec<DataType>>>()?;

        let first_column = columns.first().cloned().ok_or_else(|| {
            SchemaError::UnknownColumn {
                table: table.to_string(),
                column: String::new(),
            }
        })?;
        let name = canonical_name(table, &first_column, INDEX_TYPE_BTREE);
        let file_path = self.index_dir.join(format!("{name}.idx"));

        let build = || -> crate::Result<BTreeIndex> {
            let mut index = BTreeIndex::create(&file_path, columns.clone(), key_types.clone(), unique)?;
            index.build_index(rows)?;
            Ok(index)
        };

        match build() {
            Ok(index) => {
                self.indexes.insert(name.clone(), index);
                self.metadata.insert(
                    name.clone(),
                    IndexMetadata {
                        file_path,
                        table: table.to_string(),
                        columns,
                        key_type: key_types.iter().map(|t| t.name().to_string()).collect(),
                        unique,
                        index_type: INDEX_TYPE_BTREE.to_string(),
                    },
                );
                if let Err(e) = self.save_metadata() {
                    log::warn!("rolling back index `{name}`: metadata save failed: {e}");
                    self.indexes.remove(&name);
                    self.metadata.remove(&name);
                    let _ = std::fs::remove_file(&file_path);
                    return Err(e);
                }
                log::info!("created index `{name}`");
                Ok(name)
            }
            Err(e) => {
                log::warn!("rolling back index `{name}`: build failed: {e}");
                let _ = std::fs::remove_file(&file_path);
                Err(e)
            }
        }
    }

    /// Drops an index: removes the in-memory entry, its metadata, and the
    /// underlying index file.
    pub fn drop_index(&mut self, name: &str) -> crate::Result<()> {
        let entry = self
            .metadata
            .remove(name)
            .ok_or_else(|| SchemaError::UnknownIndex(name.to_string()))?;
        self.indexes.remove(name);
        let _ = std::fs::remove_file(&entry.file_path);
        self.save_metadata()?;
        log::info!("dropped index `{name}`");
        Ok(())
    }

    /// Looks up a loaded index by its canonical name.
    pub fn get_index(&mut self, name: &str) -> Option<&mut BTreeIndex> {
        self.indexes.get_mut(name)
    }

    /// Finds the first index registered against `table` whose leading
    /// column is `column`.
    pub fn get_index_for_table_column(&mut self, table: &str, column: &str) -> Option<&mut BTreeIndex> {
        let name = self
            .metadata
            .iter()
            .find(|(_, m)| m.table == table && m.columns.first().is_some_and(|c| c == column))
            .map(|(name, _)| name.clone())?;
        self.indexes.get_mut(&name)
    }

    /// All metadata entries registered against `table`.
    pub fn indexes_for_table<'a>(&'a self, table: &'a str) -> impl Iterator<Item = (&'a str, &'a IndexMetadata)> {
        self.metadata
            .iter()
            .filter(move |(_, m)| m.table == table)
            .map(|(name, m)| (name.as_str(), m))
    }
}

fn parse_key_types(names: &[String]) -> crate::Result<Vec<DataType>> {
    names
        .iter()
        .map(|n| match n.as_str() {
            "int" => Ok(DataType::Int),
            "float" => Ok(DataType::Float),
            // Width is unused for comparison/metadata-validation purposes;
            // see BTreeIndex::open, which only compares tag bytes.
            "char" => Ok(DataType::Char(0)),
            "varchar" => Ok(DataType::Varchar(0)),
            other => Err(SchemaError::KeyTypeMismatch {
                index: String::new(),
                stored: other.to_string(),
                expected: "int|float|char|varchar".to_string(),
            }
            .into()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::RowPointer;
    use crate::schema::{Column, Schema, Value};
    use test_log::test;

    fn setup(dir: &Path) -> Catalog {
        let mut catalog = Catalog::open(dir.join("catalog.json")).unwrap();
        let schema = Schema::new(
            "users",
            vec![
                Column::new("id", DataType::Int),
                Column::new("name", DataType::Varchar(32)),
            ],
            Some("id".into()),
        )
        .unwrap();
        catalog.create_table(&schema, dir.join("users.dat")).unwrap();
        catalog
    }

    #[test]
    fn set_index_creates_and_persists_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = setup(dir.path());
        let mut controller = IndexController::open(dir.path().join("indexes.json"), dir.path()).unwrap();

        let rows = vec![
            (crate::index::IndexKey::new(vec![Value::Int(1)]), RowPointer::new(0, 0)),
            (crate::index::IndexKey::new(vec![Value::Int(2)]), RowPointer::new(0, 20)),
        ];
        let name = controller
            .set_index(&catalog, "users", vec!["id".into()], true, rows)
            .unwrap();
        assert_eq!(name, "users_id_BTREE");

        let found: Vec<_> = controller
            .get_index(&name)
            .unwrap()
            .search(&crate::index::IndexKey::new(vec![Value::Int(1)]))
            .unwrap()
            .map(Result::unwrap)
            .collect();
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn reopen_recovers_index_registry() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = setup(dir.path());
        {
            let mut controller = IndexController::open(dir.path().join("indexes.json"), dir.path()).unwrap();
            controller
                .set_index(&catalog, "users", vec!["id".into()], true, std::iter::empty())
                .unwrap();
        }

        let mut reopened = IndexController::open(dir.path().join("indexes.json"), dir.path()).unwrap();
        assert!(reopened.get_index("users_id_BTREE").is_some());
        assert!(reopened.get_index_for_table_column("users", "id").is_some());
    }

    #[test]
    fn drop_index_removes_file_and_registry_entry() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = setup(dir.path());
        let mut controller = IndexController::open(dir.path().join("indexes.json"), dir.path()).unwrap();
        let name = controller
            .set_index(&catalog, "users", vec!["id".into()], true, std::iter::empty())
            .unwrap();

        controller.drop_index(&name).unwrap();
        assert!(controller.get_index(&name).is_none());
    }
}
