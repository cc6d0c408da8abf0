// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The public façade tying BlockIO, the row codec, the catalog and the
//! index registry together (spec.md §4.5).

use crate::block_io::{BlockIo, BLOCK_SIZE};
use crate::catalog::Catalog;
use crate::index::{Condition, Index, IndexKey};
use crate::index_controller::IndexController;
use crate::row::codec::{DecodeError, FLAG_ACTIVE, FLAG_DELETED};
use crate::row::{self, Row, RowPointer};
use crate::schema::{Schema, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;

/// `read_block`'s input: the table, an optional column projection (empty
/// means "all columns"), and a conjunction of conditions.
#[derive(Clone, Debug)]
pub struct Retrieval {
    /// Table to read from
    pub table: String,
    /// Columns to project, in order; empty means all columns
    pub columns: Vec<String>,
    /// Conditions, ANDed together
    pub conditions: Vec<Condition>,
}

/// `write_block`'s input: the table, the columns the caller supplied
/// values for, and the rows themselves (one `Vec<Value>` per row,
/// positionally matching `columns`).
#[derive(Clone, Debug)]
pub struct WriteRequest {
    /// Table to write into
    pub table: String,
    /// Columns the caller is supplying, in order
    pub columns: Vec<String>,
    /// Row values, positionally matching `columns`
    pub rows: Vec<Vec<Value>>,
}

/// `delete_block`'s input.
#[derive(Clone, Debug)]
pub struct Deletion {
    /// Table to delete from
    pub table: String,
    /// Conditions, ANDed together; rows matching all of them are deleted
    pub conditions: Vec<Condition>,
}

/// `get_stats`' return value: `{n_r, l_r, f_r, b_r, V_a_r}` (spec.md §4.5).
#[derive(Clone, Debug, PartialEq)]
pub struct Stats {
    /// Row count
    pub n_r: usize,
    /// Average row size in bytes
    pub l_r: f64,
    /// Rows per block (`floor(BLOCK_SIZE / l_r)`, minimum 1)
    pub f_r: usize,
    /// Block count (`ceil(n_r / f_r)`)
    pub b_r: usize,
    /// Per-column distinct-value estimate, keyed by column name
    pub v_a_r: BTreeMap<String, usize>,
}

/// Orchestrates reads, writes, deletes and DDL across the catalog, the row
/// codec, BlockIO and the index registry.
pub struct StorageEngine {
    catalog: Catalog,
    controller: IndexController,
    data_dir: PathBuf,
    data_files: HashMap<String, BlockIo>,
    auto_increment_counters: HashMap<String, i32>,
}

impl StorageEngine {
    /// Opens (or initializes) the catalog and index registry rooted at
    /// `data_dir`.
    pub fn open(data_dir: impl Into<PathBuf>) -> crate::Result<Self> {
        let data_dir = data_dir.into();
        std::fs::create_dir_all(&data_dir)?;
        let catalog = Catalog::open(data_dir.join("catalog.json"))?;
        let controller = IndexController::open(data_dir.join("index_metadata.json"), &data_dir)?;
        Ok(Self {
            catalog,
            controller,
            data_dir,
            data_files: HashMap::new(),
            auto_increment_counters: HashMap::new(),
        })
    }

    fn data_file(&mut self, table: &str) -> crate::Result<&mut BlockIo> {
        if !self.data_files.contains_key(table) {
            let entry = self.catalog.entry(table)?;
            let io = BlockIo::open(entry.file_path.clone())?;
            self.data_files.insert(table.to_string(), io);
        }
        Ok(self.data_files.get_mut(table).expect("just inserted"))
    }

    /// Creates (or replaces) a table's schema entry.
    pub fn create_table(&mut self, schema: Schema) -> crate::Result<()> {
        let file_path = self.data_dir.join(format!("{}.dat", schema.name()));
        self.data_files.remove(schema.name());
        self.catalog.create_table(&schema, file_path)
    }

    /// Soft-drops a table: removes it from the catalog, leaves its data
    /// file on disk, closes any cached file handle.
    pub fn drop_table(&mut self, name: &str) -> crate::Result<()> {
        self.data_files.remove(name);
        self.catalog.drop_table(name)
    }

    /// Creates a new index over `columns` of `table`, building it from a
    /// full table scan.
    pub fn set_index(&mut self, table: &str, columns: Vec<String>, unique: bool) -> crate::Result<String> {
        let schema = self.catalog.schema(table)?;
        let rows = self.scan_table(table, &schema)?;
        let key_columns = columns.clone();
        let entries = rows.into_iter().map(move |(row, pointer)| {
            let values = key_columns
                .iter()
                .map(|c| {
                    let idx = schema.column_index(c).expect("validated by set_index's caller");
                    row.values[idx].clone()
                })
                .collect();
            (IndexKey::new(values), pointer)
        });
        self.controller.set_index(&self.catalog, table, columns, unique, entries)
    }

    /// Full table scan, skipping tombstones, pairing each live row with its
    /// [`RowPointer`].
    fn scan_table(&mut self, table: &str, schema: &Schema) -> crate::Result<Vec<(Row, RowPointer)>> {
        let io = self.data_file(table)?;
        let last = io.last_block_index()?;
        let mut results = Vec::new();
        let mut block_idx: u64 = 0;

        while (block_idx as i64) <= last {
            let mut buffer = io.read(block_idx)?;
            let mut blocks_consumed: u64 = 1;

            loop {
                match row::codec::deserialize(schema, &buffer, BLOCK_SIZE) {
                    Ok(rows) => {
                        for r in rows {
                            let abs_block = block_idx + (r.offset / BLOCK_SIZE) as u64;
                            let intra_offset = (r.offset % BLOCK_SIZE) as u16;
                            results.push((r.row, RowPointer::new(abs_block as u32, intra_offset)));
                        }
                        break;
                    }
                    Err(DecodeError::IncompleteBlock { additional_needed_blocks }) => {
                        for i in 0..additional_needed_blocks {
                            let next_block = block_idx + blocks_consumed + i as u64;
                            buffer.extend_from_slice(&io.read(next_block)?);
                        }
                        blocks_consumed += additional_needed_blocks as u64;
                    }
                    Err(e) => return Err(e.into()),
                }
            }

            block_idx += blocks_consumed;
        }

        Ok(results)
    }

    /// Decodes the single row whose flag byte is at `pointer`, reading
    /// further blocks if its payload straddles a boundary. `None` if the
    /// row at that pointer is a tombstone.
    fn read_row_at(&mut self, table: &str, schema: &Schema, pointer: RowPointer) -> crate::Result<Option<Row>> {
        let io = self.data_file(table)?;
        let mut buffer = io.read(u64::from(pointer.block_index))?;
        let start = pointer.offset as usize;
        let mut next_block = u64::from(pointer.block_index) + 1;

        loop {
            if start + 3 > buffer.len() {
                buffer.extend_from_slice(&io.read(next_block)?);
                next_block += 1;
                continue;
            }
            let flag = buffer[start];
            if flag != FLAG_ACTIVE && flag != FLAG_DELETED {
                return Ok(None);
            }
            let length = u16::from_le_bytes([buffer[start + 1], buffer[start + 2]]) as usize;
            let payload_start = start + 3;
            let payload_end = payload_start + length;

            if payload_end > buffer.len() {
                buffer.extend_from_slice(&io.read(next_block)?);
                next_block += 1;
                continue;
            }

            if flag == FLAG_DELETED {
                return Ok(None);
            }

            let mut cursor = &buffer[payload_start..payload_end];
            let mut values = Vec::with_capacity(schema.columns().len());
            for column in schema.columns() {
                values.push(column.data_type.decode(&mut cursor)?);
            }
            return Ok(Some(Row::new(values)));
        }
    }

    /// Reads rows matching `retrieval.conditions`, projecting `columns` if
    /// non-empty.
    pub fn read_block(&mut self, retrieval: Retrieval) -> crate::Result<Vec<Row>> {
        let schema = self.catalog.schema(&retrieval.table)?;

        let indexed_condition = retrieval
            .conditions
            .iter()
            .find(|c| self.controller.get_index_for_table_column(&retrieval.table, &c.column).is_some());

        let candidates: Vec<(Row, RowPointer)> = if let Some(condition) = indexed_condition {
            let pointers: Vec<RowPointer> = self
                .controller
                .get_index_for_table_column(&retrieval.table, &condition.column)
                .expect("just confirmed present")
                .search_condition(condition)?
                .map(|entry| entry.map(|e| e.pointer))
                .collect::<crate::Result<Vec<RowPointer>>>()?;

            let mut rows = Vec::with_capacity(pointers.len());
            for pointer in pointers {
                if let Some(row) = self.read_row_at(&retrieval.table, &schema, pointer)? {
                    rows.push((row, pointer));
                }
            }
            rows
        } else {
            self.scan_table(&retrieval.table, &schema)?
        };

        let mut out = Vec::new();
        for (row, _) in candidates {
            if retrieval
                .conditions
                .iter()
                .all(|c| evaluate_condition(&schema, &row, c))
            {
                out.push(project(&schema, &row, &retrieval.columns));
            }
        }
        Ok(out)
    }

    fn next_auto_increment_value(&mut self, table: &str, schema: &Schema) -> crate::Result<i32> {
        if let Some(&next) = self.auto_increment_counters.get(table) {
            return Ok(next);
        }
        let column = schema
            .auto_increment_column()
            .expect("caller only invokes this when a column is declared auto-increment");
        let idx = schema.column_index(column).expect("validated at Schema::new");

        let max = self
            .scan_table(table, schema)?
            .into_iter()
            .filter_map(|(row, _)| match &row.values[idx] {
                Value::Int(v) => Some(*v),
                _ => None,
            })
            .max()
            .unwrap_or(-1);

        Ok(max + 1)
    }

    /// Builds a full schema-ordered row from a partial column/value list,
    /// imputing every column the caller didn't supply.
    fn impute_row(&mut self, table: &str, schema: &Schema, columns: &[String], values: Vec<Value>) -> crate::Result<Row> {
        let mut full = vec![None; schema.columns().len()];
        for (column, value) in columns.iter().zip(values) {
            let idx = schema.column_index(column).ok_or_else(|| {
                crate::error::SchemaError::UnknownColumn {
                    table: table.to_string(),
                    column: column.clone(),
                }
            })?;
            full[idx] = Some(value);
        }

        for (idx, column) in schema.columns().iter().enumerate() {
            if full[idx].is_some() {
                continue;
            }
            let imputed = if schema.auto_increment_column() == Some(column.name.as_str()) {
                let next = self.next_auto_increment_value(table, schema)?;
                self.auto_increment_counters.insert(table.to_string(), next + 1);
                Value::Int(next)
            } else {
                column.data_type.default_value()
            };
            full[idx] = Some(imputed);
        }

        Ok(Row::new(full.into_iter().map(|v| v.expect("every column imputed above")).collect()))
    }

    /// Writes `write.rows` into `write.table`, imputing missing columns,
    /// validating unique-index constraints up front, and updating every
    /// index registered against the table. Returns the number of rows
    /// written.
    pub fn write_block(&mut self, write: WriteRequest) -> crate::Result<usize> {
        let schema = self.catalog.schema(&write.table)?;

        let mut full_rows = Vec::with_capacity(write.rows.len());
        for values in write.rows {
            full_rows.push(self.impute_row(&write.table, &schema, &write.columns, values)?);
        }

        let index_names: Vec<(String, Vec<String>, bool)> = self
            .controller
            .indexes_for_table(&write.table)
            .map(|(name, meta)| (name.to_string(), meta.columns.clone(), meta.unique))
            .collect();

        // Validate every unique index before writing anything: against the
        // already-committed tree, and against the rest of this same batch
        // (two rows in one write_block call can collide with each other
        // without either existing on disk yet).
        for (name, cols, unique) in &index_names {
            if !unique {
                continue;
            }
            let index = self.controller.get_index(name).expect("listed by indexes_for_table");
            let mut seen_in_batch: Vec<IndexKey> = Vec::with_capacity(full_rows.len());
            for row in &full_rows {
                let key = build_key(&schema, row, cols);
                let collides_in_batch = seen_in_batch.iter().any(|k| *k == key);
                let collides_on_disk = index.search(&key)?.next().transpose()?.is_some();
                if collides_in_batch || collides_on_disk {
                    return Err(crate::Error::UniqueViolation {
                        index: name.clone(),
                        key: format!("{:?}", key.0),
                    });
                }
                seen_in_batch.push(key);
            }
        }

        let io = self.data_file(&write.table)?;
        let mut block_idx = (io.last_block_index()? + 1) as u64;
        let mut buffer: Vec<u8> = Vec::new();
        let mut pointers = Vec::with_capacity(full_rows.len());

        for row in &full_rows {
            let encoded = row::codec::serialize_with_flags(&schema, std::slice::from_ref(&(row.clone(), FLAG_ACTIVE)))?;

            if !buffer.is_empty() && buffer.len() + encoded.len() > BLOCK_SIZE {
                io.write(block_idx, &buffer)?;
                block_idx += 1;
                buffer.clear();
            }

            if encoded.len() > BLOCK_SIZE {
                let pointer = RowPointer::new(block_idx as u32, 0);
                let blocks_written = io.write(block_idx, &encoded)?;
                block_idx += blocks_written;
                pointers.push(pointer);
            } else {
                let pointer = RowPointer::new(block_idx as u32, buffer.len() as u16);
                buffer.extend_from_slice(&encoded);
                pointers.push(pointer);
            }
        }

        if !buffer.is_empty() {
            io.write(block_idx, &buffer)?;
        }

        for (row, pointer) in full_rows.iter().zip(&pointers) {
            for (name, cols, _) in &index_names {
                let key = build_key(&schema, row, cols);
                let index = self.controller.get_index(name).expect("listed by indexes_for_table");
                index.insert(key, *pointer)?;
            }
        }

        let written = full_rows.len();
        log::info!("wrote {written} row(s) into `{}`", write.table);
        Ok(written)
    }

    /// Marks every row matching `deletion.conditions` as a tombstone and
    /// removes its index entries. Returns the number of rows deleted.
    pub fn delete_block(&mut self, deletion: Deletion) -> crate::Result<usize> {
        let schema = self.catalog.schema(&deletion.table)?;

        let indexed_condition = deletion
            .conditions
            .iter()
            .find(|c| self.controller.get_index_for_table_column(&deletion.table, &c.column).is_some());

        let candidates: Vec<(Row, RowPointer)> = if let Some(condition) = indexed_condition {
            let pointers: Vec<RowPointer> = self
                .controller
                .get_index_for_table_column(&deletion.table, &condition.column)
                .expect("just confirmed present")
                .search_condition(condition)?
                .map(|entry| entry.map(|e| e.pointer))
                .collect::<crate::Result<Vec<RowPointer>>>()?;
            let mut rows = Vec::with_capacity(pointers.len());
            for pointer in pointers {
                if let Some(row) = self.read_row_at(&deletion.table, &schema, pointer)? {
                    rows.push((row, pointer));
                }
            }
            rows
        } else {
            self.scan_table(&deletion.table, &schema)?
        };

        let matching: Vec<(Row, RowPointer)> = candidates
            .into_iter()
            .filter(|(row, _)| deletion.conditions.iter().all(|c| evaluate_condition(&schema, row, c)))
            .collect();

        let mut by_block: HashMap<u32, Vec<u16>> = HashMap::new();
        for (_, pointer) in &matching {
            by_block.entry(pointer.block_index).or_default().push(pointer.offset);
        }

        let io = self.data_file(&deletion.table)?;
        for (block_index, offsets) in by_block {
            let mut block = io.read(u64::from(block_index))?;
            for offset in offsets {
                block[offset as usize] = FLAG_DELETED;
            }
            io.write(u64::from(block_index), &block)?;
        }

        let index_names: Vec<(String, Vec<String>, bool)> = self
            .controller
            .indexes_for_table(&deletion.table)
            .map(|(name, meta)| (name.to_string(), meta.columns.clone(), meta.unique))
            .collect();

        for (row, pointer) in &matching {
            for (name, cols, _) in &index_names {
                let key = build_key(&schema, row, cols);
                let index = self.controller.get_index(name).expect("listed by indexes_for_table");
                index.delete(&key, Some(*pointer))?;
            }
        }

        let deleted = matching.len();
        log::info!("deleted {deleted} row(s) from `{}`", deletion.table);
        Ok(deleted)
    }

    /// Compacts `table`'s data file: rewrites surviving rows densely from
    /// block 0 and rebuilds every index registered against it.
    pub fn defragment(&mut self, table: &str) -> crate::Result<()> {
        let schema = self.catalog.schema(table)?;
        let live_rows: Vec<Row> = self.scan_table(table, &schema)?.into_iter().map(|(r, _)| r).collect();

        let io = self.data_file(table)?;
        let old_last = io.last_block_index()?;

        let mut block_idx: u64 = 0;
        let mut buffer: Vec<u8> = Vec::new();
        let mut pointers = Vec::with_capacity(live_rows.len());

        for row in &live_rows {
            let encoded = row::codec::serialize_with_flags(&schema, std::slice::from_ref(&(row.clone(), FLAG_ACTIVE)))?;
            if !buffer.is_empty() && buffer.len() + encoded.len() > BLOCK_SIZE {
                io.write(block_idx, &buffer)?;
                block_idx += 1;
                buffer.clear();
            }
            if encoded.len() > BLOCK_SIZE {
                pointers.push(RowPointer::new(block_idx as u32, 0));
                block_idx += io.write(block_idx, &encoded)?;
            } else {
                pointers.push(RowPointer::new(block_idx as u32, buffer.len() as u16));
                buffer.extend_from_slice(&encoded);
            }
        }
        if !buffer.is_empty() {
            io.write(block_idx, &buffer)?;
        }
        let new_last = block_idx as i64 - if buffer.is_empty() { 1 } else { 0 };

        for stale in (new_last + 1)..=old_last {
            io.delete(stale as u64)?;
        }

        let index_specs: Vec<(String, Vec<String>, bool)> = self
            .controller
            .indexes_for_table(table)
            .map(|(name, meta)| (name.to_string(), meta.columns.clone(), meta.unique))
            .collect();

        for (name, _, _) in &index_specs {
            self.controller.drop_index(name)?;
        }
        for (_, columns, unique) in index_specs {
            self.set_index_from_rows(table, &schema, columns, unique, &live_rows, &pointers)?;
        }

        log::info!("defragmented `{table}`: {} live row(s)", live_rows.len());
        Ok(())
    }

    fn set_index_from_rows(
        &mut self,
        table: &str,
        schema: &Schema,
        columns: Vec<String>,
        unique: bool,
        rows: &[Row],
        pointers: &[RowPointer],
    ) -> crate::Result<()> {
        let entries: Vec<(IndexKey, RowPointer)> = rows
            .iter()
            .zip(pointers)
            .map(|(row, pointer)| (build_key(schema, row, &columns), *pointer))
            .collect();
        self.controller
            .set_index(&self.catalog, table, columns, unique, entries)
            .map(|_| ())
    }

    /// Computes `{n_r, l_r, f_r, b_r, V_a_r}` for `table` via a full scan.
    pub fn get_stats(&mut self, table: &str) -> crate::Result<Stats> {
        let schema = self.catalog.schema(table)?;
        let rows = self.scan_table(table, &schema)?;

        let n_r = rows.len();
        let total_bytes: usize = rows
            .iter()
            .map(|(row, _)| row::codec::serialize(&schema, std::slice::from_ref(row)).map(|b| b.len()).unwrap_or(0))
            .sum();
        let l_r = if n_r == 0 { 0.0 } else { total_bytes as f64 / n_r as f64 };
        let f_r = if l_r <= 0.0 { 1 } else { ((BLOCK_SIZE as f64 / l_r).floor() as usize).max(1) };
        let b_r = n_r.div_ceil(f_r);

        let mut v_a_r = BTreeMap::new();
        for (idx, column) in schema.columns().iter().enumerate() {
            let distinct: HashSet<String> = rows.iter().map(|(row, _)| format!("{:?}", row.values[idx])).collect();
            v_a_r.insert(column.name.clone(), distinct.len());
        }

        Ok(Stats { n_r, l_r, f_r, b_r, v_a_r })
    }
}

fn build_key(schema: &Schema, row: &Row, columns: &[String]) -> IndexKey {
    let values = columns
        .iter()
        .map(|c| {
            let idx = schema.column_index(c).expect("index columns must exist in schema");
            row.values[idx].clone()
        })
        .collect();
    IndexKey::new(values)
}

fn evaluate_condition(schema: &Schema, row: &Row, condition: &Condition) -> bool {
    let Some(idx) = schema.column_index(&condition.column) else {
        return false;
    };
    condition.operator.apply(&row.values[idx], &condition.operand)
}

fn project(schema: &Schema, row: &Row, columns: &[String]) -> Row {
    if columns.is_empty() {
        return row.clone();
    }
    let values = columns
        .iter()
        .map(|c| {
            let idx = schema.column_index(c).expect("projection columns must exist in schema");
            row.values[idx].clone()
        })
        .collect();
    Row::new(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::Operator;
    use crate::schema::{Column, DataType};
    use test_log::test;

    fn users_schema() -> Schema {
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
    fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = StorageEngine::open(dir.path()).unwrap();
        engine.create_table(users_schema()).unwrap();

        let written = engine
            .write_block(WriteRequest {
                table: "users".into(),
                columns: vec!["name".into()],
                rows: vec![vec![Value::Text("alice".into())], vec![Value::Text("bob".into())]],
            })
            .unwrap();
        assert_eq!(written, 2);

        let rows = engine
            .read_block(Retrieval {
                table: "users".into(),
                columns: vec![],
                conditions: vec![],
            })
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].values[0], Value::Int(0));
        assert_eq!(rows[1].values[0], Value::Int(1));
    }

    #[test]
    fn unique_index_rejects_conflicting_write() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = StorageEngine::open(dir.path()).unwrap();
        engine.create_table(users_schema()).unwrap();
        engine
            .write_block(WriteRequest {
                table: "users".into(),
                columns: vec!["id".into(), "name".into()],
                rows: vec![vec![Value::Int(1), Value::Text("alice".into())]],
            })
            .unwrap();
        engine.set_index("users", vec!["id".into()], true).unwrap();

        let result = engine.write_block(WriteRequest {
            table: "users".into(),
            columns: vec!["id".into(), "name".into()],
            rows: vec![vec![Value::Int(1), Value::Text("collision".into())]],
        });
        assert!(matches!(result, Err(crate::Error::UniqueViolation { .. })));
    }

    #[test]
    fn delete_then_read_excludes_tombstones() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = StorageEngine::open(dir.path()).unwrap();
        engine.create_table(users_schema()).unwrap();
        engine
            .write_block(WriteRequest {
                table: "users".into(),
                columns: vec!["id".into(), "name".into()],
                rows: vec![
                    vec![Value::Int(1), Value::Text("alice".into())],
                    vec![Value::Int(2), Value::Text("bob".into())],
                ],
            })
            .unwrap();

        let deleted = engine
            .delete_block(Deletion {
                table: "users".into(),
                conditions: vec![Condition {
                    column: "id".into(),
                    operator: Operator::Eq,
                    operand: Value::Int(1),
                }],
            })
            .unwrap();
        assert_eq!(deleted, 1);

        let rows = engine
            .read_block(Retrieval {
                table: "users".into(),
                columns: vec![],
                conditions: vec![],
            })
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].values[0], Value::Int(2));
    }

    #[test]
    fn defragment_preserves_live_rows_and_index_lookups() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = StorageEngine::open(dir.path()).unwrap();
        engine.create_table(users_schema()).unwrap();
        engine
            .write_block(WriteRequest {
                table: "users".into(),
                columns: vec!["id".into(), "name".into()],
                rows: vec![
                    vec![Value::Int(1), Value::Text("alice".into())],
                    vec![Value::Int(2), Value::Text("bob".into())],
                    vec![Value::Int(3), Value::Text("carol".into())],
                ],
            })
            .unwrap();
        engine.set_index("users", vec!["id".into()], true).unwrap();
        engine
            .delete_block(Deletion {
                table: "users".into(),
                conditions: vec![Condition {
                    column: "id".into(),
                    operator: Operator::Eq,
                    operand: Value::Int(2),
                }],
            })
            .unwrap();

        engine.defragment("users").unwrap();

        let rows = engine
            .read_block(Retrieval {
                table: "users".into(),
                columns: vec![],
                conditions: vec![],
            })
            .unwrap();
        assert_eq!(rows.len(), 2);

        let found = engine
            .read_block(Retrieval {
                table: "users".into(),
                columns: vec![],
                conditions: vec![Condition {
                    column: "id".into(),
                    operator: Operator::Eq,
                    operand: Value::Int(3),
                }],
            })
            .unwrap();
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn get_stats_reports_row_count_and_distinct_values() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = StorageEngine::open(dir.path()).unwrap();
        engine.create_table(users_schema()).unwrap();
        engine
            .write_block(WriteRequest {
                table: "users".into(),
                columns: vec!["id".into(), "name".into()],
                rows: vec![
                    vec![Value::Int(1), Value::Text("alice".into())],
                    vec![Value::Int(2), Value::Text("alice".into())],
                ],
            })
            .unwrap();

        let stats = engine.get_stats("users").unwrap();
        assert_eq!(stats.n_r, 2);
        assert_eq!(stats.v_a_r["name"], 1);
        assert_eq!(stats.v_a_r["id"], 2);
    }
}
