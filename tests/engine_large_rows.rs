use storage_core::schema::{Column, DataType, Schema, Value};
use storage_core::{Retrieval, StorageEngine, WriteRequest};
use test_log::test;

/// A row whose encoded size exceeds `BLOCK_SIZE` (4096) forces the engine's
/// write/read/scan paths to span multiple blocks, exercising the same
/// `IncompleteBlockError` retry loop the row codec defines.
fn wide_schema() -> Schema {
    Schema::new(
        "documents",
        vec![
            Column::new("id", DataType::Int),
            Column::new("body", DataType::Varchar(5000)),
        ],
        Some("id".into()),
    )
    .expect("valid schema")
}

#[test]
fn row_spanning_multiple_blocks_round_trips() -> storage_core::Result<()> {
    let dir = tempfile::tempdir()?;
    let mut engine = StorageEngine::open(dir.path())?;
    engine.create_table(wide_schema())?;

    let body = "x".repeat(4900);
    engine.write_block(WriteRequest {
        table: "documents".into(),
        columns: vec!["body".into()],
        rows: vec![vec![Value::Text(body.clone())]],
    })?;

    let rows = engine.read_block(Retrieval {
        table: "documents".into(),
        columns: vec!["body".into()],
        conditions: vec![],
    })?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].values, vec![Value::Text(body)]);

    Ok(())
}

#[test]
fn multiple_wide_rows_are_all_recovered_by_a_full_scan() -> storage_core::Result<()> {
    let dir = tempfile::tempdir()?;
    let mut engine = StorageEngine::open(dir.path())?;
    engine.create_table(wide_schema())?;

    for i in 0..3 {
        let body = format!("{i}").repeat(4800);
        engine.write_block(WriteRequest {
            table: "documents".into(),
            columns: vec!["body".into()],
            rows: vec![vec![Value::Text(body)]],
        })?;
    }

    let rows = engine.read_block(Retrieval {
        table: "documents".into(),
        columns: vec![],
        conditions: vec![],
    })?;
    assert_eq!(rows.len(), 3);

    Ok(())
}
