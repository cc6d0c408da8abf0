use storage_core::schema::{Column, DataType, Schema, Value};
use storage_core::{Deletion, Retrieval, StorageEngine, WriteRequest};
use test_log::test;

fn users_schema() -> Schema {
    Schema::new(
        "users",
        vec![
            Column::new("id", DataType::Int),
            Column::new("name", DataType::Varchar(32)),
            Column::new("score", DataType::Float),
        ],
        Some("id".into()),
    )
    .expect("valid schema")
}

#[test]
fn write_read_delete_round_trip_across_reopen() -> storage_core::Result<()> {
    let dir = tempfile::tempdir()?;

    {
        let mut engine = StorageEngine::open(dir.path())?;
        engine.create_table(users_schema())?;

        engine.write_block(WriteRequest {
            table: "users".into(),
            columns: vec!["name".into(), "score".into()],
            rows: vec![
                vec![Value::Text("ada".into()), Value::Float(9.5)],
                vec![Value::Text("grace".into()), Value::Float(8.0)],
            ],
        })?;
    }

    // Reopen to confirm catalog + data file both survive a fresh process.
    let mut engine = StorageEngine::open(dir.path())?;
    let rows = engine.read_block(Retrieval {
        table: "users".into(),
        columns: vec![],
        conditions: vec![],
    })?;
    assert_eq!(rows.len(), 2);

    let deleted = engine.delete_block(Deletion {
        table: "users".into(),
        conditions: vec![storage_core::Condition {
            column: "name".into(),
            operator: storage_core::Operator::Eq,
            operand: Value::Text("ada".into()),
        }],
    })?;
    assert_eq!(deleted, 1);

    let remaining = engine.read_block(Retrieval {
        table: "users".into(),
        columns: vec!["name".into()],
        conditions: vec![],
    })?;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].values, vec![Value::Text("grace".into())]);

    Ok(())
}

#[test]
fn auto_increment_column_fills_without_caller_supplying_it() -> storage_core::Result<()> {
    let dir = tempfile::tempdir()?;
    let mut engine = StorageEngine::open(dir.path())?;
    engine.create_table(users_schema())?;

    engine.write_block(WriteRequest {
        table: "users".into(),
        columns: vec!["name".into(), "score".into()],
        rows: vec![vec![Value::Text("a".into()), Value::Float(1.0)]],
    })?;
    engine.write_block(WriteRequest {
        table: "users".into(),
        columns: vec!["name".into(), "score".into()],
        rows: vec![vec![Value::Text("b".into()), Value::Float(2.0)]],
    })?;

    let rows = engine.read_block(Retrieval {
        table: "users".into(),
        columns: vec!["id".into()],
        conditions: vec![],
    })?;
    let mut ids: Vec<i32> = rows
        .iter()
        .map(|r| match r.values.first() {
            Some(Value::Int(v)) => *v,
            _ => panic!("expected int id"),
        })
        .collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![1, 2]);

    Ok(())
}

#[test]
fn drop_table_is_soft_and_data_file_remains_on_disk() -> storage_core::Result<()> {
    let dir = tempfile::tempdir()?;
    let mut engine = StorageEngine::open(dir.path())?;
    engine.create_table(users_schema())?;
    engine.write_block(WriteRequest {
        table: "users".into(),
        columns: vec!["name".into(), "score".into()],
        rows: vec![vec![Value::Text("ada".into()), Value::Float(9.5)]],
    })?;

    engine.drop_table("users")?;
    assert!(dir.path().join("users.dat").exists());
    assert!(engine
        .read_block(Retrieval {
            table: "users".into(),
            columns: vec![],
            conditions: vec![],
        })
        .is_err());

    Ok(())
}
