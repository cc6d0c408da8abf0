// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Row representation and the schema-driven row codec.

pub mod codec;

pub use codec::{DeserializedRow, Row, RowPointer};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::codec::{deserialize, serialize, serialize_with_flags, FLAG_DELETED};
    use crate::schema::{Column, DataType, Schema, Value};
    use test_log::test;

    fn student_schema() -> Schema {
        Schema::new(
            "student",
            vec![
                Column::new("id", DataType::Int),
                Column::new("name", DataType::Char(8)),
                Column::new("nim", DataType::Varchar(16)),
                Column::new("gpa", DataType::Float),
            ],
            None,
        )
        .unwrap()
    }

    #[test]
    fn round_trip_mixed_row() {
        let schema = student_schema();
        let row = Row::new(vec![
            Value::Int(2_147_483_647),
            Value::Text("Alif".into()),
            Value::Text("13523045".into()),
            Value::Float(2.3),
        ]);

        let bytes = serialize(&schema, &[row.clone()]).unwrap();
        let decoded = deserialize(&schema, &bytes, 4096).unwrap();

        assert_eq!(decoded.len(), 1);
        let got = &decoded[0].row;
        assert_eq!(got.values[0], Value::Int(2_147_483_647));
        assert_eq!(got.values[1], Value::Text("Alif".into()));
        assert_eq!(got.values[2], Value::Text("13523045".into()));
        match got.values[3] {
            Value::Float(f) => assert!((f - 2.3).abs() < 1e-6),
            _ => panic!("expected float"),
        }
    }

    #[test]
    fn idempotent_reserialize() {
        let schema = student_schema();
        let row = Row::new(vec![
            Value::Int(1),
            Value::Text("Bob".into()),
            Value::Text("999".into()),
            Value::Float(3.5),
        ]);
        let once = serialize(&schema, &[row]).unwrap();
        let decoded = deserialize(&schema, &once, 4096).unwrap();
        let rows: Vec<Row> = decoded.into_iter().map(|d| d.row).collect();
        let twice = serialize(&schema, &rows).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn tombstone_opacity() {
        let schema = student_schema();
        let row = Row::new(vec![
            Value::Int(7),
            Value::Text("Eve".into()),
            Value::Text("111".into()),
            Value::Float(1.0),
        ]);

        let four = vec![row.clone(), row.clone(), row.clone(), row.clone()];
        let tagged: Vec<(Row, u8)> = four
            .into_iter()
            .enumerate()
            .map(|(i, r)| (r, if i < 2 { FLAG_DELETED } else { codec::FLAG_ACTIVE }))
            .collect();

        let before_len = serialize_with_flags(&schema, &tagged).unwrap().len();
        let bytes = serialize_with_flags(&schema, &tagged).unwrap();

        let decoded = deserialize(&schema, &bytes, 4096).unwrap();
        assert_eq!(decoded.len(), 2);
        assert_eq!(bytes.len(), before_len);
    }

    #[test]
    fn char_truncates_and_pads() {
        let schema = Schema::new(
            "t",
            vec![Column::new("c", DataType::Char(3))],
            None,
        )
        .unwrap();

        let long = Row::new(vec![Value::Text("abcdef".into())]);
        let bytes = serialize(&schema, &[long]).unwrap();
        let decoded = deserialize(&schema, &bytes, 4096).unwrap();
        assert_eq!(decoded[0].row.values[0], Value::Text("abc".into()));

        let short = Row::new(vec![Value::Text("a".into())]);
        let bytes = serialize(&schema, &[short]).unwrap();
        let decoded = deserialize(&schema, &bytes, 4096).unwrap();
        assert_eq!(decoded[0].row.values[0], Value::Text("a".into()));
    }

    #[test]
    fn cross_block_row_raises_incomplete_block() {
        let schema = Schema::new(
            "t",
            vec![Column::new("v", DataType::Varchar(65535))],
            None,
        )
        .unwrap();

        let big = Row::new(vec![Value::Text("x".repeat(4990))]);
        let bytes = serialize(&schema, &[big]).unwrap();
        assert!(bytes.len() > 4096);

        let block_size = 4096;
        let one_block = &bytes[..block_size.min(bytes.len())];
        let err = deserialize(&schema, one_block, block_size).unwrap_err();
        match err {
            crate::row::codec::DecodeError::IncompleteBlock {
                additional_needed_blocks,
            } => assert_eq!(additional_needed_blocks, 1),
            other => panic!("expected IncompleteBlock, got {other:?}"),
        }

        let whole = deserialize(&schema, &bytes, block_size).unwrap();
        assert_eq!(whole.len(), 1);
        assert_eq!(whole[0].row.values[0], Value::Text("x".repeat(4990)));
    }
}
