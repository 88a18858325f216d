//! Arrow schema for the in-memory precedent index.

use std::sync::Arc;

use arrow::datatypes::{DataType, Field, Schema};

/// Schema of a precedent index export: one row per document with its
/// normalized embedding as `FixedSizeList<Float32, dim>`.
pub fn precedent_index_schema(dim: usize) -> Schema {
    Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("title", DataType::Utf8, false),
        Field::new("year", DataType::Int32, false),
        Field::new("court", DataType::Utf8, false),
        Field::new(
            "tags",
            DataType::List(Arc::new(Field::new("item", DataType::Utf8, true))),
            false,
        ),
        Field::new("text", DataType::Utf8, false),
        Field::new(
            "embedding",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, true)),
                dim as i32,
            ),
            false,
        ),
    ])
}
