//! Label-tagged tables
//!
//! - [`TableMeta`]: typed per-table metadata (vertex/edge, label, label
//!   index, id or endpoint columns, relations), validated once against the
//!   table schema.
//! - [`LabelTables`]: a label index → value collection that rejects
//!   duplicate and out-of-range indices and yields values in label order.
//! - Arrow IPC stream helpers for shipping schemas and tables between
//!   workers and into sealed objects.

use std::collections::BTreeMap;
use std::io::Cursor;
use std::sync::Arc;

use arrow::compute::concat_batches;
use arrow::datatypes::{Schema, SchemaRef};
use arrow::ipc::reader::StreamReader;
use arrow::ipc::writer::StreamWriter;
use arrow::record_batch::RecordBatch;
use serde::{Deserialize, Serialize};

use crate::error::{LoadError, Result};
use crate::oid::is_id_type;
use crate::LabelId;

// ============================================================================
// Metadata
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TableKind {
    Vertex {
        id_column: usize,
    },
    Edge {
        src_column: usize,
        dst_column: usize,
        /// `(source vertex label, destination vertex label)`; empty means
        /// endpoints may belong to any vertex label.
        relations: Vec<(LabelId, LabelId)>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMeta {
    pub kind: TableKind,
    pub label: String,
    pub label_index: LabelId,
}

impl TableMeta {
    pub fn vertex(label: impl Into<String>, label_index: LabelId, id_column: usize) -> Self {
        Self {
            kind: TableKind::Vertex { id_column },
            label: label.into(),
            label_index,
        }
    }

    pub fn edge(
        label: impl Into<String>,
        label_index: LabelId,
        src_column: usize,
        dst_column: usize,
        relations: Vec<(LabelId, LabelId)>,
    ) -> Self {
        Self {
            kind: TableKind::Edge {
                src_column,
                dst_column,
                relations,
            },
            label: label.into(),
            label_index,
        }
    }

    pub fn is_vertex(&self) -> bool {
        matches!(self.kind, TableKind::Vertex { .. })
    }

    pub fn sub_relation_count(&self) -> usize {
        match &self.kind {
            TableKind::Vertex { .. } => 0,
            TableKind::Edge { relations, .. } => relations.len(),
        }
    }

    /// Columns that reference vertices (id column, or src/dst columns).
    pub fn key_columns(&self) -> Vec<usize> {
        match &self.kind {
            TableKind::Vertex { id_column } => vec![*id_column],
            TableKind::Edge {
                src_column,
                dst_column,
                ..
            } => vec![*src_column, *dst_column],
        }
    }

    /// Check the key columns exist and hold id-typed values.
    pub fn validate(&self, schema: &Schema, vertex_label_num: usize) -> Result<()> {
        for column in self.key_columns() {
            let field = schema.fields().get(column).ok_or_else(|| {
                LoadError::Invalid(format!(
                    "label '{}': key column {column} missing, table has {} column(s)",
                    self.label,
                    schema.fields().len()
                ))
            })?;
            if !is_id_type(field.data_type()) {
                return Err(LoadError::Type(format!(
                    "label '{}': column '{}' has type {}, not an id type",
                    self.label,
                    field.name(),
                    field.data_type()
                )));
            }
        }
        if let TableKind::Edge { relations, .. } = &self.kind {
            if let Some(bad) = relations
                .iter()
                .find(|(s, d)| *s >= vertex_label_num || *d >= vertex_label_num)
            {
                return Err(LoadError::Invalid(format!(
                    "label '{}': relation {bad:?} names a vertex label outside 0..{vertex_label_num}",
                    self.label
                )));
            }
        }
        Ok(())
    }
}

/// A table together with its metadata.
#[derive(Debug, Clone)]
pub struct LabeledTable {
    pub meta: TableMeta,
    pub batch: RecordBatch,
}

// ============================================================================
// Label-keyed collection
// ============================================================================

#[derive(Debug, Clone)]
pub struct LabelTables<T> {
    label_num: usize,
    tables: BTreeMap<LabelId, T>,
}

impl<T> LabelTables<T> {
    pub fn new(label_num: usize) -> Self {
        Self {
            label_num,
            tables: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, label: LabelId, table: T) -> Result<()> {
        if label >= self.label_num {
            return Err(LoadError::Invalid(format!(
                "label index {label} out of range for {} labels",
                self.label_num
            )));
        }
        if self.tables.contains_key(&label) {
            return Err(LoadError::Invalid(format!("duplicate table for label index {label}")));
        }
        self.tables.insert(label, table);
        Ok(())
    }

    pub fn from_entries(label_num: usize, entries: impl IntoIterator<Item = (LabelId, T)>) -> Result<Self> {
        let mut out = Self::new(label_num);
        for (label, table) in entries {
            out.insert(label, table)?;
        }
        Ok(out)
    }

    pub fn label_num(&self) -> usize {
        self.label_num
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn get(&self, label: LabelId) -> Option<&T> {
        self.tables.get(&label)
    }

    pub fn iter(&self) -> impl Iterator<Item = (LabelId, &T)> {
        self.tables.iter().map(|(l, t)| (*l, t))
    }

    /// Values in label order; every label in `0..label_num` must be present.
    pub fn into_ordered(self) -> Result<Vec<T>> {
        if self.tables.len() != self.label_num {
            let missing = (0..self.label_num)
                .find(|l| !self.tables.contains_key(l))
                .unwrap_or(self.label_num);
            return Err(LoadError::Invalid(format!("no table for label index {missing}")));
        }
        Ok(self.tables.into_values().collect())
    }
}

// ============================================================================
// IPC helpers
// ============================================================================

/// Encode a schema as an IPC stream with no batches.
pub fn schema_to_bytes(schema: &Schema) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut writer = StreamWriter::try_new(&mut out, schema)?;
    writer.finish()?;
    drop(writer);
    Ok(out)
}

pub fn schema_from_bytes(bytes: &[u8]) -> Result<SchemaRef> {
    let reader = StreamReader::try_new(Cursor::new(bytes), None)?;
    Ok(reader.schema())
}

pub fn batch_to_bytes(batch: &RecordBatch) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut writer = StreamWriter::try_new(&mut out, batch.schema().as_ref())?;
    writer.write(batch)?;
    writer.finish()?;
    drop(writer);
    Ok(out)
}

pub fn batch_from_bytes(bytes: &[u8]) -> Result<RecordBatch> {
    let reader = StreamReader::try_new(Cursor::new(bytes), None)?;
    let schema = reader.schema();
    let batches = reader.collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(concat_batches(&schema, &batches)?)
}

/// Concatenate `parts` (each matching `schema`), yielding an empty batch
/// when there are none.
pub fn concat_or_empty(schema: &SchemaRef, parts: &[RecordBatch]) -> Result<RecordBatch> {
    if parts.is_empty() {
        return Ok(RecordBatch::new_empty(Arc::clone(schema)));
    }
    Ok(concat_batches(schema, parts)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Int64Array, StringArray};
    use arrow::datatypes::{DataType, Field};

    fn person() -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("name", DataType::Utf8, true),
        ]));
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(vec![1, 2])),
                Arc::new(StringArray::from(vec!["ada", "bob"])),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_ipc_table_and_schema() {
        let batch = person();
        assert_eq!(batch_from_bytes(&batch_to_bytes(&batch).unwrap()).unwrap(), batch);
        let schema = schema_from_bytes(&schema_to_bytes(&batch.schema()).unwrap()).unwrap();
        assert_eq!(schema, batch.schema());
    }

    #[test]
    fn test_label_tables_reject_duplicates_and_out_of_range() {
        let mut tables = LabelTables::new(2);
        tables.insert(1, "b").unwrap();
        assert!(matches!(tables.insert(1, "again"), Err(LoadError::Invalid(_))));
        assert!(matches!(tables.insert(2, "c"), Err(LoadError::Invalid(_))));
        assert!(tables.clone().into_ordered().is_err());
        tables.insert(0, "a").unwrap();
        assert_eq!(tables.into_ordered().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn test_meta_validation() {
        let schema = person().schema();
        assert!(TableMeta::vertex("person", 0, 0).validate(&schema, 1).is_ok());
        assert!(matches!(
            TableMeta::vertex("person", 0, 5).validate(&schema, 1),
            Err(LoadError::Invalid(_))
        ));
        assert!(TableMeta::edge("knows", 0, 0, 1, vec![]).validate(&schema, 1).is_ok());
        assert!(TableMeta::edge("knows", 0, 0, 1, vec![(0, 3)])
            .validate(&schema, 1)
            .is_err());
    }
}
