//! Property-graph schema: per label, the property columns and (for edge
//! labels) the valid `(source label, destination label)` relations.

use arrow::datatypes::Schema;
use serde::{Deserialize, Serialize};

use crate::error::{LoadError, Result};
use crate::table::{TableKind, TableMeta};
use crate::LabelId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyDef {
    pub name: String,
    /// Arrow type, rendered with its `Display` form.
    pub data_type: String,
    pub nullable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelEntry {
    pub label: String,
    pub label_index: LabelId,
    pub properties: Vec<PropertyDef>,
    /// Empty for vertex labels.
    pub relations: Vec<(LabelId, LabelId)>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyGraphSchema {
    pub vertex_entries: Vec<LabelEntry>,
    pub edge_entries: Vec<LabelEntry>,
}

impl PropertyGraphSchema {
    /// Property columns of a canonical raw table: everything except the id
    /// (or endpoint) columns.
    pub fn entry(meta: &TableMeta, raw: &Schema, relations: Vec<(LabelId, LabelId)>) -> LabelEntry {
        let keys = meta.key_columns();
        let properties = raw
            .fields()
            .iter()
            .enumerate()
            .filter(|(c, _)| !keys.contains(c))
            .map(|(_, f)| PropertyDef {
                name: f.name().clone(),
                data_type: f.data_type().to_string(),
                nullable: f.is_nullable(),
            })
            .collect();
        let relations = match &meta.kind {
            TableKind::Vertex { .. } => Vec::new(),
            TableKind::Edge { .. } => relations,
        };
        LabelEntry {
            label: meta.label.clone(),
            label_index: meta.label_index,
            properties,
            relations,
        }
    }

    pub fn vertex_label_num(&self) -> usize {
        self.vertex_entries.len()
    }

    pub fn edge_label_num(&self) -> usize {
        self.edge_entries.len()
    }

    pub fn vertex_label_index(&self, name: &str) -> Option<LabelId> {
        self.vertex_entries
            .iter()
            .find(|e| e.label == name)
            .map(|e| e.label_index)
    }

    pub fn edge_label_index(&self, name: &str) -> Option<LabelId> {
        self.edge_entries
            .iter()
            .find(|e| e.label == name)
            .map(|e| e.label_index)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| LoadError::Invalid(format!("schema json: {e}")))
    }
}
