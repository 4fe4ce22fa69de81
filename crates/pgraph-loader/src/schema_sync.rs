//! Schema synchronization
//!
//! Makes every worker's copy of one label's table schema-identical:
//!
//! 1. each worker serializes its local schema (empty bytes when it holds no
//!    table) and the byte lengths are gathered on the coordinator;
//! 2. the serialized schemas are gathered and decoded on the coordinator;
//! 3. per column position the coordinator picks the most frequent field,
//!    grouping fields by their type string; among groups of equal size the
//!    smallest type string wins, and the group's first field is the winner;
//! 4. the canonical schema (or the failure) is broadcast;
//! 5. each worker builds an empty canonical table or casts its own table to
//!    the canonical schema.
//!
//! When no worker holds a table the protocol fails with an IO error on every
//! worker.

use std::sync::Arc;

use arrow::array::ArrayRef;
use arrow::compute::{can_cast_types, cast_with_options, CastOptions};
use arrow::datatypes::{Field, FieldRef, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use pgraph_comm::{Communicator, Phase, COORDINATOR};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{LoadError, Result};
use crate::status::agree;
use crate::table::{schema_from_bytes, schema_to_bytes};

#[derive(Debug, Serialize, Deserialize)]
enum SyncOutcome {
    Canonical(Vec<u8>),
    NoSchema(String),
    Incompatible(String),
}

/// Collective: agree on the canonical schema of one label.
///
/// The result is identical on every worker, errors included.
pub fn exchange_canonical_schema<C: Communicator>(
    comm: &mut C,
    local: Option<&SchemaRef>,
    label: &str,
) -> Result<SchemaRef> {
    let encoded = match local {
        Some(schema) => schema_to_bytes(schema),
        None => Ok(Vec::new()),
    };
    let local_bytes = agree(comm, "schema encode", encoded)?;
    let lengths = comm.gather(Phase::SchemaSync, local_bytes.len() as u64, COORDINATOR)?;
    let gathered = comm.gatherv(Phase::SchemaSync, local_bytes, COORDINATOR)?;

    let payload = match (lengths, gathered) {
        (Some(lengths), Some(buffers)) => bincode::serialize(&decide(&lengths, &buffers, label))?,
        _ => Vec::new(),
    };

    let bytes = comm.broadcast(Phase::SchemaSync, payload, COORDINATOR)?;
    match bincode::deserialize::<SyncOutcome>(&bytes)? {
        SyncOutcome::Canonical(schema) => {
            let schema = schema_from_bytes(&schema)?;
            debug!(label, columns = schema.fields().len(), "canonical schema agreed");
            Ok(schema)
        }
        SyncOutcome::NoSchema(message) => Err(LoadError::Io(message)),
        SyncOutcome::Incompatible(message) => Err(LoadError::Type(message)),
    }
}

/// Coordinator side of the exchange. Never fails: every problem becomes an
/// outcome that all workers receive.
fn decide(lengths: &[u64], buffers: &[Vec<u8>], label: &str) -> SyncOutcome {
    let mut schemas = Vec::new();
    for (worker, (len, buf)) in lengths.iter().zip(buffers).enumerate() {
        if *len as usize != buf.len() {
            return SyncOutcome::Incompatible(format!(
                "label '{label}': worker {worker} announced a {len}-byte schema but sent {} bytes",
                buf.len()
            ));
        }
        if buf.is_empty() {
            continue;
        }
        match schema_from_bytes(buf) {
            Ok(schema) => schemas.push(schema),
            Err(e) => {
                return SyncOutcome::Incompatible(format!(
                    "label '{label}': schema from worker {worker}: {}",
                    detail(e)
                ))
            }
        }
    }
    if schemas.is_empty() {
        return SyncOutcome::NoSchema(format!("label '{label}': all schemas are empty"));
    }
    match most_common_fields(&schemas).and_then(|schema| schema_to_bytes(&schema)) {
        Ok(bytes) => SyncOutcome::Canonical(bytes),
        Err(e) => SyncOutcome::Incompatible(format!("label '{label}': {}", detail(e))),
    }
}

fn detail(e: LoadError) -> String {
    match e {
        LoadError::Io(m) | LoadError::Type(m) | LoadError::Invalid(m) => m,
        other => other.to_string(),
    }
}

/// Local: bring `table` in line with `canonical`.
pub fn reconcile(table: Option<RecordBatch>, canonical: &SchemaRef) -> Result<RecordBatch> {
    match table {
        None => Ok(RecordBatch::new_empty(Arc::clone(canonical))),
        Some(batch) => promote_to_schema(&batch, canonical),
    }
}

/// Cast and rename every column of `batch` to `schema`.
pub fn promote_to_schema(batch: &RecordBatch, schema: &SchemaRef) -> Result<RecordBatch> {
    if batch.schema() == *schema {
        return Ok(batch.clone());
    }
    if batch.num_columns() != schema.fields().len() {
        return Err(LoadError::Type(format!(
            "table has {} column(s), canonical schema has {}",
            batch.num_columns(),
            schema.fields().len()
        )));
    }
    let options = CastOptions {
        safe: false,
        ..Default::default()
    };
    let columns = batch
        .columns()
        .iter()
        .zip(schema.fields().iter())
        .map(|(column, field)| -> Result<ArrayRef> {
            if column.data_type() == field.data_type() {
                return Ok(Arc::clone(column));
            }
            if !can_cast_types(column.data_type(), field.data_type()) {
                return Err(LoadError::Type(format!(
                    "column '{}': cannot promote {} to {}",
                    field.name(),
                    column.data_type(),
                    field.data_type()
                )));
            }
            cast_with_options(column, field.data_type(), &options).map_err(|e| {
                LoadError::Type(format!("column '{}': {e}", field.name()))
            })
        })
        .collect::<Result<Vec<_>>>()?;
    RecordBatch::try_new(Arc::clone(schema), columns).map_err(|e| LoadError::Type(e.to_string()))
}

/// Per column position, the most frequent field across `schemas`.
pub fn most_common_fields(schemas: &[SchemaRef]) -> Result<Schema> {
    let Some(first) = schemas.first() else {
        return Err(LoadError::Io("no schemas to reconcile".to_string()));
    };
    let width = first.fields().len();
    if let Some(other) = schemas.iter().find(|s| s.fields().len() != width) {
        return Err(LoadError::Type(format!(
            "column counts differ across workers: {width} vs {}",
            other.fields().len()
        )));
    }

    let fields = (0..width)
        .map(|column| {
            most_common_field(schemas.iter().map(|s| s.fields()[column].clone()))
                .ok_or_else(|| LoadError::Type(format!("column {column} has no candidates")))
        })
        .collect::<Result<Vec<Field>>>()?;
    Ok(Schema::new(fields))
}

fn most_common_field(candidates: impl Iterator<Item = FieldRef>) -> Option<Field> {
    // (type string, count, first field of that type)
    let mut groups: Vec<(String, usize, FieldRef)> = Vec::new();
    for field in candidates {
        let key = field.data_type().to_string();
        match groups.iter_mut().find(|(k, _, _)| *k == key) {
            Some(group) => group.1 += 1,
            None => groups.push((key, 1, field)),
        }
    }
    // Ties go to the smallest type string.
    groups.sort_by(|a, b| a.0.cmp(&b.0));
    let max = groups.iter().map(|g| g.1).max()?;
    groups
        .into_iter()
        .find(|g| g.1 == max)
        .map(|(_, _, field)| field.as_ref().clone())
}
