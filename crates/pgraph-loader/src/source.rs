//! Raw table sources.
//!
//! A [`TableSource`] turns one input file into this worker's share of rows.
//! [`CsvTableSource`] keeps data rows `[part * n / parts, (part + 1) * n / parts)`
//! and infers column types from the kept rows only, so two workers reading
//! the same file may legitimately end up with different local types.
//!
//! A file with a header but no data rows yields a zero-row table on every
//! worker, all columns typed as text, so its label still loads (empty).

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::csv::reader::Format;
use arrow::csv::{ReaderBuilder, WriterBuilder};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use tracing::debug;

use crate::error::{LoadError, Result};
use crate::schema_sync::promote_to_schema;
use crate::table::concat_or_empty;
use crate::LabelId;

pub trait TableSource: Send {
    /// Rows of `path` belonging to `part` out of `parts`, or `None` when
    /// that share is empty.
    fn read_table(&self, path: &Path, part: usize, parts: usize) -> Result<Option<RecordBatch>>;
}

#[derive(Debug, Clone, Copy)]
pub struct CsvTableSource {
    delimiter: u8,
}

impl Default for CsvTableSource {
    fn default() -> Self {
        Self { delimiter: b',' }
    }
}

impl CsvTableSource {
    pub fn new(delimiter: u8) -> Self {
        Self { delimiter }
    }

    fn format(&self) -> Format {
        Format::default().with_header(true).with_delimiter(self.delimiter)
    }

    fn read_all(&self, bytes: &[u8], schema: SchemaRef, bounds: Option<(usize, usize)>) -> Result<RecordBatch> {
        let mut builder = ReaderBuilder::new(Arc::clone(&schema))
            .with_header(true)
            .with_delimiter(self.delimiter);
        if let Some((lo, hi)) = bounds {
            builder = builder.with_bounds(lo, hi);
        }
        let reader = builder.build(Cursor::new(bytes))?;
        let batches = reader.collect::<std::result::Result<Vec<_>, _>>()?;
        concat_or_empty(&schema, &batches)
    }
}

impl TableSource for CsvTableSource {
    fn read_table(&self, path: &Path, part: usize, parts: usize) -> Result<Option<RecordBatch>> {
        let bytes =
            std::fs::read(path).map_err(|e| LoadError::Io(format!("{}: {e}", path.display())))?;
        let (header_schema, rows) = self
            .format()
            .infer_schema(Cursor::new(bytes.as_slice()), None)
            .map_err(|e| LoadError::Io(format!("{}: {e}", path.display())))?;

        let text_schema = Arc::new(Schema::new(
            header_schema
                .fields()
                .iter()
                .map(|f| Field::new(f.name(), DataType::Utf8, true))
                .collect::<Vec<_>>(),
        ));
        if rows == 0 {
            debug!(path = %path.display(), part, parts, "header only");
            return Ok(Some(RecordBatch::new_empty(text_schema)));
        }

        let lo = part * rows / parts;
        let hi = (part + 1) * rows / parts;
        if lo == hi {
            debug!(path = %path.display(), part, parts, "empty share");
            return Ok(None);
        }

        // Read the share as text, then re-infer types from those rows alone.
        let text = self.read_all(&bytes, text_schema, Some((lo, hi)))?;

        let mut share = Vec::new();
        {
            let mut writer = WriterBuilder::new()
                .with_header(true)
                .with_delimiter(self.delimiter)
                .build(&mut share);
            writer.write(&text)?;
        }
        let (share_schema, _) = self.format().infer_schema(Cursor::new(share.as_slice()), None)?;
        let batch = self.read_all(&share, Arc::new(share_schema), None)?;
        debug!(path = %path.display(), part, parts, rows = batch.num_rows(), "read share");
        Ok(Some(batch))
    }
}

/// Path of label `label` under `prefix`.
pub fn label_path(prefix: &str, label: LabelId) -> PathBuf {
    PathBuf::from(format!("{prefix}_{label}"))
}

/// This worker's share of label `label` under each prefix, in prefix order.
pub fn read_label_shares(
    source: &dyn TableSource,
    prefixes: &[&str],
    label: LabelId,
    part: usize,
    parts: usize,
) -> Result<Vec<Option<RecordBatch>>> {
    prefixes
        .iter()
        .map(|prefix| source.read_table(&label_path(prefix, label), part, parts))
        .collect()
}

/// Concatenate the tables of one label, casting each to the first table's
/// schema. `None` when `shares` is empty.
pub fn concat_shares(shares: Vec<RecordBatch>) -> Result<Option<RecordBatch>> {
    let Some(first) = shares.first() else {
        return Ok(None);
    };
    if shares.len() == 1 {
        return Ok(shares.into_iter().next());
    }
    let schema = first.schema();
    let shares = shares
        .iter()
        .map(|b| promote_to_schema(b, &schema))
        .collect::<Result<Vec<_>>>()?;
    Ok(Some(concat_or_empty(&schema, &shares)?))
}
