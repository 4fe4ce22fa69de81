//! Row shuffles
//!
//! [`BasicLoader`] holds one worker's schema-synchronized raw tables and moves
//! every row to the worker owning it:
//!
//! - vertex rows go to the owner of their oid; the owner keeps the rows in
//!   source-worker order and records the oids it now owns per label;
//! - edge rows have both endpoints translated to vids first, then go to the
//!   owner of the source vertex (and, for undirected loads, also to the owner
//!   of the destination vertex).
//!
//! Each shuffle is a single all-to-all where the message for one destination
//! is a list of per-label Arrow IPC buffers (an empty buffer means no rows).

use std::collections::BTreeSet;
use std::sync::Arc;

use arrow::array::{ArrayRef, UInt32Array, UInt64Array};
use arrow::compute::take_record_batch;
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use pgraph_comm::{CommError, CommSpec, Communicator, Phase};
use rayon::prelude::*;
use tracing::{debug, info};

use crate::error::{LoadError, Result};
use crate::id_parser::IdParser;
use crate::oid::{oids_from_column, Oid};
use crate::partitioner::Partitioner;
use crate::status::agree;
use crate::table::{
    batch_from_bytes, batch_to_bytes, concat_or_empty, LabelTables, LabeledTable, TableKind, TableMeta,
};
use crate::{LabelId, Vid};

/// At most this many unresolved endpoints are quoted in a lookup error.
const LOOKUP_SAMPLES: usize = 8;

/// Vertex tables after the shuffle, in label order.
#[derive(Debug)]
pub struct ShuffledVertices {
    /// Property columns (the id column removed) of the rows owned here.
    pub tables: Vec<RecordBatch>,
    /// Per label, the oids owned here in row order.
    pub oids: Vec<Vec<Oid>>,
}

/// Edge tables after the shuffle, in label order.
#[derive(Debug)]
pub struct ShuffledEdges {
    /// Columns: source vid, destination vid, then the property columns.
    pub tables: Vec<RecordBatch>,
    /// Per label, the `(source label, destination label)` pairs.
    pub relations: Vec<Vec<(LabelId, LabelId)>>,
}

pub struct BasicLoader {
    spec: CommSpec,
    id_parser: IdParser,
    directed: bool,
    vertex_label_num: usize,
    vertex_metas: Vec<TableMeta>,
    edge_metas: Vec<TableMeta>,
    vertex_tables: Vec<RecordBatch>,
    edge_tables: Vec<RecordBatch>,
}

impl BasicLoader {
    pub fn new(
        spec: CommSpec,
        vertex_tables: LabelTables<LabeledTable>,
        edge_tables: LabelTables<LabeledTable>,
        directed: bool,
    ) -> Result<Self> {
        let vertex_label_num = vertex_tables.label_num();
        let (vertex_metas, vertex_tables) = split(vertex_tables.into_ordered()?, vertex_label_num, true)?;
        let (edge_metas, edge_tables) = split(edge_tables.into_ordered()?, vertex_label_num, false)?;
        Ok(Self {
            id_parser: IdParser::new(spec.fnum(), vertex_label_num),
            spec,
            directed,
            vertex_label_num,
            vertex_metas,
            edge_metas,
            vertex_tables,
            edge_tables,
        })
    }

    pub fn id_parser(&self) -> IdParser {
        self.id_parser
    }

    pub fn vertex_metas(&self) -> &[TableMeta] {
        &self.vertex_metas
    }

    pub fn edge_metas(&self) -> &[TableMeta] {
        &self.edge_metas
    }

    /// Every oid in the local vertex tables, all labels pooled.
    pub fn local_oids(&self) -> Result<Vec<Oid>> {
        let mut out = Vec::new();
        for (meta, batch) in self.vertex_metas.iter().zip(&self.vertex_tables) {
            out.extend(oids_from_column(batch.column(id_column(meta)?))?);
        }
        Ok(out)
    }

    // ========================================================================
    // Vertices
    // ========================================================================

    /// Collective. Hands the local vertex tables over to their owners.
    pub fn shuffle_vertex_tables<C: Communicator>(
        &mut self,
        comm: &mut C,
        partitioner: &dyn Partitioner,
    ) -> Result<ShuffledVertices> {
        let tables = std::mem::take(&mut self.vertex_tables);
        let schemas: Vec<SchemaRef> = tables.iter().map(|t| t.schema()).collect();
        let sent: usize = tables.iter().map(|t| t.num_rows()).sum();

        let outgoing = agree(comm, "vertex shuffle", self.vertex_messages(&tables, partitioner))?;
        drop(tables);
        let incoming = comm.all_to_all(Phase::VertexShuffle, outgoing)?;
        let owned = self.owned_vertices(&incoming, &schemas);
        let out = agree(comm, "vertex receive", owned)?;
        info!(
            worker = self.spec.worker_id(),
            fid = self.spec.fid(),
            sent,
            owned = out.oids.iter().map(Vec::len).sum::<usize>(),
            "vertex shuffle done"
        );
        Ok(out)
    }

    /// Decode the received rows and split off the id column.
    fn owned_vertices(&self, incoming: &[Vec<u8>], schemas: &[SchemaRef]) -> Result<ShuffledVertices> {
        let received = receive_tables(incoming, schemas)?;
        let mut out = ShuffledVertices {
            tables: Vec::with_capacity(received.len()),
            oids: Vec::with_capacity(received.len()),
        };
        for (meta, batch) in self.vertex_metas.iter().zip(received) {
            let id_column = id_column(meta)?;
            out.oids.push(oids_from_column(batch.column(id_column))?);
            let keep: Vec<usize> = (0..batch.num_columns()).filter(|&c| c != id_column).collect();
            out.tables.push(batch.project(&keep)?);
        }
        Ok(out)
    }

    fn vertex_messages(&self, tables: &[RecordBatch], partitioner: &dyn Partitioner) -> Result<Vec<Vec<u8>>> {
        let worker_num = self.spec.worker_num();
        let per_label = self
            .vertex_metas
            .par_iter()
            .zip(tables.par_iter())
            .map(|(meta, batch)| {
                let oids = oids_from_column(batch.column(id_column(meta)?))?;
                let mut rows = vec![Vec::new(); worker_num];
                for (row, oid) in oids.iter().enumerate() {
                    let fid = partitioner.get_partition_id(oid);
                    rows[self.spec.frag_to_worker(fid)].push(row_index(row)?);
                }
                rows.into_iter().map(|r| take_rows(batch, r)).collect::<Result<Vec<_>>>()
            })
            .collect::<Result<Vec<_>>>()?;
        encode_messages(per_label, worker_num)
    }

    // ========================================================================
    // Edges
    // ========================================================================

    /// Collective. Translates both endpoints of every local edge with
    /// `id_mapper(vertex label, oid)` and hands the rows over to the owner of
    /// the source vertex.
    ///
    /// Endpoints that resolve under no candidate label fail the load with a
    /// lookup error; nothing is dropped.
    pub fn shuffle_edge_tables<C, F>(&mut self, comm: &mut C, id_mapper: F) -> Result<ShuffledEdges>
    where
        C: Communicator,
        F: Fn(LabelId, &Oid) -> Option<Vid> + Sync,
    {
        let tables = std::mem::take(&mut self.edge_tables);
        let sent: usize = tables.iter().map(|t| t.num_rows()).sum();

        let prepared = self
            .edge_metas
            .iter()
            .zip(&tables)
            .map(|(meta, batch)| edge_output_schema(meta, &batch.schema()))
            .collect::<Result<Vec<_>>>()
            .and_then(|schemas| {
                let (outgoing, observed) = self.edge_messages(&tables, &schemas, &id_mapper)?;
                Ok((schemas, outgoing, observed))
            });
        let (schemas, outgoing, observed) = agree(comm, "edge shuffle", prepared)?;
        drop(tables);
        let incoming = comm.all_to_all(Phase::EdgeShuffle, outgoing)?;
        let received = agree(comm, "edge receive", receive_tables(&incoming, &schemas))?;

        // Relations actually seen, for labels without configured relations.
        let gathered = comm.all_gather(Phase::EdgeShuffle, bincode::serialize(&observed)?)?;
        let mut seen_relations = vec![BTreeSet::new(); self.edge_metas.len()];
        for buf in &gathered {
            let sets: Vec<BTreeSet<(LabelId, LabelId)>> = bincode::deserialize(buf)?;
            for (label, set) in sets.into_iter().enumerate() {
                if let Some(slot) = seen_relations.get_mut(label) {
                    slot.extend(set);
                }
            }
        }
        let relations = self
            .edge_metas
            .iter()
            .zip(seen_relations)
            .map(|(meta, seen)| match &meta.kind {
                TableKind::Edge { relations, .. } if !relations.is_empty() => relations.clone(),
                _ => seen.into_iter().collect(),
            })
            .collect();

        info!(
            worker = self.spec.worker_id(),
            fid = self.spec.fid(),
            sent,
            owned = received.iter().map(RecordBatch::num_rows).sum::<usize>(),
            directed = self.directed,
            "edge shuffle done"
        );
        Ok(ShuffledEdges {
            tables: received,
            relations,
        })
    }

    #[allow(clippy::type_complexity)]
    fn edge_messages<F>(
        &self,
        tables: &[RecordBatch],
        schemas: &[SchemaRef],
        id_mapper: &F,
    ) -> Result<(Vec<Vec<u8>>, Vec<BTreeSet<(LabelId, LabelId)>>)>
    where
        F: Fn(LabelId, &Oid) -> Option<Vid> + Sync,
    {
        let worker_num = self.spec.worker_num();
        let mut per_label = Vec::with_capacity(tables.len());
        let mut observed = Vec::with_capacity(tables.len());
        for ((meta, batch), schema) in self.edge_metas.iter().zip(tables).zip(schemas) {
            let translated = self.translate_edges(meta, batch, schema, id_mapper)?;

            let mut rows = vec![Vec::new(); worker_num];
            let mut seen = BTreeSet::new();
            let srcs = column_u64(&translated, 0)?;
            let dsts = column_u64(&translated, 1)?;
            for (row, (&src, &dst)) in srcs.iter().zip(dsts).enumerate() {
                seen.insert((self.id_parser.get_label(src), self.id_parser.get_label(dst)));
                let src_owner = self.spec.frag_to_worker(self.id_parser.get_fid(src));
                let index = row_index(row)?;
                rows[src_owner].push(index);
                if !self.directed {
                    let dst_owner = self.spec.frag_to_worker(self.id_parser.get_fid(dst));
                    if dst_owner != src_owner {
                        rows[dst_owner].push(index);
                    }
                }
            }
            per_label.push(
                rows.into_iter()
                    .map(|r| take_rows(&translated, r))
                    .collect::<Result<Vec<_>>>()?,
            );
            observed.push(seen);
        }
        Ok((encode_messages(per_label, worker_num)?, observed))
    }

    /// Replace the endpoint columns with vids: `[src, dst, properties...]`.
    fn translate_edges<F>(
        &self,
        meta: &TableMeta,
        batch: &RecordBatch,
        schema: &SchemaRef,
        id_mapper: &F,
    ) -> Result<RecordBatch>
    where
        F: Fn(LabelId, &Oid) -> Option<Vid> + Sync,
    {
        let TableKind::Edge {
            src_column,
            dst_column,
            relations,
        } = &meta.kind
        else {
            return Err(LoadError::Invalid(format!("label '{}' is not an edge label", meta.label)));
        };
        let src_oids = oids_from_column(batch.column(*src_column))?;
        let dst_oids = oids_from_column(batch.column(*dst_column))?;

        let any_label = |oid: &Oid| (0..self.vertex_label_num).find_map(|l| id_mapper(l, oid));
        let resolved: Vec<Option<(Vid, Vid)>> = src_oids
            .par_iter()
            .zip(dst_oids.par_iter())
            .map(|(src, dst)| {
                if relations.is_empty() {
                    Some((any_label(src)?, any_label(dst)?))
                } else {
                    relations
                        .iter()
                        .find_map(|&(sl, dl)| Some((id_mapper(sl, src)?, id_mapper(dl, dst)?)))
                }
            })
            .collect();

        let missing: Vec<usize> = resolved
            .iter()
            .enumerate()
            .filter_map(|(row, r)| r.is_none().then_some(row))
            .collect();
        if !missing.is_empty() {
            let samples: Vec<String> = missing
                .iter()
                .take(LOOKUP_SAMPLES)
                .map(|&row| format!("{} -> {}", src_oids[row], dst_oids[row]))
                .collect();
            return Err(LoadError::Lookup(format!(
                "edge label '{}': {} edge(s) reference unknown vertices, e.g. [{}]",
                meta.label,
                missing.len(),
                samples.join(", ")
            )));
        }

        let (srcs, dsts): (Vec<Vid>, Vec<Vid>) = resolved.into_iter().flatten().unzip();
        let mut columns: Vec<ArrayRef> = vec![
            Arc::new(UInt64Array::from(srcs)),
            Arc::new(UInt64Array::from(dsts)),
        ];
        columns.extend(
            (0..batch.num_columns())
                .filter(|c| c != src_column && c != dst_column)
                .map(|c| Arc::clone(batch.column(c))),
        );
        debug!(label = %meta.label, rows = batch.num_rows(), "edges translated");
        Ok(RecordBatch::try_new(Arc::clone(schema), columns)?)
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn split(
    tables: Vec<LabeledTable>,
    vertex_label_num: usize,
    vertex: bool,
) -> Result<(Vec<TableMeta>, Vec<RecordBatch>)> {
    let mut metas = Vec::with_capacity(tables.len());
    let mut batches = Vec::with_capacity(tables.len());
    for table in tables {
        if table.meta.is_vertex() != vertex {
            return Err(LoadError::Invalid(format!(
                "label '{}' is registered as {} label but carries {} metadata",
                table.meta.label,
                if vertex { "a vertex" } else { "an edge" },
                if vertex { "edge" } else { "vertex" },
            )));
        }
        table.meta.validate(&table.batch.schema(), vertex_label_num)?;
        metas.push(table.meta);
        batches.push(table.batch);
    }
    Ok((metas, batches))
}

fn id_column(meta: &TableMeta) -> Result<usize> {
    match meta.kind {
        TableKind::Vertex { id_column } => Ok(id_column),
        TableKind::Edge { .. } => Err(LoadError::Invalid(format!(
            "label '{}' is not a vertex label",
            meta.label
        ))),
    }
}

/// Schema of a translated edge table: UInt64 endpoints, then properties.
pub fn edge_output_schema(meta: &TableMeta, raw: &Schema) -> Result<SchemaRef> {
    let TableKind::Edge {
        src_column,
        dst_column,
        ..
    } = &meta.kind
    else {
        return Err(LoadError::Invalid(format!("label '{}' is not an edge label", meta.label)));
    };
    let mut fields = vec![
        Field::new(raw.field(*src_column).name(), DataType::UInt64, false),
        Field::new(raw.field(*dst_column).name(), DataType::UInt64, false),
    ];
    fields.extend(
        raw.fields()
            .iter()
            .enumerate()
            .filter(|(c, _)| c != src_column && c != dst_column)
            .map(|(_, f)| f.as_ref().clone()),
    );
    Ok(Arc::new(Schema::new(fields)))
}

fn column_u64(batch: &RecordBatch, column: usize) -> Result<&[u64]> {
    batch
        .column(column)
        .as_any()
        .downcast_ref::<UInt64Array>()
        .map(|a| -> &[u64] { a.values() })
        .ok_or_else(|| LoadError::Type(format!("column {column} is not UInt64")))
}

/// Row offset as a `take` index.
fn row_index(row: usize) -> Result<u32> {
    u32::try_from(row).map_err(|_| LoadError::Invalid(format!("row {row} exceeds the u32 take index range")))
}

fn take_rows(batch: &RecordBatch, rows: Vec<u32>) -> Result<Vec<u8>> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }
    let taken = take_record_batch(batch, &UInt32Array::from(rows))?;
    batch_to_bytes(&taken)
}

/// `per_label[label][dest]` → one message per destination.
fn encode_messages(per_label: Vec<Vec<Vec<u8>>>, worker_num: usize) -> Result<Vec<Vec<u8>>> {
    let mut per_dest: Vec<Vec<Vec<u8>>> = vec![Vec::with_capacity(per_label.len()); worker_num];
    for buffers in per_label {
        for (dest, buf) in buffers.into_iter().enumerate() {
            per_dest[dest].push(buf);
        }
    }
    per_dest
        .iter()
        .map(|labels| Ok(bincode::serialize(labels)?))
        .collect()
}

/// Decode one message per source worker and concatenate per label, in
/// source-worker order.
fn receive_tables(incoming: &[Vec<u8>], schemas: &[SchemaRef]) -> Result<Vec<RecordBatch>> {
    let mut parts: Vec<Vec<RecordBatch>> = vec![Vec::new(); schemas.len()];
    for (src, message) in incoming.iter().enumerate() {
        let labels: Vec<Vec<u8>> = bincode::deserialize(message)?;
        if labels.len() != schemas.len() {
            return Err(CommError::Malformed(format!(
                "worker {src} sent {} label buffer(s), expected {}",
                labels.len(),
                schemas.len()
            ))
            .into());
        }
        for (label, bytes) in labels.iter().enumerate() {
            if !bytes.is_empty() {
                parts[label].push(batch_from_bytes(bytes)?);
            }
        }
    }
    parts
        .iter()
        .zip(schemas)
        .map(|(p, schema)| concat_or_empty(schema, p))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partitioner::HashPartitioner;
    use arrow::array::{AsArray, Int64Array, StringArray};
    use arrow::datatypes::Int64Type;
    use pgraph_comm::{LocalCluster, LocalComm};
    use std::thread;

    fn vertices(ids: &[i64]) -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("name", DataType::Utf8, true),
        ]));
        let names: Vec<String> = ids.iter().map(|i| format!("v{i}")).collect();
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(ids.to_vec())),
                Arc::new(StringArray::from(names)),
            ],
        )
        .unwrap()
    }

    fn edges(pairs: &[(i64, i64)]) -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("src", DataType::Int64, false),
            Field::new("dst", DataType::Int64, false),
            Field::new("weight", DataType::Int64, true),
        ]));
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(pairs.iter().map(|p| p.0).collect::<Vec<_>>())),
                Arc::new(Int64Array::from(pairs.iter().map(|p| p.1).collect::<Vec<_>>())),
                Arc::new(Int64Array::from(pairs.iter().map(|p| p.0 * 10 + p.1).collect::<Vec<_>>())),
            ],
        )
        .unwrap()
    }

    fn loader(comm: &LocalComm, v: RecordBatch, e: RecordBatch, directed: bool) -> BasicLoader {
        let vt = LabelTables::from_entries(
            1,
            [(0, LabeledTable { meta: TableMeta::vertex("v", 0, 0), batch: v })],
        )
        .unwrap();
        let et = LabelTables::from_entries(
            1,
            [(0, LabeledTable { meta: TableMeta::edge("e", 0, 0, 1, vec![]), batch: e })],
        )
        .unwrap();
        BasicLoader::new(comm.spec().clone(), vt, et, directed).unwrap()
    }

    /// Map oid `i` of label 0 to a vid on partition `i % fnum` at offset `i`.
    fn mapper(parser: IdParser, fnum: u32) -> impl Fn(LabelId, &Oid) -> Option<Vid> + Sync {
        move |label, oid| match (label, oid) {
            (0, Oid::Int(i)) if *i >= 0 => parser.generate_id((*i as u32) % fnum, 0, *i as u64).ok(),
            _ => None,
        }
    }

    #[test]
    fn test_vertex_and_edge_shuffle_two_workers() {
        let inputs = [
            (vec![1, 2], vec![(1, 2), (2, 3)]),
            (vec![3, 4], vec![(3, 4), (4, 1)]),
        ];
        let handles: Vec<_> = LocalCluster::new(2)
            .unwrap()
            .into_iter()
            .zip(inputs)
            .map(|(mut comm, (ids, pairs))| {
                thread::spawn(move || {
                    let mut basic = loader(&comm, vertices(&ids), edges(&pairs), true);
                    let partitioner = HashPartitioner::new(2).unwrap();
                    let shuffled = basic.shuffle_vertex_tables(&mut comm, &partitioner).unwrap();
                    let parser = basic.id_parser();
                    let edges = basic.shuffle_edge_tables(&mut comm, mapper(parser, 2)).unwrap();
                    (comm.spec().fid(), shuffled, edges, parser)
                })
            })
            .collect();

        for handle in handles {
            let (fid, shuffled, edges, parser) = handle.join().unwrap();
            let expected: Vec<Oid> = if fid == 0 {
                vec![Oid::Int(2), Oid::Int(4)]
            } else {
                vec![Oid::Int(1), Oid::Int(3)]
            };
            assert_eq!(shuffled.oids, vec![expected]);
            // Id column removed, name kept.
            assert_eq!(shuffled.tables[0].num_columns(), 1);
            assert_eq!(shuffled.tables[0].num_rows(), 2);

            let table = &edges.tables[0];
            assert_eq!(table.num_rows(), 2);
            let srcs = table.column(0).as_primitive::<arrow::datatypes::UInt64Type>();
            assert!(srcs.values().iter().all(|&v| parser.get_fid(v) == fid));
            assert_eq!(table.column(2).as_primitive::<Int64Type>().len(), 2);
            assert_eq!(edges.relations, vec![vec![(0, 0)]]);
        }
    }

    #[test]
    fn test_undirected_edges_reach_both_owners() {
        let handles: Vec<_> = LocalCluster::new(2)
            .unwrap()
            .into_iter()
            .enumerate()
            .map(|(w, mut comm)| {
                thread::spawn(move || {
                    let (ids, pairs) = if w == 0 {
                        (vec![1, 2], vec![(1, 2)])
                    } else {
                        (vec![], vec![])
                    };
                    let mut basic = loader(&comm, vertices(&ids), edges(&pairs), false);
                    let partitioner = HashPartitioner::new(2).unwrap();
                    basic.shuffle_vertex_tables(&mut comm, &partitioner).unwrap();
                    let parser = basic.id_parser();
                    basic.shuffle_edge_tables(&mut comm, mapper(parser, 2)).unwrap()
                })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap().tables[0].num_rows(), 1);
        }
    }

    #[test]
    fn test_unknown_endpoint_is_lookup_error_everywhere() {
        let handles: Vec<_> = LocalCluster::new(2)
            .unwrap()
            .into_iter()
            .enumerate()
            .map(|(w, mut comm)| {
                thread::spawn(move || {
                    let pairs = if w == 1 { vec![(1, -7)] } else { vec![] };
                    let mut basic = loader(&comm, vertices(&[1]), edges(&pairs), true);
                    let partitioner = HashPartitioner::new(2).unwrap();
                    basic.shuffle_vertex_tables(&mut comm, &partitioner).unwrap();
                    let parser = basic.id_parser();
                    basic.shuffle_edge_tables(&mut comm, mapper(parser, 2))
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(matches!(&results[0], Err(LoadError::Aborted { worker: 1, .. })));
        assert!(matches!(&results[1], Err(LoadError::Lookup(m)) if m.contains("1 -> -7")));
    }

    #[test]
    fn test_row_index_rejects_offsets_past_u32() {
        assert_eq!(row_index(7).unwrap(), 7);
        assert_eq!(row_index(u32::MAX as usize).unwrap(), u32::MAX);
        let err = row_index(u32::MAX as usize + 1).unwrap_err();
        assert!(matches!(err, LoadError::Invalid(m) if m.contains("4294967296")));
    }

    #[test]
    fn test_corrupt_shuffle_message_is_rejected() {
        let schema = Arc::new(Schema::new(vec![Field::new("id", DataType::Int64, true)]));
        let err = receive_tables(&[vec![0xff; 3]], &[schema]).unwrap_err();
        assert!(matches!(err, LoadError::Comm(_) | LoadError::Io(_)));
    }

    #[test]
    fn test_mismatched_metadata_rejected() {
        let comm = LocalCluster::new(1).unwrap().remove(0);
        let vt = LabelTables::from_entries(
            1,
            [(0, LabeledTable { meta: TableMeta::edge("x", 0, 0, 1, vec![]), batch: vertices(&[1]) })],
        )
        .unwrap();
        let result = BasicLoader::new(comm.spec().clone(), vt, LabelTables::new(0), true);
        assert!(matches!(result, Err(LoadError::Invalid(_))));
    }
}
