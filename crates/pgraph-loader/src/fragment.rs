//! Fragments
//!
//! A [`Fragment`] is one partition of the loaded graph:
//! 1. the vertex tables (property columns of the vertices owned here), one
//!    per vertex label in label order;
//! 2. the edge tables (`[src vid, dst vid, properties...]`) stored here, one
//!    per edge label in label order;
//! 3. the property-graph schema and the id of the sealed vertex map;
//! 4. topology derived from the edge tables: the outer vertices (endpoints
//!    owned by other partitions) per vertex label, and CSR adjacency of the
//!    inner vertices per (vertex label, edge label).
//!
//! Fragments are built once by [`FragmentBuilder`], sealed and never
//! modified afterwards.

use arrow::array::{Array, UInt64Array};
use arrow::record_batch::RecordBatch;
use pgraph_comm::Fid;
use pgraph_store::{resolve_object, seal_object, ObjectId, ObjectStore, StoredObject};
use roaring::RoaringTreemap;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{LoadError, Result};
use crate::id_parser::IdParser;
use crate::schema::PropertyGraphSchema;
use crate::table::{batch_from_bytes, batch_to_bytes, LabelTables};
use crate::{LabelId, Vid};

// ============================================================================
// Adjacency
// ============================================================================

/// One adjacency entry: the other endpoint and the edge's row in its table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Nbr {
    pub neighbor: Vid,
    pub edge_index: u64,
}

/// Compressed sparse rows over the inner vertices of one label.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Csr {
    offsets: Vec<u64>,
    nbrs: Vec<Nbr>,
}

impl Csr {
    /// `entries` are `(vertex offset, nbr)`; each vertex keeps its entries in
    /// the order given.
    fn build(vertex_num: usize, entries: &[(u64, Nbr)]) -> Self {
        let mut offsets = vec![0u64; vertex_num + 1];
        for (v, _) in entries {
            offsets[*v as usize + 1] += 1;
        }
        for i in 0..vertex_num {
            offsets[i + 1] += offsets[i];
        }
        let mut cursor: Vec<u64> = offsets[..vertex_num].to_vec();
        let mut nbrs = vec![
            Nbr {
                neighbor: 0,
                edge_index: 0
            };
            entries.len()
        ];
        for (v, nbr) in entries {
            let slot = &mut cursor[*v as usize];
            nbrs[*slot as usize] = *nbr;
            *slot += 1;
        }
        Self { offsets, nbrs }
    }

    pub fn neighbors(&self, offset: usize) -> &[Nbr] {
        match (self.offsets.get(offset), self.offsets.get(offset + 1)) {
            (Some(&lo), Some(&hi)) => &self.nbrs[lo as usize..hi as usize],
            _ => &[],
        }
    }

    pub fn edge_num(&self) -> usize {
        self.nbrs.len()
    }
}

// ============================================================================
// Fragment
// ============================================================================

#[derive(Debug, Clone)]
pub struct Fragment {
    fid: Fid,
    fnum: Fid,
    directed: bool,
    id_parser: IdParser,
    schema: PropertyGraphSchema,
    vertex_map_id: ObjectId,
    vertex_tables: Vec<RecordBatch>,
    edge_tables: Vec<RecordBatch>,
    outer_vertices: Vec<RoaringTreemap>,
    /// `oe[vertex label][edge label]`
    oe: Vec<Vec<Csr>>,
    /// `ie[vertex label][edge label]`; empty for undirected fragments.
    ie: Vec<Vec<Csr>>,
}

#[derive(Serialize, Deserialize)]
struct StoredFragment {
    fid: Fid,
    fnum: Fid,
    directed: bool,
    id_parser: IdParser,
    schema: PropertyGraphSchema,
    vertex_map_id: ObjectId,
    vertex_tables: Vec<Vec<u8>>,
    edge_tables: Vec<Vec<u8>>,
    outer_vertices: Vec<RoaringTreemap>,
    oe: Vec<Vec<Csr>>,
    ie: Vec<Vec<Csr>>,
}

impl StoredObject for StoredFragment {
    const TYPE_NAME: &'static str = "pgraph::Fragment";
}

impl Fragment {
    pub fn fid(&self) -> Fid {
        self.fid
    }

    pub fn fnum(&self) -> Fid {
        self.fnum
    }

    pub fn directed(&self) -> bool {
        self.directed
    }

    pub fn id_parser(&self) -> IdParser {
        self.id_parser
    }

    pub fn schema(&self) -> &PropertyGraphSchema {
        &self.schema
    }

    pub fn vertex_map_id(&self) -> ObjectId {
        self.vertex_map_id
    }

    pub fn vertex_label_num(&self) -> usize {
        self.vertex_tables.len()
    }

    pub fn edge_label_num(&self) -> usize {
        self.edge_tables.len()
    }

    pub fn vertex_table(&self, label: LabelId) -> Option<&RecordBatch> {
        self.vertex_tables.get(label)
    }

    pub fn edge_table(&self, label: LabelId) -> Option<&RecordBatch> {
        self.edge_tables.get(label)
    }

    pub fn inner_vertex_num(&self, label: LabelId) -> usize {
        self.vertex_tables.get(label).map_or(0, RecordBatch::num_rows)
    }

    pub fn outer_vertices(&self, label: LabelId) -> Option<&RoaringTreemap> {
        self.outer_vertices.get(label)
    }

    pub fn edge_num(&self) -> usize {
        self.edge_tables.iter().map(RecordBatch::num_rows).sum()
    }

    pub fn is_inner(&self, vid: Vid) -> bool {
        self.id_parser.get_fid(vid) == self.fid
            && (self.id_parser.get_offset(vid) as usize) < self.inner_vertex_num(self.id_parser.get_label(vid))
    }

    /// Vertex id of the `offset`-th inner vertex of `label`.
    pub fn inner_vertex(&self, label: LabelId, offset: u64) -> Result<Vid> {
        self.id_parser.generate_id(self.fid, label, offset)
    }

    pub fn out_edges(&self, vid: Vid, edge_label: LabelId) -> Result<&[Nbr]> {
        self.adjacency(&self.oe, vid, edge_label)
    }

    /// Incoming edges; for undirected fragments the same as [`Self::out_edges`].
    pub fn in_edges(&self, vid: Vid, edge_label: LabelId) -> Result<&[Nbr]> {
        if self.directed {
            self.adjacency(&self.ie, vid, edge_label)
        } else {
            self.adjacency(&self.oe, vid, edge_label)
        }
    }

    fn adjacency<'a>(&self, csr: &'a [Vec<Csr>], vid: Vid, edge_label: LabelId) -> Result<&'a [Nbr]> {
        if !self.is_inner(vid) {
            return Err(LoadError::Lookup(format!(
                "vid {vid:#x} is not an inner vertex of fragment {}",
                self.fid
            )));
        }
        let label = self.id_parser.get_label(vid);
        let offset = self.id_parser.get_offset(vid) as usize;
        csr.get(label)
            .and_then(|per_edge| per_edge.get(edge_label))
            .map(|c| c.neighbors(offset))
            .ok_or_else(|| LoadError::Lookup(format!("no edge label {edge_label}")))
    }

    /// Seal and persist this fragment.
    pub fn seal<S: ObjectStore + ?Sized>(&self, store: &S) -> Result<ObjectId> {
        let stored = StoredFragment {
            fid: self.fid,
            fnum: self.fnum,
            directed: self.directed,
            id_parser: self.id_parser,
            schema: self.schema.clone(),
            vertex_map_id: self.vertex_map_id,
            vertex_tables: self.vertex_tables.iter().map(batch_to_bytes).collect::<Result<_>>()?,
            edge_tables: self.edge_tables.iter().map(batch_to_bytes).collect::<Result<_>>()?,
            outer_vertices: self.outer_vertices.clone(),
            oe: self.oe.clone(),
            ie: self.ie.clone(),
        };
        let id = seal_object(store, &stored)?;
        store.persist(id)?;
        info!(fid = self.fid, %id, edges = self.edge_num(), "fragment sealed");
        Ok(id)
    }

    pub fn resolve<S: ObjectStore + ?Sized>(store: &S, id: ObjectId) -> Result<Self> {
        let stored: StoredFragment = resolve_object(store, id)?;
        Ok(Self {
            fid: stored.fid,
            fnum: stored.fnum,
            directed: stored.directed,
            id_parser: stored.id_parser,
            schema: stored.schema,
            vertex_map_id: stored.vertex_map_id,
            vertex_tables: stored
                .vertex_tables
                .iter()
                .map(|b| batch_from_bytes(b))
                .collect::<Result<_>>()?,
            edge_tables: stored
                .edge_tables
                .iter()
                .map(|b| batch_from_bytes(b))
                .collect::<Result<_>>()?,
            outer_vertices: stored.outer_vertices,
            oe: stored.oe,
            ie: stored.ie,
        })
    }
}

// ============================================================================
// Builder
// ============================================================================

pub struct FragmentBuilder {
    fid: Fid,
    fnum: Fid,
    directed: bool,
    id_parser: IdParser,
    schema: PropertyGraphSchema,
    vertex_map_id: ObjectId,
    vertex_tables: LabelTables<RecordBatch>,
    edge_tables: LabelTables<RecordBatch>,
}

impl FragmentBuilder {
    pub fn new(
        fid: Fid,
        fnum: Fid,
        directed: bool,
        schema: PropertyGraphSchema,
        vertex_map_id: ObjectId,
    ) -> Self {
        let vertex_label_num = schema.vertex_label_num();
        let edge_label_num = schema.edge_label_num();
        Self {
            fid,
            fnum,
            directed,
            id_parser: IdParser::new(fnum, vertex_label_num),
            schema,
            vertex_map_id,
            vertex_tables: LabelTables::new(vertex_label_num),
            edge_tables: LabelTables::new(edge_label_num),
        }
    }

    pub fn add_vertex_table(&mut self, label: LabelId, table: RecordBatch) -> Result<()> {
        self.vertex_tables.insert(label, table)
    }

    /// `table` must start with the UInt64 source and destination vid columns.
    pub fn add_edge_table(&mut self, label: LabelId, table: RecordBatch) -> Result<()> {
        if table.num_columns() < 2 {
            return Err(LoadError::Invalid(format!(
                "edge table {label} has {} column(s), needs src and dst",
                table.num_columns()
            )));
        }
        self.edge_tables.insert(label, table)
    }

    pub fn build(self) -> Result<Fragment> {
        let vertex_tables = self.vertex_tables.into_ordered()?;
        let edge_tables = self.edge_tables.into_ordered()?;
        let parser = self.id_parser;
        let inner: Vec<usize> = vertex_tables.iter().map(RecordBatch::num_rows).collect();
        let vertex_label_num = vertex_tables.len();

        let mut outer_vertices = vec![RoaringTreemap::new(); vertex_label_num];
        let mut oe = vec![Vec::with_capacity(edge_tables.len()); vertex_label_num];
        let mut ie = if self.directed {
            vec![Vec::with_capacity(edge_tables.len()); vertex_label_num]
        } else {
            Vec::new()
        };

        for (edge_label, table) in edge_tables.iter().enumerate() {
            let srcs = vid_column(table, 0, edge_label)?;
            let dsts = vid_column(table, 1, edge_label)?;
            let mut out_entries: Vec<Vec<(u64, Nbr)>> = vec![Vec::new(); vertex_label_num];
            let mut in_entries: Vec<Vec<(u64, Nbr)>> = vec![Vec::new(); vertex_label_num];

            for (row, (&src, &dst)) in srcs.values().iter().zip(dsts.values().iter()).enumerate() {
                let edge_index = row as u64;
                let src_inner = check_vid(&parser, self.fid, self.fnum, src, &inner)?;
                let dst_inner = check_vid(&parser, self.fid, self.fnum, dst, &inner)?;
                if self.directed && !src_inner {
                    return Err(LoadError::Invalid(format!(
                        "edge label {edge_label} row {row}: source {src:#x} is not owned by fragment {}",
                        self.fid
                    )));
                }
                for (vid, other, is_inner, entries) in [
                    (src, dst, src_inner, &mut out_entries),
                    (dst, src, dst_inner, &mut in_entries),
                ] {
                    if is_inner {
                        entries[parser.get_label(vid)].push((
                            parser.get_offset(vid),
                            Nbr {
                                neighbor: other,
                                edge_index,
                            },
                        ));
                    } else {
                        outer_vertices[parser.get_label(vid)].insert(vid);
                    }
                }
            }

            for label in 0..vertex_label_num {
                if self.directed {
                    oe[label].push(Csr::build(inner[label], &out_entries[label]));
                    ie[label].push(Csr::build(inner[label], &in_entries[label]));
                } else {
                    // Both directions are adjacency of the same vertex.
                    let mut both = std::mem::take(&mut out_entries[label]);
                    both.append(&mut in_entries[label]);
                    both.sort_by_key(|(offset, nbr)| (*offset, nbr.edge_index));
                    oe[label].push(Csr::build(inner[label], &both));
                }
            }
        }

        let fragment = Fragment {
            fid: self.fid,
            fnum: self.fnum,
            directed: self.directed,
            id_parser: parser,
            schema: self.schema,
            vertex_map_id: self.vertex_map_id,
            vertex_tables,
            edge_tables,
            outer_vertices,
            oe,
            ie,
        };
        info!(
            fid = fragment.fid,
            inner = inner.iter().sum::<usize>(),
            outer = fragment.outer_vertices.iter().map(RoaringTreemap::len).sum::<u64>(),
            edges = fragment.edge_num(),
            "fragment built"
        );
        Ok(fragment)
    }
}

/// Whether `vid` is inner to fragment `fid`; rejects vids outside the graph.
fn check_vid(parser: &IdParser, fid: Fid, fnum: Fid, vid: Vid, inner: &[usize]) -> Result<bool> {
    let owner = parser.get_fid(vid);
    let label = parser.get_label(vid);
    if owner >= fnum || label >= inner.len() {
        return Err(LoadError::Invalid(format!("vid {vid:#x} is outside the graph")));
    }
    if owner != fid {
        return Ok(false);
    }
    if parser.get_offset(vid) as usize >= inner[label] {
        return Err(LoadError::Invalid(format!(
            "vid {vid:#x} points past the {} inner vertices of label {label}",
            inner[label]
        )));
    }
    Ok(true)
}

fn vid_column(table: &RecordBatch, column: usize, edge_label: LabelId) -> Result<&UInt64Array> {
    let array = table
        .column(column)
        .as_any()
        .downcast_ref::<UInt64Array>()
        .ok_or_else(|| {
            LoadError::Type(format!(
                "edge label {edge_label}: column {column} must hold UInt64 vids"
            ))
        })?;
    if array.null_count() > 0 {
        return Err(LoadError::Invalid(format!(
            "edge label {edge_label}: column {column} holds null vids"
        )));
    }
    Ok(array)
}
