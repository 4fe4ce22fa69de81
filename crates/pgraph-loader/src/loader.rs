//! Fragment loader
//!
//! Every worker runs the same sequence; each step that involves other
//! workers is a blocking collective, and every step that can fail locally is
//! followed by an agreement round so no worker is left waiting at a barrier:
//!
//! 1. ingest this worker's share of every label (files or pre-loaded tables);
//! 2. synchronize each label's schema (skipped for a single worker);
//! 3. initialize the partitioner (segmented: one gather/broadcast pre-pass);
//! 4. shuffle vertex rows to their owners;
//! 5. build the vertex map from every partition's owned oids, seal it once;
//! 6. translate and shuffle edge rows;
//! 7. build, seal and persist the local fragment;
//! 8. optionally assemble the fragment group and broadcast its id.

use arrow::record_batch::RecordBatch;
use pgraph_comm::{Communicator, Phase};
use pgraph_store::{ObjectId, ObjectStore};
use tracing::{info, info_span};

use crate::basic_loader::BasicLoader;
use crate::config::{LoaderConfig, PartitionStrategy};
use crate::error::{LoadError, Result};
use crate::fragment::FragmentBuilder;
use crate::group::assemble_fragment_group;
use crate::partitioner::{HashPartitioner, Partitioner, SegmentedPartitioner};
use crate::schema::PropertyGraphSchema;
use crate::schema_sync::{exchange_canonical_schema, reconcile};
use crate::source::{concat_shares, read_label_shares, CsvTableSource, TableSource};
use crate::status::{agree, seal_on_coordinator};
use crate::table::{LabelTables, LabeledTable, TableMeta};
use crate::vertex_map::VertexMap;

/// Where the raw tables come from.
pub enum LoaderInput {
    /// Read `<prefix>_<label>` for every configured prefix.
    Files(Box<dyn TableSource>),
    /// This worker's partial tables, one entry per label in label order.
    Tables {
        vertex: Vec<Option<RecordBatch>>,
        edge: Vec<Option<RecordBatch>>,
    },
}

/// Per label, one optional table per input group (file prefix).
type RawTables = (Vec<Vec<Option<RecordBatch>>>, Vec<Vec<Option<RecordBatch>>>);

pub struct FragmentLoader<C, S> {
    comm: C,
    store: S,
    config: LoaderConfig,
    input: Option<LoaderInput>,
}

impl<C: Communicator, S: ObjectStore> FragmentLoader<C, S> {
    /// Load from CSV files named by `config`.
    pub fn new(comm: C, store: S, config: LoaderConfig) -> Result<Self> {
        Self::with_input(comm, store, config, LoaderInput::Files(Box::new(CsvTableSource::default())))
    }

    /// Load from already materialized partial tables.
    pub fn from_tables(
        comm: C,
        store: S,
        config: LoaderConfig,
        vertex: Vec<Option<RecordBatch>>,
        edge: Vec<Option<RecordBatch>>,
    ) -> Result<Self> {
        if vertex.len() != config.vertex_label_num || edge.len() != config.edge_label_num {
            return Err(LoadError::Invalid(format!(
                "got {} vertex and {} edge table(s) for {} vertex and {} edge label(s)",
                vertex.len(),
                edge.len(),
                config.vertex_label_num,
                config.edge_label_num
            )));
        }
        Self::with_input(comm, store, config, LoaderInput::Tables { vertex, edge })
    }

    pub fn with_input(comm: C, store: S, config: LoaderConfig, input: LoaderInput) -> Result<Self> {
        let spec = comm.spec();
        config.validate(spec.worker_num())?;
        if config.assignment.is_some() && config.comm_spec(spec.worker_id(), spec.worker_num())? != *spec {
            return Err(LoadError::Invalid(
                "configured partition assignment differs from the communicator's".to_string(),
            ));
        }
        Ok(Self {
            comm,
            store,
            config,
            input: Some(input),
        })
    }

    pub fn comm(&self) -> &C {
        &self.comm
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    pub fn into_parts(self) -> (C, S) {
        (self.comm, self.store)
    }

    /// Collective: load this worker's partition and return its fragment id.
    pub fn load_fragment(&mut self) -> Result<ObjectId> {
        let spec = self.comm.spec().clone();
        let span = info_span!("load_fragment", worker = spec.worker_id(), fid = spec.fid());
        let _guard = span.enter();

        let input = self
            .input
            .take()
            .ok_or_else(|| LoadError::Invalid("loader input already consumed".to_string()))?;
        let raw = self.read_raw(input);
        let (vertex_raw, edge_raw) = agree(&mut self.comm, "ingest", raw)?;

        let (vertex_tables, edge_tables) = self.sync_tables(vertex_raw, edge_raw)?;
        let vertex_schemas: Vec<(TableMeta, arrow::datatypes::SchemaRef)> = vertex_tables
            .iter()
            .map(|(_, t)| (t.meta.clone(), t.batch.schema()))
            .collect();
        let edge_schemas: Vec<(TableMeta, arrow::datatypes::SchemaRef)> = edge_tables
            .iter()
            .map(|(_, t)| (t.meta.clone(), t.batch.schema()))
            .collect();

        let mut basic = BasicLoader::new(spec.clone(), vertex_tables, edge_tables, self.config.directed)?;

        let partitioner: Box<dyn Partitioner> = match self.config.partitioner {
            PartitionStrategy::Hash => Box::new(HashPartitioner::new(spec.fnum())?),
            PartitionStrategy::Segmented => {
                let oids = agree(&mut self.comm, "partitioner", basic.local_oids())?;
                Box::new(SegmentedPartitioner::init(&mut self.comm, oids)?)
            }
        };
        info!(strategy = %self.config.partitioner, fnum = spec.fnum(), "partitioner ready");

        let vertices = basic.shuffle_vertex_tables(&mut self.comm, partitioner.as_ref())?;
        let vertex_map = VertexMap::build(&mut self.comm, self.config.vertex_label_num, &vertices.oids)?;
        let store = &self.store;
        let vertex_map_id = seal_on_coordinator(&mut self.comm, Phase::VertexMap, || vertex_map.seal(store))?;

        let edges = basic.shuffle_edge_tables(&mut self.comm, |label, oid| {
            vertex_map
                .get_internal_id(partitioner.get_partition_id(oid), label, oid)
                .ok()
        })?;

        let schema = PropertyGraphSchema {
            vertex_entries: vertex_schemas
                .iter()
                .map(|(meta, raw)| PropertyGraphSchema::entry(meta, raw, Vec::new()))
                .collect(),
            edge_entries: edge_schemas
                .iter()
                .zip(&edges.relations)
                .map(|((meta, raw), relations)| PropertyGraphSchema::entry(meta, raw, relations.clone()))
                .collect(),
        };

        let built = (|| {
            let mut builder =
                FragmentBuilder::new(spec.fid(), spec.fnum(), self.config.directed, schema, vertex_map_id);
            for (label, table) in vertices.tables.into_iter().enumerate() {
                builder.add_vertex_table(label, table)?;
            }
            for (label, table) in edges.tables.into_iter().enumerate() {
                builder.add_edge_table(label, table)?;
            }
            builder.build()?.seal(store)
        })();
        let fragment_id = agree(&mut self.comm, "fragment build", built)?;
        info!(fragment = %fragment_id, vertex_map = %vertex_map_id, "fragment loaded");
        Ok(fragment_id)
    }

    /// Collective: load and return the fragment group id, identical on every
    /// worker.
    pub fn load_fragment_as_fragment_group(&mut self) -> Result<ObjectId> {
        let fragment_id = self.load_fragment()?;
        assemble_fragment_group(
            &mut self.comm,
            &self.store,
            fragment_id,
            self.config.vertex_label_num,
            self.config.edge_label_num,
        )
    }

    fn read_raw(&self, input: LoaderInput) -> Result<RawTables> {
        match input {
            LoaderInput::Tables { vertex, edge } => {
                let single = |tables: Vec<Option<RecordBatch>>| -> Vec<Vec<Option<RecordBatch>>> {
                    tables.into_iter().map(|t| vec![t]).collect()
                };
                Ok((single(vertex), single(edge)))
            }
            LoaderInput::Files(source) => {
                let spec = self.comm.spec();
                let (part, parts) = (spec.worker_id(), spec.worker_num());
                let vertex_prefixes = self.config.vertex_prefixes();
                let edge_prefixes = self.config.edge_prefixes();
                let vertex = (0..self.config.vertex_label_num)
                    .map(|label| read_label_shares(source.as_ref(), &vertex_prefixes, label, part, parts))
                    .collect::<Result<Vec<_>>>()?;
                let edge = (0..self.config.edge_label_num)
                    .map(|label| read_label_shares(source.as_ref(), &edge_prefixes, label, part, parts))
                    .collect::<Result<Vec<_>>>()?;
                info!(
                    vertex_rows = vertex.iter().flatten().flatten().map(RecordBatch::num_rows).sum::<usize>(),
                    edge_rows = edge.iter().flatten().flatten().map(RecordBatch::num_rows).sum::<usize>(),
                    "raw tables read"
                );
                Ok((vertex, edge))
            }
        }
    }

    /// Make every label's table schema-identical across workers and attach
    /// its metadata. Each input group is synchronized on its own; the groups
    /// of a label are then concatenated in input order.
    fn sync_tables(
        &mut self,
        vertex_raw: Vec<Vec<Option<RecordBatch>>>,
        edge_raw: Vec<Vec<Option<RecordBatch>>>,
    ) -> Result<(LabelTables<LabeledTable>, LabelTables<LabeledTable>)> {
        let vertex_names: Vec<String> = (0..vertex_raw.len()).map(|l| self.config.vertex_label_name(l)).collect();
        let edge_names: Vec<String> = (0..edge_raw.len()).map(|l| self.config.edge_label_name(l)).collect();

        let (vertex, edge) = if self.comm.spec().worker_num() == 1 {
            let only = |tables: Vec<Vec<Option<RecordBatch>>>, names: &[String]| {
                tables
                    .into_iter()
                    .zip(names)
                    .map(|(groups, name)| {
                        concat_shares(groups.into_iter().flatten().collect())?
                            .ok_or_else(|| LoadError::Io(format!("no input rows for label '{name}'")))
                    })
                    .collect::<Result<Vec<_>>>()
            };
            (only(vertex_raw, &vertex_names)?, only(edge_raw, &edge_names)?)
        } else {
            let mut local: Result<()> = Ok(());
            let mut sync = |tables: Vec<Vec<Option<RecordBatch>>>, names: &[String]| -> Result<Vec<RecordBatch>> {
                let mut out = Vec::with_capacity(tables.len());
                for (groups, name) in tables.into_iter().zip(names) {
                    let mut reconciled = Vec::with_capacity(groups.len());
                    for table in groups {
                        let local_schema = table.as_ref().map(RecordBatch::schema);
                        let canonical = exchange_canonical_schema(&mut self.comm, local_schema.as_ref(), name)?;
                        match reconcile(table, &canonical) {
                            Ok(batch) => reconciled.push(batch),
                            Err(e) => {
                                if local.is_ok() {
                                    local = Err(e);
                                }
                                reconciled.push(RecordBatch::new_empty(canonical));
                            }
                        }
                    }
                    let fallback = reconciled.first().map(|b| RecordBatch::new_empty(b.schema()));
                    match concat_shares(reconciled) {
                        Ok(Some(batch)) => out.push(batch),
                        Ok(None) => {
                            return Err(LoadError::Invalid(format!("no input group configured for label '{name}'")))
                        }
                        Err(e) => {
                            if local.is_ok() {
                                local = Err(e);
                            }
                            out.extend(fallback);
                        }
                    }
                }
                Ok(out)
            };
            let vertex = sync(vertex_raw, &vertex_names)?;
            let edge = sync(edge_raw, &edge_names)?;
            agree(&mut self.comm, "schema sync", local)?;
            (vertex, edge)
        };

        let config = &self.config;
        let vertex = LabelTables::from_entries(
            config.vertex_label_num,
            vertex.into_iter().enumerate().map(|(label, batch)| {
                let meta = TableMeta::vertex(config.vertex_label_name(label), label, config.id_column);
                (label, LabeledTable { meta, batch })
            }),
        )?;
        let edge_entries = edge
            .into_iter()
            .enumerate()
            .map(|(label, batch)| {
                let meta = TableMeta::edge(
                    config.edge_label_name(label),
                    label,
                    config.src_column,
                    config.dst_column,
                    config.edge_relations(label)?,
                );
                Ok((label, LabeledTable { meta, batch }))
            })
            .collect::<Result<Vec<_>>>()?;
        let edge = LabelTables::from_entries(config.edge_label_num, edge_entries)?;
        Ok((vertex, edge))
    }
}
