//! Distributed property-graph fragment loader
//!
//! A load runs on `fnum` cooperating workers, one partition (fragment) each.
//! Every worker reads its share of the raw vertex and edge tables and the
//! workers then, in lock step:
//!
//! 1. agree on one schema per label ([`schema_sync`])
//! 2. move every vertex row to the partition owning its oid ([`basic_loader`])
//! 3. assign dense internal vertex ids ([`vertex_map`], [`id_parser`])
//! 4. translate edge endpoints and move edges to their owners
//! 5. build, seal and persist a local [`Fragment`]
//! 6. optionally register all fragments in a [`FragmentGroup`]
//!
//! [`FragmentLoader`] drives the whole sequence over any
//! [`pgraph_comm::Communicator`] and [`pgraph_store::ObjectStore`].
//!
//! Any failure, local or remote, makes every worker return an error; no
//! worker is left blocked in a collective.

pub mod basic_loader;
pub mod config;
pub mod error;
pub mod fragment;
pub mod group;
pub mod id_parser;
pub mod loader;
pub mod oid;
pub mod partitioner;
pub mod schema;
pub mod schema_sync;
pub mod source;
pub mod status;
pub mod table;
pub mod vertex_map;

pub use config::{LoaderConfig, PartitionStrategy};
pub use error::{LoadError, Result};
pub use fragment::{Fragment, Nbr};
pub use group::{FragmentGroup, FragmentLocation};
pub use id_parser::IdParser;
pub use loader::{FragmentLoader, LoaderInput};
pub use oid::Oid;
pub use partitioner::{HashPartitioner, Partitioner, SegmentedPartitioner};
pub use schema::PropertyGraphSchema;
pub use source::{CsvTableSource, TableSource};
pub use vertex_map::VertexMap;

/// Dense label index, `0..label_num`.
pub type LabelId = usize;

/// Internal vertex id: `fid | label | offset`, see [`IdParser`].
pub type Vid = u64;
