//! Global vertex map: `(fid, label, oid)` ↔ vid.
//!
//! After the vertex shuffle every worker knows the oids it owns per label.
//! Those lists are exchanged with an all-gather and every worker builds the
//! identical map from them: the vid of an oid is
//! `(owning fid, label, position in the owner's list)`.
//!
//! The map is immutable once built; lookups need no locking.

use ahash::AHashMap;
use pgraph_comm::{Communicator, Fid, Phase};
use pgraph_store::{resolve_object, seal_object, ObjectId, ObjectStore, StoredObject};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{LoadError, Result};
use crate::id_parser::IdParser;
use crate::oid::Oid;
use crate::{LabelId, Vid};

#[derive(Debug, Clone)]
pub struct VertexMap {
    fnum: Fid,
    label_num: usize,
    id_parser: IdParser,
    /// `oids[fid][label][offset]`
    oids: Vec<Vec<Vec<Oid>>>,
    /// `index[fid][label]`: oid → offset
    index: Vec<Vec<AHashMap<Oid, u64>>>,
}

#[derive(Serialize, Deserialize)]
struct StoredVertexMap {
    fnum: Fid,
    label_num: usize,
    oids: Vec<Vec<Vec<Oid>>>,
}

impl StoredObject for StoredVertexMap {
    const TYPE_NAME: &'static str = "pgraph::VertexMap";
}

impl VertexMap {
    /// Build from every partition's owned oid lists, `oids[fid][label]`.
    ///
    /// An oid listed twice for one partition and label is rejected.
    pub fn from_partitions(fnum: Fid, label_num: usize, oids: Vec<Vec<Vec<Oid>>>) -> Result<Self> {
        if oids.len() != fnum as usize {
            return Err(LoadError::Invalid(format!(
                "vertex map needs {fnum} partition(s), got {}",
                oids.len()
            )));
        }
        let id_parser = IdParser::new(fnum, label_num);
        let mut index = Vec::with_capacity(oids.len());
        for (fid, labels) in oids.iter().enumerate() {
            if labels.len() != label_num {
                return Err(LoadError::Invalid(format!(
                    "partition {fid} lists {} vertex label(s), expected {label_num}",
                    labels.len()
                )));
            }
            let mut per_label = Vec::with_capacity(label_num);
            for (label, list) in labels.iter().enumerate() {
                if list.len() as u64 > id_parser.max_offset() + 1 {
                    return Err(LoadError::Invalid(format!(
                        "partition {fid} label {label}: {} vertices exceed the id space",
                        list.len()
                    )));
                }
                let mut map = AHashMap::with_capacity(list.len());
                for (offset, oid) in list.iter().enumerate() {
                    if map.insert(oid.clone(), offset as u64).is_some() {
                        return Err(LoadError::Invalid(format!(
                            "duplicate vertex id {oid} in label {label}"
                        )));
                    }
                }
                per_label.push(map);
            }
            index.push(per_label);
        }
        Ok(Self {
            fnum,
            label_num,
            id_parser,
            oids,
            index,
        })
    }

    /// Collective: exchange the locally owned lists and build the map.
    pub fn build<C: Communicator>(comm: &mut C, label_num: usize, local: &[Vec<Oid>]) -> Result<Self> {
        let spec = comm.spec().clone();
        let gathered = comm.all_gather(Phase::VertexMap, bincode::serialize(local)?)?;
        let mut by_fid: Vec<Vec<Vec<Oid>>> = vec![Vec::new(); spec.worker_num()];
        for (worker, buf) in gathered.iter().enumerate() {
            by_fid[spec.worker_to_frag(worker) as usize] = bincode::deserialize(buf)?;
        }
        let map = Self::from_partitions(spec.fnum(), label_num, by_fid)?;
        info!(
            worker = spec.worker_id(),
            vertices = map.total_vertex_num(),
            "vertex map built"
        );
        Ok(map)
    }

    pub fn fnum(&self) -> Fid {
        self.fnum
    }

    pub fn label_num(&self) -> usize {
        self.label_num
    }

    pub fn id_parser(&self) -> IdParser {
        self.id_parser
    }

    pub fn get_internal_id(&self, fid: Fid, label: LabelId, oid: &Oid) -> Result<Vid> {
        let offset = self
            .index
            .get(fid as usize)
            .and_then(|labels| labels.get(label))
            .and_then(|map| map.get(oid))
            .ok_or_else(|| {
                LoadError::Lookup(format!(
                    "vertex {oid} not registered for partition {fid}, label {label}"
                ))
            })?;
        self.id_parser.generate_id(fid, label, *offset)
    }

    pub fn get_oid(&self, vid: Vid) -> Result<Oid> {
        let fid = self.id_parser.get_fid(vid) as usize;
        let label = self.id_parser.get_label(vid);
        let offset = self.id_parser.get_offset(vid) as usize;
        self.oids
            .get(fid)
            .and_then(|labels| labels.get(label))
            .and_then(|list| list.get(offset))
            .cloned()
            .ok_or_else(|| LoadError::Lookup(format!("vid {vid:#x} not in the vertex map")))
    }

    /// Vertices of `label` owned by partition `fid`.
    pub fn inner_vertex_num(&self, fid: Fid, label: LabelId) -> usize {
        self.oids
            .get(fid as usize)
            .and_then(|labels| labels.get(label))
            .map_or(0, Vec::len)
    }

    pub fn total_vertex_num(&self) -> usize {
        self.oids.iter().flatten().map(Vec::len).sum()
    }

    /// Seal and persist the map.
    pub fn seal<S: ObjectStore + ?Sized>(&self, store: &S) -> Result<ObjectId> {
        let stored = StoredVertexMap {
            fnum: self.fnum,
            label_num: self.label_num,
            oids: self.oids.clone(),
        };
        let id = seal_object(store, &stored)?;
        store.persist(id)?;
        Ok(id)
    }

    pub fn resolve<S: ObjectStore + ?Sized>(store: &S, id: ObjectId) -> Result<Self> {
        let stored: StoredVertexMap = resolve_object(store, id)?;
        Self::from_partitions(stored.fnum, stored.label_num, stored.oids)
    }
}
