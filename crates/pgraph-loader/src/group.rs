//! Fragment groups
//!
//! Once every worker has sealed its fragment, the coordinator gathers each
//! worker's `(instance, fragment id)`, keys them by the partition the worker
//! owns, seals the group and broadcasts its id. Every worker returns that
//! broadcast id.

use std::collections::BTreeMap;

use pgraph_comm::{Communicator, Fid, Phase, COORDINATOR};
use pgraph_store::{resolve_object, seal_object, InstanceId, ObjectId, ObjectStore, StoredObject};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{LoadError, Result};
use crate::status::seal_on_coordinator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentLocation {
    pub instance: InstanceId,
    pub fragment: ObjectId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentGroup {
    fnum: Fid,
    vertex_label_num: usize,
    edge_label_num: usize,
    fragments: BTreeMap<Fid, FragmentLocation>,
}

impl StoredObject for FragmentGroup {
    const TYPE_NAME: &'static str = "pgraph::FragmentGroup";
}

impl FragmentGroup {
    /// Requires exactly one location per partition `0..fnum`.
    pub fn new(
        fnum: Fid,
        vertex_label_num: usize,
        edge_label_num: usize,
        fragments: BTreeMap<Fid, FragmentLocation>,
    ) -> Result<Self> {
        let expected: Vec<Fid> = (0..fnum).collect();
        let actual: Vec<Fid> = fragments.keys().copied().collect();
        if actual != expected {
            return Err(LoadError::Invalid(format!(
                "fragment group needs partitions 0..{fnum}, got {actual:?}"
            )));
        }
        Ok(Self {
            fnum,
            vertex_label_num,
            edge_label_num,
            fragments,
        })
    }

    pub fn fnum(&self) -> Fid {
        self.fnum
    }

    pub fn vertex_label_num(&self) -> usize {
        self.vertex_label_num
    }

    pub fn edge_label_num(&self) -> usize {
        self.edge_label_num
    }

    pub fn get(&self, fid: Fid) -> Option<&FragmentLocation> {
        self.fragments.get(&fid)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Fid, &FragmentLocation)> {
        self.fragments.iter().map(|(f, l)| (*f, l))
    }

    pub fn seal<S: ObjectStore + ?Sized>(&self, store: &S) -> Result<ObjectId> {
        let id = seal_object(store, self)?;
        store.persist(id)?;
        Ok(id)
    }

    pub fn resolve<S: ObjectStore + ?Sized>(store: &S, id: ObjectId) -> Result<Self> {
        Ok(resolve_object(store, id)?)
    }
}

/// Collective: assemble, seal and broadcast the fragment group.
pub fn assemble_fragment_group<C, S>(
    comm: &mut C,
    store: &S,
    fragment: ObjectId,
    vertex_label_num: usize,
    edge_label_num: usize,
) -> Result<ObjectId>
where
    C: Communicator,
    S: ObjectStore + ?Sized,
{
    let location = FragmentLocation {
        instance: store.local_instance_id(),
        fragment,
    };
    let gathered = comm.gatherv(Phase::FragmentGroup, bincode::serialize(&location)?, COORDINATOR)?;
    let spec = comm.spec().clone();

    let group_id = seal_on_coordinator(comm, Phase::FragmentGroup, || {
        let buffers = gathered.unwrap_or_default();
        let mut fragments = BTreeMap::new();
        for (worker, buf) in buffers.iter().enumerate() {
            let location: FragmentLocation = bincode::deserialize(buf)?;
            fragments.insert(spec.worker_to_frag(worker), location);
        }
        let group = FragmentGroup::new(spec.fnum(), vertex_label_num, edge_label_num, fragments)?;
        group.seal(store)
    })?;
    info!(worker = spec.worker_id(), group = %group_id, "fragment group ready");
    Ok(group_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn location(seq: u32) -> FragmentLocation {
        FragmentLocation {
            instance: 0,
            fragment: ObjectId::compose(0, seq),
        }
    }

    #[test]
    fn test_group_requires_every_partition() {
        let mut fragments = BTreeMap::new();
        fragments.insert(0, location(1));
        fragments.insert(2, location(2));
        assert!(FragmentGroup::new(2, 1, 1, fragments).is_err());
    }

    #[test]
    fn test_group_roundtrips_through_store() {
        let store = pgraph_store::MemoryStore::new(0);
        let fragments = (0..3).map(|f| (f, location(f + 10))).collect();
        let group = FragmentGroup::new(3, 1, 0, fragments).unwrap();
        let id = group.seal(&store).unwrap();
        assert_eq!(FragmentGroup::resolve(&store, id).unwrap(), group);
        assert_eq!(group.get(2), Some(&location(12)));
    }
}
