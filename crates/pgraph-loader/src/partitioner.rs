//! Vertex partitioners: oid → owning partition.
//!
//! Both strategies are pure functions of the oid and the partition count once
//! initialized:
//! 1. [`HashPartitioner`]: `stable_hash(oid) mod fnum`, no coordination.
//! 2. [`SegmentedPartitioner`]: one collective pre-pass over all workers'
//!    oids computes `fnum - 1` boundaries; an oid belongs to the segment its
//!    sorted position falls in.

use pgraph_comm::{Communicator, Fid, Phase, COORDINATOR};
use tracing::debug;

use crate::error::{LoadError, Result};
use crate::oid::Oid;

pub trait Partitioner: Send + Sync {
    fn fnum(&self) -> Fid;

    /// Owning partition of `oid`, always in `[0, fnum)`.
    fn get_partition_id(&self, oid: &Oid) -> Fid;
}

// ============================================================================
// Hash
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashPartitioner {
    fnum: Fid,
}

impl HashPartitioner {
    pub fn new(fnum: Fid) -> Result<Self> {
        if fnum == 0 {
            return Err(LoadError::Invalid("partition count must be positive".to_string()));
        }
        Ok(Self { fnum })
    }
}

impl Partitioner for HashPartitioner {
    fn fnum(&self) -> Fid {
        self.fnum
    }

    fn get_partition_id(&self, oid: &Oid) -> Fid {
        (oid.stable_hash() % self.fnum as u64) as Fid
    }
}

// ============================================================================
// Segmented
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentedPartitioner {
    fnum: Fid,
    /// `bounds[i]` is the first oid of partition `i + 1`.
    bounds: Vec<Oid>,
}

impl SegmentedPartitioner {
    /// Cut the global oid set into `fnum` contiguous segments of
    /// `ceil(n / fnum)` distinct oids each.
    pub fn from_oids(fnum: Fid, mut oids: Vec<Oid>) -> Result<Self> {
        if fnum == 0 {
            return Err(LoadError::Invalid("partition count must be positive".to_string()));
        }
        oids.sort_unstable();
        oids.dedup();
        let n = oids.len();
        let segment = n.div_ceil(fnum as usize).max(1);
        let bounds = (1..fnum as usize)
            .map(|i| i * segment)
            .take_while(|&pos| pos < n)
            .map(|pos| oids[pos].clone())
            .collect();
        Ok(Self { fnum, bounds })
    }

    /// Collective initialization: the coordinator gathers every worker's
    /// oids, computes the boundaries and broadcasts them.
    pub fn init<C: Communicator>(comm: &mut C, local_oids: Vec<Oid>) -> Result<Self> {
        let fnum = comm.spec().fnum();
        let payload = bincode::serialize(&local_oids)?;
        let gathered = comm.gatherv(Phase::PartitionerInit, payload, COORDINATOR)?;

        let bounds_payload = match gathered {
            Some(buffers) => {
                let mut all = Vec::new();
                for buf in &buffers {
                    let oids: Vec<Oid> = bincode::deserialize(buf)?;
                    all.extend(oids);
                }
                let partitioner = Self::from_oids(fnum, all)?;
                bincode::serialize(&partitioner.bounds)?
            }
            None => Vec::new(),
        };
        let bytes = comm.broadcast(Phase::PartitionerInit, bounds_payload, COORDINATOR)?;
        let bounds: Vec<Oid> = bincode::deserialize(&bytes)?;
        debug!(fnum, bounds = bounds.len(), "segmented partitioner initialized");
        Ok(Self { fnum, bounds })
    }

    pub fn bounds(&self) -> &[Oid] {
        &self.bounds
    }
}

impl Partitioner for SegmentedPartitioner {
    fn fnum(&self) -> Fid {
        self.fnum
    }

    fn get_partition_id(&self, oid: &Oid) -> Fid {
        self.bounds.partition_point(|b| b <= oid) as Fid
    }
}
