//! Collective communication for SPMD graph loading
//!
//! Every worker of a load runs the same sequence of steps; whenever a step
//! needs data from other workers it calls one of the blocking collectives
//! defined by [`Communicator`]:
//!
//! 1. **gather / gatherv**: every worker sends a buffer to a root
//! 2. **broadcast**: the root sends one buffer to every worker
//! 3. **all-to-all**: every worker sends one buffer to every other worker
//!
//! Each collective is tagged with a [`Phase`] and a per-worker sequence
//! number. Workers must reach the collectives in the same order; a receiver
//! that observes a different phase or sequence fails with
//! [`CommError::PhaseMismatch`] instead of mixing payloads of two steps.
//!
//! Two transports are provided:
//! - [`LocalCluster`]: in-process channels, one endpoint per thread
//! - [`TcpComm`]: one process per worker, star topology around worker 0

pub mod local;
pub mod tcp;

pub use local::{LocalCluster, LocalComm};
pub use tcp::TcpComm;

use serde::{Deserialize, Serialize};

/// Partition (fragment) id.
pub type Fid = u32;

/// The worker that roots every coordinated step of a load.
pub const COORDINATOR: usize = 0;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum CommError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("worker {peer} disconnected during {phase:?}")]
    Disconnected { peer: usize, phase: Phase },

    #[error(
        "collective mismatch with worker {peer}: expected {expected:?} #{expected_seq}, got {actual:?} #{actual_seq}"
    )]
    PhaseMismatch {
        peer: usize,
        expected: Phase,
        expected_seq: u64,
        actual: Phase,
        actual_seq: u64,
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("malformed message: {0}")]
    Malformed(String),
}

impl From<bincode::Error> for CommError {
    fn from(e: bincode::Error) -> Self {
        CommError::Malformed(e.to_string())
    }
}

// ============================================================================
// Phases
// ============================================================================

/// Which step of the load a collective belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Phase {
    Handshake = 0,
    Status = 1,
    PartitionerInit = 2,
    SchemaSync = 3,
    VertexShuffle = 4,
    VertexMap = 5,
    EdgeShuffle = 6,
    FragmentGroup = 7,
}

impl Phase {
    pub fn from_u8(raw: u8) -> Option<Self> {
        Some(match raw {
            0 => Phase::Handshake,
            1 => Phase::Status,
            2 => Phase::PartitionerInit,
            3 => Phase::SchemaSync,
            4 => Phase::VertexShuffle,
            5 => Phase::VertexMap,
            6 => Phase::EdgeShuffle,
            7 => Phase::FragmentGroup,
            _ => return None,
        })
    }
}

// ============================================================================
// Worker / partition layout
// ============================================================================

/// Identity of one worker and the worker ↔ partition assignment.
///
/// There are exactly as many partitions as workers; `worker_to_frag[w]` is
/// the partition owned by worker `w`. The assignment is configuration, so
/// code that needs "the worker owning partition `fid`" must go through
/// [`CommSpec::frag_to_worker`] rather than assume identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommSpec {
    worker_id: usize,
    worker_to_frag: Vec<Fid>,
    frag_to_worker: Vec<usize>,
}

impl CommSpec {
    /// Identity assignment: worker `w` owns partition `w`.
    pub fn new(worker_id: usize, worker_num: usize) -> Result<Self, CommError> {
        let assignment = (0..worker_num as Fid).collect();
        Self::with_assignment(worker_id, assignment)
    }

    /// Explicit assignment; `assignment[w]` is the partition of worker `w`.
    /// Must be a permutation of `0..worker_num`.
    pub fn with_assignment(worker_id: usize, assignment: Vec<Fid>) -> Result<Self, CommError> {
        let worker_num = assignment.len();
        if worker_num == 0 {
            return Err(CommError::InvalidArgument(
                "worker count must be positive".to_string(),
            ));
        }
        if worker_id >= worker_num {
            return Err(CommError::InvalidArgument(format!(
                "worker id {worker_id} out of range for {worker_num} workers"
            )));
        }
        let mut frag_to_worker = vec![usize::MAX; worker_num];
        for (worker, &fid) in assignment.iter().enumerate() {
            let slot = frag_to_worker.get_mut(fid as usize).ok_or_else(|| {
                CommError::InvalidArgument(format!(
                    "partition {fid} of worker {worker} out of range for {worker_num} partitions"
                ))
            })?;
            if *slot != usize::MAX {
                return Err(CommError::InvalidArgument(format!(
                    "partition {fid} assigned to both worker {} and worker {worker}",
                    *slot
                )));
            }
            *slot = worker;
        }
        Ok(Self {
            worker_id,
            worker_to_frag: assignment,
            frag_to_worker,
        })
    }

    pub fn worker_id(&self) -> usize {
        self.worker_id
    }

    pub fn worker_num(&self) -> usize {
        self.worker_to_frag.len()
    }

    /// Partition owned by this worker.
    pub fn fid(&self) -> Fid {
        self.worker_to_frag[self.worker_id]
    }

    /// Total number of partitions (equals the worker count).
    pub fn fnum(&self) -> Fid {
        self.worker_to_frag.len() as Fid
    }

    pub fn frag_to_worker(&self, fid: Fid) -> usize {
        self.frag_to_worker[fid as usize]
    }

    pub fn worker_to_frag(&self, worker: usize) -> Fid {
        self.worker_to_frag[worker]
    }

    pub fn is_coordinator(&self) -> bool {
        self.worker_id == COORDINATOR
    }

    /// Same layout seen from another worker.
    pub fn for_worker(&self, worker_id: usize) -> Result<Self, CommError> {
        Self::with_assignment(worker_id, self.worker_to_frag.clone())
    }
}

// ============================================================================
// Communicator
// ============================================================================

/// Blocking collectives over the full worker set.
///
/// Every worker must call the same collectives in the same order with the
/// same phase and root; the implementations verify phase and order on every
/// received message.
pub trait Communicator {
    fn spec(&self) -> &CommSpec;

    /// Variable-length gather. The root receives `Some(buffers)` indexed by
    /// worker id (its own buffer included); everyone else receives `None`.
    fn gatherv(
        &mut self,
        phase: Phase,
        payload: Vec<u8>,
        root: usize,
    ) -> Result<Option<Vec<Vec<u8>>>, CommError>;

    /// The root's `payload` is delivered to every worker; the payload passed
    /// by non-root workers is ignored.
    fn broadcast(&mut self, phase: Phase, payload: Vec<u8>, root: usize)
        -> Result<Vec<u8>, CommError>;

    /// `outgoing[w]` is delivered to worker `w`; the result is indexed by
    /// source worker.
    fn all_to_all(&mut self, phase: Phase, outgoing: Vec<Vec<u8>>)
        -> Result<Vec<Vec<u8>>, CommError>;

    /// Fixed-size gather of one `u64` per worker.
    fn gather(&mut self, phase: Phase, value: u64, root: usize) -> Result<Option<Vec<u64>>, CommError> {
        let Some(buffers) = self.gatherv(phase, value.to_le_bytes().to_vec(), root)? else {
            return Ok(None);
        };
        let mut out = Vec::with_capacity(buffers.len());
        for (worker, buf) in buffers.iter().enumerate() {
            let bytes: [u8; 8] = buf.as_slice().try_into().map_err(|_| {
                CommError::Malformed(format!(
                    "worker {worker} sent {} bytes for a fixed-size gather",
                    buf.len()
                ))
            })?;
            out.push(u64::from_le_bytes(bytes));
        }
        Ok(Some(out))
    }

    /// Every worker receives every worker's buffer (gatherv to the
    /// coordinator followed by a broadcast).
    fn all_gather(&mut self, phase: Phase, payload: Vec<u8>) -> Result<Vec<Vec<u8>>, CommError> {
        let gathered = self.gatherv(phase, payload, COORDINATOR)?;
        let encoded = match gathered {
            Some(buffers) => bincode::serialize(&buffers)?,
            None => Vec::new(),
        };
        let bytes = self.broadcast(phase, encoded, COORDINATOR)?;
        let buffers: Vec<Vec<u8>> = bincode::deserialize(&bytes)?;
        if buffers.len() != self.spec().worker_num() {
            return Err(CommError::Malformed(format!(
                "all-gather returned {} buffers for {} workers",
                buffers.len(),
                self.spec().worker_num()
            )));
        }
        Ok(buffers)
    }
}

pub(crate) fn check_root(spec: &CommSpec, root: usize) -> Result<(), CommError> {
    if root >= spec.worker_num() {
        return Err(CommError::InvalidArgument(format!(
            "root {root} out of range for {} workers",
            spec.worker_num()
        )));
    }
    Ok(())
}

pub(crate) fn check_outgoing(spec: &CommSpec, outgoing: &[Vec<u8>]) -> Result<(), CommError> {
    if outgoing.len() != spec.worker_num() {
        return Err(CommError::InvalidArgument(format!(
            "all-to-all needs {} buffers, got {}",
            spec.worker_num(),
            outgoing.len()
        )));
    }
    Ok(())
}
