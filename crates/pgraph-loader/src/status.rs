//! Cross-worker agreement on stage outcomes.
//!
//! A local failure must not let one worker skip a barrier the others are
//! blocked on. At each stage boundary every worker reports its outcome, the
//! coordinator picks the first failure by worker id and broadcasts it, and
//! every worker leaves the stage with the same verdict:
//!
//! 1. the failing worker returns its own error;
//! 2. every other worker returns [`LoadError::Aborted`] naming the failure.

use pgraph_comm::{Communicator, Phase, COORDINATOR};
use pgraph_store::ObjectId;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{LoadError, Result};

/// Agree on `local` across all workers.
pub fn agree<C: Communicator, T>(comm: &mut C, stage: &str, local: Result<T>) -> Result<T> {
    let report: Option<String> = local.as_ref().err().map(|e| e.to_string());
    let gathered = comm.gatherv(Phase::Status, bincode::serialize(&report)?, COORDINATOR)?;

    let verdict_payload = match gathered {
        Some(buffers) => {
            let mut first_failure: Option<(usize, String)> = None;
            for (worker, buf) in buffers.iter().enumerate() {
                let report: Option<String> = bincode::deserialize(buf)?;
                if let Some(message) = report {
                    first_failure = Some((worker, message));
                    break;
                }
            }
            bincode::serialize(&first_failure)?
        }
        None => Vec::new(),
    };
    let bytes = comm.broadcast(Phase::Status, verdict_payload, COORDINATOR)?;
    let verdict: Option<(usize, String)> = bincode::deserialize(&bytes)?;

    match (verdict, local) {
        (None, local) => local,
        (Some(_), Err(e)) => Err(e),
        (Some((worker, message)), Ok(_)) => {
            warn!(stage, worker, %message, "aborting: another worker failed");
            Err(LoadError::Aborted { worker, message })
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
enum SealOutcome {
    Sealed(ObjectId),
    Failed(String),
}

/// Run `seal` on the coordinator only and broadcast the resulting id.
///
/// The coordinator returns its own error on failure; the others return
/// [`LoadError::Aborted`].
pub fn seal_on_coordinator<C, F>(comm: &mut C, phase: Phase, seal: F) -> Result<ObjectId>
where
    C: Communicator,
    F: FnOnce() -> Result<ObjectId>,
{
    let mut own_error = None;
    let payload = if comm.spec().is_coordinator() {
        let outcome = match seal() {
            Ok(id) => SealOutcome::Sealed(id),
            Err(e) => {
                let message = e.to_string();
                own_error = Some(e);
                SealOutcome::Failed(message)
            }
        };
        bincode::serialize(&outcome)?
    } else {
        Vec::new()
    };

    let bytes = comm.broadcast(phase, payload, COORDINATOR)?;
    match bincode::deserialize::<SealOutcome>(&bytes)? {
        SealOutcome::Sealed(id) => Ok(id),
        SealOutcome::Failed(message) => Err(own_error.unwrap_or(LoadError::Aborted {
            worker: COORDINATOR,
            message,
        })),
    }
}
