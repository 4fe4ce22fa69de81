//! In-process transport: one endpoint per worker thread, connected by a
//! full mesh of channels.
//!
//! Messages from different peers (and from a fast peer that already moved on
//! to the next collective) can arrive interleaved on the single inbox; they
//! are stashed by `(sequence, source)` until the matching receive.

use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, Sender};

use crate::{check_outgoing, check_root, CommError, CommSpec, Communicator, Fid, Phase};

struct Envelope {
    seq: u64,
    phase: Phase,
    src: usize,
    payload: Vec<u8>,
}

/// Builder for a set of connected [`LocalComm`] endpoints.
pub struct LocalCluster;

impl LocalCluster {
    /// `worker_num` endpoints with the identity worker ↔ partition layout.
    pub fn new(worker_num: usize) -> Result<Vec<LocalComm>, CommError> {
        Self::with_assignment((0..worker_num as Fid).collect())
    }

    /// Endpoints where worker `w` owns partition `assignment[w]`.
    pub fn with_assignment(assignment: Vec<Fid>) -> Result<Vec<LocalComm>, CommError> {
        let worker_num = assignment.len();
        let (senders, receivers): (Vec<Sender<Envelope>>, Vec<Receiver<Envelope>>) =
            (0..worker_num).map(|_| mpsc::channel()).unzip();

        let mut endpoints = Vec::with_capacity(worker_num);
        for (worker_id, inbox) in receivers.into_iter().enumerate() {
            let spec = CommSpec::with_assignment(worker_id, assignment.clone())?;
            // No sender to our own inbox: once every peer is gone, `recv`
            // reports a disconnect instead of blocking forever.
            let peers = senders
                .iter()
                .enumerate()
                .map(|(peer, tx)| (peer != worker_id).then(|| tx.clone()))
                .collect();
            endpoints.push(LocalComm {
                spec,
                peers,
                inbox,
                stash: HashMap::new(),
                seq: 0,
            });
        }
        Ok(endpoints)
    }
}

/// One worker's endpoint of a [`LocalCluster`].
pub struct LocalComm {
    spec: CommSpec,
    peers: Vec<Option<Sender<Envelope>>>,
    inbox: Receiver<Envelope>,
    stash: HashMap<(u64, usize), Envelope>,
    seq: u64,
}

impl LocalComm {
    fn send(&self, seq: u64, dst: usize, phase: Phase, payload: Vec<u8>) -> Result<(), CommError> {
        let Some(tx) = self.peers.get(dst).and_then(Option::as_ref) else {
            return Err(CommError::InvalidArgument(format!(
                "worker {} cannot send to worker {dst}",
                self.spec.worker_id()
            )));
        };
        tx.send(Envelope {
            seq,
            phase,
            src: self.spec.worker_id(),
            payload,
        })
        .map_err(|_| CommError::Disconnected { peer: dst, phase })
    }

    fn recv(&mut self, seq: u64, src: usize, phase: Phase) -> Result<Vec<u8>, CommError> {
        let env = match self.stash.remove(&(seq, src)) {
            Some(env) => env,
            None => loop {
                let env = self
                    .inbox
                    .recv()
                    .map_err(|_| CommError::Disconnected { peer: src, phase })?;
                if env.seq == seq && env.src == src {
                    break env;
                }
                if env.seq < seq {
                    return Err(CommError::PhaseMismatch {
                        peer: env.src,
                        expected: phase,
                        expected_seq: seq,
                        actual: env.phase,
                        actual_seq: env.seq,
                    });
                }
                self.stash.insert((env.seq, env.src), env);
            },
        };
        if env.phase != phase {
            return Err(CommError::PhaseMismatch {
                peer: src,
                expected: phase,
                expected_seq: seq,
                actual: env.phase,
                actual_seq: env.seq,
            });
        }
        Ok(env.payload)
    }

    fn next_seq(&mut self) -> u64 {
        let seq = self.seq;
        self.seq += 1;
        seq
    }
}

impl Communicator for LocalComm {
    fn spec(&self) -> &CommSpec {
        &self.spec
    }

    fn gatherv(
        &mut self,
        phase: Phase,
        payload: Vec<u8>,
        root: usize,
    ) -> Result<Option<Vec<Vec<u8>>>, CommError> {
        check_root(&self.spec, root)?;
        let seq = self.next_seq();
        let me = self.spec.worker_id();
        if me != root {
            self.send(seq, root, phase, payload)?;
            return Ok(None);
        }

        let mut own = Some(payload);
        let mut out = Vec::with_capacity(self.spec.worker_num());
        for src in 0..self.spec.worker_num() {
            if src == me {
                out.push(own.take().unwrap_or_default());
            } else {
                out.push(self.recv(seq, src, phase)?);
            }
        }
        Ok(Some(out))
    }

    fn broadcast(
        &mut self,
        phase: Phase,
        payload: Vec<u8>,
        root: usize,
    ) -> Result<Vec<u8>, CommError> {
        check_root(&self.spec, root)?;
        let seq = self.next_seq();
        if self.spec.worker_id() != root {
            return self.recv(seq, root, phase);
        }
        for dst in 0..self.spec.worker_num() {
            if dst != root {
                self.send(seq, dst, phase, payload.clone())?;
            }
        }
        Ok(payload)
    }

    fn all_to_all(
        &mut self,
        phase: Phase,
        outgoing: Vec<Vec<u8>>,
    ) -> Result<Vec<Vec<u8>>, CommError> {
        check_outgoing(&self.spec, &outgoing)?;
        let seq = self.next_seq();
        let me = self.spec.worker_id();

        let mut own = Vec::new();
        for (dst, buf) in outgoing.into_iter().enumerate() {
            if dst == me {
                own = buf;
            } else {
                self.send(seq, dst, phase, buf)?;
            }
        }

        let mut incoming = Vec::with_capacity(self.spec.worker_num());
        for src in 0..self.spec.worker_num() {
            if src == me {
                incoming.push(std::mem::take(&mut own));
            } else {
                incoming.push(self.recv(seq, src, phase)?);
            }
        }
        Ok(incoming)
    }
}
