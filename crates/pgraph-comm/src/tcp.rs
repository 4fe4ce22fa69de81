//! Multi-process transport over TCP.
//!
//! Star topology: worker 0 (the coordinator) listens, every other worker
//! holds one connection to it. Gathers and broadcasts are therefore rooted
//! at the coordinator; an all-to-all is routed through it.
//!
//! Frame layout (little endian):
//!
//! ```text
//! magic:u32 | seq:u64 | phase:u8 | src:u32 | len:u64 | payload[len]
//! ```

use std::io::{BufWriter, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use tracing::{debug, info};

use crate::{check_outgoing, CommError, CommSpec, Communicator, Phase, COORDINATOR};

const FRAME_MAGIC: u32 = 0x5047_4346; // "PGCF"
const CONNECT_RETRY: Duration = Duration::from_millis(100);
const MAX_FRAME_LEN: u64 = 1 << 36;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FrameHeader {
    seq: u64,
    phase: Phase,
    src: u32,
}

fn write_frame(stream: &mut TcpStream, header: FrameHeader, payload: &[u8]) -> Result<(), CommError> {
    let mut w = BufWriter::new(stream);
    w.write_u32::<LittleEndian>(FRAME_MAGIC)?;
    w.write_u64::<LittleEndian>(header.seq)?;
    w.write_u8(header.phase as u8)?;
    w.write_u32::<LittleEndian>(header.src)?;
    w.write_u64::<LittleEndian>(payload.len() as u64)?;
    w.write_all(payload)?;
    w.flush()?;
    Ok(())
}

fn read_frame(r: &mut TcpStream) -> Result<(FrameHeader, Vec<u8>), CommError> {
    let magic = r.read_u32::<LittleEndian>()?;
    if magic != FRAME_MAGIC {
        return Err(CommError::Malformed(format!("bad frame magic {magic:#x}")));
    }
    let seq = r.read_u64::<LittleEndian>()?;
    let raw_phase = r.read_u8()?;
    let phase = Phase::from_u8(raw_phase)
        .ok_or_else(|| CommError::Malformed(format!("unknown phase tag {raw_phase}")))?;
    let src = r.read_u32::<LittleEndian>()?;
    let len = r.read_u64::<LittleEndian>()?;
    if len > MAX_FRAME_LEN {
        return Err(CommError::Malformed(format!("frame of {len} bytes exceeds limit")));
    }
    let mut payload = vec![0u8; len as usize];
    r.read_exact(&mut payload)?;
    Ok((FrameHeader { seq, phase, src }, payload))
}

/// One worker's endpoint of a TCP star.
pub struct TcpComm {
    spec: CommSpec,
    /// Coordinator: one stream per worker (`None` at its own slot).
    /// Others: a single stream to the coordinator at slot 0.
    links: Vec<Option<TcpStream>>,
    seq: u64,
}

impl TcpComm {
    /// Coordinator side: accept one connection from every other worker.
    pub fn coordinator(listener: TcpListener, spec: CommSpec) -> Result<Self, CommError> {
        if !spec.is_coordinator() {
            return Err(CommError::InvalidArgument(format!(
                "worker {} cannot act as coordinator",
                spec.worker_id()
            )));
        }
        let worker_num = spec.worker_num();
        let mut links: Vec<Option<TcpStream>> = (0..worker_num).map(|_| None).collect();
        let mut accepted = 0;
        while accepted + 1 < worker_num {
            let (mut stream, peer_addr) = listener.accept()?;
            stream.set_nodelay(true)?;
            let (header, _) = read_frame(&mut stream)?;
            let worker = header.src as usize;
            if header.phase != Phase::Handshake || worker == COORDINATOR || worker >= worker_num {
                return Err(CommError::Malformed(format!(
                    "unexpected handshake from {peer_addr}: {header:?}"
                )));
            }
            if links[worker].is_some() {
                return Err(CommError::InvalidArgument(format!(
                    "worker {worker} connected twice"
                )));
            }
            debug!(worker, %peer_addr, "worker connected");
            links[worker] = Some(stream);
            accepted += 1;
        }
        info!(workers = worker_num, "coordinator accepted all workers");
        Ok(Self { spec, links, seq: 0 })
    }

    /// Worker side: connect to the coordinator, retrying until `timeout`.
    pub fn connect(addr: impl ToSocketAddrs, spec: CommSpec, timeout: Duration) -> Result<Self, CommError> {
        if spec.is_coordinator() {
            return Err(CommError::InvalidArgument(
                "the coordinator listens instead of connecting".to_string(),
            ));
        }
        let addrs: Vec<SocketAddr> = addr.to_socket_addrs()?.collect();
        let deadline = Instant::now() + timeout;
        let mut stream = loop {
            match addrs.iter().find_map(|a| TcpStream::connect(a).ok()) {
                Some(stream) => break stream,
                None if Instant::now() < deadline => std::thread::sleep(CONNECT_RETRY),
                None => {
                    return Err(CommError::Io(std::io::Error::new(
                        std::io::ErrorKind::TimedOut,
                        format!("could not reach coordinator at {addrs:?}"),
                    )))
                }
            }
        };
        stream.set_nodelay(true)?;
        let hello = FrameHeader {
            seq: 0,
            phase: Phase::Handshake,
            src: spec.worker_id() as u32,
        };
        write_frame(&mut stream, hello, &[])?;
        let mut links: Vec<Option<TcpStream>> = (0..spec.worker_num()).map(|_| None).collect();
        links[COORDINATOR] = Some(stream);
        Ok(Self { spec, links, seq: 0 })
    }

    /// Bind (coordinator) or connect (everyone else) to `addr`.
    pub fn establish(addr: &str, spec: CommSpec, timeout: Duration) -> Result<Self, CommError> {
        if spec.is_coordinator() {
            let listener = TcpListener::bind(addr)?;
            Self::coordinator(listener, spec)
        } else {
            Self::connect(addr, spec, timeout)
        }
    }

    fn next_seq(&mut self) -> u64 {
        let seq = self.seq;
        self.seq += 1;
        seq
    }

    fn link(&mut self, worker: usize, phase: Phase) -> Result<&mut TcpStream, CommError> {
        self.links
            .get_mut(worker)
            .and_then(Option::as_mut)
            .ok_or(CommError::Disconnected { peer: worker, phase })
    }

    fn send(&mut self, seq: u64, dst: usize, phase: Phase, payload: &[u8]) -> Result<(), CommError> {
        let header = FrameHeader {
            seq,
            phase,
            src: self.spec.worker_id() as u32,
        };
        let stream = self.link(dst, phase)?;
        write_frame(stream, header, payload)
    }

    fn recv(&mut self, seq: u64, src: usize, phase: Phase) -> Result<Vec<u8>, CommError> {
        let stream = self.link(src, phase)?;
        let (header, payload) = read_frame(stream)?;
        if header.seq != seq || header.phase != phase || header.src as usize != src {
            return Err(CommError::PhaseMismatch {
                peer: src,
                expected: phase,
                expected_seq: seq,
                actual: header.phase,
                actual_seq: header.seq,
            });
        }
        Ok(payload)
    }

    fn require_coordinator_root(&self, root: usize) -> Result<(), CommError> {
        if root != COORDINATOR {
            return Err(CommError::InvalidArgument(format!(
                "the TCP transport only roots collectives at worker {COORDINATOR}, got {root}"
            )));
        }
        Ok(())
    }
}

impl Communicator for TcpComm {
    fn spec(&self) -> &CommSpec {
        &self.spec
    }

    fn gatherv(
        &mut self,
        phase: Phase,
        payload: Vec<u8>,
        root: usize,
    ) -> Result<Option<Vec<Vec<u8>>>, CommError> {
        self.require_coordinator_root(root)?;
        let seq = self.next_seq();
        if !self.spec.is_coordinator() {
            self.send(seq, COORDINATOR, phase, &payload)?;
            return Ok(None);
        }
        let mut out = Vec::with_capacity(self.spec.worker_num());
        out.push(payload);
        for src in 1..self.spec.worker_num() {
            out.push(self.recv(seq, src, phase)?);
        }
        Ok(Some(out))
    }

    fn broadcast(
        &mut self,
        phase: Phase,
        payload: Vec<u8>,
        root: usize,
    ) -> Result<Vec<u8>, CommError> {
        self.require_coordinator_root(root)?;
        let seq = self.next_seq();
        if !self.spec.is_coordinator() {
            return self.recv(seq, COORDINATOR, phase);
        }
        for dst in 1..self.spec.worker_num() {
            self.send(seq, dst, phase, &payload)?;
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
        let worker_num = self.spec.worker_num();

        if !self.spec.is_coordinator() {
            self.send(seq, COORDINATOR, phase, &bincode::serialize(&outgoing)?)?;
            let routed = self.recv(seq, COORDINATOR, phase)?;
            let incoming: Vec<Vec<u8>> = bincode::deserialize(&routed)?;
            if incoming.len() != worker_num {
                return Err(CommError::Malformed(format!(
                    "routed all-to-all carried {} buffers for {worker_num} workers",
                    incoming.len()
                )));
            }
            return Ok(incoming);
        }

        // rows[src][dst]
        let mut rows = Vec::with_capacity(worker_num);
        rows.push(outgoing);
        for src in 1..worker_num {
            let bytes = self.recv(seq, src, phase)?;
            let row: Vec<Vec<u8>> = bincode::deserialize(&bytes)?;
            if row.len() != worker_num {
                return Err(CommError::Malformed(format!(
                    "worker {src} sent {} all-to-all buffers for {worker_num} workers",
                    row.len()
                )));
            }
            rows.push(row);
        }
        for dst in 1..worker_num {
            let column: Vec<Vec<u8>> = rows
                .iter_mut()
                .map(|row| std::mem::take(&mut row[dst]))
                .collect();
            self.send(seq, dst, phase, &bincode::serialize(&column)?)?;
        }
        Ok(rows
            .iter_mut()
            .map(|row| std::mem::take(&mut row[COORDINATOR]))
            .collect())
    }
}
