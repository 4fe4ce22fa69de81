//! Collective semantics over both transports.

use std::net::TcpListener;
use std::thread;
use std::time::Duration;

use pgraph_comm::*;
use proptest::prelude::*;

/// Run `f` once per endpoint, each on its own thread, returning results in
/// worker order.
fn run_workers<C, T, F>(endpoints: Vec<C>, f: F) -> Vec<T>
where
    C: Communicator + Send + 'static,
    T: Send + 'static,
    F: Fn(C) -> T + Send + Sync + Clone + 'static,
{
    let handles: Vec<_> = endpoints
        .into_iter()
        .map(|comm| {
            let f = f.clone();
            thread::spawn(move || f(comm))
        })
        .collect();
    handles.into_iter().map(|h| h.join().unwrap()).collect()
}

// ============================================================================
// In-process transport
// ============================================================================

#[test]
fn test_local_gatherv_collects_in_worker_order() {
    let results = run_workers(LocalCluster::new(4).unwrap(), |mut comm| {
        let me = comm.spec().worker_id();
        comm.gatherv(Phase::SchemaSync, vec![me as u8; me], 0).unwrap()
    });
    let root = results[0].as_ref().expect("root receives the buffers");
    assert_eq!(root.len(), 4);
    for (worker, buf) in root.iter().enumerate() {
        assert_eq!(buf, &vec![worker as u8; worker]);
    }
    assert!(results[1..].iter().all(Option::is_none));
}

#[test]
fn test_local_gather_fixed_size_values() {
    let results = run_workers(LocalCluster::new(3).unwrap(), |mut comm| {
        let me = comm.spec().worker_id() as u64;
        comm.gather(Phase::SchemaSync, me * 10, 0).unwrap()
    });
    assert_eq!(results[0], Some(vec![0, 10, 20]));
}

#[test]
fn test_local_broadcast_from_non_zero_root() {
    let results = run_workers(LocalCluster::new(3).unwrap(), |mut comm| {
        let payload = if comm.spec().worker_id() == 2 {
            b"hello".to_vec()
        } else {
            Vec::new()
        };
        comm.broadcast(Phase::FragmentGroup, payload, 2).unwrap()
    });
    assert!(results.iter().all(|r| r == b"hello"));
}

#[test]
fn test_local_all_to_all_routes_every_buffer() {
    let results = run_workers(LocalCluster::new(3).unwrap(), |mut comm| {
        let me = comm.spec().worker_id() as u8;
        let outgoing = (0..3u8).map(|dst| vec![me, dst]).collect();
        comm.all_to_all(Phase::VertexShuffle, outgoing).unwrap()
    });
    for (dst, incoming) in results.iter().enumerate() {
        for (src, buf) in incoming.iter().enumerate() {
            assert_eq!(buf, &vec![src as u8, dst as u8]);
        }
    }
}

#[test]
fn test_local_all_gather_is_identical_everywhere() {
    let results = run_workers(LocalCluster::new(3).unwrap(), |mut comm| {
        let me = comm.spec().worker_id() as u8;
        comm.all_gather(Phase::VertexMap, vec![me; 2]).unwrap()
    });
    let expected = vec![vec![0u8; 2], vec![1u8; 2], vec![2u8; 2]];
    assert!(results.iter().all(|r| r == &expected));
}

fn payload_matrix() -> impl Strategy<Value = Vec<Vec<Vec<u8>>>> {
    (1usize..5).prop_flat_map(|n| {
        prop::collection::vec(prop::collection::vec(prop::collection::vec(any::<u8>(), 0..16), n), n)
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_all_to_all_delivers_buffer_matrix(matrix in payload_matrix()) {
        let n = matrix.len();
        let sent = matrix.clone();
        let results = run_workers(LocalCluster::new(n).unwrap(), move |mut comm| {
            let me = comm.spec().worker_id();
            comm.all_to_all(Phase::EdgeShuffle, sent[me].clone()).unwrap()
        });
        for (dst, incoming) in results.iter().enumerate() {
            prop_assert_eq!(incoming.len(), n);
            for (src, buf) in incoming.iter().enumerate() {
                prop_assert_eq!(buf, &matrix[src][dst]);
            }
        }
    }
}

#[test]
fn test_local_consecutive_collectives_do_not_mix() {
    // Worker 1 races ahead through two broadcasts rooted at itself while the
    // others are still receiving; stashing by sequence keeps them apart.
    let results = run_workers(LocalCluster::new(3).unwrap(), |mut comm| {
        let me = comm.spec().worker_id();
        let a = comm.broadcast(Phase::Status, vec![1], 1).unwrap();
        let b = comm.broadcast(Phase::Status, vec![2], 1).unwrap();
        let c = comm.gatherv(Phase::Status, vec![me as u8], 0).unwrap();
        (a, b, c)
    });
    for (a, b, _) in &results {
        assert_eq!(a, &vec![1]);
        assert_eq!(b, &vec![2]);
    }
    assert_eq!(results[0].2, Some(vec![vec![0], vec![1], vec![2]]));
}

#[test]
fn test_local_phase_mismatch_is_detected() {
    let results = run_workers(LocalCluster::new(2).unwrap(), |mut comm| {
        let phase = if comm.spec().worker_id() == 0 {
            Phase::SchemaSync
        } else {
            Phase::VertexShuffle
        };
        comm.gatherv(phase, vec![7], 0)
    });
    assert!(matches!(
        results[0],
        Err(CommError::PhaseMismatch {
            expected: Phase::SchemaSync,
            actual: Phase::VertexShuffle,
            ..
        })
    ));
    assert!(matches!(results[1], Ok(None)));
}

#[test]
fn test_local_single_worker_collectives_are_local() {
    let mut endpoints = LocalCluster::new(1).unwrap();
    let mut comm = endpoints.pop().unwrap();
    assert_eq!(
        comm.gatherv(Phase::SchemaSync, vec![1, 2], 0).unwrap(),
        Some(vec![vec![1, 2]])
    );
    assert_eq!(comm.broadcast(Phase::Status, vec![3], 0).unwrap(), vec![3]);
    assert_eq!(
        comm.all_to_all(Phase::EdgeShuffle, vec![vec![4]]).unwrap(),
        vec![vec![4]]
    );
}

#[test]
fn test_local_all_to_all_rejects_wrong_arity() {
    let mut endpoints = LocalCluster::new(1).unwrap();
    let mut comm = endpoints.pop().unwrap();
    assert!(matches!(
        comm.all_to_all(Phase::EdgeShuffle, vec![vec![], vec![]]),
        Err(CommError::InvalidArgument(_))
    ));
}

#[test]
fn test_local_permuted_assignment_is_visible_to_every_worker() {
    let results = run_workers(LocalCluster::with_assignment(vec![1, 2, 0]).unwrap(), |comm| {
        (comm.spec().fid(), comm.spec().frag_to_worker(0))
    });
    assert_eq!(results, vec![(1, 2), (2, 2), (0, 2)]);
}

// ============================================================================
// TCP transport
// ============================================================================

fn tcp_cluster(worker_num: usize) -> Vec<thread::JoinHandle<TcpComm>> {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let mut handles = Vec::new();
    handles.push(thread::spawn(move || {
        TcpComm::coordinator(listener, CommSpec::new(0, worker_num).unwrap()).unwrap()
    }));
    for worker in 1..worker_num {
        handles.push(thread::spawn(move || {
            TcpComm::connect(
                addr,
                CommSpec::new(worker, worker_num).unwrap(),
                Duration::from_secs(10),
            )
            .unwrap()
        }));
    }
    handles
}

#[test]
fn test_tcp_collectives_match_local_semantics() {
    let handles: Vec<_> = tcp_cluster(3)
        .into_iter()
        .map(|h| {
            thread::spawn(move || {
                let mut comm = h.join().unwrap();
                let me = comm.spec().worker_id() as u8;
                let gathered = comm.gatherv(Phase::SchemaSync, vec![me], 0).unwrap();
                let bcast = comm.broadcast(Phase::SchemaSync, vec![42], 0).unwrap();
                let outgoing = (0..3u8).map(|dst| vec![me, dst]).collect();
                let exchanged = comm.all_to_all(Phase::VertexShuffle, outgoing).unwrap();
                let everyone = comm.all_gather(Phase::VertexMap, vec![me]).unwrap();
                (gathered, bcast, exchanged, everyone)
            })
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(results[0].0, Some(vec![vec![0], vec![1], vec![2]]));
    for (dst, (gathered, bcast, exchanged, everyone)) in results.iter().enumerate() {
        if dst != 0 {
            assert!(gathered.is_none());
        }
        assert_eq!(bcast, &vec![42]);
        for (src, buf) in exchanged.iter().enumerate() {
            assert_eq!(buf, &vec![src as u8, dst as u8]);
        }
        assert_eq!(everyone, &vec![vec![0], vec![1], vec![2]]);
    }
}

#[test]
fn test_tcp_rejects_non_coordinator_root() {
    let handles: Vec<_> = tcp_cluster(2)
        .into_iter()
        .map(|h| {
            thread::spawn(move || {
                let mut comm = h.join().unwrap();
                comm.broadcast(Phase::Status, vec![], 1)
            })
        })
        .collect();
    for h in handles {
        assert!(matches!(h.join().unwrap(), Err(CommError::InvalidArgument(_))));
    }
}
