//! End-to-end loads over the in-process transport.

use std::sync::Arc;
use std::thread;

use arrow::array::{Array, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use pgraph_comm::{Communicator, LocalCluster, LocalComm};
use pgraph_loader::*;
use pgraph_store::{MemoryStore, ObjectId, ObjectStore};

// ============================================================================
// Fixtures
// ============================================================================

fn persons(ids: &[i64]) -> RecordBatch {
    let schema = Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("name", DataType::Utf8, true),
    ]);
    let names: Vec<String> = ids.iter().map(|i| format!("v{i}")).collect();
    RecordBatch::try_new(
        Arc::new(schema),
        vec![
            Arc::new(Int64Array::from(ids.to_vec())),
            Arc::new(StringArray::from(names)),
        ],
    )
    .unwrap()
}

fn knows(pairs: &[(i64, i64)]) -> RecordBatch {
    let schema = Schema::new(vec![
        Field::new("src", DataType::Int64, false),
        Field::new("dst", DataType::Int64, false),
    ]);
    RecordBatch::try_new(
        Arc::new(schema),
        vec![
            Arc::new(Int64Array::from(pairs.iter().map(|p| p.0).collect::<Vec<_>>())),
            Arc::new(Int64Array::from(pairs.iter().map(|p| p.1).collect::<Vec<_>>())),
        ],
    )
    .unwrap()
}

fn config() -> LoaderConfig {
    LoaderConfig {
        vertex_label_num: 1,
        edge_label_num: 1,
        vertex_labels: vec!["person".to_string()],
        edge_labels: vec!["knows".to_string()],
        ..LoaderConfig::default()
    }
}

/// Per worker: (vertex table, edge table).
type Inputs = Vec<(Option<RecordBatch>, Option<RecordBatch>)>;

/// Ring over ids 0..6, split evenly between two workers.
fn ring_inputs() -> Inputs {
    vec![
        (Some(persons(&[0, 1, 2])), Some(knows(&[(0, 1), (1, 2), (2, 3)]))),
        (Some(persons(&[3, 4, 5])), Some(knows(&[(3, 4), (4, 5), (5, 0)]))),
    ]
}

/// Load on one thread per endpoint, sharing one memory store.
fn load_all(
    endpoints: Vec<LocalComm>,
    config: LoaderConfig,
    inputs: Inputs,
    as_group: bool,
) -> (MemoryStore, Vec<Result<ObjectId>>) {
    let store = MemoryStore::new(0);
    let handles: Vec<_> = endpoints
        .into_iter()
        .zip(inputs)
        .map(|(comm, (vertex, edge))| {
            let store = store.connect(comm.spec().worker_id() as u32);
            let config = config.clone();
            thread::spawn(move || -> Result<ObjectId> {
                let mut loader = FragmentLoader::from_tables(comm, store, config, vec![vertex], vec![edge])?;
                if as_group {
                    loader.load_fragment_as_fragment_group()
                } else {
                    loader.load_fragment()
                }
            })
        })
        .collect();
    let results = handles.into_iter().map(|h| h.join().unwrap()).collect();
    (store, results)
}

fn fragments(store: &MemoryStore, results: Vec<Result<ObjectId>>) -> Vec<Fragment> {
    results
        .into_iter()
        .map(|r| Fragment::resolve(store, r.unwrap()).unwrap())
        .collect()
}

fn names(batch: &RecordBatch) -> Vec<String> {
    let column = batch
        .column_by_name("name")
        .unwrap()
        .as_any()
        .downcast_ref::<StringArray>()
        .unwrap()
        .clone();
    let mut out: Vec<String> = (0..column.len()).map(|i| column.value(i).to_string()).collect();
    out.sort();
    out
}

// ============================================================================
// Partitioning
// ============================================================================

#[test]
fn test_hash_partition_places_even_ids_on_fragment_zero() {
    let (store, results) = load_all(LocalCluster::new(2).unwrap(), config(), ring_inputs(), false);
    let frags = fragments(&store, results);

    assert_eq!(names(frags[0].vertex_table(0).unwrap()), vec!["v0", "v2", "v4"]);
    assert_eq!(names(frags[1].vertex_table(0).unwrap()), vec!["v1", "v3", "v5"]);
    // The id column is not a property.
    assert!(frags[0].vertex_table(0).unwrap().column_by_name("id").is_none());

    // Directed edges live with their source vertex.
    assert_eq!(frags[0].edge_num(), 3);
    assert_eq!(frags[1].edge_num(), 3);

    let map = VertexMap::resolve(&store, frags[0].vertex_map_id()).unwrap();
    assert_eq!(frags[0].vertex_map_id(), frags[1].vertex_map_id());
    let parser = map.id_parser();
    for i in 0..6i64 {
        let vid = map.get_internal_id((i % 2) as u32, 0, &Oid::Int(i)).unwrap();
        assert_eq!(parser.get_fid(vid), (i % 2) as u32);
        assert_eq!(map.get_oid(vid).unwrap(), Oid::Int(i));
    }
}

#[test]
fn test_segmented_partition_splits_sorted_range() {
    let config = LoaderConfig {
        partitioner: PartitionStrategy::Segmented,
        ..config()
    };
    let inputs = vec![
        (Some(persons(&[5, 0, 3])), Some(knows(&[(5, 0)]))),
        (Some(persons(&[1, 4, 2])), Some(knows(&[(1, 4)]))),
    ];
    let (store, results) = load_all(LocalCluster::new(2).unwrap(), config, inputs, false);
    let frags = fragments(&store, results);

    assert_eq!(names(frags[0].vertex_table(0).unwrap()), vec!["v0", "v1", "v2"]);
    assert_eq!(names(frags[1].vertex_table(0).unwrap()), vec!["v3", "v4", "v5"]);
    assert_eq!(frags[0].edge_num(), 1);
    assert_eq!(frags[1].edge_num(), 1);
}

// ============================================================================
// Failures
// ============================================================================

#[test]
fn test_dangling_edge_fails_every_worker() {
    let inputs = vec![
        (Some(persons(&[0, 1])), Some(knows(&[(0, 1)]))),
        (Some(persons(&[2, 3])), Some(knows(&[(2, 99)]))),
    ];
    let (_, results) = load_all(LocalCluster::new(2).unwrap(), config(), inputs, false);

    match &results[1] {
        Err(LoadError::Lookup(message)) => assert!(message.contains("2 -> 99"), "{message}"),
        other => panic!("expected lookup error, got {other:?}"),
    }
    assert!(matches!(&results[0], Err(LoadError::Aborted { worker: 1, .. })));
}

#[test]
fn test_duplicate_vertex_fails_every_worker() {
    let inputs = vec![
        (Some(persons(&[0, 1])), Some(knows(&[]))),
        (Some(persons(&[0, 3])), Some(knows(&[]))),
    ];
    let (_, results) = load_all(LocalCluster::new(2).unwrap(), config(), inputs, false);
    assert!(results.iter().all(|r| r.is_err()));
}

#[test]
fn test_mismatched_assignment_rejected_before_loading() {
    let config = LoaderConfig {
        assignment: Some(vec![1, 0]),
        ..config()
    };
    let comm = LocalCluster::new(2).unwrap().remove(0);
    let err = FragmentLoader::from_tables(comm, MemoryStore::new(0), config, vec![None], vec![None])
        .err()
        .unwrap();
    assert!(matches!(err, LoadError::Invalid(_)));
}

#[test]
fn test_table_count_must_match_labels() {
    let comm = LocalCluster::new(1).unwrap().remove(0);
    let result = FragmentLoader::from_tables(comm, MemoryStore::new(0), config(), vec![], vec![None]);
    assert!(matches!(result.err(), Some(LoadError::Invalid(_))));
}

// ============================================================================
// Schemas
// ============================================================================

#[test]
fn test_worker_without_rows_ends_with_canonical_schema() {
    let inputs = vec![(Some(persons(&[0, 1, 2, 3])), Some(knows(&[(0, 1), (2, 3)]))), (None, None)];
    let (store, results) = load_all(LocalCluster::new(2).unwrap(), config(), inputs, false);
    let frags = fragments(&store, results);

    assert_eq!(frags[0].vertex_table(0).unwrap().schema(), frags[1].vertex_table(0).unwrap().schema());
    assert_eq!(frags[0].inner_vertex_num(0) + frags[1].inner_vertex_num(0), 4);
    assert_eq!(frags[0].schema(), frags[1].schema());
}

#[test]
fn test_majority_type_wins_schema_sync() {
    fn weighted(ids: &[i64], weight: Arc<dyn Array>) -> RecordBatch {
        let schema = Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("weight", weight.data_type().clone(), true),
        ]);
        RecordBatch::try_new(Arc::new(schema), vec![Arc::new(Int64Array::from(ids.to_vec())), weight]).unwrap()
    }
    let inputs = vec![
        (Some(weighted(&[0], Arc::new(Int64Array::from(vec![3])))), Some(knows(&[]))),
        (Some(weighted(&[1], Arc::new(Float64Array::from(vec![0.5])))), Some(knows(&[]))),
        (Some(weighted(&[2], Arc::new(Float64Array::from(vec![1.5])))), Some(knows(&[]))),
    ];
    let (store, results) = load_all(LocalCluster::new(3).unwrap(), config(), inputs, false);
    let frags = fragments(&store, results);

    for frag in &frags {
        let table = frag.vertex_table(0).unwrap();
        assert_eq!(table.schema().field_with_name("weight").unwrap().data_type(), &DataType::Float64);
    }
    let property = &frags[0].schema().vertex_entries[0].properties[0];
    assert_eq!(property.name, "weight");
    assert_eq!(property.data_type, "Float64");
}

#[test]
fn test_tied_types_resolve_to_smallest_type_string() {
    fn scored(id: i64, score: Arc<dyn Array>) -> RecordBatch {
        let schema = Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("score", score.data_type().clone(), true),
        ]);
        RecordBatch::try_new(Arc::new(schema), vec![Arc::new(Int64Array::from(vec![id])), score]).unwrap()
    }
    // Utf8 is seen first, but "Int64" < "Utf8".
    let inputs = vec![
        (Some(scored(0, Arc::new(StringArray::from(vec!["7"])))), Some(knows(&[]))),
        (Some(scored(1, Arc::new(Int64Array::from(vec![3])))), Some(knows(&[]))),
        (Some(scored(2, Arc::new(Int64Array::from(vec![4])))), Some(knows(&[]))),
        (Some(scored(3, Arc::new(StringArray::from(vec!["8"])))), Some(knows(&[]))),
    ];
    let (store, results) = load_all(LocalCluster::new(4).unwrap(), config(), inputs, false);
    let frags = fragments(&store, results);

    let mut scores = Vec::new();
    for frag in &frags {
        let table = frag.vertex_table(0).unwrap();
        let column = table.column_by_name("score").unwrap();
        assert_eq!(column.data_type(), &DataType::Int64);
        scores.extend(column.as_any().downcast_ref::<Int64Array>().unwrap().values().iter().copied());
    }
    scores.sort();
    assert_eq!(scores, vec![3, 4, 7, 8]);
}

#[test]
fn test_label_without_rows_anywhere_fails_every_worker_alike() {
    let inputs = vec![(Some(persons(&[0, 1])), None), (Some(persons(&[2, 3])), None)];
    let (_, results) = load_all(LocalCluster::new(2).unwrap(), config(), inputs, false);
    for result in &results {
        match result {
            Err(LoadError::Io(message)) => {
                assert!(message.contains("all schemas are empty"), "{message}");
                assert!(message.contains("knows"), "{message}");
            }
            other => panic!("expected IO error, got {other:?}"),
        }
    }
}

#[test]
fn test_header_only_edge_file_loads_empty_edge_label() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("v_0"), "id,name\n0,a\n1,b\n2,c\n3,d\n").unwrap();
    std::fs::write(dir.path().join("e_0"), "src,dst\n").unwrap();
    let config = LoaderConfig {
        vertex_files: dir.path().join("v").display().to_string(),
        edge_files: dir.path().join("e").display().to_string(),
        ..config()
    };

    let store = MemoryStore::new(0);
    let handles: Vec<_> = LocalCluster::new(2)
        .unwrap()
        .into_iter()
        .map(|comm| {
            let store = store.connect(comm.spec().worker_id() as u32);
            let config = config.clone();
            thread::spawn(move || -> Result<ObjectId> { FragmentLoader::new(comm, store, config)?.load_fragment() })
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let frags = fragments(&store, results);

    assert_eq!(frags.iter().map(|f| f.inner_vertex_num(0)).sum::<usize>(), 4);
    for frag in &frags {
        assert_eq!(frag.edge_num(), 0);
        assert_eq!(frag.edge_table(0).unwrap().num_rows(), 0);
    }
}

#[test]
fn test_observed_relations_recorded_in_schema() {
    let (store, results) = load_all(LocalCluster::new(2).unwrap(), config(), ring_inputs(), false);
    let frags = fragments(&store, results);
    assert_eq!(frags[0].schema().edge_entries[0].relations, vec![(0, 0)]);
    assert_eq!(frags[0].schema().edge_entries[0].label, "knows");
}

// ============================================================================
// Topology
// ============================================================================

#[test]
fn test_undirected_edge_visible_from_both_owners() {
    let config = LoaderConfig {
        directed: false,
        ..config()
    };
    let inputs = vec![
        (Some(persons(&[0, 1])), Some(knows(&[(0, 1)]))),
        (Some(persons(&[2, 3])), Some(knows(&[]))),
    ];
    let (store, results) = load_all(LocalCluster::new(2).unwrap(), config, inputs, false);
    let frags = fragments(&store, results);
    assert_eq!(frags[0].edge_num(), 1);
    assert_eq!(frags[1].edge_num(), 1);

    let map = VertexMap::resolve(&store, frags[0].vertex_map_id()).unwrap();
    let v0 = map.get_internal_id(0, 0, &Oid::Int(0)).unwrap();
    let v1 = map.get_internal_id(1, 0, &Oid::Int(1)).unwrap();
    assert_eq!(frags[0].out_edges(v0, 0).unwrap()[0].neighbor, v1);
    assert_eq!(frags[1].out_edges(v1, 0).unwrap()[0].neighbor, v0);
    assert!(frags[1].outer_vertices(0).unwrap().contains(v0));
}

#[test]
fn test_single_worker_holds_whole_graph() {
    let inputs = vec![(
        Some(persons(&[0, 1, 2, 3, 4, 5])),
        Some(knows(&[(0, 1), (1, 2), (2, 3), (3, 4), (4, 5), (5, 0)])),
    )];
    let (store, results) = load_all(LocalCluster::new(1).unwrap(), config(), inputs, false);
    let frag = fragments(&store, results).remove(0);

    assert_eq!(frag.fnum(), 1);
    assert_eq!(frag.inner_vertex_num(0), 6);
    assert_eq!(frag.edge_num(), 6);
    assert!(frag.outer_vertices(0).unwrap().is_empty());
    let v5 = frag.inner_vertex(0, 5).unwrap();
    assert_eq!(frag.in_edges(frag.inner_vertex(0, 0).unwrap(), 0).unwrap()[0].neighbor, v5);
}

// ============================================================================
// Groups
// ============================================================================

#[test]
fn test_group_covers_every_partition_with_permuted_assignment() {
    let config = LoaderConfig {
        assignment: Some(vec![2, 0, 1]),
        ..config()
    };
    let inputs = vec![
        (Some(persons(&[0, 1])), Some(knows(&[(0, 1)]))),
        (Some(persons(&[2, 3])), Some(knows(&[(2, 3)]))),
        (Some(persons(&[4, 5])), Some(knows(&[(4, 5)]))),
    ];
    let endpoints = LocalCluster::with_assignment(vec![2, 0, 1]).unwrap();
    let (store, results) = load_all(endpoints, config, inputs, true);

    let ids: Vec<ObjectId> = results.into_iter().map(|r| r.unwrap()).collect();
    assert!(ids.windows(2).all(|w| w[0] == w[1]));
    assert!(store.is_persisted(ids[0]).unwrap());

    let group = FragmentGroup::resolve(&store, ids[0]).unwrap();
    assert_eq!(group.fnum(), 3);
    assert_eq!(group.iter().count(), 3);
    for (fid, location) in group.iter() {
        let frag = Fragment::resolve(&store, location.fragment).unwrap();
        assert_eq!(frag.fid(), fid);
    }
    // Worker 1 owns partition 0.
    assert_eq!(group.get(0).unwrap().instance, 1);
}
