use crate::config::AuditConfig;
use crate::routing_common::edge_encoder::{EdgeFlags, LevelRange, RoadClass};
use crate::routing_common::road_network::{GeoPoint, NodeId};
use crate::routing_common::street_graph::StreetGraphBuilder;
use crate::topology::barriers::BarrierIndex;
use crate::topology::detector::{AuditContext, UnconnectedFinder};
use crate::topology::error::{DetectorError, PipelineError};
use crate::topology::findings::{DuplicatedEdge, Finding};
use crate::topology::osm_id_store::OsmIdStore;
use crate::topology::pipeline::{FindingSink, audit, run_pipeline};
use std::io;
use std::sync::Arc;
use std::time::Duration;

/// One finding per node divisible by 7, tagged with the node id.
fn fake_findings(start: NodeId, end: NodeId) -> Vec<Finding> {
    (start..end)
        .filter(|n| n % 7 == 0)
        .map(|n| {
            DuplicatedEdge {
                geometry: Vec::new(),
                way_id_1: Some(n as u64),
                way_id_2: None,
                rank: DuplicatedEdge::RANK_NORMAL,
            }
            .into()
        })
        .collect()
}

fn uneven_job(start: NodeId, end: NodeId) -> Result<Vec<Finding>, DetectorError> {
    // later jobs tend to finish first
    std::thread::sleep(Duration::from_millis(((start / 10) % 5) as u64 * 3));
    Ok(fake_findings(start, end))
}

#[test]
fn test_output_order_matches_sequential_run() {
    let expected = fake_findings(0, 1003);
    for (workers, batch) in [(1, 1000), (2, 10), (4, 10), (8, 7), (3, 5000)] {
        let mut out: Vec<Finding> = Vec::new();
        let summary = run_pipeline(1003, batch, workers, Arc::new(uneven_job), &mut out).unwrap();
        assert_eq!(out, expected, "workers {} batch {}", workers, batch);
        assert_eq!(summary.nodes, 1003);
        assert_eq!(summary.duplicated_edges, expected.len());
        assert_eq!(summary.missing_connections, 0);
        assert_eq!(summary.jobs, 1003usize.div_ceil(batch as usize));
    }
}

#[test]
fn test_empty_graph() {
    let mut out: Vec<Finding> = Vec::new();
    let summary = run_pipeline(0, 1000, 4, Arc::new(uneven_job), &mut out).unwrap();
    assert!(out.is_empty());
    assert_eq!(summary.jobs, 0);
}

#[test]
fn test_failing_job_stops_the_run() {
    let job = |start: NodeId, end: NodeId| {
        if (start..end).contains(&250) {
            Err(DetectorError::DegenerateEdge { edge: 42 })
        } else {
            Ok(fake_findings(start, end))
        }
    };
    let mut out: Vec<Finding> = Vec::new();
    let result = run_pipeline(1000, 100, 3, Arc::new(job), &mut out);
    match result {
        Err(PipelineError::JobFailed { start, end, source }) => {
            assert_eq!((start, end), (200, 300));
            assert!(matches!(source, DetectorError::DegenerateEdge { edge: 42 }));
        }
        other => panic!("unexpected result {:?}", other.map(|s| s.jobs)),
    }
    // everything before the failed range was written, nothing after it
    assert_eq!(out, fake_findings(0, 200));
}

#[test]
fn test_panicking_job_is_reported() {
    let job = |start: NodeId, end: NodeId| -> Result<Vec<Finding>, DetectorError> {
        if start == 30 {
            panic!("boom at {}", start);
        }
        Ok(fake_findings(start, end))
    };
    let mut out: Vec<Finding> = Vec::new();
    let result = run_pipeline(100, 10, 2, Arc::new(job), &mut out);
    match result {
        Err(PipelineError::WorkerPanicked { start, message, .. }) => {
            assert_eq!(start, 30);
            assert!(message.contains("boom at 30"));
        }
        other => panic!("unexpected result {:?}", other.map(|s| s.jobs)),
    }
}

struct BrokenSink;

impl FindingSink for BrokenSink {
    fn write_findings(&mut self, findings: &[Finding]) -> io::Result<()> {
        if findings.is_empty() {
            Ok(())
        } else {
            Err(io::Error::other("disk full"))
        }
    }
}

#[test]
fn test_sink_error_is_propagated() {
    let result = run_pipeline(100, 10, 2, Arc::new(uneven_job), &mut BrokenSink);
    assert!(matches!(result, Err(PipelineError::Sink(_))));
}

#[test]
fn test_audit_matches_single_threaded_check() {
    // a row of short dead ends south of a long road, every second one close enough
    let mut builder = StreetGraphBuilder::new();
    let mut node_ids = OsmIdStore::for_nodes();
    let mut way_ids = OsmIdStore::for_ways();
    let flags = EdgeFlags::new(RoadClass::Residential, false, LevelRange::GROUND, false);

    let west = builder.add_node(GeoPoint::new(50.0, 8.0));
    let east = builder.add_node(GeoPoint::new(50.0, 8.02));
    builder.add_edge(west, east, Vec::new(), 1430.0, flags);
    for i in 0..20 {
        let lon = 8.001 + i as f64 * 0.0009;
        let gap = if i % 2 == 0 { 0.00008 } else { 0.0003 };
        let far = builder.add_node(GeoPoint::new(49.999, lon));
        let near = builder.add_node(GeoPoint::new(50.0 - gap, lon));
        builder.add_edge(far, near, Vec::new(), 100.0, flags);
    }
    let node_count = builder.node_count() as u32;
    for id in 0..node_count {
        node_ids.add_record(id, 10_000 + id as u64, false).unwrap();
    }
    for edge in 0..21 {
        way_ids.add_record(edge, 700 + edge as u64, false).unwrap();
    }

    let ctx = Arc::new(AuditContext {
        node_ids,
        way_ids,
        barriers: BarrierIndex::empty(),
        config: AuditConfig {
            worker_threads: 3,
            batch_size: 4,
            ..AuditConfig::default()
        },
        graph: builder.build(),
    });
    let expected = UnconnectedFinder::new(&*ctx)
        .check_range(0, node_count)
        .unwrap();
    assert_eq!(expected.len(), 10);

    let mut out: Vec<Finding> = Vec::new();
    let summary = audit(Arc::clone(&ctx), &mut out).unwrap();
    assert_eq!(out, expected);
    assert_eq!(summary.missing_connections, 10);
    assert_eq!(summary.nodes, node_count);
}
