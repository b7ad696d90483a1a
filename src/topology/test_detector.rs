use crate::config::AuditConfig;
use crate::routing_common::edge_encoder::{EdgeFlags, LevelRange, RoadClass};
use crate::routing_common::geometry_utils::haversine_distance;
use crate::routing_common::road_network::{GeoPoint, MatchPosition, NodeId};
use crate::routing_common::street_graph::{StreetGraph, StreetGraphBuilder};
use crate::topology::barriers::BarrierIndex;
use crate::topology::detector::{AuditContext, UnconnectedFinder};
use crate::topology::findings::{DuplicatedEdge, Finding, MissingConnection};
use crate::topology::osm_id_store::OsmIdStore;

const LAT0: f64 = 50.0;
const LON0: f64 = 8.0;
const METERS_PER_DEG_LAT: f64 = 111_195.0;

/// Local metric coordinates (x east, y north) around (50, 8).
fn at(x: f64, y: f64) -> GeoPoint {
    let meters_per_deg_lon = METERS_PER_DEG_LAT * LAT0.to_radians().cos();
    GeoPoint::new(LAT0 + y / METERS_PER_DEG_LAT, LON0 + x / meters_per_deg_lon)
}

fn flags(class: RoadClass) -> EdgeFlags {
    EdgeFlags::new(class, false, LevelRange::GROUND, false)
}

struct Scenario {
    builder: StreetGraphBuilder,
    points: Vec<GeoPoint>,
    way_ids: OsmIdStore,
    next_way: u64,
    no_exit: Vec<NodeId>,
    /// Nodes without an id store record.
    unknown: Vec<NodeId>,
    removed: Vec<NodeId>,
    barriers: Vec<Vec<GeoPoint>>,
    config: AuditConfig,
}

impl Scenario {
    fn new() -> Self {
        Scenario {
            builder: StreetGraphBuilder::new(),
            points: Vec::new(),
            way_ids: OsmIdStore::for_ways(),
            next_way: 500,
            no_exit: Vec::new(),
            unknown: Vec::new(),
            removed: Vec::new(),
            barriers: Vec::new(),
            config: AuditConfig::default(),
        }
    }

    fn node(&mut self, x: f64, y: f64) -> NodeId {
        let p = at(x, y);
        self.points.push(p);
        self.builder.add_node(p)
    }

    fn edge_with(&mut self, a: NodeId, b: NodeId, flags: EdgeFlags) -> u32 {
        let pa = self.points[a as usize];
        let pb = self.points[b as usize];
        let length = haversine_distance(pa.lat, pa.lon, pb.lat, pb.lon);
        let edge = self.builder.add_edge(a, b, Vec::new(), length, flags);
        self.way_ids.add_record(edge, self.next_way, false).unwrap();
        self.next_way += 1;
        edge
    }

    fn edge(&mut self, a: NodeId, b: NodeId, class: RoadClass) -> u32 {
        self.edge_with(a, b, flags(class))
    }

    fn run(self) -> Vec<Finding> {
        let mut node_ids = OsmIdStore::for_nodes();
        for id in 0..self.points.len() as u32 {
            if self.unknown.contains(&id) {
                continue;
            }
            node_ids
                .add_record(id, 1000 + id as u64, self.no_exit.contains(&id))
                .unwrap();
        }
        let node_count = self.points.len() as u32;
        let mut graph = self.builder.build();
        for &id in &self.removed {
            graph.mark_node_removed(id);
        }
        let ctx: AuditContext<StreetGraph> = AuditContext {
            node_ids,
            way_ids: self.way_ids,
            barriers: BarrierIndex::bulk_load(self.barriers),
            config: self.config,
            graph,
        };
        UnconnectedFinder::new(&ctx)
            .check_range(0, node_count)
            .unwrap()
    }
}

fn missing(findings: &[Finding]) -> Vec<&MissingConnection> {
    findings
        .iter()
        .filter_map(|f| match f {
            Finding::MissingConnection(m) => Some(m),
            _ => None,
        })
        .collect()
}

fn duplicates(findings: &[Finding]) -> Vec<&DuplicatedEdge> {
    findings
        .iter()
        .filter_map(|f| match f {
            Finding::DuplicatedEdge(d) => Some(d),
            _ => None,
        })
        .collect()
}

/// Residential side street ending ~9 m north of a main road.
fn side_street() -> (Scenario, NodeId) {
    let mut s = Scenario::new();
    let m0 = s.node(-70.0, 0.0);
    let m1 = s.node(70.0, 0.0);
    let far = s.node(0.0, 100.0);
    let dead_end = s.node(0.0, 9.0);
    s.edge(m0, m1, RoadClass::Residential);
    s.edge(far, dead_end, RoadClass::Residential);
    (s, dead_end)
}

#[test]
fn test_reports_dead_end_near_road() {
    let (s, dead_end) = side_street();
    let findings = s.run();
    assert_eq!(findings.len(), 1);

    let m = missing(&findings)[0];
    assert_eq!(m.node_id, dead_end);
    assert_eq!(m.osm_id, 1000 + dead_end as u64);
    assert_eq!(m.match_position, MatchPosition::Edge);
    assert_eq!(m.road_class, RoadClass::Residential);
    assert!(!m.private_access);
    assert!((m.distance - 9.0).abs() < 0.1, "distance {}", m.distance);
    // 9 m falls into the third of four 3.75 m buckets
    assert_eq!(m.priority, 3);
    assert!((m.snap_point.lat - LAT0).abs() < 1e-9);
}

#[test]
fn test_private_access_lowers_importance() {
    let mut s = Scenario::new();
    let m0 = s.node(-70.0, 0.0);
    let m1 = s.node(70.0, 0.0);
    let far = s.node(0.0, 100.0);
    let dead_end = s.node(0.0, 9.0);
    s.edge(m0, m1, RoadClass::Residential);
    s.edge_with(
        far,
        dead_end,
        EdgeFlags::new(RoadClass::Residential, true, LevelRange::GROUND, false),
    );
    let findings = s.run();
    let m = missing(&findings)[0];
    assert!(m.private_access);
    assert_eq!(m.priority, 4);
}

#[test]
fn test_private_way_with_zero_table_row_is_not_reported() {
    let mut s = Scenario::new();
    s.config
        .priorities
        .buckets
        .insert(RoadClass::Residential, [0, 0, 0, 0]);
    let m0 = s.node(-70.0, 0.0);
    let m1 = s.node(70.0, 0.0);
    let far = s.node(0.0, 100.0);
    let dead_end = s.node(0.0, 9.0);
    s.edge(m0, m1, RoadClass::Residential);
    s.edge_with(
        far,
        dead_end,
        EdgeFlags::new(RoadClass::Residential, true, LevelRange::GROUND, false),
    );
    assert!(s.run().is_empty());
}

#[test]
fn test_no_exit_node_is_skipped() {
    let (mut s, dead_end) = side_street();
    s.no_exit.push(dead_end);
    assert!(s.run().is_empty());
}

#[test]
fn test_node_without_osm_id_is_skipped() {
    let (mut s, dead_end) = side_street();
    s.unknown.push(dead_end);
    assert!(s.run().is_empty());
}

#[test]
fn test_removed_node_is_skipped() {
    let (mut s, dead_end) = side_street();
    s.removed.push(dead_end);
    assert!(s.run().is_empty());
}

#[test]
fn test_barrier_suppresses_finding() {
    let (mut s, _) = side_street();
    s.barriers.push(vec![at(-20.0, 4.0), at(20.0, 4.0)]);
    assert!(s.run().is_empty());
}

#[test]
fn test_different_levels_are_not_matched() {
    let mut s = Scenario::new();
    let m0 = s.node(-70.0, 0.0);
    let m1 = s.node(70.0, 0.0);
    let far = s.node(0.0, 100.0);
    let dead_end = s.node(0.0, 9.0);
    s.edge(m0, m1, RoadClass::Residential);
    s.edge_with(
        far,
        dead_end,
        EdgeFlags::new(
            RoadClass::Residential,
            false,
            LevelRange::parse(Some("1")),
            false,
        ),
    );
    assert!(s.run().is_empty());
}

#[test]
fn test_match_on_own_street_is_excluded() {
    // main road m0 - m1, side street m1 - dead end bending back along it
    let mut s = Scenario::new();
    let m0 = s.node(-70.0, 0.0);
    let m1 = s.node(0.0, 0.0);
    let dead_end = s.node(-8.0, 9.0);
    s.edge(m0, m1, RoadClass::Residential);
    s.edge(m1, dead_end, RoadClass::Residential);
    assert!(missing(&s.run()).is_empty());
}

#[test]
fn test_match_on_neighbour_of_neighbour_is_excluded() {
    // p0 - p1 main road, n - p0 link, d - n dead end hanging back towards the road
    let mut s = Scenario::new();
    let p0 = s.node(0.0, 0.0);
    let p1 = s.node(140.0, 0.0);
    let n = s.node(36.0, 33.0);
    let dead_end = s.node(21.0, 9.0);
    s.edge(p0, p1, RoadClass::Residential);
    s.edge(n, p0, RoadClass::Residential);
    s.edge(dead_end, n, RoadClass::Residential);
    assert!(missing(&s.run()).is_empty());
}

/// Footway d - a - b - c continuing straight into c - e.
fn straight_footway(do_routing: bool) -> (Scenario, NodeId) {
    let mut s = Scenario::new();
    s.config.do_routing = do_routing;
    let d = s.node(0.0, 0.0);
    let a = s.node(3.0, 0.0);
    let b = s.node(6.0, 0.0);
    let c = s.node(9.0, 0.0);
    let e = s.node(30.0, 0.0);
    s.edge(d, a, RoadClass::Footway);
    s.edge(a, b, RoadClass::Footway);
    s.edge(b, c, RoadClass::Footway);
    s.edge(c, e, RoadClass::Footway);
    (s, d)
}

#[test]
fn test_footway_reported_without_routing() {
    let (s, d) = straight_footway(false);
    let findings = s.run();
    let found = missing(&findings);
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].node_id, d);
    assert_eq!(found[0].match_position, MatchPosition::Tower);
    assert_eq!(found[0].priority, 5);
}

#[test]
fn test_footway_with_short_detour_is_suppressed() {
    let (s, _) = straight_footway(true);
    assert!(s.run().is_empty());
}

#[test]
fn test_footway_with_long_detour_is_lowered() {
    // d - a - b - c loops around, c - e passes 8 m north of d
    let mut s = Scenario::new();
    s.config.do_routing = true;
    let d = s.node(0.0, 0.0);
    let a = s.node(0.0, -2.0);
    let b = s.node(8.0, -2.0);
    let c = s.node(8.0, 8.0);
    let e = s.node(-30.0, 8.0);
    s.edge(d, a, RoadClass::Footway);
    s.edge(a, b, RoadClass::Footway);
    s.edge(b, c, RoadClass::Footway);
    s.edge(c, e, RoadClass::Footway);

    let findings = s.run();
    let found = missing(&findings);
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].node_id, d);
    assert_eq!(found[0].match_position, MatchPosition::Edge);
    // 8 m -> bucket 2 -> 5, network/beeline ratio 3.5 -> +1
    assert_eq!(found[0].priority, 6);
}

#[test]
fn test_parallel_driveway_is_lowered() {
    // driveway 11 m north of and parallel to a road
    let mut s = Scenario::new();
    let r0 = s.node(-150.0, 0.0);
    let r1 = s.node(200.0, 0.0);
    let w1 = s.node(-70.0, 11.0);
    let w0 = s.node(0.0, 11.0);
    s.edge(r0, r1, RoadClass::Residential);
    s.edge(w1, w0, RoadClass::ServiceDriveway);

    let findings = s.run();
    let found = missing(&findings);
    assert_eq!(found.len(), 2);
    for m in found {
        assert_eq!(m.road_class, RoadClass::ServiceDriveway);
        // bucket 2 -> 5, parallel pattern -> +1
        assert_eq!(m.priority, 6);
    }
}

#[test]
fn test_duplicated_edges() {
    let mut s = Scenario::new();
    let a = s.node(0.0, 0.0);
    let b = s.node(50.0, 0.0);
    s.edge(a, b, RoadClass::Residential);
    s.edge(a, b, RoadClass::Residential);

    let findings = s.run();
    let dups = duplicates(&findings);
    assert_eq!(dups.len(), 1);
    assert_eq!(dups[0].way_id_1, Some(500));
    assert_eq!(dups[0].way_id_2, Some(501));
    assert_eq!(dups[0].rank, DuplicatedEdge::RANK_NORMAL);
    assert_eq!(dups[0].geometry.len(), 2);
    assert!(missing(&findings).is_empty());
}

#[test]
fn test_duplicated_area_edges_rank_higher() {
    let mut s = Scenario::new();
    let a = s.node(0.0, 0.0);
    let b = s.node(50.0, 0.0);
    s.edge(a, b, RoadClass::Pedestrian);
    s.edge_with(
        b,
        a,
        EdgeFlags::new(RoadClass::Pedestrian, false, LevelRange::GROUND, true),
    );

    let findings = s.run();
    let dups = duplicates(&findings);
    assert_eq!(dups.len(), 1);
    assert_eq!(dups[0].rank, DuplicatedEdge::RANK_AREA);
}

/// a = b doubled, b - c leads away; c is a dead end far from everything.
fn doubled_link() -> (Scenario, NodeId, NodeId) {
    let mut s = Scenario::new();
    let a = s.node(0.0, 0.0);
    let b = s.node(50.0, 0.0);
    let c = s.node(50.0, 100.0);
    s.edge(a, b, RoadClass::Residential);
    s.edge(a, b, RoadClass::Residential);
    s.edge(b, c, RoadClass::Residential);
    (s, a, b)
}

#[test]
fn test_duplicate_found_from_upper_node_when_lower_is_no_exit() {
    let (mut s, a, _) = doubled_link();
    s.no_exit.push(a);
    let findings = s.run();
    let dups = duplicates(&findings);
    assert_eq!(dups.len(), 1);
    assert_eq!(dups[0].way_id_1, Some(500));
    assert_eq!(dups[0].way_id_2, Some(501));
}

#[test]
fn test_duplicate_found_from_upper_node_when_lower_is_unknown() {
    let (mut s, a, _) = doubled_link();
    s.unknown.push(a);
    assert_eq!(duplicates(&s.run()).len(), 1);
}

#[test]
fn test_duplicate_reported_once_when_both_ends_are_checked() {
    let (s, _, _) = doubled_link();
    assert_eq!(duplicates(&s.run()).len(), 1);
}

#[test]
fn test_three_parallel_edges_give_two_duplicates() {
    let mut s = Scenario::new();
    let a = s.node(0.0, 0.0);
    let b = s.node(50.0, 0.0);
    for _ in 0..3 {
        s.edge(a, b, RoadClass::Residential);
    }

    let findings = s.run();
    let ids: Vec<(Option<u64>, Option<u64>)> = duplicates(&findings)
        .iter()
        .map(|d| (d.way_id_1, d.way_id_2))
        .collect();
    assert_eq!(ids, vec![(Some(500), Some(501)), (Some(501), Some(502))]);
}
