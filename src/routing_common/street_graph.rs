use crate::routing_common::edge_encoder::{EdgeFlags, LevelRange, RoadClass};
use crate::routing_common::geometry_utils::{
    LocalTangentPlane, haversine_distance, project_onto_segment, radius_to_degrees,
};
use crate::routing_common::osm_graph::{self, RoadGraphData};
use crate::routing_common::road_network::{
    EdgeAttributes, EdgeId, EdgeRef, FetchMode, GeoPoint, MatchPosition, NodeId, RoadNetwork,
    Snap,
};
use rstar::primitives::{GeomWithData, Rectangle};
use rstar::{AABB, RTree};
use std::collections::BTreeMap;
use tracing::debug;

type SegmentEntry = GeomWithData<Rectangle<[f64; 2]>, (EdgeId, u32)>;

#[derive(Debug, Clone)]
struct StoredEdge {
    base: NodeId,
    adj: NodeId,
    length_m: f64,
    flags: EdgeFlags,
    pillars: Vec<GeoPoint>,
}

/// In-memory road graph: tower nodes, edges with pillar geometry and an
/// R-tree over all edge segments for nearest-edge lookups.
pub struct StreetGraph {
    nodes: Vec<GeoPoint>,
    removed: Vec<bool>,
    edges: Vec<StoredEdge>,
    adjacency: Vec<Vec<EdgeId>>,
    segment_index: RTree<SegmentEntry>,
}

/// Collects nodes and edges before the adjacency lists and the spatial
/// index are built.
#[derive(Default)]
pub struct StreetGraphBuilder {
    nodes: Vec<GeoPoint>,
    edges: Vec<StoredEdge>,
}

impl StreetGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, point: GeoPoint) -> NodeId {
        self.nodes.push(point);
        (self.nodes.len() - 1) as NodeId
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Add an edge. `pillars` excludes both end nodes.
    pub fn add_edge(
        &mut self,
        base: NodeId,
        adj: NodeId,
        pillars: Vec<GeoPoint>,
        length_m: f64,
        flags: EdgeFlags,
    ) -> EdgeId {
        self.edges.push(StoredEdge {
            base,
            adj,
            length_m,
            flags,
            pillars,
        });
        (self.edges.len() - 1) as EdgeId
    }

    pub fn build(self) -> StreetGraph {
        let removed = vec![false; self.nodes.len()];
        StreetGraph::assemble(self.nodes, removed, self.edges)
    }
}

impl StreetGraph {
    fn assemble(nodes: Vec<GeoPoint>, removed: Vec<bool>, edges: Vec<StoredEdge>) -> Self {
        let mut adjacency: Vec<Vec<EdgeId>> = vec![Vec::new(); nodes.len()];
        for (edge_id, edge) in edges.iter().enumerate() {
            adjacency[edge.base as usize].push(edge_id as EdgeId);
            if edge.adj != edge.base {
                adjacency[edge.adj as usize].push(edge_id as EdgeId);
            }
        }

        let mut graph = StreetGraph {
            nodes,
            removed,
            edges,
            adjacency,
            segment_index: RTree::new(),
        };
        graph.segment_index = graph.build_segment_index();
        debug!(
            "Street graph assembled: {} nodes, {} edges, {} indexed segments",
            graph.nodes.len(),
            graph.edges.len(),
            graph.segment_index.size()
        );
        graph
    }

    fn build_segment_index(&self) -> RTree<SegmentEntry> {
        let mut items = Vec::new();
        for edge_id in 0..self.edges.len() as EdgeId {
            let points = self.stored_geometry(edge_id);
            for (seg, pair) in points.windows(2).enumerate() {
                let min = [pair[0].lon.min(pair[1].lon), pair[0].lat.min(pair[1].lat)];
                let max = [pair[0].lon.max(pair[1].lon), pair[0].lat.max(pair[1].lat)];
                items.push(GeomWithData::new(
                    Rectangle::from_corners(min, max),
                    (edge_id, seg as u32),
                ));
            }
        }
        RTree::bulk_load(items)
    }

    /// Full geometry in stored orientation.
    fn stored_geometry(&self, edge: EdgeId) -> Vec<GeoPoint> {
        let stored = &self.edges[edge as usize];
        let mut points = Vec::with_capacity(stored.pillars.len() + 2);
        points.push(self.nodes[stored.base as usize]);
        points.extend_from_slice(&stored.pillars);
        points.push(self.nodes[stored.adj as usize]);
        points
    }

    pub fn edge_count(&self) -> u32 {
        self.edges.len() as u32
    }

    /// Both end nodes of an edge in stored orientation.
    pub fn edge_nodes(&self, edge: EdgeId) -> (NodeId, NodeId) {
        let stored = &self.edges[edge as usize];
        (stored.base, stored.adj)
    }

    pub fn edge_flags(&self, edge: EdgeId) -> EdgeFlags {
        self.edges[edge as usize].flags
    }

    /// Only valid before the analysis phase starts.
    pub fn mark_node_removed(&mut self, node: NodeId) {
        self.removed[node as usize] = true;
    }

    pub fn from_data(data: RoadGraphData) -> Self {
        let nodes: Vec<GeoPoint> = data
            .nodes
            .iter()
            .map(|n| GeoPoint::new(n.lat, n.lon))
            .collect();
        let removed: Vec<bool> = data.nodes.iter().map(|n| n.removed).collect();
        let edges = data
            .edges
            .iter()
            .map(|e| StoredEdge {
                base: e.base_node,
                adj: e.adj_node,
                length_m: e.length_m,
                flags: EdgeFlags(e.flags),
                pillars: data
                    .geometries
                    .get(e.geometry_id as usize)
                    .map(|g| coords_to_points(&g.coords))
                    .unwrap_or_default(),
            })
            .collect();
        StreetGraph::assemble(nodes, removed, edges)
    }

    /// Snapshot of the graph plus the given barrier polylines.
    pub fn to_data(&self, barriers: &[Vec<GeoPoint>]) -> RoadGraphData {
        RoadGraphData {
            nodes: self
                .nodes
                .iter()
                .zip(self.removed.iter())
                .map(|(p, removed)| osm_graph::Node {
                    lat: p.lat,
                    lon: p.lon,
                    removed: *removed,
                })
                .collect(),
            edges: self
                .edges
                .iter()
                .enumerate()
                .map(|(i, e)| osm_graph::Edge {
                    base_node: e.base,
                    adj_node: e.adj,
                    length_m: e.length_m,
                    flags: e.flags.0,
                    geometry_id: i as u32,
                })
                .collect(),
            geometries: self
                .edges
                .iter()
                .map(|e| osm_graph::Geometry {
                    coords: points_to_coords(&e.pillars),
                })
                .collect(),
            barriers: barriers
                .iter()
                .map(|line| osm_graph::Geometry {
                    coords: points_to_coords(line),
                })
                .collect(),
        }
    }
}

pub fn coords_to_points(coords: &[f64]) -> Vec<GeoPoint> {
    coords
        .chunks_exact(2)
        .map(|chunk| GeoPoint::new(chunk[0], chunk[1]))
        .collect()
}

pub fn points_to_coords(points: &[GeoPoint]) -> Vec<f64> {
    points.iter().flat_map(|p| [p.lat, p.lon]).collect()
}

struct Candidate {
    distance: f64,
    segment: usize,
    t: f64,
    snapped: GeoPoint,
}

impl RoadNetwork for StreetGraph {
    fn node_count(&self) -> u32 {
        self.nodes.len() as u32
    }

    fn is_node_removed(&self, node: NodeId) -> bool {
        self.removed[node as usize]
    }

    fn node_point(&self, node: NodeId) -> GeoPoint {
        self.nodes[node as usize]
    }

    fn edges_of(&self, node: NodeId) -> Vec<EdgeRef> {
        self.adjacency[node as usize]
            .iter()
            .map(|&edge| {
                let stored = &self.edges[edge as usize];
                if stored.base == node {
                    EdgeRef {
                        edge,
                        base: node,
                        adj: stored.adj,
                        reversed: false,
                    }
                } else {
                    EdgeRef {
                        edge,
                        base: node,
                        adj: stored.base,
                        reversed: true,
                    }
                }
            })
            .collect()
    }

    fn fetch_geometry(&self, edge: &EdgeRef, mode: FetchMode) -> Vec<GeoPoint> {
        let mut points = self.stored_geometry(edge.edge);
        if edge.reversed {
            points.reverse();
        }
        let last = points.len() - 1;
        match mode {
            FetchMode::All => points,
            FetchMode::PillarsAndAdj => points[1..].to_vec(),
            FetchMode::PillarsOnly => points[1..last].to_vec(),
        }
    }

    fn edge_length(&self, edge: EdgeId) -> f64 {
        self.edges[edge as usize].length_m
    }

    fn find_nearest(&self, lat: f64, lon: f64, radius: f64) -> Vec<Snap> {
        let query = GeoPoint::new(lat, lon);
        let (dlat, dlon) = radius_to_degrees(lat, radius);
        let envelope = AABB::from_corners([lon - dlon, lat - dlat], [lon + dlon, lat + dlat]);
        let plane = LocalTangentPlane::new(query);

        let mut best: BTreeMap<EdgeId, Candidate> = BTreeMap::new();
        for item in self.segment_index.locate_in_envelope_intersecting(&envelope) {
            let (edge_id, segment) = item.data;
            let stored = &self.edges[edge_id as usize];
            if self.removed[stored.base as usize] || self.removed[stored.adj as usize] {
                continue;
            }
            let points = self.stored_geometry(edge_id);
            let segment = segment as usize;
            let (t, snapped) =
                project_onto_segment(&plane, query, points[segment], points[segment + 1]);
            let distance = haversine_distance(lat, lon, snapped.lat, snapped.lon);
            if distance > radius {
                continue;
            }
            let better = best
                .get(&edge_id)
                .map_or(true, |current| distance < current.distance);
            if better {
                best.insert(
                    edge_id,
                    Candidate {
                        distance,
                        segment,
                        t,
                        snapped,
                    },
                );
            }
        }

        best.into_iter()
            .map(|(edge_id, candidate)| self.make_snap(edge_id, query, candidate))
            .collect()
    }
}

impl StreetGraph {
    fn make_snap(&self, edge_id: EdgeId, query: GeoPoint, candidate: Candidate) -> Snap {
        let stored = &self.edges[edge_id as usize];
        let points = self.stored_geometry(edge_id);
        let last = points.len() - 1;
        let edge = EdgeRef {
            edge: edge_id,
            base: stored.base,
            adj: stored.adj,
            reversed: false,
        };

        let vertex = if candidate.t <= 0.0 {
            Some(candidate.segment)
        } else if candidate.t >= 1.0 {
            Some(candidate.segment + 1)
        } else {
            None
        };

        let (position, way_index) = match vertex {
            Some(v) if v == 0 || v == last => (MatchPosition::Tower, v),
            Some(v) => (MatchPosition::Pillar, v),
            None => (MatchPosition::Edge, candidate.segment),
        };

        let closest_node = match position {
            MatchPosition::Tower if way_index == 0 => stored.base,
            MatchPosition::Tower => stored.adj,
            _ => {
                let mut along = 0.0;
                for pair in points[..=way_index].windows(2) {
                    along += haversine_distance(pair[0].lat, pair[0].lon, pair[1].lat, pair[1].lon);
                }
                let p = points[way_index];
                along += haversine_distance(
                    p.lat,
                    p.lon,
                    candidate.snapped.lat,
                    candidate.snapped.lon,
                );
                let total: f64 = points
                    .windows(2)
                    .map(|pair| haversine_distance(pair[0].lat, pair[0].lon, pair[1].lat, pair[1].lon))
                    .sum();
                if along <= total - along {
                    stored.base
                } else {
                    stored.adj
                }
            }
        };

        Snap {
            edge,
            closest_node,
            query_point: query,
            snapped_point: candidate.snapped,
            query_distance: candidate.distance,
            position,
            way_index,
        }
    }
}

impl EdgeAttributes for StreetGraph {
    fn road_class(&self, edge: EdgeId) -> RoadClass {
        self.edges[edge as usize].flags.road_class()
    }

    fn is_private(&self, edge: EdgeId) -> bool {
        self.edges[edge as usize].flags.is_private()
    }

    fn level(&self, edge: EdgeId) -> LevelRange {
        self.edges[edge as usize].flags.level()
    }

    fn is_area(&self, edge: EdgeId) -> bool {
        self.edges[edge as usize].flags.is_area()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn residential() -> EdgeFlags {
        EdgeFlags::new(RoadClass::Residential, false, LevelRange::GROUND, false)
    }

    // 0 ---- 1 with a pillar in the middle, and an isolated node 2 to the north
    fn small_graph() -> StreetGraph {
        let mut builder = StreetGraphBuilder::new();
        let a = builder.add_node(GeoPoint::new(50.0, 8.0));
        let b = builder.add_node(GeoPoint::new(50.0, 8.002));
        builder.add_node(GeoPoint::new(50.001, 8.001));
        builder.add_edge(a, b, vec![GeoPoint::new(50.0, 8.001)], 143.0, residential());
        builder.build()
    }

    #[test]
    fn test_edges_are_oriented_away_from_node() {
        let graph = small_graph();
        let from_b = graph.edges_of(1);
        assert_eq!(from_b.len(), 1);
        assert_eq!(from_b[0].base, 1);
        assert_eq!(from_b[0].adj, 0);
        assert!(from_b[0].reversed);

        let geometry = graph.fetch_geometry(&from_b[0], FetchMode::All);
        assert_eq!(geometry.first(), Some(&GeoPoint::new(50.0, 8.002)));
        assert_eq!(geometry.last(), Some(&GeoPoint::new(50.0, 8.0)));
        assert_eq!(
            graph.fetch_geometry(&from_b[0], FetchMode::PillarsOnly),
            vec![GeoPoint::new(50.0, 8.001)]
        );
        assert_eq!(graph.fetch_geometry(&from_b[0], FetchMode::PillarsAndAdj).len(), 2);
        assert!(graph.edges_of(2).is_empty());
    }

    #[test]
    fn test_find_nearest_classifies_match_position() {
        let graph = small_graph();

        // straight above the pillar
        let pillar = graph.find_nearest(50.00005, 8.001, 15.0);
        assert_eq!(pillar.len(), 1);
        assert_eq!(pillar[0].position, MatchPosition::Pillar);
        assert_eq!(pillar[0].way_index, 1);
        assert!((pillar[0].query_distance - 5.56).abs() < 0.1);

        // between node 0 and the pillar, closer to node 0
        let interior = graph.find_nearest(50.00005, 8.0003, 15.0);
        assert_eq!(interior[0].position, MatchPosition::Edge);
        assert_eq!(interior[0].way_index, 0);
        assert_eq!(interior[0].closest_node, 0);

        // beyond the end of the edge
        let tower = graph.find_nearest(50.0, 8.00205, 15.0);
        assert_eq!(tower[0].position, MatchPosition::Tower);
        assert_eq!(tower[0].closest_node, 1);
        assert_eq!(tower[0].way_index, 2);

        assert!(graph.find_nearest(50.001, 8.001, 15.0).is_empty());
    }

    #[test]
    fn test_removed_nodes_are_not_matched() {
        let mut graph = small_graph();
        graph.mark_node_removed(0);
        assert!(graph.is_node_removed(0));
        assert!(graph.find_nearest(50.00005, 8.001, 15.0).is_empty());
    }

    #[test]
    fn test_snapshot_roundtrip_keeps_topology() {
        let mut graph = small_graph();
        graph.mark_node_removed(2);
        let barrier = vec![GeoPoint::new(49.9, 8.0), GeoPoint::new(50.1, 8.0)];
        let data = graph.to_data(std::slice::from_ref(&barrier));
        assert_eq!(data.barriers.len(), 1);

        let loaded = StreetGraph::from_data(data);
        assert_eq!(loaded.node_count(), 3);
        assert_eq!(loaded.edge_count(), 1);
        assert!(loaded.is_node_removed(2));
        assert_eq!(loaded.edge_length(0), 143.0);
        assert_eq!(loaded.road_class(0), RoadClass::Residential);
        assert_eq!(
            loaded.fetch_geometry(&loaded.edges_of(0)[0], FetchMode::PillarsOnly),
            vec![GeoPoint::new(50.0, 8.001)]
        );
    }
}
