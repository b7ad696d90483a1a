// Ports between the topology core and whatever graph engine backs it.
//
// The detector, the bounded path search and the pipeline only ever talk to a
// graph through these two traits. `StreetGraph` is the in-memory adapter used
// by the `thistle` binary; tests build small graphs with the same adapter.

use crate::routing_common::edge_encoder::{LevelRange, RoadClass};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Internal, dense node id (0..N).
pub type NodeId = u32;
/// Internal, dense edge id (0..M).
pub type EdgeId = u32;

/// A WGS84 coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

impl fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.7}, {:.7})", self.lat, self.lon)
    }
}

/// An edge as seen from one of its end nodes.
///
/// `base` is the node the edge was reached from, `adj` the opposite node.
/// Geometry fetched through a `RoadNetwork` is oriented from `base` to `adj`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EdgeRef {
    pub edge: EdgeId,
    pub base: NodeId,
    pub adj: NodeId,
    /// True if `base` is the stored end node of the edge rather than its start.
    pub reversed: bool,
}

/// Which points of an edge geometry to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    /// Interior (pillar) points only.
    PillarsOnly,
    /// Pillars followed by the adjacent node.
    PillarsAndAdj,
    /// Base node, pillars, adjacent node.
    All,
}

/// Where a spatial match landed on the matched edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPosition {
    /// On a graph node.
    Tower,
    /// On an interior vertex of the edge geometry.
    Pillar,
    /// Somewhere between two vertices.
    Edge,
}

impl MatchPosition {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchPosition::Tower => "tower",
            MatchPosition::Pillar => "pillar",
            MatchPosition::Edge => "edge",
        }
    }
}

/// Result of a nearest-edge lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct Snap {
    /// Matched edge, oriented as stored (start node as `base`).
    pub edge: EdgeRef,
    /// The tower node of the matched edge closest to the snapped point.
    pub closest_node: NodeId,
    pub query_point: GeoPoint,
    pub snapped_point: GeoPoint,
    /// Beeline distance in meters between query and snapped point.
    pub query_distance: f64,
    pub position: MatchPosition,
    /// Index into the full (`FetchMode::All`) geometry: the vertex for
    /// `Tower`/`Pillar` matches, the start of the matched segment for `Edge`.
    pub way_index: usize,
}

/// Read-only access to the routing graph.
pub trait RoadNetwork: Send + Sync {
    fn node_count(&self) -> u32;

    fn is_node_removed(&self, node: NodeId) -> bool;

    fn node_point(&self, node: NodeId) -> GeoPoint;

    /// All edges incident to `node`, oriented away from it.
    fn edges_of(&self, node: NodeId) -> Vec<EdgeRef>;

    fn fetch_geometry(&self, edge: &EdgeRef, mode: FetchMode) -> Vec<GeoPoint>;

    /// Edge length in meters.
    fn edge_length(&self, edge: EdgeId) -> f64;

    /// Edges with a point within `radius` meters of (lat, lon), one snap per edge,
    /// ordered by edge id.
    fn find_nearest(&self, lat: f64, lon: f64, radius: f64) -> Vec<Snap>;
}

/// Per-edge attributes written by the edge encoder during import.
pub trait EdgeAttributes: Send + Sync {
    fn road_class(&self, edge: EdgeId) -> RoadClass;

    fn is_private(&self, edge: EdgeId) -> bool;

    fn level(&self, edge: EdgeId) -> LevelRange;

    fn is_area(&self, edge: EdgeId) -> bool;
}
