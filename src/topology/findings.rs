use crate::routing_common::edge_encoder::RoadClass;
use crate::routing_common::road_network::{GeoPoint, MatchPosition, NodeId};

/// A dead end that very likely should be connected to a nearby road.
#[derive(Debug, Clone, PartialEq)]
pub struct MissingConnection {
    pub open_end: GeoPoint,
    pub snap_point: GeoPoint,
    /// Beeline distance in meters.
    pub distance: f64,
    pub node_id: NodeId,
    pub osm_id: u64,
    pub match_position: MatchPosition,
    pub road_class: RoadClass,
    pub private_access: bool,
    /// 1 (most important) to 6.
    pub priority: i32,
}

/// Two edges between the same nodes with identical geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct DuplicatedEdge {
    pub geometry: Vec<GeoPoint>,
    pub way_id_1: Option<u64>,
    pub way_id_2: Option<u64>,
    /// 1 for ordinary ways, 2 if an area is involved.
    pub rank: u8,
}

impl DuplicatedEdge {
    pub const RANK_NORMAL: u8 = 1;
    pub const RANK_AREA: u8 = 2;
}

#[derive(Debug, Clone, PartialEq)]
pub enum Finding {
    MissingConnection(MissingConnection),
    DuplicatedEdge(DuplicatedEdge),
}

impl From<MissingConnection> for Finding {
    fn from(value: MissingConnection) -> Self {
        Finding::MissingConnection(value)
    }
}

impl From<DuplicatedEdge> for Finding {
    fn from(value: DuplicatedEdge) -> Self {
        Finding::DuplicatedEdge(value)
    }
}
