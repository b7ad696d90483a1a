// Per-node topology checks.
//
// For every node: report duplicated edges, and for dead ends look for a nearby
// road the dead end was probably meant to join. The candidate filtering and the
// priority adjustments are heuristics; everything reported is reviewed by a
// human later on.

use crate::config::AuditConfig;
use crate::routing_common::geometry_utils::compass_bearing;
use crate::routing_common::road_network::{
    EdgeAttributes, EdgeRef, FetchMode, MatchPosition, NodeId, RoadNetwork, Snap,
};
use crate::topology::barriers::BarrierIndex;
use crate::topology::dijkstra_limits::{DijkstraWithLimits, RouteResult, lower_neighbour_pillars};
use crate::topology::error::DetectorError;
use crate::topology::findings::{DuplicatedEdge, Finding, MissingConnection};
use crate::topology::osm_id_store::{OsmIdAccessor, OsmIdStore};
use crate::topology::priorities::{SUPPRESS, is_reported};
use ahash::AHashSet;

/// Everything the analysis phase reads. Built once after import, shared
/// read-only by all workers.
pub struct AuditContext<G: ?Sized> {
    pub node_ids: OsmIdStore,
    pub way_ids: OsmIdStore,
    pub barriers: BarrierIndex,
    pub config: AuditConfig,
    pub graph: G,
}

/// Absolute difference of two compass bearings in [0, 180].
///
/// For matches in the interior of an edge the edge has no direction of its
/// own, so the result is further folded into [0, 90].
pub fn angle_between(heading_a: f64, heading_b: f64, kind: MatchPosition) -> f64 {
    let mut diff = (heading_a - heading_b).abs() % 360.0;
    if diff > 180.0 {
        diff = 360.0 - diff;
    }
    if kind == MatchPosition::Edge {
        diff = diff.min(180.0 - diff);
    }
    diff
}

pub struct UnconnectedFinder<'a, G: RoadNetwork + EdgeAttributes + ?Sized> {
    ctx: &'a AuditContext<G>,
    node_ids: OsmIdAccessor<'a>,
    way_ids: OsmIdAccessor<'a>,
    dijkstra: DijkstraWithLimits<'a, G>,
}

impl<'a, G: RoadNetwork + EdgeAttributes + ?Sized> UnconnectedFinder<'a, G> {
    pub fn new(ctx: &'a AuditContext<G>) -> Self {
        UnconnectedFinder {
            node_ids: ctx.node_ids.accessor(),
            way_ids: ctx.way_ids.accessor(),
            dijkstra: DijkstraWithLimits::new(
                &ctx.graph,
                ctx.config.routing_max_nodes,
                ctx.config.routing_max_distance(),
            ),
            ctx,
        }
    }

    /// Check the nodes `start..end` and return their findings in node order.
    pub fn check_range(&mut self, start: NodeId, end: NodeId) -> Result<Vec<Finding>, DetectorError> {
        let mut findings = Vec::new();
        for node in start..end {
            self.check_node(node, &mut findings).map_err(|e| DetectorError::Node {
                node,
                osm_id: self.node_ids.osm_id(node),
                source: Box::new(e),
            })?;
        }
        Ok(findings)
    }

    pub fn check_node(&mut self, id: NodeId, out: &mut Vec<Finding>) -> Result<(), DetectorError> {
        let ctx = self.ctx;
        let graph = &ctx.graph;
        if graph.is_node_removed(id) {
            return Ok(());
        }
        let Some(osm_id) = self.node_ids.osm_id(id) else {
            return Ok(());
        };
        if self.node_ids.no_exit(id) {
            return Ok(());
        }

        let edges = graph.edges_of(id);
        self.find_duplicates(id, &edges, out);

        let [dead_end_edge] = edges.as_slice() else {
            return Ok(());
        };
        let adj = dead_end_edge.adj;
        if adj == id {
            return Ok(());
        }

        // spatial lookups trivially hit the dead end's own street
        let neighbours_of_adj: AHashSet<NodeId> = graph
            .edges_of(adj)
            .iter()
            .map(|e| e.adj)
            .filter(|&n| n != id)
            .collect();

        let open_end = graph.node_point(id);
        let radius = ctx.config.radius;
        let end_level = graph.level(dead_end_edge.edge);

        let mut closest: Option<Snap> = None;
        for snap in graph.find_nearest(open_end.lat, open_end.lon, radius) {
            if snap.edge.edge == dead_end_edge.edge
                || snap.closest_node == adj
                || neighbours_of_adj.contains(&snap.closest_node)
            {
                continue;
            }
            let found_level = graph.level(snap.edge.edge);
            if end_level.valid && found_level.valid && !end_level.overlaps(&found_level) {
                continue;
            }
            if snap.query_distance > 0.0
                && closest
                    .as_ref()
                    .is_none_or(|c| snap.query_distance < c.query_distance)
            {
                closest = Some(snap);
            }
        }
        let Some(snap) = closest else {
            return Ok(());
        };

        if ctx.barriers.crosses_barrier(open_end, snap.snapped_point) {
            return Ok(());
        }

        let road_class = graph.road_class(dead_end_edge.edge);
        let private_access = graph.is_private(dead_end_edge.edge);
        let mut priority = ctx.config.priorities.base_priority(
            road_class,
            private_access,
            snap.query_distance,
            radius,
        );
        if priority <= 0 {
            return Ok(());
        }
        priority += self.importance_decrement(id, dead_end_edge, &snap)?;

        if is_reported(priority) {
            out.push(
                MissingConnection {
                    open_end,
                    snap_point: snap.snapped_point,
                    distance: snap.query_distance,
                    node_id: id,
                    osm_id,
                    match_position: snap.position,
                    road_class,
                    private_access,
                    priority,
                }
                .into(),
            );
        }
        Ok(())
    }

    /// Nodes that `check_node` skips entirely.
    fn is_skipped(&mut self, id: NodeId) -> bool {
        self.ctx.graph.is_node_removed(id)
            || self.node_ids.osm_id(id).is_none()
            || self.node_ids.no_exit(id)
    }

    /// Each duplicate pair is seen from both endpoints; it is reported from the
    /// lower id unless that endpoint is skipped.
    fn find_duplicates(&mut self, id: NodeId, edges: &[EdgeRef], out: &mut Vec<Finding>) {
        let ctx = self.ctx;
        let graph = &ctx.graph;
        for (i, a) in edges.iter().enumerate() {
            if id > a.adj && !self.is_skipped(a.adj) {
                continue;
            }
            // first duplicate of `a` only, later pairs are found from `b`
            let duplicate = edges[i + 1..].iter().find(|b| {
                b.adj == a.adj
                    && graph.edge_length(a.edge) == graph.edge_length(b.edge)
                    && graph.fetch_geometry(a, FetchMode::All)
                        == graph.fetch_geometry(b, FetchMode::All)
            });
            let Some(b) = duplicate else {
                continue;
            };
            let rank = if graph.is_area(a.edge) || graph.is_area(b.edge) {
                DuplicatedEdge::RANK_AREA
            } else {
                DuplicatedEdge::RANK_NORMAL
            };
            out.push(
                DuplicatedEdge {
                    geometry: graph.fetch_geometry(a, FetchMode::All),
                    way_id_1: self.way_ids.osm_id(a.edge),
                    way_id_2: self.way_ids.osm_id(b.edge),
                    rank,
                }
                .into(),
            );
        }
    }

    /// Heading of the dead end: from the node towards the first point of its edge.
    fn open_end_heading(&self, edge: &EdgeRef) -> Result<f64, DetectorError> {
        let graph = &self.ctx.graph;
        let points = graph.fetch_geometry(edge, FetchMode::PillarsAndAdj);
        let next = points
            .first()
            .ok_or(DetectorError::DegenerateEdge { edge: edge.edge })?;
        Ok(compass_bearing(graph.node_point(edge.base), *next))
    }

    /// Angle between the dead end and the matched edge at the snap point.
    fn matched_edge_angle(&self, open_heading: f64, snap: &Snap) -> Result<f64, DetectorError> {
        let points = self.ctx.graph.fetch_geometry(&snap.edge, FetchMode::All);
        let degenerate = DetectorError::DegenerateEdge {
            edge: snap.edge.edge,
        };
        if points.len() < 2 {
            return Err(degenerate);
        }
        let last = points.len() - 1;
        let snapped = snap.snapped_point;

        match snap.position {
            MatchPosition::Tower => {
                let neighbour = if snap.way_index == 0 {
                    points[1]
                } else {
                    points[last - 1]
                };
                let heading = compass_bearing(neighbour, snapped);
                Ok(angle_between(open_heading, heading, MatchPosition::Tower))
            }
            MatchPosition::Edge => {
                let i = lower_neighbour_pillars(&points, snapped).ok_or(
                    DetectorError::PillarNotFound {
                        edge: snap.edge.edge,
                        lat: snapped.lat,
                        lon: snapped.lon,
                    },
                )?;
                let heading = compass_bearing(points[i], points[i + 1]);
                Ok(angle_between(open_heading, heading, MatchPosition::Edge))
            }
            MatchPosition::Pillar => {
                let w = snap.way_index;
                if w == 0 || w >= last {
                    return Err(degenerate);
                }
                let incoming = compass_bearing(points[w - 1], snapped);
                let outgoing = compass_bearing(snapped, points[w + 1]);
                Ok(0.5
                    * (angle_between(open_heading, incoming, MatchPosition::Pillar)
                        + angle_between(open_heading, outgoing, MatchPosition::Pillar)))
            }
        }
    }

    fn distance_on_graph(&self, from: NodeId, snap: &Snap) -> Result<RouteResult, DetectorError> {
        match snap.position {
            MatchPosition::Tower => Ok(self.dijkstra.route(from, snap.closest_node)),
            MatchPosition::Pillar => Ok(self
                .dijkstra
                .route_to_pillar(from, &snap.edge, snap.way_index)),
            MatchPosition::Edge => {
                self.dijkstra
                    .route_between_pillars(from, &snap.edge, snap.snapped_point)
            }
        }
    }

    /// Amount added to the priority number for classes where a nearby road
    /// is often not a missing connection.
    fn importance_decrement(
        &self,
        id: NodeId,
        dead_end_edge: &EdgeRef,
        snap: &Snap,
    ) -> Result<i32, DetectorError> {
        let road_class = self.ctx.graph.road_class(dead_end_edge.edge);

        if road_class.is_driveway_like() {
            let open_heading = self.open_end_heading(dead_end_edge)?;
            let open_end = self.ctx.graph.node_point(id);
            let connection = compass_bearing(open_end, snap.snapped_point);
            // direction of the connection line does not matter
            let connection_angle = angle_between(open_heading, connection, MatchPosition::Edge);
            let edge_angle = self.matched_edge_angle(open_heading, snap)?;
            let edge_angle = edge_angle.min(180.0 - edge_angle);
            if (86.0..=90.0).contains(&connection_angle) && edge_angle <= 4.0 {
                return Ok(1);
            }
            return Ok(0);
        }

        if road_class.is_pedestrian_path() && self.ctx.config.do_routing {
            let route = self.distance_on_graph(id, snap)?;
            if !route.is_ok() {
                return Ok(0);
            }
            let ratio = route.distance / snap.query_distance;
            if ratio < 2.0 {
                return Ok(SUPPRESS);
            }
            if ratio < 6.0 {
                return Ok(1);
            }
        }
        Ok(0)
    }
}
