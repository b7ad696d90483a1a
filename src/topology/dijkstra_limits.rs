// Shortest path search with hard limits on settled nodes and distance.
//
// Used by the detector to compare the network distance between a dead end and
// its spatial match with their beeline distance. The search space is tiny
// (tens of nodes), so the frontier is a plain vector scanned linearly instead
// of a heap. All state is local to one call.

use crate::routing_common::geometry_utils::DistanceCalc;
use crate::routing_common::road_network::{EdgeRef, FetchMode, GeoPoint, NodeId, RoadNetwork};
use crate::topology::error::DetectorError;
use ahash::AHashMap;
use std::f64::consts::PI;

/// Slack for "point lies inside the segment's bounding box" tests.
const BBOX_TOLERANCE: f64 = 1e-7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteStatus {
    Ok,
    TooLong,
    TooManyNodes,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RouteResult {
    pub status: RouteStatus,
    /// Network distance for `Ok`, the configured distance limit otherwise.
    pub distance: f64,
}

impl RouteResult {
    fn ok(distance: f64) -> Self {
        RouteResult {
            status: RouteStatus::Ok,
            distance,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == RouteStatus::Ok
    }
}

struct Label {
    node: NodeId,
    distance: f64,
    settled: bool,
}

pub struct DijkstraWithLimits<'a, G: RoadNetwork + ?Sized> {
    graph: &'a G,
    max_nodes: usize,
    max_distance: f64,
    distance_calc: DistanceCalc,
}

impl<'a, G: RoadNetwork + ?Sized> DijkstraWithLimits<'a, G> {
    pub fn new(graph: &'a G, max_nodes: usize, max_distance: f64) -> Self {
        Self::with_distance_calc(graph, max_nodes, max_distance, DistanceCalc::Earth)
    }

    pub fn with_distance_calc(
        graph: &'a G,
        max_nodes: usize,
        max_distance: f64,
        distance_calc: DistanceCalc,
    ) -> Self {
        DijkstraWithLimits {
            graph,
            max_nodes,
            max_distance,
            distance_calc,
        }
    }

    fn limited(&self, status: RouteStatus) -> RouteResult {
        RouteResult {
            status,
            distance: self.max_distance,
        }
    }

    pub fn route(&self, from: NodeId, to: NodeId) -> RouteResult {
        if from == to {
            return RouteResult::ok(0.0);
        }

        // insertion order doubles as the tie-break between equal distances
        let mut labels: Vec<Label> = vec![Label {
            node: from,
            distance: 0.0,
            settled: false,
        }];
        let mut index: AHashMap<NodeId, usize> = AHashMap::new();
        index.insert(from, 0);
        let mut settled = 0usize;

        while settled < self.max_nodes {
            let mut best: Option<usize> = None;
            for (i, label) in labels.iter().enumerate() {
                if label.settled {
                    continue;
                }
                if best.is_none_or(|b| label.distance < labels[b].distance) {
                    best = Some(i);
                }
            }

            let Some(best) = best else {
                return self.limited(RouteStatus::TooLong);
            };
            let base_distance = labels[best].distance;
            if base_distance > self.max_distance {
                return self.limited(RouteStatus::TooLong);
            }
            let base = labels[best].node;
            labels[best].settled = true;
            settled += 1;

            for edge in self.graph.edges_of(base) {
                let candidate = base_distance + self.graph.edge_length(edge.edge);
                let slot = index.get(&edge.adj).copied();
                if edge.adj == to {
                    // first relaxation of the target ends the search
                    let distance = slot.map_or(candidate, |i| labels[i].distance.min(candidate));
                    if distance <= self.max_distance {
                        return RouteResult::ok(distance);
                    }
                }
                match slot {
                    Some(i) => {
                        let label = &mut labels[i];
                        if !label.settled && candidate < label.distance {
                            label.distance = candidate;
                        }
                    }
                    None => {
                        index.insert(edge.adj, labels.len());
                        labels.push(Label {
                            node: edge.adj,
                            distance: candidate,
                            settled: false,
                        });
                    }
                }
            }
        }
        self.limited(RouteStatus::TooManyNodes)
    }

    /// Cheapest route from `from` to a point reached through either end of
    /// `edge`, given the along-edge distances from its base and adj node.
    fn route_via_edge_ends(
        &self,
        from: NodeId,
        edge: &EdgeRef,
        from_base: f64,
        from_adj: f64,
    ) -> RouteResult {
        let to_base = self.route(from, edge.base);
        let to_adj = self.route(from, edge.adj);

        let best = [(to_base, from_base), (to_adj, from_adj)]
            .into_iter()
            .filter(|(result, _)| result.is_ok())
            .map(|(result, along)| result.distance + along)
            .min_by(|a, b| a.total_cmp(b));

        match best {
            Some(distance) if distance <= self.max_distance => RouteResult::ok(distance),
            Some(_) => self.limited(RouteStatus::TooLong),
            None if to_base.status == RouteStatus::TooManyNodes
                || to_adj.status == RouteStatus::TooManyNodes =>
            {
                self.limited(RouteStatus::TooManyNodes)
            }
            None => self.limited(RouteStatus::TooLong),
        }
    }

    /// Route to the geometry vertex `way_index` of `edge`.
    pub fn route_to_pillar(&self, from: NodeId, edge: &EdgeRef, way_index: usize) -> RouteResult {
        let points = self.graph.fetch_geometry(edge, FetchMode::All);
        let way_index = way_index.min(points.len().saturating_sub(1));
        let from_base = self.distance_calc.polyline_length(&points[..=way_index]);
        let from_adj = self.distance_calc.polyline_length(&points[way_index..]);
        self.route_via_edge_ends(from, edge, from_base, from_adj)
    }

    /// Route to an arbitrary point in the interior of `edge`.
    pub fn route_between_pillars(
        &self,
        from: NodeId,
        edge: &EdgeRef,
        point: GeoPoint,
    ) -> Result<RouteResult, DetectorError> {
        let mut points = self.graph.fetch_geometry(edge, FetchMode::All);
        let not_found = || DetectorError::PillarNotFound {
            edge: edge.edge,
            lat: point.lat,
            lon: point.lon,
        };
        let from_base = self.distance_on_edge(&points, point).ok_or_else(not_found)?;
        points.reverse();
        let from_adj = self.distance_on_edge(&points, point).ok_or_else(not_found)?;
        Ok(self.route_via_edge_ends(from, edge, from_base, from_adj))
    }

    /// Distance along `points` from its first vertex to `point`.
    pub fn distance_on_edge(&self, points: &[GeoPoint], point: GeoPoint) -> Option<f64> {
        let i = lower_neighbour_pillars(points, point)?;
        Some(
            self.distance_calc.polyline_length(&points[..=i])
                + self.distance_calc.calc_dist(points[i], point),
        )
    }
}

/// Index `i` of the segment `(points[i], points[i + 1])` that `point` lies on.
///
/// Every segment whose bounding box contains the point is a candidate; the one
/// whose direction best matches the direction from the point to the segment
/// end wins. `None` means the point is not on the polyline at all.
pub fn lower_neighbour_pillars(points: &[GeoPoint], point: GeoPoint) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, pair) in points.windows(2).enumerate() {
        let (a, b) = (pair[0], pair[1]);
        let inside = point.lat >= a.lat.min(b.lat) - BBOX_TOLERANCE
            && point.lat <= a.lat.max(b.lat) + BBOX_TOLERANCE
            && point.lon >= a.lon.min(b.lon) - BBOX_TOLERANCE
            && point.lon <= a.lon.max(b.lon) + BBOX_TOLERANCE;
        if !inside {
            continue;
        }

        let d_lat = b.lat - point.lat;
        let d_lon = b.lon - point.lon;
        let deviation = if d_lat.abs() < f64::EPSILON && d_lon.abs() < f64::EPSILON {
            0.0
        } else {
            let expected = (b.lat - a.lat).atan2(b.lon - a.lon);
            let actual = d_lat.atan2(d_lon);
            let diff = (expected - actual).abs() % PI;
            diff.min(PI - diff)
        };

        if best.is_none_or(|(_, current)| deviation < current) {
            best = Some((i, deviation));
        }
    }
    best.map(|(i, _)| i)
}
