use crate::routing_common::road_network::GeoPoint;
use itertools::Itertools;

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance in meters.
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();
    let a = (dlat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_M * c
}

/// Distance metric used for along-edge measurements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DistanceCalc {
    /// Haversine distance in meters.
    #[default]
    Earth,
    /// Cartesian distance in coordinate units, for synthetic geometry.
    Plane,
}

impl DistanceCalc {
    pub fn calc_dist(&self, a: GeoPoint, b: GeoPoint) -> f64 {
        match self {
            DistanceCalc::Earth => haversine_distance(a.lat, a.lon, b.lat, b.lon),
            DistanceCalc::Plane => ((b.lat - a.lat).powi(2) + (b.lon - a.lon).powi(2)).sqrt(),
        }
    }

    pub fn polyline_length(&self, points: &[GeoPoint]) -> f64 {
        points
            .iter()
            .tuple_windows()
            .map(|(a, b)| self.calc_dist(*a, *b))
            .sum()
    }
}

/// Initial compass bearing from `from` to `to` in degrees, 0 = north,
/// clockwise, in [0, 360).
pub fn compass_bearing(from: GeoPoint, to: GeoPoint) -> f64 {
    let lat1 = from.lat.to_radians();
    let lat2 = to.lat.to_radians();
    let dlon = (to.lon - from.lon).to_radians();
    let y = dlon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos();
    let bearing = y.atan2(x).to_degrees();
    (bearing + 360.0) % 360.0
}

/// Equirectangular projection around a query point.
///
/// Accurate to well below a meter within a search radius, which is all the
/// snapping code needs.
#[derive(Debug, Clone, Copy)]
pub struct LocalTangentPlane {
    origin: GeoPoint,
    meters_per_deg_lat: f64,
    meters_per_deg_lon: f64,
}

impl LocalTangentPlane {
    pub fn new(origin: GeoPoint) -> Self {
        let meters_per_deg_lat = EARTH_RADIUS_M.to_radians();
        LocalTangentPlane {
            origin,
            meters_per_deg_lat,
            meters_per_deg_lon: meters_per_deg_lat * origin.lat.to_radians().cos(),
        }
    }

    /// Meters east and north of the origin.
    pub fn to_local(&self, p: GeoPoint) -> (f64, f64) {
        (
            (p.lon - self.origin.lon) * self.meters_per_deg_lon,
            (p.lat - self.origin.lat) * self.meters_per_deg_lat,
        )
    }

    pub fn to_geo(&self, east: f64, north: f64) -> GeoPoint {
        GeoPoint::new(
            self.origin.lat + north / self.meters_per_deg_lat,
            self.origin.lon + east / self.meters_per_deg_lon,
        )
    }
}

/// Project `point` onto the segment `a`-`b` in metric space.
///
/// Returns the clamped segment parameter in [0, 1] and the projected point.
pub fn project_onto_segment(
    plane: &LocalTangentPlane,
    point: GeoPoint,
    a: GeoPoint,
    b: GeoPoint,
) -> (f64, GeoPoint) {
    let (px, py) = plane.to_local(point);
    let (ax, ay) = plane.to_local(a);
    let (bx, by) = plane.to_local(b);
    let dx = bx - ax;
    let dy = by - ay;
    let len_sq = dx * dx + dy * dy;
    if len_sq <= f64::EPSILON {
        return (0.0, a);
    }
    let t = (((px - ax) * dx + (py - ay) * dy) / len_sq).clamp(0.0, 1.0);
    if t == 0.0 {
        return (t, a);
    }
    if t == 1.0 {
        return (t, b);
    }
    (t, plane.to_geo(ax + t * dx, ay + t * dy))
}

/// Degrees of latitude/longitude spanned by `radius_m` meters around `lat`.
pub fn radius_to_degrees(lat: f64, radius_m: f64) -> (f64, f64) {
    let dlat = radius_m / 111_320.0;
    let cos_lat = lat.to_radians().cos().abs().max(1e-6);
    (dlat, dlat / cos_lat)
}
