use crate::routing_common::road_network::GeoPoint;
use ahash::AHashMap;
use geo::{Coord, Intersects, Line, LineString};
use rstar::primitives::{GeomWithData, Rectangle};
use rstar::{AABB, RTree};
use tracing::info;

/// `barrier=*` values treated as linear obstacles between two ways.
pub const BARRIER_VALUES: [&str; 8] = [
    "fence",
    "wall",
    "embankment",
    "hedge",
    "guard_rail",
    "handrail",
    "ditch",
    "retaining_wall",
];

pub fn is_barrier(value: Option<&str>) -> bool {
    value.is_some_and(|v| BARRIER_VALUES.contains(&v))
}

const DEGREE_FACTOR: f64 = 10_000_000.0;
const NO_LOCATION: u64 = u64::MAX;

/// Location cache for the few OSM nodes that belong to barrier ways.
///
/// Coordinates are stored as 1e-7 degree fixed-point integers, latitude in
/// the low and longitude in the high half of one `u64`.
#[derive(Debug, Default)]
pub struct SparseLocationIndex {
    index: AHashMap<u64, u64>,
}

impl SparseLocationIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_as_interested(&mut self, osm_id: u64) {
        self.index.entry(osm_id).or_insert(NO_LOCATION);
    }

    pub fn is_interested(&self, osm_id: u64) -> bool {
        self.index.contains_key(&osm_id)
    }

    /// Ignored for nodes nobody asked for.
    pub fn set_location(&mut self, osm_id: u64, lat: f64, lon: f64) {
        if let Some(slot) = self.index.get_mut(&osm_id) {
            *slot = pack(lat, lon);
        }
    }

    pub fn location(&self, osm_id: u64) -> Option<GeoPoint> {
        match self.index.get(&osm_id) {
            Some(&packed) if packed != NO_LOCATION => Some(unpack(packed)),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

fn pack(lat: f64, lon: f64) -> u64 {
    let lat = (lat * DEGREE_FACTOR).round() as i32 as u32 as u64;
    let lon = (lon * DEGREE_FACTOR).round() as i32 as u32 as u64;
    (lon << 32) | lat
}

fn unpack(packed: u64) -> GeoPoint {
    let lat = (packed & 0xFFFF_FFFF) as u32 as i32;
    let lon = (packed >> 32) as u32 as i32;
    GeoPoint::new(lat as f64 / DEGREE_FACTOR, lon as f64 / DEGREE_FACTOR)
}

fn to_coord(point: &GeoPoint) -> Coord<f64> {
    Coord {
        x: point.lon,
        y: point.lat,
    }
}

/// Read-only R-tree over barrier polylines.
pub struct BarrierIndex {
    rtree: RTree<GeomWithData<Rectangle<[f64; 2]>, usize>>,
    lines: Vec<LineString<f64>>,
    polylines: Vec<Vec<GeoPoint>>,
}

impl BarrierIndex {
    pub fn empty() -> Self {
        Self::bulk_load(Vec::new())
    }

    pub fn bulk_load(polylines: Vec<Vec<GeoPoint>>) -> Self {
        let polylines: Vec<Vec<GeoPoint>> = polylines
            .into_iter()
            .filter(|line| line.len() >= 2)
            .collect();

        let lines: Vec<LineString<f64>> = polylines
            .iter()
            .map(|line| LineString::new(line.iter().map(to_coord).collect()))
            .collect();

        let items = polylines
            .iter()
            .enumerate()
            .map(|(i, line)| {
                let mut min = [f64::MAX, f64::MAX];
                let mut max = [f64::MIN, f64::MIN];
                for p in line {
                    min[0] = min[0].min(p.lon);
                    min[1] = min[1].min(p.lat);
                    max[0] = max[0].max(p.lon);
                    max[1] = max[1].max(p.lat);
                }
                GeomWithData::new(Rectangle::from_corners(min, max), i)
            })
            .collect();

        info!("Building spatial index of {} barriers", polylines.len());
        BarrierIndex {
            rtree: RTree::bulk_load(items),
            lines,
            polylines,
        }
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Barrier polylines, for the graph snapshot.
    pub fn polylines(&self) -> &[Vec<GeoPoint>] {
        &self.polylines
    }

    /// Does the straight segment `p1`-`p2` cross any barrier?
    pub fn crosses_barrier(&self, p1: GeoPoint, p2: GeoPoint) -> bool {
        let envelope = AABB::from_corners(
            [p1.lon.min(p2.lon), p1.lat.min(p2.lat)],
            [p1.lon.max(p2.lon), p1.lat.max(p2.lat)],
        );
        let query = Line::new(to_coord(&p1), to_coord(&p2));
        self.rtree
            .locate_in_envelope_intersecting(&envelope)
            .any(|item| query.intersects(&self.lines[item.data]))
    }
}
