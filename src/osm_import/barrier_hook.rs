use crate::osm_import::ReaderHook;
use crate::routing_common::road_network::GeoPoint;
use crate::topology::barriers::{BarrierIndex, SparseLocationIndex, is_barrier};
use osmpbfreader::{Node, Way};
use tracing::debug;

fn barrier_tag(way: &Way) -> Option<&str> {
    way.tags.get("barrier").map(|v| v.as_str())
}

/// Collects linear barriers while the file is read.
///
/// Pass 1 remembers which nodes belong to barrier ways, pass 2 records their
/// locations and assembles one polyline per barrier way.
#[derive(Default)]
pub struct BarriersHook {
    locations: SparseLocationIndex,
    polylines: Vec<Vec<GeoPoint>>,
    incomplete: usize,
}

impl BarriersHook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn barrier_count(&self) -> usize {
        self.polylines.len()
    }

    /// Drop the location cache and build the query index.
    pub fn prepare_for_query(self) -> BarrierIndex {
        if self.incomplete > 0 {
            debug!(
                "Skipped {} barrier ways with nodes outside the extract",
                self.incomplete
            );
        }
        BarrierIndex::bulk_load(self.polylines)
    }
}

impl ReaderHook for BarriersHook {
    fn pre_process_way(&mut self, way: &Way) {
        if !is_barrier(barrier_tag(way)) {
            return;
        }
        for node in &way.nodes {
            if node.0 > 0 {
                self.locations.set_as_interested(node.0 as u64);
            }
        }
    }

    fn process_node(&mut self, node: &Node) {
        if node.id.0 > 0 {
            self.locations
                .set_location(node.id.0 as u64, node.lat(), node.lon());
        }
    }

    fn process_way(&mut self, way: &Way) -> bool {
        if !is_barrier(barrier_tag(way)) {
            return true;
        }
        let polyline: Option<Vec<GeoPoint>> = way
            .nodes
            .iter()
            .map(|n| {
                if n.0 > 0 {
                    self.locations.location(n.0 as u64)
                } else {
                    None
                }
            })
            .collect();
        match polyline {
            Some(points) if points.len() >= 2 => self.polylines.push(points),
            _ => {
                debug!("Barrier way {} has nodes without location", way.id.0);
                self.incomplete += 1;
            }
        }
        false
    }
}
