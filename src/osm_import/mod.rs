// Turning an OSM extract into the road graph the analysis runs on.

pub mod barrier_hook;
pub mod importer;
pub mod no_exit_hook;
pub mod snapshot;

use crate::routing_common::road_network::NodeId;
use crate::topology::error::StoreError;
use osmpbfreader::{Node, Way};

/// Callbacks into the two read passes of [`importer::OsmImporter`].
///
/// Hooks collect side data the graph itself does not carry. All methods
/// default to doing nothing.
pub trait ReaderHook {
    /// Pass 1, every way in the file.
    fn pre_process_way(&mut self, _way: &Way) {}

    /// Pass 2, every node in the file.
    fn process_node(&mut self, _node: &Node) {}

    /// Pass 2, every way in the file. Returning `false` consumes the way:
    /// it is not considered for the road graph.
    fn process_way(&mut self, _way: &Way) -> bool {
        true
    }

    /// Called once per tower node, in ascending internal id order.
    fn add_tower_node(&mut self, _osm_id: i64, _internal_id: NodeId) -> Result<(), StoreError> {
        Ok(())
    }
}
