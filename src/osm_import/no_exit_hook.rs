use crate::osm_import::ReaderHook;
use crate::routing_common::road_network::NodeId;
use crate::topology::error::StoreError;
use crate::topology::osm_id_store::OsmIdStore;
use ahash::AHashSet;
use osmpbfreader::{Node, Tags};

/// Nodes where a dead end is expected: `noexit=yes` and entrances.
pub fn marks_no_exit(tags: &Tags) -> bool {
    if tags.get("noexit").is_some_and(|v| v.as_str() == "yes") {
        return true;
    }
    tags.get("entrance").is_some_and(|v| v.as_str() != "no")
}

/// Fills the node id store and flags dead ends that are mapped on purpose.
pub struct NoExitHook {
    store: OsmIdStore,
    no_exit: AHashSet<i64>,
}

impl Default for NoExitHook {
    fn default() -> Self {
        Self::new()
    }
}

impl NoExitHook {
    pub fn new() -> Self {
        NoExitHook {
            store: OsmIdStore::for_nodes(),
            no_exit: AHashSet::new(),
        }
    }

    pub fn no_exit_count(&self) -> usize {
        self.no_exit.len()
    }

    pub fn into_store(self) -> OsmIdStore {
        self.store
    }
}

impl ReaderHook for NoExitHook {
    fn process_node(&mut self, node: &Node) {
        if marks_no_exit(&node.tags) {
            self.no_exit.insert(node.id.0);
        }
    }

    fn add_tower_node(&mut self, osm_id: i64, internal_id: NodeId) -> Result<(), StoreError> {
        // nodes synthesized by the importer have no OSM counterpart
        if osm_id <= 0 {
            return Ok(());
        }
        self.store
            .add_record(internal_id, osm_id as u64, self.no_exit.contains(&osm_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: i64, tags: &[(&str, &str)]) -> Node {
        let mut node_tags = Tags::new();
        for (k, v) in tags {
            node_tags.insert((*k).into(), (*v).into());
        }
        Node {
            id: osmpbfreader::NodeId(id),
            tags: node_tags,
            decimicro_lat: 500_000_000,
            decimicro_lon: 80_000_000,
        }
    }

    #[test]
    fn test_tags() {
        assert!(marks_no_exit(&node(1, &[("noexit", "yes")]).tags));
        assert!(!marks_no_exit(&node(1, &[("noexit", "no")]).tags));
        assert!(marks_no_exit(&node(1, &[("entrance", "main")]).tags));
        assert!(marks_no_exit(&node(1, &[("entrance", "yes")]).tags));
        assert!(!marks_no_exit(&node(1, &[("entrance", "no")]).tags));
        assert!(!marks_no_exit(&node(1, &[("highway", "turning_circle")]).tags));
    }

    #[test]
    fn test_store_is_filled_with_flags() {
        let mut hook = NoExitHook::new();
        hook.process_node(&node(3426740052, &[("noexit", "yes")]));
        hook.process_node(&node(17, &[]));
        hook.add_tower_node(17, 0).unwrap();
        hook.add_tower_node(3426740052, 1).unwrap();
        hook.add_tower_node(-5, 2).unwrap();
        assert_eq!(hook.no_exit_count(), 1);

        let store = hook.into_store();
        assert_eq!(store.osm_id(0), Some(17));
        assert!(!store.no_exit(0));
        assert_eq!(store.osm_id(1), Some(3426740052));
        assert!(store.no_exit(1));
        assert_eq!(store.osm_id(2), None);
    }
}
