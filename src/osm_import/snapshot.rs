use crate::osm_import::ReaderHook;
use crate::osm_import::barrier_hook::BarriersHook;
use crate::osm_import::importer::OsmImporter;
use crate::osm_import::no_exit_hook::NoExitHook;
use crate::routing_common::osm_graph::RoadGraphData;
use crate::routing_common::street_graph::{StreetGraph, coords_to_points};
use crate::topology::barriers::BarrierIndex;
use crate::topology::error::ImportError;
use crate::topology::osm_id_store::OsmIdStore;
use std::fs;
use std::path::Path;
use tracing::info;

pub const GRAPH_FILE: &str = "road_graph.pbf";
pub const NODE_INFO_FILE: &str = "node_info.bin";
pub const WAY_IDS_FILE: &str = "way_ids.bin";

/// Everything the analysis needs from an OSM extract.
pub struct RoadNetworkData {
    pub graph: StreetGraph,
    pub node_ids: OsmIdStore,
    pub way_ids: OsmIdStore,
    pub barriers: BarrierIndex,
}

pub fn snapshot_exists(dir: &Path) -> bool {
    [GRAPH_FILE, NODE_INFO_FILE, WAY_IDS_FILE]
        .iter()
        .all(|name| dir.join(name).is_file())
}

pub fn save_snapshot(dir: &Path, data: &RoadNetworkData) -> Result<(), ImportError> {
    let graph_path = dir.join(GRAPH_FILE);
    fs::create_dir_all(dir).map_err(|source| ImportError::Snapshot {
        path: dir.to_path_buf(),
        source,
    })?;
    data.graph
        .to_data(data.barriers.polylines())
        .save(&graph_path)
        .map_err(|source| ImportError::Snapshot {
            path: graph_path.clone(),
            source,
        })?;
    data.node_ids.save(&dir.join(NODE_INFO_FILE))?;
    data.way_ids.save(&dir.join(WAY_IDS_FILE))?;
    info!("Saved road graph snapshot to {}", dir.display());
    Ok(())
}

pub fn load_snapshot(dir: &Path) -> Result<RoadNetworkData, ImportError> {
    let graph_path = dir.join(GRAPH_FILE);
    let mut data = RoadGraphData::load(&graph_path).map_err(|source| ImportError::Snapshot {
        path: graph_path.clone(),
        source,
    })?;
    let barriers = std::mem::take(&mut data.barriers)
        .into_iter()
        .map(|g| coords_to_points(&g.coords))
        .collect();

    let network = RoadNetworkData {
        graph: StreetGraph::from_data(data),
        node_ids: OsmIdStore::load(&dir.join(NODE_INFO_FILE))?,
        way_ids: OsmIdStore::load(&dir.join(WAY_IDS_FILE))?,
        barriers: BarrierIndex::bulk_load(barriers),
    };
    info!(
        "Loaded road graph snapshot from {}: {} edges, {} barriers",
        dir.display(),
        network.graph.edge_count(),
        network.barriers.len()
    );
    Ok(network)
}

/// Read `input` into a road network, reusing the snapshot in `graph_dir`
/// when there is one.
pub fn import_or_load(input: &Path, graph_dir: &Path) -> Result<RoadNetworkData, ImportError> {
    if snapshot_exists(graph_dir) {
        return load_snapshot(graph_dir);
    }

    let mut no_exit = NoExitHook::new();
    let mut barriers = BarriersHook::new();
    let imported = {
        let mut hooks: [&mut dyn ReaderHook; 2] = [&mut no_exit, &mut barriers];
        OsmImporter::new(input).import(&mut hooks)?
    };
    info!(
        "Import found {} no-exit nodes and {} barriers",
        no_exit.no_exit_count(),
        barriers.barrier_count()
    );

    let network = RoadNetworkData {
        graph: imported.graph,
        node_ids: no_exit.into_store(),
        way_ids: imported.way_ids,
        barriers: barriers.prepare_for_query(),
    };
    save_snapshot(graph_dir, &network)?;
    Ok(network)
}
