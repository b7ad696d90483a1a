use crate::osm_import::ReaderHook;
use crate::routing_common::edge_encoder::{EdgeFlags, RoadClass};
use crate::routing_common::geometry_utils::DistanceCalc;
use crate::routing_common::road_network::{GeoPoint, NodeId};
use crate::routing_common::street_graph::{StreetGraph, StreetGraphBuilder};
use crate::topology::error::{ImportError, StoreError};
use crate::topology::osm_id_store::OsmIdStore;
use ahash::AHashMap;
use osmpbfreader::{OsmObj, OsmPbfReader, Way};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A routable way kept from pass 2, reduced to what the graph needs.
#[derive(Debug, Clone)]
pub struct RoadWay {
    pub id: i64,
    pub nodes: Vec<i64>,
    pub flags: EdgeFlags,
}

impl RoadWay {
    /// `None` for ways that are not part of the road network.
    pub fn from_way(way: &Way) -> Option<RoadWay> {
        let flags = EdgeFlags::from_way_tags(|key: &str| way.tags.get(key).map(|v| v.as_str()));
        if flags.road_class() == RoadClass::Undefined || way.nodes.len() < 2 {
            return None;
        }
        Some(RoadWay {
            id: way.id.0,
            nodes: way.nodes.iter().map(|n| n.0).collect(),
            flags,
        })
    }
}

pub struct ImportedGraph {
    pub graph: StreetGraph,
    /// OSM way id per edge.
    pub way_ids: OsmIdStore,
}

/// Two-pass reader for `.osm.pbf` extracts.
pub struct OsmImporter {
    path: PathBuf,
}

impl OsmImporter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        OsmImporter { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> Result<OsmPbfReader<BufReader<File>>, ImportError> {
        let file = File::open(&self.path).map_err(|source| ImportError::Open {
            path: self.path.clone(),
            source,
        })?;
        Ok(OsmPbfReader::new(BufReader::new(file)))
    }

    fn pbf_error(&self, source: osmpbfreader::Error) -> ImportError {
        ImportError::Pbf {
            path: self.path.clone(),
            source,
        }
    }

    pub fn import(&self, hooks: &mut [&mut dyn ReaderHook]) -> Result<ImportedGraph, ImportError> {
        info!("Reading OSM data from {}", self.path.display());

        // Pass 1: which nodes do road ways use, and how often
        let mut node_uses: AHashMap<i64, u8> = AHashMap::new();
        let mut road_ways = 0usize;
        let mut reader = self.open()?;
        for obj in reader.iter() {
            let obj = obj.map_err(|e| self.pbf_error(e))?;
            if let OsmObj::Way(way) = obj {
                for hook in hooks.iter_mut() {
                    hook.pre_process_way(&way);
                }
                if RoadWay::from_way(&way).is_some() {
                    road_ways += 1;
                    for node in &way.nodes {
                        let uses = node_uses.entry(node.0).or_insert(0);
                        *uses = uses.saturating_add(1);
                    }
                }
            }
        }
        info!(
            "Pass 1 complete: {} road ways referencing {} nodes",
            road_ways,
            node_uses.len()
        );

        // Pass 2: node locations, then the ways themselves
        let mut locations: AHashMap<i64, GeoPoint> = AHashMap::with_capacity(node_uses.len());
        let mut ways: Vec<RoadWay> = Vec::with_capacity(road_ways);
        let mut reader = self.open()?;
        for obj in reader.iter() {
            let obj = obj.map_err(|e| self.pbf_error(e))?;
            match obj {
                OsmObj::Node(node) => {
                    for hook in hooks.iter_mut() {
                        hook.process_node(&node);
                    }
                    if node_uses.contains_key(&node.id.0) {
                        locations.insert(node.id.0, GeoPoint::new(node.lat(), node.lon()));
                    }
                }
                OsmObj::Way(way) => {
                    if !hooks.iter_mut().all(|hook| hook.process_way(&way)) {
                        continue;
                    }
                    if let Some(road) = RoadWay::from_way(&way) {
                        ways.push(road);
                    }
                }
                OsmObj::Relation(_) => {}
            }
        }
        info!(
            "Pass 2 complete: {} node locations, {} road ways",
            locations.len(),
            ways.len()
        );

        let imported = assemble_graph(&ways, &node_uses, &locations, hooks)?;
        if imported.graph.edge_count() == 0 {
            return Err(ImportError::NoRoads {
                path: self.path.clone(),
            });
        }
        Ok(imported)
    }
}

fn tower_id(
    osm_id: i64,
    point: GeoPoint,
    builder: &mut StreetGraphBuilder,
    tower_ids: &mut AHashMap<i64, NodeId>,
    hooks: &mut [&mut dyn ReaderHook],
) -> Result<NodeId, StoreError> {
    if let Some(&id) = tower_ids.get(&osm_id) {
        return Ok(id);
    }
    let id = builder.add_node(point);
    tower_ids.insert(osm_id, id);
    for hook in hooks.iter_mut() {
        hook.add_tower_node(osm_id, id)?;
    }
    Ok(id)
}

/// Split road ways at tower nodes into edges.
///
/// Way end points and nodes used more than once are tower nodes; everything
/// in between becomes edge geometry. Nodes without a location are dropped
/// from their way.
pub fn assemble_graph(
    ways: &[RoadWay],
    node_uses: &AHashMap<i64, u8>,
    locations: &AHashMap<i64, GeoPoint>,
    hooks: &mut [&mut dyn ReaderHook],
) -> Result<ImportedGraph, StoreError> {
    let mut builder = StreetGraphBuilder::new();
    let mut way_ids = OsmIdStore::for_ways();
    let mut tower_ids: AHashMap<i64, NodeId> = AHashMap::new();
    let mut incomplete = 0usize;

    for way in ways {
        let points: Vec<(i64, GeoPoint)> = way
            .nodes
            .iter()
            .filter_map(|n| locations.get(n).map(|p| (*n, *p)))
            .collect();
        if points.len() < way.nodes.len() {
            incomplete += 1;
        }
        if points.len() < 2 {
            continue;
        }

        let last = points.len() - 1;
        let (first_osm, first_point) = points[0];
        let mut base = tower_id(first_osm, first_point, &mut builder, &mut tower_ids, hooks)?;
        let mut start = 0;
        for i in 1..=last {
            let (osm_id, point) = points[i];
            let is_tower = i == last || node_uses.get(&osm_id).copied().unwrap_or(0) > 1;
            if !is_tower {
                continue;
            }
            let adj = tower_id(osm_id, point, &mut builder, &mut tower_ids, hooks)?;
            let segment: Vec<GeoPoint> = points[start..=i].iter().map(|(_, p)| *p).collect();
            let length = DistanceCalc::Earth.polyline_length(&segment);
            let pillars = segment[1..segment.len() - 1].to_vec();
            let edge = builder.add_edge(base, adj, pillars, length, way.flags);
            way_ids.add_record(edge, way.id as u64, false)?;
            base = adj;
            start = i;
        }
    }

    if incomplete > 0 {
        debug!("{} road ways reference nodes missing from the extract", incomplete);
    }
    let graph = builder.build();
    info!(
        "Road graph has {} tower nodes and {} edges",
        tower_ids.len(),
        graph.edge_count()
    );
    Ok(ImportedGraph { graph, way_ids })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::osm_import::no_exit_hook::NoExitHook;
    use crate::routing_common::edge_encoder::LevelRange;
    use crate::routing_common::road_network::{EdgeAttributes, FetchMode, RoadNetwork};
    use osmpbfreader::Tags;

    fn way(id: i64, tags: &[(&str, &str)], nodes: &[i64]) -> Way {
        let mut way_tags = Tags::new();
        for (k, v) in tags {
            way_tags.insert((*k).into(), (*v).into());
        }
        Way {
            id: osmpbfreader::WayId(id),
            tags: way_tags,
            nodes: nodes.iter().map(|&n| osmpbfreader::NodeId(n)).collect(),
        }
    }

    fn uses(ways: &[RoadWay]) -> AHashMap<i64, u8> {
        let mut counts = AHashMap::new();
        for way in ways {
            for n in &way.nodes {
                *counts.entry(*n).or_insert(0u8) += 1;
            }
        }
        counts
    }

    #[test]
    fn test_road_way_selection_and_flags() {
        let road = RoadWay::from_way(&way(
            5,
            &[("highway", "service"), ("service", "driveway"), ("access", "private")],
            &[1, 2],
        ))
        .unwrap();
        assert_eq!(road.flags.road_class(), RoadClass::ServiceDriveway);
        assert!(road.flags.is_private());
        assert_eq!(road.flags.level(), LevelRange::GROUND);

        assert!(RoadWay::from_way(&way(6, &[("barrier", "fence")], &[1, 2])).is_none());
        assert!(RoadWay::from_way(&way(7, &[("highway", "residential")], &[1])).is_none());
    }

    #[test]
    fn test_ways_are_split_at_shared_nodes() {
        // way 100: 1 - 2 - 3 - 4, way 200: 3 - 5
        let ways = vec![
            RoadWay::from_way(&way(100, &[("highway", "residential")], &[1, 2, 3, 4])).unwrap(),
            RoadWay::from_way(&way(200, &[("highway", "footway")], &[3, 5])).unwrap(),
        ];
        let mut locations = AHashMap::new();
        for (id, lon) in [(1, 8.0), (2, 8.001), (3, 8.002), (4, 8.003)] {
            locations.insert(id, GeoPoint::new(50.0, lon));
        }
        locations.insert(5, GeoPoint::new(50.001, 8.002));

        let mut no_exit = NoExitHook::new();
        let imported = {
            let mut hooks: [&mut dyn ReaderHook; 1] = [&mut no_exit];
            assemble_graph(&ways, &uses(&ways), &locations, &mut hooks).unwrap()
        };
        let graph = &imported.graph;

        // towers: 1, 3, 4, 5; node 2 is a pillar
        assert_eq!(graph.node_count(), 4);
        assert_eq!(graph.edge_count(), 3);
        assert_eq!(imported.way_ids.osm_id(0), Some(100));
        assert_eq!(imported.way_ids.osm_id(1), Some(100));
        assert_eq!(imported.way_ids.osm_id(2), Some(200));
        assert_eq!(graph.road_class(2), RoadClass::Footway);

        let first = graph.edges_of(0)[0];
        assert_eq!(
            graph.fetch_geometry(&first, FetchMode::PillarsOnly),
            vec![GeoPoint::new(50.0, 8.001)]
        );
        assert!((graph.edge_length(0) - 143.0).abs() < 1.0);

        let node_ids = no_exit.into_store();
        assert_eq!(node_ids.len(), 4);
        assert_eq!(node_ids.osm_id(0), Some(1));
        assert_eq!(node_ids.osm_id(1), Some(3));
        assert_eq!(node_ids.osm_id(2), Some(4));
        assert_eq!(node_ids.osm_id(3), Some(5));
    }

    #[test]
    fn test_missing_locations_are_dropped() {
        let ways =
            vec![RoadWay::from_way(&way(1, &[("highway", "track")], &[1, 2, 3])).unwrap()];
        let mut locations = AHashMap::new();
        locations.insert(1, GeoPoint::new(50.0, 8.0));
        locations.insert(3, GeoPoint::new(50.0, 8.002));

        let imported = assemble_graph(&ways, &uses(&ways), &locations, &mut []).unwrap();
        assert_eq!(imported.graph.edge_count(), 1);
        assert_eq!(imported.graph.edge_nodes(0), (0, 1));
    }
}
