// Binary snapshot of the imported road graph.
//
// Written once after import into the graph directory and loaded on later runs
// instead of re-reading the PBF. Protocol Buffers (via `prost`) keep the file
// compact and forward compatible.
//
// LAYOUT RECAP:
//  - nodes: tower nodes in internal id order (0..N).
//  - edges: start/end node, length, packed `EdgeFlags`, geometry reference.
//  - geometries: pillar coordinates only; endpoints come from the nodes.
//  - barriers: polylines of linear barriers for the barrier index.

use prost::Message;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Root container of a road graph snapshot.
#[derive(Clone, PartialEq, Message)]
pub struct RoadGraphData {
    /// Tower nodes sorted by internal id.
    #[prost(message, repeated, tag = "1")]
    pub nodes: Vec<Node>,

    #[prost(message, repeated, tag = "2")]
    pub edges: Vec<Edge>,

    /// Pillar geometry, referenced by `Edge::geometry_id`.
    #[prost(message, repeated, tag = "3")]
    pub geometries: Vec<Geometry>,

    /// Linear barriers (fences, walls, ...).
    #[prost(message, repeated, tag = "4")]
    pub barriers: Vec<Geometry>,
}

/// A tower node (junction or end of a way).
#[derive(Clone, PartialEq, Message)]
pub struct Node {
    /// WGS84 degrees.
    #[prost(double, tag = "1")]
    pub lat: f64,

    /// WGS84 degrees.
    #[prost(double, tag = "2")]
    pub lon: f64,

    /// Node was removed together with its subnetwork.
    #[prost(bool, tag = "3")]
    pub removed: bool,
}

#[derive(Clone, PartialEq, Message)]
pub struct Edge {
    #[prost(uint32, tag = "1")]
    pub base_node: u32,

    #[prost(uint32, tag = "2")]
    pub adj_node: u32,

    /// Length in meters.
    #[prost(double, tag = "3")]
    pub length_m: f64,

    /// See `edge_encoder::edge_flags`.
    #[prost(uint32, tag = "4")]
    pub flags: u32,

    /// Index into `geometries`.
    #[prost(uint32, tag = "5")]
    pub geometry_id: u32,
}

#[derive(Clone, PartialEq, Message)]
pub struct Geometry {
    /// Flattened lat/lon pairs.
    #[prost(double, repeated, tag = "1")]
    pub coords: Vec<f64>,
}

impl RoadGraphData {
    /// Write the snapshot next to `path` first and move it into place, so an
    /// interrupted write never leaves a truncated graph behind.
    pub fn save(&self, path: &Path) -> io::Result<()> {
        let tmp_path = path.with_extension("pbf.tmp");
        let mut writer = BufWriter::new(File::create(&tmp_path)?);
        writer.write_all(&self.encode_to_vec())?;
        writer.into_inner().map_err(|e| e.into_error())?.sync_all()?;
        fs::rename(&tmp_path, path)
    }

    pub fn load(path: &Path) -> io::Result<RoadGraphData> {
        let bytes = fs::read(path)?;
        RoadGraphData::decode(bytes.as_slice()).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("{} is not a road graph snapshot: {}", path.display(), e),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_road_graph_io() {
        let graph = RoadGraphData {
            nodes: vec![
                Node {
                    lat: 49.0,
                    lon: 8.4,
                    removed: false,
                },
                Node {
                    lat: 49.001,
                    lon: 8.401,
                    removed: true,
                },
            ],
            edges: vec![Edge {
                base_node: 0,
                adj_node: 1,
                length_m: 133.5,
                flags: 13,
                geometry_id: 0,
            }],
            geometries: vec![Geometry {
                coords: vec![49.0005, 8.4005],
            }],
            barriers: vec![Geometry {
                coords: vec![49.0, 8.3, 49.1, 8.3],
            }],
        };

        let path = std::env::temp_dir().join("thistle_test_road_graph.pbf");
        graph.save(&path).unwrap();
        assert!(!path.with_extension("pbf.tmp").exists());

        let loaded = RoadGraphData::load(&path).unwrap();

        assert_eq!(loaded, graph);
        assert!(loaded.nodes[1].removed);

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_garbage_is_rejected() {
        let path = std::env::temp_dir().join("thistle_test_not_a_graph.pbf");
        std::fs::write(&path, [0xff, 0xff, 0xff]).unwrap();
        let err = RoadGraphData::load(&path).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        std::fs::remove_file(&path).unwrap();
    }
}
