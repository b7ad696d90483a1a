use crate::routing_common::road_network::{EdgeId, NodeId};
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("OSM id {osm_id} of node {internal_id} exceeds the 56 bit range of the id store")]
    IdOutOfRange { internal_id: u32, osm_id: u64 },
    #[error("Records must be added in non-decreasing order: got {internal_id} after {last}")]
    OutOfOrder { internal_id: u32, last: u32 },
    #[error("Id store file '{path}' is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },
    #[error("I/O error accessing id store '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error(
        "Snapped point {lat},{lon} does not lie on any segment of edge {edge} (match claimed by the spatial index)"
    )]
    PillarNotFound { edge: EdgeId, lat: f64, lon: f64 },
    #[error("Edge {edge} has fewer than two geometry points")]
    DegenerateEdge { edge: EdgeId },
    #[error("Failed to check node {node} (OSM id {osm_id:?}): {source}")]
    Node {
        node: NodeId,
        osm_id: Option<u64>,
        #[source]
        source: Box<DetectorError>,
    },
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Job for nodes {start}..{end} failed: {source}")]
    JobFailed {
        start: NodeId,
        end: NodeId,
        #[source]
        source: DetectorError,
    },
    #[error("Worker panicked while processing nodes {start}..{end}: {message}")]
    WorkerPanicked {
        start: NodeId,
        end: NodeId,
        message: String,
    },
    #[error("Failed to write findings: {0}")]
    Sink(#[source] io::Error),
}

#[derive(Error, Debug)]
pub enum SubnetworkError {
    #[error(
        "Removing small subnetworks would drop {removed} of {total} edges; the input is probably broken"
    )]
    TooManyRemoved { removed: usize, total: usize },
    #[error("Failed to write removed subnetworks: {0}")]
    Sink(#[source] io::Error),
}

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Cannot open OSM file '{path}': {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to read OSM file '{path}': {source}")]
    Pbf {
        path: PathBuf,
        #[source]
        source: osmpbfreader::Error,
    },
    #[error("No routable ways found in '{path}'")]
    NoRoads { path: PathBuf },
    #[error("Failed to read or write graph snapshot '{path}': {source}")]
    Snapshot {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}
