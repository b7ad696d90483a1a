// Streaming GeoJSON output.
//
// Result files can get large on country extracts, so features are serialized
// one at a time into `<name>.tmp` and the file only gets its final name once
// the collection was closed cleanly. A writer dropped without `finish` removes
// its temporary file.

use crate::routing_common::road_network::GeoPoint;
use crate::topology::findings::{DuplicatedEdge, Finding, MissingConnection};
use crate::topology::pipeline::FindingSink;
use geojson::{Feature, Geometry, JsonObject, Value};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub struct GeoJsonWriter {
    path: PathBuf,
    tmp_path: PathBuf,
    out: Option<BufWriter<File>>,
    written: usize,
}

impl GeoJsonWriter {
    pub fn create(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
        tmp_name.push(".tmp");
        let tmp_path = path.with_file_name(tmp_name);

        let mut out = BufWriter::new(File::create(&tmp_path)?);
        out.write_all(b"{\"type\":\"FeatureCollection\",\"features\":[\n")?;
        Ok(GeoJsonWriter {
            path,
            tmp_path,
            out: Some(out),
            written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn features_written(&self) -> usize {
        self.written
    }

    pub fn write_feature(&mut self, feature: &Feature) -> io::Result<()> {
        let out = self
            .out
            .as_mut()
            .ok_or_else(|| io::Error::other("GeoJSON writer already finished"))?;
        if self.written > 0 {
            out.write_all(b",\n")?;
        }
        serde_json::to_writer(&mut *out, feature)?;
        self.written += 1;
        Ok(())
    }

    /// Close the collection and move the file to its final name.
    pub fn finish(mut self) -> io::Result<PathBuf> {
        let Some(mut out) = self.out.take() else {
            return Ok(self.path.clone());
        };
        out.write_all(b"\n]}\n")?;
        out.into_inner().map_err(|e| e.into_error())?.sync_all()?;
        fs::rename(&self.tmp_path, &self.path)?;
        debug!("Wrote {} features to {}", self.written, self.path.display());
        Ok(self.path.clone())
    }
}

impl Drop for GeoJsonWriter {
    fn drop(&mut self) {
        if let Some(out) = self.out.take() {
            drop(out);
            if let Err(e) = fs::remove_file(&self.tmp_path) {
                warn!(
                    "Could not remove unfinished output {}: {}",
                    self.tmp_path.display(),
                    e
                );
            }
        }
    }
}

impl FindingSink for GeoJsonWriter {
    fn write_findings(&mut self, findings: &[Finding]) -> io::Result<()> {
        for finding in findings {
            match finding {
                Finding::MissingConnection(m) => {
                    for feature in missing_connection_features(m) {
                        self.write_feature(&feature)?;
                    }
                }
                Finding::DuplicatedEdge(d) => self.write_feature(&duplicated_edge_feature(d))?,
            }
        }
        Ok(())
    }
}

fn point(p: GeoPoint) -> Geometry {
    Geometry::new(Value::Point(vec![p.lon, p.lat]))
}

fn line_string(points: &[GeoPoint]) -> Geometry {
    Geometry::new(Value::LineString(
        points.iter().map(|p| vec![p.lon, p.lat]).collect(),
    ))
}

fn feature(geometry: Geometry, properties: JsonObject) -> Feature {
    Feature {
        bbox: None,
        geometry: Some(geometry),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

/// The open end (typed by how the match was made) and the snap point.
pub fn missing_connection_features(finding: &MissingConnection) -> [Feature; 2] {
    let mut properties = JsonObject::new();
    properties.insert("distance".to_string(), finding.distance.into());
    properties.insert("priority".to_string(), finding.priority.into());
    properties.insert(
        "road_class".to_string(),
        finding.road_class.as_str().into(),
    );
    properties.insert("private".to_string(), finding.private_access.into());
    properties.insert("osm_id".to_string(), finding.osm_id.into());
    properties.insert("node_id".to_string(), finding.node_id.into());

    let mut open_end = properties.clone();
    open_end.insert(
        "type".to_string(),
        finding.match_position.as_str().into(),
    );
    let mut snap = properties;
    snap.insert("type".to_string(), "snap point".into());

    [
        feature(point(finding.open_end), open_end),
        feature(point(finding.snap_point), snap),
    ]
}

pub fn duplicated_edge_feature(finding: &DuplicatedEdge) -> Feature {
    let mut properties = JsonObject::new();
    properties.insert("type".to_string(), "duplicate".into());
    properties.insert("way_id_1".to_string(), finding.way_id_1.into());
    properties.insert("way_id_2".to_string(), finding.way_id_2.into());
    properties.insert("rank".to_string(), finding.rank.into());
    feature(line_string(&finding.geometry), properties)
}

/// An edge dropped because its component was too small.
pub fn island_feature(geometry: &[GeoPoint], way_id: Option<u64>) -> Feature {
    let mut properties = JsonObject::new();
    properties.insert("type".to_string(), "island".into());
    properties.insert("way_id".to_string(), way_id.into());
    feature(line_string(geometry), properties)
}
