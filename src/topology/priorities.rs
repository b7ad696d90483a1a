use crate::routing_common::edge_encoder::RoadClass;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Largest priority number that still gets reported.
pub const LOWEST_REPORTED_PRIORITY: i32 = 6;
/// Added to a priority to push it out of the reported range.
pub const SUPPRESS: i32 = 100;

/// Base priority per road class and distance bucket.
///
/// The search radius is split into four buckets of equal width; a dead end
/// matched in bucket `i` gets `buckets[class][i]`. 0 means "never report".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorityTable {
    pub buckets: BTreeMap<RoadClass, [i32; 4]>,
}

impl Default for PriorityTable {
    fn default() -> Self {
        let rows: [(RoadClass, [i32; 4]); 27] = [
            (RoadClass::Motorway, [1, 1, 1, 2]),
            (RoadClass::MotorwayLink, [1, 1, 1, 2]),
            (RoadClass::Trunk, [1, 1, 1, 2]),
            (RoadClass::TrunkLink, [1, 1, 1, 2]),
            (RoadClass::Primary, [1, 1, 1, 2]),
            (RoadClass::PrimaryLink, [1, 1, 1, 2]),
            (RoadClass::Secondary, [1, 1, 1, 2]),
            (RoadClass::SecondaryLink, [1, 1, 1, 2]),
            (RoadClass::Tertiary, [2, 2, 3, 3]),
            (RoadClass::TertiaryLink, [2, 2, 3, 3]),
            (RoadClass::Unclassified, [2, 2, 3, 3]),
            (RoadClass::Residential, [2, 2, 3, 3]),
            (RoadClass::LivingStreet, [2, 3, 3, 4]),
            (RoadClass::Track, [2, 2, 3, 4]),
            (RoadClass::Pedestrian, [3, 4, 4, 5]),
            (RoadClass::Footway, [4, 5, 5, 5]),
            (RoadClass::Cycleway, [4, 5, 5, 5]),
            (RoadClass::Path, [4, 5, 5, 5]),
            (RoadClass::Steps, [5, 5, 5, 5]),
            (RoadClass::Service, [3, 4, 4, 4]),
            (RoadClass::ServiceAlley, [3, 4, 4, 5]),
            (RoadClass::ServiceDriveway, [4, 4, 5, 5]),
            (RoadClass::ServiceParkingAisle, [4, 4, 5, 5]),
            (RoadClass::Road, [3, 3, 4, 4]),
            (RoadClass::Raceway, [2, 2, 2, 3]),
            (RoadClass::Ferry, [2, 3, 3, 3]),
            (RoadClass::Platform, [4, 5, 5, 6]),
        ];
        PriorityTable {
            buckets: rows.into_iter().collect(),
        }
    }
}

impl PriorityTable {
    /// Read per-class overrides from a RON map such as
    /// `{ footway: (5, 5, 6, 6), steps: (0, 0, 0, 0) }`.
    pub fn overrides_from_ron(
        source: &str,
    ) -> Result<BTreeMap<RoadClass, [i32; 4]>, ron::error::SpannedError> {
        ron::from_str(source)
    }

    pub fn load_overrides(&mut self, path: &Path) -> anyhow::Result<()> {
        let source = std::fs::read_to_string(path)?;
        let overrides = Self::overrides_from_ron(&source)?;
        self.buckets.extend(overrides);
        Ok(())
    }

    /// Priority before class specific adjustments. 0 whenever the table entry
    /// is 0, regardless of distance or access.
    pub fn base_priority(
        &self,
        road_class: RoadClass,
        private_access: bool,
        distance: f64,
        max_distance: f64,
    ) -> i32 {
        let row = self.buckets.get(&road_class).copied().unwrap_or([0; 4]);
        let bucket_width = max_distance / 4.0;
        let index = if bucket_width > 0.0 {
            ((distance / bucket_width) as usize).min(3)
        } else {
            3
        };

        let mut priority = row[index];
        if priority <= 0 {
            return 0;
        }
        // near misses are almost certainly mapping errors
        if distance < 1.0 {
            priority = 1.min(priority - 2);
        } else if distance < 2.0 {
            priority = 1.min(priority - 1);
        }
        if private_access {
            priority += 1;
        }
        priority
    }
}

pub fn is_reported(priority: i32) -> bool {
    priority > 0 && priority <= LOWEST_REPORTED_PRIORITY
}
