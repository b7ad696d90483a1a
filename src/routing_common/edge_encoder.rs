// Edge attribute encoding for the all-roads profile.
//
// Every edge carries one packed `u32` of flags (see `edge_flags`), written once
// during import and decoded on the hot path of the detector.

use serde::{Deserialize, Serialize};
use std::fmt;

pub mod edge_flags {
    /// Bits 0-4: road class discriminant.
    pub const ROAD_CLASS_MASK: u32 = 0b1_1111;
    pub const ROAD_CLASS_SHIFT: u32 = 0;

    /// Bit 5: access=private or access=no.
    pub const EDGE_FLAG_PRIVATE: u32 = 1 << 5;

    /// Bits 6-9: encoded minimum level (see `LevelRange`).
    pub const LEVEL_MASK: u32 = 0b1111 << 6;
    pub const LEVEL_SHIFT: u32 = 6;

    /// Bit 10: level span (max level - min level), 0 or 1.
    pub const EDGE_FLAG_LEVEL_DIFF: u32 = 1 << 10;

    /// Bit 11: the way is an area (area=yes).
    pub const EDGE_FLAG_AREA: u32 = 1 << 11;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum RoadClass {
    Undefined = 0,
    Road,
    Motorway,
    MotorwayLink,
    Trunk,
    TrunkLink,
    Primary,
    PrimaryLink,
    Secondary,
    SecondaryLink,
    Tertiary,
    TertiaryLink,
    Unclassified,
    Residential,
    LivingStreet,
    Pedestrian,
    Service,
    ServiceDriveway,
    ServiceAlley,
    ServiceParkingAisle,
    Track,
    Footway,
    Cycleway,
    Path,
    Raceway,
    Steps,
    Platform,
    Ferry,
}

impl RoadClass {
    pub const ALL: [RoadClass; 28] = [
        RoadClass::Undefined,
        RoadClass::Road,
        RoadClass::Motorway,
        RoadClass::MotorwayLink,
        RoadClass::Trunk,
        RoadClass::TrunkLink,
        RoadClass::Primary,
        RoadClass::PrimaryLink,
        RoadClass::Secondary,
        RoadClass::SecondaryLink,
        RoadClass::Tertiary,
        RoadClass::TertiaryLink,
        RoadClass::Unclassified,
        RoadClass::Residential,
        RoadClass::LivingStreet,
        RoadClass::Pedestrian,
        RoadClass::Service,
        RoadClass::ServiceDriveway,
        RoadClass::ServiceAlley,
        RoadClass::ServiceParkingAisle,
        RoadClass::Track,
        RoadClass::Footway,
        RoadClass::Cycleway,
        RoadClass::Path,
        RoadClass::Raceway,
        RoadClass::Steps,
        RoadClass::Platform,
        RoadClass::Ferry,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RoadClass::Undefined => "undefined",
            RoadClass::Road => "road",
            RoadClass::Motorway => "motorway",
            RoadClass::MotorwayLink => "motorway_link",
            RoadClass::Trunk => "trunk",
            RoadClass::TrunkLink => "trunk_link",
            RoadClass::Primary => "primary",
            RoadClass::PrimaryLink => "primary_link",
            RoadClass::Secondary => "secondary",
            RoadClass::SecondaryLink => "secondary_link",
            RoadClass::Tertiary => "tertiary",
            RoadClass::TertiaryLink => "tertiary_link",
            RoadClass::Unclassified => "unclassified",
            RoadClass::Residential => "residential",
            RoadClass::LivingStreet => "living_street",
            RoadClass::Pedestrian => "pedestrian",
            RoadClass::Service => "service",
            RoadClass::ServiceDriveway => "service_driveway",
            RoadClass::ServiceAlley => "service_alley",
            RoadClass::ServiceParkingAisle => "service_parking_aisle",
            RoadClass::Track => "track",
            RoadClass::Footway => "footway",
            RoadClass::Cycleway => "cycleway",
            RoadClass::Path => "path",
            RoadClass::Raceway => "raceway",
            RoadClass::Steps => "steps",
            RoadClass::Platform => "platform",
            RoadClass::Ferry => "ferry",
        }
    }

    fn from_discriminant(value: u32) -> RoadClass {
        RoadClass::ALL
            .get(value as usize)
            .copied()
            .unwrap_or(RoadClass::Undefined)
    }

    /// Classify a way from its tags. `Undefined` means the way is not part of
    /// the road network.
    pub fn from_tags(
        highway: Option<&str>,
        service: Option<&str>,
        public_transport: Option<&str>,
        railway: Option<&str>,
        route: Option<&str>,
    ) -> RoadClass {
        if let Some(highway) = highway {
            return match highway {
                "road" => RoadClass::Road,
                "motorway" => RoadClass::Motorway,
                "motorway_link" => RoadClass::MotorwayLink,
                "trunk" => RoadClass::Trunk,
                "trunk_link" => RoadClass::TrunkLink,
                "primary" => RoadClass::Primary,
                "primary_link" => RoadClass::PrimaryLink,
                "secondary" => RoadClass::Secondary,
                "secondary_link" => RoadClass::SecondaryLink,
                "tertiary" => RoadClass::Tertiary,
                "tertiary_link" => RoadClass::TertiaryLink,
                "unclassified" => RoadClass::Unclassified,
                "residential" => RoadClass::Residential,
                "living_street" => RoadClass::LivingStreet,
                "pedestrian" => RoadClass::Pedestrian,
                "service" => match service {
                    Some("driveway") => RoadClass::ServiceDriveway,
                    Some("alley") => RoadClass::ServiceAlley,
                    Some("parking_aisle") => RoadClass::ServiceParkingAisle,
                    _ => RoadClass::Service,
                },
                "track" => RoadClass::Track,
                "footway" => RoadClass::Footway,
                "cycleway" => RoadClass::Cycleway,
                "path" => RoadClass::Path,
                "raceway" => RoadClass::Raceway,
                "steps" => RoadClass::Steps,
                "platform" => RoadClass::Platform,
                _ => RoadClass::Undefined,
            };
        }
        if railway == Some("platform") || public_transport == Some("platform") {
            return RoadClass::Platform;
        }
        if route == Some("ferry") {
            return RoadClass::Ferry;
        }
        RoadClass::Undefined
    }

    pub fn is_driveway_like(&self) -> bool {
        matches!(
            self,
            RoadClass::ServiceDriveway | RoadClass::ServiceParkingAisle
        )
    }

    pub fn is_pedestrian_path(&self) -> bool {
        matches!(self, RoadClass::Footway | RoadClass::Path | RoadClass::Steps)
    }
}

impl fmt::Display for RoadClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Vertical level range of an edge, decoded from `level=*`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelRange {
    pub min: i32,
    pub diff: i32,
    pub valid: bool,
}

impl LevelRange {
    const LEVEL_BITS: u32 = 4;
    pub const MIN_LEVEL: i32 = -7;
    const MAX_DIFF: i32 = 1;
    // the uppermost code is reserved for "invalid"
    pub const MAX_LEVEL: i32 = (1 << Self::LEVEL_BITS) - 2 + Self::MIN_LEVEL;
    const INVALID_CODE: u32 = (1 << Self::LEVEL_BITS) - 1;

    pub const GROUND: LevelRange = LevelRange {
        min: 0,
        diff: 0,
        valid: true,
    };

    pub const INVALID: LevelRange = LevelRange {
        min: 0,
        diff: 0,
        valid: false,
    };

    pub fn max(&self) -> i32 {
        self.min + self.diff
    }

    /// True if both ranges share at least one level.
    pub fn overlaps(&self, other: &LevelRange) -> bool {
        !(other.min > self.max() || other.max() < self.min)
    }

    /// Parse a `level=*` value. Missing or empty values mean ground level.
    /// Unparseable values, spans larger than one level and values outside
    /// the encodable range yield `LevelRange::INVALID`.
    pub fn parse(value: Option<&str>) -> LevelRange {
        let value = match value {
            Some(v) if !v.is_empty() => v,
            _ => return LevelRange::GROUND,
        };
        let mut min_value = i32::MAX;
        let mut max_value = i32::MIN;
        for part in value.split(';') {
            // decimals are accepted but truncated
            let v = match part.trim().parse::<f64>() {
                Ok(v) => v as i32,
                Err(_) => return LevelRange::INVALID,
            };
            min_value = min_value.min(v);
            max_value = max_value.max(v);
        }
        if max_value > min_value + Self::MAX_DIFF
            || max_value > Self::MAX_LEVEL
            || min_value < Self::MIN_LEVEL
        {
            return LevelRange::INVALID;
        }
        LevelRange {
            min: min_value,
            diff: max_value - min_value,
            valid: true,
        }
    }

    fn encode(&self) -> u32 {
        if !self.valid {
            return Self::INVALID_CODE << edge_flags::LEVEL_SHIFT;
        }
        let code = (self.min.clamp(Self::MIN_LEVEL, Self::MAX_LEVEL) - Self::MIN_LEVEL) as u32;
        let mut bits = code << edge_flags::LEVEL_SHIFT;
        if self.diff > 0 {
            bits |= edge_flags::EDGE_FLAG_LEVEL_DIFF;
        }
        bits
    }

    fn decode(flags: u32) -> LevelRange {
        let code = (flags & edge_flags::LEVEL_MASK) >> edge_flags::LEVEL_SHIFT;
        if code == Self::INVALID_CODE {
            return LevelRange::INVALID;
        }
        LevelRange {
            min: code as i32 + Self::MIN_LEVEL,
            diff: i32::from(flags & edge_flags::EDGE_FLAG_LEVEL_DIFF != 0),
            valid: true,
        }
    }
}

/// Packed per-edge attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct EdgeFlags(pub u32);

impl EdgeFlags {
    pub fn new(road_class: RoadClass, private: bool, level: LevelRange, area: bool) -> Self {
        let mut bits = (road_class as u32) << edge_flags::ROAD_CLASS_SHIFT;
        if private {
            bits |= edge_flags::EDGE_FLAG_PRIVATE;
        }
        bits |= level.encode();
        if area {
            bits |= edge_flags::EDGE_FLAG_AREA;
        }
        EdgeFlags(bits)
    }

    /// Encode the attributes of an OSM way from its tags.
    pub fn from_way_tags<'a>(tag: impl Fn(&str) -> Option<&'a str>) -> Self {
        let road_class = RoadClass::from_tags(
            tag("highway"),
            tag("service"),
            tag("public_transport"),
            tag("railway"),
            tag("route"),
        );
        let private = matches!(tag("access"), Some("private") | Some("no"));
        let area = tag("area") == Some("yes");
        EdgeFlags::new(road_class, private, LevelRange::parse(tag("level")), area)
    }

    pub fn road_class(&self) -> RoadClass {
        RoadClass::from_discriminant(
            (self.0 & edge_flags::ROAD_CLASS_MASK) >> edge_flags::ROAD_CLASS_SHIFT,
        )
    }

    pub fn is_private(&self) -> bool {
        self.0 & edge_flags::EDGE_FLAG_PRIVATE != 0
    }

    pub fn level(&self) -> LevelRange {
        LevelRange::decode(self.0)
    }

    pub fn is_area(&self) -> bool {
        self.0 & edge_flags::EDGE_FLAG_AREA != 0
    }
}
