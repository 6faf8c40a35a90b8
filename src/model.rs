// Core data model for races, laps, sections, weather and telemetry

use serde::{Deserialize, Serialize};

pub type RaceId = u32;
pub type TrackId = u32;
pub type VehicleId = u32;

/// Race metadata as held by the metadata repository.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Race {
    pub id: RaceId,
    pub track_id: TrackId,
    /// Race number within the event weekend (1 or 2 in the exports)
    pub race_number: u32,
}

/// Track metadata. Section bounds are optional: without them telemetry
/// KPI extraction is unavailable and the analysers degrade to
/// timing-only comparisons.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Track {
    pub id: TrackId,
    /// Human-readable track name (e.g., "Virginia International Raceway")
    pub name: String,
    /// Short name used in data paths and API responses (e.g., "vir")
    pub abbreviation: String,
    /// Distance bounds per named section, in meters from start/finish
    #[serde(default)]
    pub section_bounds: Option<Vec<SectionBound>>,
}

/// Distance range a named section occupies on the circuit. Sections are
/// contiguous and non-overlapping; together they cover the full lap.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SectionBound {
    pub section_name: String,
    pub start_m: f64,
    pub end_m: f64,
}

impl SectionBound {
    pub fn contains(&self, distance_m: f64) -> bool {
        distance_m >= self.start_m && distance_m < self.end_m
    }
}

/// Time spent in one named section of one lap.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SectionTime {
    pub section_name: String,
    /// 1-based position of the section around the circuit
    pub section_order: u32,
    pub time_ms: i64,
}

/// One traversal of the circuit by one vehicle. Immutable once ingested.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Lap {
    pub race_id: RaceId,
    pub vehicle_id: VehicleId,
    /// 1-based, unique per vehicle within a race
    pub lap_number: u32,
    pub lap_time_ms: Option<i64>,
    pub is_valid: bool,
    /// Wall-clock start of the lap, when the export carries one; used
    /// for weather alignment
    #[serde(default)]
    pub lap_start_time_ms: Option<i64>,
    pub sections: Vec<SectionTime>,
}

impl Lap {
    /// Section time lookup by name.
    pub fn section_time_ms(&self, section_name: &str) -> Option<i64> {
        self.sections
            .iter()
            .find(|s| s.section_name == section_name)
            .map(|s| s.time_ms)
    }
}

/// One weather station sample. Every field is optional: the station
/// exports vary by track and some channels drop out mid-session.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct WeatherSample {
    pub timestamp_ms: Option<i64>,
    pub air_temp_c: Option<f64>,
    pub track_temp_c: Option<f64>,
    pub humidity_pct: Option<f64>,
    pub wind_speed_kph: Option<f64>,
    pub wind_direction_deg: Option<f64>,
    /// Non-zero when the station reported rain during the sample window
    pub rain: Option<i64>,
}

/// One distance-aligned processed telemetry row.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct TelemetrySample {
    pub lap_number: u32,
    #[serde(default)]
    pub vehicle_id: Option<VehicleId>,
    /// Meters traveled from start/finish this lap
    pub lap_dist_m: f64,
    pub speed_kph: f64,
    /// Front brake pressure, 0.0 = released to 1.0 = max
    pub brake_pressure: f64,
    /// Throttle position, 0.0 = off to 1.0 = full
    pub throttle_pct: f64,
    /// Lateral acceleration in g
    pub lat_accel_g: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_section_time_lookup() {
        let lap = Lap {
            race_id: 1,
            vehicle_id: 7,
            lap_number: 3,
            lap_time_ms: Some(91_000),
            is_valid: true,
            lap_start_time_ms: None,
            sections: vec![
                SectionTime {
                    section_name: "Section 1".to_string(),
                    section_order: 1,
                    time_ms: 45_000,
                },
                SectionTime {
                    section_name: "Section 2".to_string(),
                    section_order: 2,
                    time_ms: 46_000,
                },
            ],
        };
        assert_eq!(lap.section_time_ms("Section 2"), Some(46_000));
        assert_eq!(lap.section_time_ms("Section 9"), None);
    }

    #[test]
    fn test_section_bound_contains() {
        let bound = SectionBound {
            section_name: "Section 1".to_string(),
            start_m: 0.0,
            end_m: 1200.0,
        };
        assert!(bound.contains(0.0));
        assert!(bound.contains(1199.9));
        assert!(!bound.contains(1200.0));
    }
}
