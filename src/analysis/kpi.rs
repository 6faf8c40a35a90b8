// Section KPI extraction from distance-aligned telemetry

use serde::{Deserialize, Serialize};

use crate::config::KpiThresholds;
use crate::model::{SectionBound, TelemetrySample};
use crate::stats;

/// Kinematic KPIs for one section of one lap. Any field can be absent
/// when the underlying channel is missing or the condition never occurs
/// (e.g. a flat-out section has no braking point).
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct SectionKpis {
    /// Minimum speed through the section
    pub apex_speed_kph: Option<f64>,
    pub max_speed_kph: Option<f64>,
    pub avg_speed_kph: Option<f64>,
    /// Distance of the first sample above the brake pressure threshold
    pub braking_point_m: Option<f64>,
    /// Distance of the first sample above the throttle threshold
    pub throttle_on_point_m: Option<f64>,
    /// Percentage of samples above the throttle threshold
    pub time_on_throttle_pct: Option<f64>,
    /// Percentage of samples above the on-brake threshold
    pub time_on_brake_pct: Option<f64>,
    pub max_lateral_g: Option<f64>,
}

/// Signed per-KPI deltas, driver minus composite. A delta exists only
/// where both sides carry the KPI.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct KpiDeltas {
    pub apex_speed_kph: Option<f64>,
    pub max_speed_kph: Option<f64>,
    pub avg_speed_kph: Option<f64>,
    pub braking_point_m: Option<f64>,
    pub throttle_on_point_m: Option<f64>,
    pub time_on_throttle_pct: Option<f64>,
    pub time_on_brake_pct: Option<f64>,
    pub max_lateral_g: Option<f64>,
}

impl KpiDeltas {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Samples of one lap that fall inside a section's distance bounds,
/// ordered by distance.
pub fn section_slice(
    samples: &[TelemetrySample],
    lap_number: u32,
    bound: &SectionBound,
) -> Vec<TelemetrySample> {
    let mut slice: Vec<TelemetrySample> = samples
        .iter()
        .filter(|s| s.lap_number == lap_number && bound.contains(s.lap_dist_m))
        .cloned()
        .collect();
    slice.sort_by(|a, b| a.lap_dist_m.total_cmp(&b.lap_dist_m));
    slice
}

/// Extract the KPI set for one section slice. An empty slice produces an
/// empty KPI set, not an error.
pub fn extract_section_kpis(
    samples: &[TelemetrySample],
    thresholds: &KpiThresholds,
) -> SectionKpis {
    if samples.is_empty() {
        return SectionKpis::default();
    }

    let speeds: Vec<f64> = samples.iter().map(|s| s.speed_kph).collect();
    let sample_count = samples.len() as f64;

    let braking_point_m = samples
        .iter()
        .find(|s| s.brake_pressure > thresholds.brake_pressure)
        .map(|s| s.lap_dist_m);
    let throttle_on_point_m = samples
        .iter()
        .find(|s| s.throttle_pct > thresholds.throttle_application)
        .map(|s| s.lap_dist_m);

    let on_throttle = samples
        .iter()
        .filter(|s| s.throttle_pct > thresholds.throttle_application)
        .count() as f64;
    let on_brake = samples
        .iter()
        .filter(|s| s.brake_pressure > thresholds.time_on_brake)
        .count() as f64;

    SectionKpis {
        apex_speed_kph: stats::min(&speeds),
        max_speed_kph: stats::max(&speeds),
        avg_speed_kph: stats::mean(&speeds),
        braking_point_m,
        throttle_on_point_m,
        time_on_throttle_pct: Some(on_throttle / sample_count * 100.0),
        time_on_brake_pct: Some(on_brake / sample_count * 100.0),
        max_lateral_g: samples
            .iter()
            .map(|s| s.lat_accel_g.abs())
            .reduce(f64::max),
    }
}

/// Per-KPI driver-minus-composite deltas.
pub fn kpi_deltas(driver: &SectionKpis, composite: &SectionKpis) -> KpiDeltas {
    fn delta(driver: Option<f64>, composite: Option<f64>) -> Option<f64> {
        Some(driver? - composite?)
    }

    KpiDeltas {
        apex_speed_kph: delta(driver.apex_speed_kph, composite.apex_speed_kph),
        max_speed_kph: delta(driver.max_speed_kph, composite.max_speed_kph),
        avg_speed_kph: delta(driver.avg_speed_kph, composite.avg_speed_kph),
        braking_point_m: delta(driver.braking_point_m, composite.braking_point_m),
        throttle_on_point_m: delta(driver.throttle_on_point_m, composite.throttle_on_point_m),
        time_on_throttle_pct: delta(driver.time_on_throttle_pct, composite.time_on_throttle_pct),
        time_on_brake_pct: delta(driver.time_on_brake_pct, composite.time_on_brake_pct),
        max_lateral_g: delta(driver.max_lateral_g, composite.max_lateral_g),
    }
}
