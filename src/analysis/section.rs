// Section performance analysis against the best-case composite

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::analysis::kpi::{
    extract_section_kpis, kpi_deltas, section_slice, KpiDeltas, SectionKpis,
};
use crate::composite::BestCaseComposite;
use crate::config::AnalysisConfig;
use crate::errors::DeltabestError;
use crate::model::{Lap, RaceId, TelemetrySample, Track, VehicleId};
use crate::sources::{DocumentLapSource, LapSourceChain, TableLapSource};
use crate::store::{DerivedStore, FileStore, MetadataRepository, TelemetrySource};
use crate::tables::schema::detect_section_schema;
use crate::tables::{RawTable, TableCache, TableKey, TableReader};
use crate::timing::ms_to_seconds;
use crate::tracks::normalize_to_folder_name;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecommendationKind {
    SectionPerformance,
    IntermediateTiming,
}

/// Comparison of one driver's one lap's one section against the
/// applicable composite. Keyed by (race, lap, vehicle, section);
/// recomputation overwrites.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SectionRecommendation {
    pub kind: RecommendationKind,
    pub race_id: RaceId,
    pub lap_number: u32,
    pub vehicle_id: VehicleId,
    pub section_name: String,
    pub driver_time_ms: i64,
    pub best_time_ms: Option<i64>,
    /// Driver time minus composite best time; positive means slower
    pub time_loss_ms: i64,
    pub time_loss_s: f64,
    pub driver_kpis: Option<SectionKpis>,
    pub composite_kpis: Option<SectionKpis>,
    pub deltas: Option<KpiDeltas>,
    pub impact_score: f64,
    /// Short statements of what triggered the impact score
    pub issues: Vec<String>,
    pub recommendations: Vec<String>,
}

/// Analyses each (vehicle, lap, section) of a race against the active
/// composite, in telemetry mode when distance-aligned telemetry and
/// section bounds are available, timing-only mode otherwise.
pub struct SectionAnalyser<'a, R: TableReader> {
    race_id: RaceId,
    metadata: &'a dyn MetadataRepository,
    tables: &'a mut TableCache<R>,
    telemetry: Option<&'a dyn TelemetrySource>,
    store: &'a FileStore,
    config: &'a AnalysisConfig,
}

impl<'a, R: TableReader> SectionAnalyser<'a, R> {
    pub fn new(
        race_id: RaceId,
        metadata: &'a dyn MetadataRepository,
        tables: &'a mut TableCache<R>,
        telemetry: Option<&'a dyn TelemetrySource>,
        store: &'a FileStore,
        config: &'a AnalysisConfig,
    ) -> Self {
        Self {
            race_id,
            metadata,
            tables,
            telemetry,
            store,
            config,
        }
    }

    /// Run the analysis for the race. Returns an empty list when no lap
    /// data or no composite exists for the scope; errors only on unknown
    /// race/track ids or store failures.
    pub fn run(&mut self) -> Result<Vec<SectionRecommendation>, DeltabestError> {
        info!("Starting section performance analysis for race {}", self.race_id);

        let race = self
            .metadata
            .get_race(self.race_id)?
            .ok_or(DeltabestError::RaceNotFound {
                race_id: self.race_id,
            })?;
        let track = self
            .metadata
            .get_track(race.track_id)?
            .ok_or(DeltabestError::TrackNotFound {
                track_id: race.track_id,
            })?;

        // Race-scoped composites take precedence; track-wide is the
        // usual case.
        let mut composites = self.store.active_composites(track.id, Some(self.race_id))?;
        if composites.is_empty() {
            composites = self.store.active_composites(track.id, None)?;
        }
        if composites.is_empty() {
            warn!(
                "No active composite for track {}; comparison unavailable",
                track.id
            );
            return Ok(Vec::new());
        }

        let laps = {
            let mut chain = LapSourceChain::new(vec![
                Box::new(TableLapSource::new(self.metadata, self.tables)),
                Box::new(DocumentLapSource::new(self.store)),
            ]);
            chain.load(self.race_id)?
        };
        let Some(laps) = laps else {
            warn!("No lap data available for race {}", self.race_id);
            return Ok(Vec::new());
        };

        let telemetry_samples = match self.telemetry {
            Some(source) => source.processed_telemetry(self.race_id).unwrap_or_else(|e| {
                warn!("Could not load telemetry for race {}: {}", self.race_id, e);
                None
            }),
            None => None,
        };
        let telemetry_mode = telemetry_samples.is_some() && track.section_bounds.is_some();
        info!(
            "Analyzing {} laps in {} mode",
            laps.len(),
            if telemetry_mode { "telemetry" } else { "timing-only" }
        );

        let mut results = Vec::new();
        for lap in &laps {
            if !lap.is_valid {
                continue;
            }
            for section in &lap.sections {
                let Some(composite) = composites.get(&section.section_name) else {
                    debug!(
                        "No composite for {}; skipping comparison",
                        section.section_name
                    );
                    continue;
                };
                if section.time_ms <= 0 {
                    continue;
                }

                let recommendation = if telemetry_mode {
                    self.analyze_with_telemetry(
                        lap,
                        &section.section_name,
                        section.time_ms,
                        composite,
                        &track,
                        telemetry_samples.as_deref().unwrap_or_default(),
                    )
                } else {
                    Some(self.analyze_timing_only(
                        lap,
                        &section.section_name,
                        section.time_ms,
                        composite,
                    ))
                };
                results.extend(recommendation);
            }
        }

        if telemetry_mode {
            results.extend(self.analyze_intermediates(&track, race.race_number));
        }

        info!("Generated {} section recommendations", results.len());
        Ok(results)
    }

    /// Telemetry mode: KPI deltas against the composite profile plus the
    /// impact-score prioritisation. Sections within the minimum time
    /// delta are left unreported.
    fn analyze_with_telemetry(
        &self,
        lap: &Lap,
        section_name: &str,
        driver_time_ms: i64,
        composite: &BestCaseComposite,
        track: &Track,
        samples: &[TelemetrySample],
    ) -> Option<SectionRecommendation> {
        let time_loss_ms = driver_time_ms - composite.best_time_ms;
        if time_loss_ms.abs() <= self.config.recommendation_thresholds.min_time_delta_for_general_rec_ms
        {
            return None;
        }

        let bound = track
            .section_bounds
            .as_ref()?
            .iter()
            .find(|b| b.section_name == section_name);

        let (driver_kpis, deltas) = match bound {
            Some(bound) => {
                let slice = section_slice(samples, lap.lap_number, bound);
                if slice.is_empty() {
                    (None, None)
                } else {
                    let kpis = extract_section_kpis(&slice, &self.config.kpi_thresholds);
                    let deltas = composite
                        .kpi_profile
                        .as_ref()
                        .map(|profile| kpi_deltas(&kpis, profile));
                    (Some(kpis), deltas)
                }
            }
            None => (None, None),
        };

        let (impact_score, issues) = self.prioritize(deltas.as_ref(), time_loss_ms);
        let recommendations = self.generate_recommendations(
            driver_kpis.as_ref(),
            composite.kpi_profile.as_ref(),
            deltas.as_ref(),
            time_loss_ms,
        );

        Some(SectionRecommendation {
            kind: RecommendationKind::SectionPerformance,
            race_id: self.race_id,
            lap_number: lap.lap_number,
            vehicle_id: lap.vehicle_id,
            section_name: section_name.to_string(),
            driver_time_ms,
            best_time_ms: Some(composite.best_time_ms),
            time_loss_ms,
            time_loss_s: ms_to_seconds(time_loss_ms),
            driver_kpis,
            composite_kpis: composite.kpi_profile.clone(),
            deltas,
            impact_score,
            issues,
            recommendations,
        })
    }

    /// Timing-only mode: raw section time against the composite best
    /// time, no KPI deltas.
    fn analyze_timing_only(
        &self,
        lap: &Lap,
        section_name: &str,
        driver_time_ms: i64,
        composite: &BestCaseComposite,
    ) -> SectionRecommendation {
        let time_loss_ms = driver_time_ms - composite.best_time_ms;
        let impact_score = if time_loss_ms != 0 {
            (time_loss_ms.abs() as f64 / 1000.0).min(10.0)
        } else {
            1.0
        };

        SectionRecommendation {
            kind: RecommendationKind::SectionPerformance,
            race_id: self.race_id,
            lap_number: lap.lap_number,
            vehicle_id: lap.vehicle_id,
            section_name: section_name.to_string(),
            driver_time_ms,
            best_time_ms: Some(composite.best_time_ms),
            time_loss_ms,
            time_loss_s: ms_to_seconds(time_loss_ms),
            driver_kpis: None,
            composite_kpis: None,
            deltas: None,
            impact_score,
            issues: Vec::new(),
            recommendations: vec![timing_recommendation(section_name, time_loss_ms)],
        }
    }

    /// Impact score: fixed contributions per triggered threshold plus a
    /// continuous term proportional to the time delta.
    fn prioritize(&self, deltas: Option<&KpiDeltas>, time_loss_ms: i64) -> (f64, Vec<String>) {
        let scores = &self.config.impact_scores;
        let mut impact_score = 0.0;
        let mut issues = Vec::new();

        if let Some(deltas) = deltas {
            if let Some(delta) = deltas.apex_speed_kph {
                if delta < scores.apex_speed_delta_kph {
                    impact_score += scores.apex_speed_impact;
                    issues.push(format!("Apex speed {:.1} kph slower.", delta.abs()));
                }
            }
            if let Some(delta) = deltas.braking_point_m {
                if delta < scores.braking_point_early_m {
                    impact_score += scores.braking_point_early_impact;
                    issues.push(format!("Braked {:.1}m too early.", delta.abs()));
                } else if delta > scores.braking_point_late_m {
                    impact_score += scores.braking_point_late_impact;
                    issues.push(format!("Braked {:.1}m too late.", delta.abs()));
                }
            }
            if let Some(delta) = deltas.throttle_on_point_m {
                if delta > scores.throttle_point_late_m {
                    impact_score += scores.throttle_point_impact;
                    issues.push(format!("Applied throttle {:.1}m later.", delta));
                }
            }
        }

        impact_score += ms_to_seconds(time_loss_ms).abs() * scores.time_delta_multiplier;
        (impact_score, issues)
    }

    /// One templated sentence per triggered threshold; a single generic
    /// sentence when nothing specific triggered but the time loss is
    /// non-trivial, so a real gap never goes unreported.
    fn generate_recommendations(
        &self,
        driver_kpis: Option<&SectionKpis>,
        composite_kpis: Option<&SectionKpis>,
        deltas: Option<&KpiDeltas>,
        time_loss_ms: i64,
    ) -> Vec<String> {
        let thresholds = &self.config.recommendation_thresholds;
        let mut recommendations = Vec::new();

        if let Some(deltas) = deltas {
            if let Some(delta) = deltas.braking_point_m {
                if delta > thresholds.braking_point_late_m {
                    recommendations.push(format!(
                        "Brake {:.1}m earlier (composite braked at {}, you braked at {})",
                        delta,
                        fmt_meters(composite_kpis.and_then(|k| k.braking_point_m)),
                        fmt_meters(driver_kpis.and_then(|k| k.braking_point_m)),
                    ));
                } else if delta < thresholds.braking_point_early_m {
                    recommendations.push(format!(
                        "Brake {:.1}m later to carry more speed (composite braked at {})",
                        delta.abs(),
                        fmt_meters(composite_kpis.and_then(|k| k.braking_point_m)),
                    ));
                }
            }

            if let Some(delta) = deltas.apex_speed_kph {
                if delta < thresholds.apex_speed_slower_kph {
                    recommendations.push(format!(
                        "Increase apex speed by {:.1} km/h (composite: {}, you: {})",
                        delta.abs(),
                        fmt_kph(composite_kpis.and_then(|k| k.apex_speed_kph)),
                        fmt_kph(driver_kpis.and_then(|k| k.apex_speed_kph)),
                    ));
                }
            }

            if let Some(delta) = deltas.throttle_on_point_m {
                if delta > thresholds.throttle_point_late_m {
                    recommendations.push(format!(
                        "Apply throttle {:.1}m earlier (composite applied at {})",
                        delta,
                        fmt_meters(composite_kpis.and_then(|k| k.throttle_on_point_m)),
                    ));
                }
            }

            if let Some(delta) = deltas.time_on_throttle_pct {
                if delta < thresholds.time_on_throttle_less_pct {
                    recommendations.push(format!(
                        "Spend more time on throttle (composite: {}, you: {})",
                        fmt_pct(composite_kpis.and_then(|k| k.time_on_throttle_pct)),
                        fmt_pct(driver_kpis.and_then(|k| k.time_on_throttle_pct)),
                    ));
                }
            }
        }

        if recommendations.is_empty() && time_loss_ms > thresholds.min_time_delta_for_general_rec_ms
        {
            recommendations.push(format!(
                "Review composite telemetry profile for this section - {:.3}s improvement opportunity",
                ms_to_seconds(time_loss_ms)
            ));
        }

        recommendations
    }

    /// Intermediate timing points (IM*_elapsed columns) reported as
    /// low-priority informational records.
    fn analyze_intermediates(&mut self, track: &Track, race_number: u32) -> Vec<SectionRecommendation> {
        let key = TableKey::sections(normalize_to_folder_name(&track.abbreviation), race_number);
        let Ok(Some(table)) = self.tables.get(&key) else {
            return Vec::new();
        };
        let Ok(schema) = detect_section_schema(&table.headers) else {
            return Vec::new();
        };
        if schema.intermediates.is_empty() {
            return Vec::new();
        }

        let laps = crate::tables::parse::parse_laps(self.race_id, &table, &schema);
        let mut results = Vec::new();
        for lap in &laps {
            // Re-find this lap's row to read the intermediate cells
            let Some(row) = table.rows.iter().find(|row| {
                RawTable::cell(row, schema.lap_number)
                    .and_then(|v| v.parse::<f64>().ok())
                    .map(|v| v.round() as u32)
                    == Some(lap.lap_number)
                    && schema
                        .vehicle
                        .and_then(|idx| RawTable::cell(row, idx))
                        .and_then(|v| v.parse::<f64>().ok())
                        .map(|v| v.round() as u32)
                        .unwrap_or(0)
                        == lap.vehicle_id
            }) else {
                continue;
            };

            for intermediate in &schema.intermediates {
                let Some(elapsed_s) = RawTable::cell(row, intermediate.index)
                    .and_then(|v| v.parse::<f64>().ok())
                    .filter(|v| v.is_finite() && *v > 0.0)
                else {
                    continue;
                };
                let elapsed_ms = (elapsed_s * 1000.0).round() as i64;

                results.push(SectionRecommendation {
                    kind: RecommendationKind::IntermediateTiming,
                    race_id: self.race_id,
                    lap_number: lap.lap_number,
                    vehicle_id: lap.vehicle_id,
                    section_name: intermediate.name.clone(),
                    driver_time_ms: elapsed_ms,
                    best_time_ms: None,
                    time_loss_ms: 0,
                    time_loss_s: 0.0,
                    driver_kpis: None,
                    composite_kpis: None,
                    deltas: None,
                    impact_score: 1.0,
                    issues: Vec::new(),
                    recommendations: vec![format!(
                        "Intermediate timing at {}: {:.3}s",
                        intermediate.name, elapsed_s
                    )],
                });
            }
        }
        results
    }
}

/// Persist section recommendations through the derived store.
pub fn persist_section_recommendations(
    store: &mut dyn DerivedStore,
    recommendations: &[SectionRecommendation],
) -> Result<usize, DeltabestError> {
    for recommendation in recommendations {
        store.put_section_recommendation(recommendation)?;
    }
    Ok(recommendations.len())
}

fn timing_recommendation(section_name: &str, time_loss_ms: i64) -> String {
    let delta_s = ms_to_seconds(time_loss_ms).abs();
    if time_loss_ms > 0 {
        format!(
            "In {}, you were {:.3}s slower than the best time. Focus on optimizing your driving line and braking points in this section.",
            section_name, delta_s
        )
    } else if time_loss_ms < 0 {
        format!(
            "In {}, you were {:.3}s faster than the best time. Great performance - maintain this level.",
            section_name, delta_s
        )
    } else {
        format!(
            "In {}, you matched the best recorded time. Great performance - maintain this level.",
            section_name
        )
    }
}

fn fmt_meters(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{v:.1}m"),
        None => "N/A".to_string(),
    }
}

fn fmt_kph(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{v:.1} km/h"),
        None => "N/A".to_string(),
    }
}

fn fmt_pct(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{v:.1}%"),
        None => "N/A".to_string(),
    }
}
