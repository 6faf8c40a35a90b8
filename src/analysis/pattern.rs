// Lap-to-lap consistency and trend analysis per vehicle

use std::collections::BTreeMap;

use itertools::Itertools;
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::config::AnalysisConfig;
use crate::errors::DeltabestError;
use crate::model::{Lap, RaceId, VehicleId};
use crate::sources::{DocumentLapSource, LapSourceChain, TableLapSource};
use crate::stats;
use crate::store::{DerivedStore, FileStore, MetadataRepository};
use crate::tables::{TableCache, TableReader};
use crate::timing::ms_to_seconds;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Trend {
    Improving,
    Declining,
    Stable,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConsistencyTrend {
    Improving,
    NeedsWork,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum SectionConsistency {
    High,
    Moderate,
    Low,
}

/// Lap-time consistency metrics for one vehicle in one race.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ConsistencyMetrics {
    pub mean_lap_time_s: f64,
    pub std_lap_time_s: f64,
    pub min_lap_time_s: f64,
    pub max_lap_time_s: f64,
    /// Lap number of the fastest lap
    pub min_lap_number: Option<u32>,
    /// Lap number of the slowest lap
    pub max_lap_number: Option<u32>,
    pub lap_count: usize,
    /// 0-10, higher is more consistent; clamped at both ends
    pub consistency_score: f64,
    pub trend: Trend,
}

/// Per-section timing statistics with a consistency classification.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SectionPattern {
    pub mean_time_s: f64,
    pub std_time_s: f64,
    pub min_time_s: f64,
    pub max_time_s: f64,
    pub consistency: SectionConsistency,
}

/// Derived pattern record per (race, vehicle).
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PatternRecommendation {
    pub race_id: RaceId,
    pub vehicle_id: VehicleId,
    pub consistency: ConsistencyMetrics,
    pub section_patterns: BTreeMap<String, SectionPattern>,
    /// Sections with high timing consistency
    pub strengths: Vec<String>,
    /// Sections with low timing consistency
    pub weaknesses: Vec<String>,
    pub consistency_trend: ConsistencyTrend,
}

/// Analyses driver consistency across a race's laps, one record per
/// vehicle (or only the requested vehicle).
pub struct PatternAnalyser<'a, R: TableReader> {
    race_id: RaceId,
    vehicle_id: Option<VehicleId>,
    metadata: &'a dyn MetadataRepository,
    tables: &'a mut TableCache<R>,
    store: &'a FileStore,
    config: &'a AnalysisConfig,
}

impl<'a, R: TableReader> PatternAnalyser<'a, R> {
    pub fn new(
        race_id: RaceId,
        vehicle_id: Option<VehicleId>,
        metadata: &'a dyn MetadataRepository,
        tables: &'a mut TableCache<R>,
        store: &'a FileStore,
        config: &'a AnalysisConfig,
    ) -> Self {
        Self {
            race_id,
            vehicle_id,
            metadata,
            tables,
            store,
            config,
        }
    }

    /// Run the analysis. Vehicles with fewer than the minimum lap count
    /// are skipped with a warning rather than failing the batch.
    pub fn run(&mut self) -> Result<Vec<PatternRecommendation>, DeltabestError> {
        info!("Starting pattern analysis for race {}", self.race_id);

        let laps = {
            let mut chain = LapSourceChain::new(vec![
                Box::new(TableLapSource::new(self.metadata, self.tables)),
                Box::new(DocumentLapSource::new(self.store)),
            ]);
            chain.load(self.race_id)?
        };
        let Some(laps) = laps else {
            warn!("No lap data found for race {}", self.race_id);
            return Ok(Vec::new());
        };

        let vehicles: Vec<VehicleId> = match self.vehicle_id {
            Some(vehicle_id) => vec![vehicle_id],
            None => laps.iter().map(|l| l.vehicle_id).unique().sorted().collect(),
        };

        let mut results = Vec::new();
        for vehicle_id in vehicles {
            let mut vehicle_laps: Vec<&Lap> = laps
                .iter()
                .filter(|l| l.vehicle_id == vehicle_id && l.is_valid)
                .collect();
            vehicle_laps.sort_by_key(|l| l.lap_number);

            if vehicle_laps.len() < self.config.analysis_params.min_laps_for_pattern {
                warn!(
                    "Not enough laps for vehicle {} to analyze patterns ({} < {})",
                    vehicle_id,
                    vehicle_laps.len(),
                    self.config.analysis_params.min_laps_for_pattern
                );
                continue;
            }

            let Some(consistency) = self.analyze_consistency(&vehicle_laps) else {
                warn!("Missing lap times for vehicle {}", vehicle_id);
                continue;
            };

            let section_patterns = self.analyze_section_patterns(&vehicle_laps);
            let strengths: Vec<String> = section_patterns
                .iter()
                .filter(|(_, p)| p.consistency == SectionConsistency::High)
                .map(|(name, _)| name.clone())
                .collect();
            let weaknesses: Vec<String> = section_patterns
                .iter()
                .filter(|(_, p)| p.consistency == SectionConsistency::Low)
                .map(|(name, _)| name.clone())
                .collect();

            let consistency_trend = if consistency.consistency_score
                >= self.config.pattern_scores.consistency_trend_improving_score
            {
                ConsistencyTrend::Improving
            } else {
                ConsistencyTrend::NeedsWork
            };

            results.push(PatternRecommendation {
                race_id: self.race_id,
                vehicle_id,
                consistency,
                section_patterns,
                strengths,
                weaknesses,
                consistency_trend,
            });
        }

        info!(
            "Pattern analysis complete: insights for {} vehicles",
            results.len()
        );
        Ok(results)
    }

    fn analyze_consistency(&self, laps: &[&Lap]) -> Option<ConsistencyMetrics> {
        let timed: Vec<(&&Lap, f64)> = laps
            .iter()
            .filter_map(|lap| Some((lap, ms_to_seconds(lap.lap_time_ms?))))
            .collect();
        if timed.len() < self.config.analysis_params.min_laps_for_pattern {
            return None;
        }
        let times: Vec<f64> = timed.iter().map(|(_, t)| *t).collect();

        let std_lap_time_s = stats::std_dev(&times)?;
        let min_lap_time_s = stats::min(&times)?;
        let max_lap_time_s = stats::max(&times)?;
        let min_lap_number = timed
            .iter()
            .find(|(_, t)| *t == min_lap_time_s)
            .map(|(lap, _)| lap.lap_number);
        let max_lap_number = timed
            .iter()
            .find(|(_, t)| *t == max_lap_time_s)
            .map(|(lap, _)| lap.lap_number);

        Some(ConsistencyMetrics {
            mean_lap_time_s: stats::mean(&times)?,
            std_lap_time_s,
            min_lap_time_s,
            max_lap_time_s,
            min_lap_number,
            max_lap_number,
            lap_count: times.len(),
            consistency_score: consistency_score(
                std_lap_time_s,
                self.config.pattern_scores.consistency_std_multiplier,
            ),
            trend: classify_trend(
                &times,
                self.config.analysis_params.min_laps_for_trend,
                self.config.pattern_scores.trend_epsilon_s,
            ),
        })
    }

    fn analyze_section_patterns(&self, laps: &[&Lap]) -> BTreeMap<String, SectionPattern> {
        let mut times_by_section: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        for lap in laps {
            for section in &lap.sections {
                if section.time_ms > 0 {
                    times_by_section
                        .entry(section.section_name.clone())
                        .or_default()
                        .push(ms_to_seconds(section.time_ms));
                }
            }
        }

        let mut patterns = BTreeMap::new();
        for (section_name, times) in times_by_section {
            // Fewer than two samples cannot be classified
            if times.len() < 2 {
                continue;
            }
            let std_time_s = match stats::std_dev(&times) {
                Some(std) => std,
                None => continue,
            };
            patterns.insert(
                section_name,
                SectionPattern {
                    mean_time_s: stats::mean(&times).unwrap_or_default(),
                    std_time_s,
                    min_time_s: stats::min(&times).unwrap_or_default(),
                    max_time_s: stats::max(&times).unwrap_or_default(),
                    consistency: classify_section_consistency(
                        std_time_s,
                        self.config.pattern_scores.section_consistency_high_std,
                        self.config.pattern_scores.section_consistency_moderate_std,
                    ),
                },
            );
        }
        patterns
    }
}

/// Persist pattern recommendations through the derived store.
pub fn persist_pattern_recommendations(
    store: &mut dyn DerivedStore,
    recommendations: &[PatternRecommendation],
) -> Result<usize, DeltabestError> {
    for recommendation in recommendations {
        store.put_pattern_recommendation(recommendation)?;
    }
    Ok(recommendations.len())
}

/// `max(0, 10 - std * k)`, clamped to [0, 10]. Monotonically
/// non-increasing in the standard deviation.
pub fn consistency_score(std_dev_s: f64, multiplier: f64) -> f64 {
    (10.0 - std_dev_s * multiplier).clamp(0.0, 10.0)
}

/// First-half versus second-half mean comparison with a symmetric
/// epsilon band. Below the minimum lap count the trend is `Stable`.
pub fn classify_trend(lap_times_s: &[f64], min_laps: usize, epsilon_s: f64) -> Trend {
    if lap_times_s.len() < min_laps {
        return Trend::Stable;
    }
    let mid = lap_times_s.len() / 2;
    let Some(first_half) = stats::mean(&lap_times_s[..mid]) else {
        return Trend::Stable;
    };
    let Some(second_half) = stats::mean(&lap_times_s[mid..]) else {
        return Trend::Stable;
    };

    if second_half < first_half - epsilon_s {
        Trend::Improving
    } else if second_half > first_half + epsilon_s {
        Trend::Declining
    } else {
        Trend::Stable
    }
}

fn classify_section_consistency(
    std_time_s: f64,
    high_std: f64,
    moderate_std: f64,
) -> SectionConsistency {
    if std_time_s < high_std {
        SectionConsistency::High
    } else if std_time_s < moderate_std {
        SectionConsistency::Moderate
    } else {
        SectionConsistency::Low
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::DeltabestError;
    use crate::model::{Race, SectionTime, Track};
    use crate::tables::{RawTable, TableKey};
    use proptest::prelude::*;
    use std::collections::HashMap;

    struct MapTableReader {
        tables: HashMap<TableKey, RawTable>,
    }

    impl TableReader for MapTableReader {
        fn read_table(&self, key: &TableKey) -> Result<Option<RawTable>, DeltabestError> {
            Ok(self.tables.get(key).cloned())
        }
    }

    fn empty_cache() -> TableCache<MapTableReader> {
        TableCache::new(MapTableReader {
            tables: HashMap::new(),
        })
    }

    fn seeded_store(tmp: &tempfile::TempDir) -> FileStore {
        let mut store = FileStore::new(tmp.path().join("store")).unwrap();
        store
            .put_track(&Track {
                id: 1,
                name: "Sebring".to_string(),
                abbreviation: "sebring".to_string(),
                section_bounds: None,
            })
            .unwrap();
        store
            .put_race(&Race {
                id: 10,
                track_id: 1,
                race_number: 1,
            })
            .unwrap();
        store
    }

    fn lap(vehicle_id: u32, lap_number: u32, lap_time_s: f64, section_times_s: &[f64]) -> Lap {
        Lap {
            race_id: 10,
            vehicle_id,
            lap_number,
            lap_time_ms: Some((lap_time_s * 1000.0) as i64),
            is_valid: true,
            lap_start_time_ms: None,
            sections: section_times_s
                .iter()
                .enumerate()
                .map(|(i, t)| SectionTime {
                    section_name: format!("Section {}", i + 1),
                    section_order: i as u32 + 1,
                    time_ms: (t * 1000.0) as i64,
                })
                .collect(),
        }
    }

    #[test]
    fn test_consistency_metrics_and_sections() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = seeded_store(&tmp);
        store
            .put_race_laps(
                10,
                &[
                    // Section 1 is metronomic, Section 2 swings wildly
                    lap(12, 1, 92.0, &[45.00, 47.00]),
                    lap(12, 2, 91.0, &[45.02, 45.98]),
                    lap(12, 3, 90.0, &[45.04, 44.96]),
                    lap(12, 4, 90.5, &[45.02, 45.48]),
                ],
            )
            .unwrap();

        let config = AnalysisConfig::default();
        let mut cache = empty_cache();
        let results = PatternAnalyser::new(10, None, &store, &mut cache, &store, &config)
            .run()
            .unwrap();

        assert_eq!(results.len(), 1);
        let result = &results[0];
        assert_eq!(result.vehicle_id, 12);
        assert_eq!(result.consistency.lap_count, 4);
        assert!((result.consistency.mean_lap_time_s - 90.875).abs() < 1e-9);
        assert_eq!(result.consistency.min_lap_time_s, 90.0);
        assert_eq!(result.consistency.min_lap_number, Some(3));
        assert_eq!(result.consistency.max_lap_number, Some(1));
        // Laps improve from [92, 91] to [90, 90.5]
        assert_eq!(result.consistency.trend, Trend::Improving);

        assert_eq!(
            result.section_patterns["Section 1"].consistency,
            SectionConsistency::High
        );
        assert_eq!(
            result.section_patterns["Section 2"].consistency,
            SectionConsistency::Low
        );
        assert_eq!(result.strengths, vec!["Section 1".to_string()]);
        assert_eq!(result.weaknesses, vec!["Section 2".to_string()]);
    }

    #[test]
    fn test_single_lap_vehicle_is_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = seeded_store(&tmp);
        store
            .put_race_laps(
                10,
                &[
                    lap(12, 1, 92.0, &[45.0, 47.0]),
                    lap(12, 2, 91.0, &[45.0, 46.0]),
                    lap(7, 1, 95.0, &[47.0, 48.0]),
                ],
            )
            .unwrap();

        let config = AnalysisConfig::default();
        let mut cache = empty_cache();
        let results = PatternAnalyser::new(10, None, &store, &mut cache, &store, &config)
            .run()
            .unwrap();

        // Vehicle 7 has one lap and produces nothing
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].vehicle_id, 12);
    }

    #[test]
    fn test_no_lap_data_yields_empty_result() {
        let tmp = tempfile::tempdir().unwrap();
        let store = seeded_store(&tmp);
        let config = AnalysisConfig::default();
        let mut cache = empty_cache();
        let results = PatternAnalyser::new(10, None, &store, &mut cache, &store, &config)
            .run()
            .unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_vehicle_filter() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = seeded_store(&tmp);
        store
            .put_race_laps(
                10,
                &[
                    lap(12, 1, 92.0, &[]),
                    lap(12, 2, 91.0, &[]),
                    lap(7, 1, 95.0, &[]),
                    lap(7, 2, 94.0, &[]),
                ],
            )
            .unwrap();

        let config = AnalysisConfig::default();
        let mut cache = empty_cache();
        let results = PatternAnalyser::new(10, Some(7), &store, &mut cache, &store, &config)
            .run()
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].vehicle_id, 7);
    }

    #[test]
    fn test_trend_classification() {
        // Short series stays stable regardless of shape
        assert_eq!(classify_trend(&[95.0, 90.0], 3, 0.1), Trend::Stable);
        assert_eq!(
            classify_trend(&[92.0, 91.5, 90.8, 90.5], 3, 0.1),
            Trend::Improving
        );
        assert_eq!(
            classify_trend(&[90.0, 90.2, 91.5, 92.0], 3, 0.1),
            Trend::Declining
        );
        assert_eq!(
            classify_trend(&[90.0, 90.05, 90.02, 90.04], 3, 0.1),
            Trend::Stable
        );
    }

    #[test]
    fn test_consistency_score_bounds() {
        assert_eq!(consistency_score(0.0, 5.0), 10.0);
        assert_eq!(consistency_score(1.0, 5.0), 5.0);
        // Floored at zero for wild lap-time swings
        assert_eq!(consistency_score(5.0, 5.0), 0.0);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        // The score never leaves [0, 10] and never increases as the
        // standard deviation grows.
        #[test]
        fn prop_consistency_score_monotone(
            std_a in 0.0f64..10.0,
            std_b in 0.0f64..10.0,
        ) {
            let score_a = consistency_score(std_a, 5.0);
            let score_b = consistency_score(std_b, 5.0);
            prop_assert!((0.0..=10.0).contains(&score_a));
            prop_assert!((0.0..=10.0).contains(&score_b));
            if std_a <= std_b {
                prop_assert!(score_a >= score_b);
            }
        }
    }

    #[test]
    fn test_persist_pattern_recommendations() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = seeded_store(&tmp);
        store
            .put_race_laps(10, &[lap(12, 1, 92.0, &[]), lap(12, 2, 91.0, &[])])
            .unwrap();

        let config = AnalysisConfig::default();
        let mut cache = empty_cache();
        let results = PatternAnalyser::new(10, None, &store, &mut cache, &store, &config)
            .run()
            .unwrap();
        persist_pattern_recommendations(&mut store, &results).unwrap();

        let stored = store.get_pattern_recommendation(10, 12).unwrap().unwrap();
        assert_eq!(stored.consistency.lap_count, 2);
    }
}
