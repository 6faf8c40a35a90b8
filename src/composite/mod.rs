// Best-case composite computation
//
// A composite is the synthetic "perfect lap" assembled from the fastest
// recorded time per section within a scope: one race, or every race at
// a track. Composites are soft-versioned: recomputation deactivates the
// previous generation before activating the new one.

use std::collections::{BTreeMap, HashMap};

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::analysis::kpi::{extract_section_kpis, section_slice, SectionKpis};
use crate::config::AnalysisConfig;
use crate::errors::DeltabestError;
use crate::model::{Race, RaceId, TelemetrySample, Track, TrackId, VehicleId};
use crate::store::{DerivedStore, MetadataRepository, TelemetrySource};
use crate::tables::schema::detect_section_schema;
use crate::tables::{parse, TableCache, TableKey, TableReader};
use crate::tracks::normalize_to_folder_name;

/// Scope of a composite: a whole track (race_id None) or a single race.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CompositeScope {
    pub track_id: TrackId,
    pub race_id: Option<RaceId>,
}

impl CompositeScope {
    pub fn track_wide(track_id: TrackId) -> Self {
        Self {
            track_id,
            race_id: None,
        }
    }

    pub fn race(track_id: TrackId, race_id: RaceId) -> Self {
        Self {
            track_id,
            race_id: Some(race_id),
        }
    }
}

/// Fastest recorded time for one section within a scope, with the lap
/// that produced it and, when telemetry allows, its KPI profile.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct BestCaseComposite {
    pub track_id: TrackId,
    /// Absent for track-wide composites
    pub race_id: Option<RaceId>,
    pub section_name: String,
    pub best_time_ms: i64,
    pub source_race_id: RaceId,
    pub source_lap_number: Option<u32>,
    pub source_vehicle_id: Option<VehicleId>,
    /// KPIs captured at the best time, when the source lap has telemetry
    pub kpi_profile: Option<SectionKpis>,
    pub is_active: bool,
}

/// Computes best-case composites from section-timing tables.
pub struct CompositeEngine<'a, R: TableReader> {
    metadata: &'a dyn MetadataRepository,
    tables: &'a mut TableCache<R>,
    telemetry: Option<&'a dyn TelemetrySource>,
    config: &'a AnalysisConfig,
}

impl<'a, R: TableReader> CompositeEngine<'a, R> {
    pub fn new(
        metadata: &'a dyn MetadataRepository,
        tables: &'a mut TableCache<R>,
        telemetry: Option<&'a dyn TelemetrySource>,
        config: &'a AnalysisConfig,
    ) -> Self {
        Self {
            metadata,
            tables,
            telemetry,
            config,
        }
    }

    /// Compute the composite set for a scope, keyed by section name.
    ///
    /// A race whose table is missing or malformed is skipped with a
    /// warning. No usable data at all yields an empty map, which callers
    /// must treat as "comparison unavailable", not as an error.
    pub fn compute(
        &mut self,
        scope: CompositeScope,
    ) -> Result<BTreeMap<String, BestCaseComposite>, DeltabestError> {
        let track = self
            .metadata
            .get_track(scope.track_id)?
            .ok_or(DeltabestError::TrackNotFound {
                track_id: scope.track_id,
            })?;

        let races = match scope.race_id {
            Some(race_id) => {
                let race = self
                    .metadata
                    .get_race(race_id)?
                    .ok_or(DeltabestError::RaceNotFound { race_id })?;
                vec![race]
            }
            None => self.metadata.races_for_track(scope.track_id)?,
        };
        if races.is_empty() {
            warn!("No races found for track {}", scope.track_id);
            return Ok(BTreeMap::new());
        }

        let best = self.find_best_sections(&track, &races)?;
        if best.is_empty() {
            warn!("No valid section times in scope for track {}", scope.track_id);
            return Ok(BTreeMap::new());
        }

        let mut composites = BTreeMap::new();
        let mut telemetry_by_race: HashMap<RaceId, Option<Vec<TelemetrySample>>> = HashMap::new();
        for (section_name, candidate) in best {
            let kpi_profile =
                self.capture_kpi_profile(&track, &candidate, &section_name, &mut telemetry_by_race);
            info!(
                "Best {}: {:.3}s from race {}, lap {:?}",
                section_name,
                candidate.time_ms as f64 / 1000.0,
                candidate.race_id,
                candidate.lap_number
            );
            composites.insert(
                section_name.clone(),
                BestCaseComposite {
                    track_id: scope.track_id,
                    race_id: scope.race_id,
                    section_name,
                    best_time_ms: candidate.time_ms,
                    source_race_id: candidate.race_id,
                    source_lap_number: candidate.lap_number,
                    source_vehicle_id: candidate.vehicle_id,
                    kpi_profile,
                    is_active: true,
                },
            );
        }
        Ok(composites)
    }

    fn find_best_sections(
        &mut self,
        track: &Track,
        races: &[Race],
    ) -> Result<BTreeMap<String, BestCandidate>, DeltabestError> {
        let folder = normalize_to_folder_name(&track.abbreviation);
        let mut best: BTreeMap<String, BestCandidate> = BTreeMap::new();

        for race in races {
            let key = TableKey::sections(folder.clone(), race.race_number);
            let table = match self.tables.get(&key) {
                Ok(Some(table)) => table,
                Ok(None) => {
                    warn!("No section table for race {}, skipping", race.id);
                    continue;
                }
                Err(e) => {
                    warn!("Could not load section table for race {}: {}", race.id, e);
                    continue;
                }
            };
            let schema = match detect_section_schema(&table.headers) {
                Ok(schema) => schema,
                Err(e) => {
                    warn!("Section table for race {} unusable: {}", race.id, e);
                    continue;
                }
            };

            for lap in parse::parse_laps(race.id, &table, &schema) {
                for section in &lap.sections {
                    let candidate = BestCandidate {
                        time_ms: section.time_ms,
                        race_id: race.id,
                        lap_number: Some(lap.lap_number),
                        vehicle_id: Some(lap.vehicle_id),
                    };
                    best.entry(section.section_name.clone())
                        .and_modify(|current| {
                            if candidate.time_ms < current.time_ms {
                                *current = candidate.clone();
                            }
                        })
                        .or_insert(candidate);
                }
            }
        }
        Ok(best)
    }

    fn capture_kpi_profile(
        &self,
        track: &Track,
        candidate: &BestCandidate,
        section_name: &str,
        telemetry_by_race: &mut HashMap<RaceId, Option<Vec<TelemetrySample>>>,
    ) -> Option<SectionKpis> {
        let telemetry = self.telemetry?;
        let lap_number = candidate.lap_number?;
        let bound = track
            .section_bounds
            .as_ref()?
            .iter()
            .find(|b| b.section_name == section_name)?;

        let samples = telemetry_by_race
            .entry(candidate.race_id)
            .or_insert_with(|| match telemetry.processed_telemetry(candidate.race_id) {
                Ok(samples) => samples,
                Err(e) => {
                    warn!(
                        "Could not load telemetry for race {}: {}",
                        candidate.race_id, e
                    );
                    None
                }
            })
            .as_ref()?;

        let slice = section_slice(samples, lap_number, bound);
        if slice.is_empty() {
            return None;
        }
        Some(extract_section_kpis(&slice, &self.config.kpi_thresholds))
    }

}

/// Persist a computed composite set: deactivate the previous active
/// generation for the scope, then write the new records. Running this
/// twice with identical input leaves exactly one active record per
/// section.
pub fn persist_composites(
    store: &mut dyn DerivedStore,
    scope: CompositeScope,
    composites: &BTreeMap<String, BestCaseComposite>,
) -> Result<usize, DeltabestError> {
    let deactivated = store.deactivate_composites(scope.track_id, scope.race_id)?;
    if deactivated > 0 {
        info!(
            "Deactivated {} previous composites for track {} race {:?}",
            deactivated, scope.track_id, scope.race_id
        );
    }
    for composite in composites.values() {
        store.put_composite(composite)?;
    }
    info!(
        "Saved {} composite sections for track {} race {:?}",
        composites.len(),
        scope.track_id,
        scope.race_id
    );
    Ok(composites.len())
}

#[derive(Clone, Debug)]
struct BestCandidate {
    time_ms: i64,
    race_id: RaceId,
    lap_number: Option<u32>,
    vehicle_id: Option<VehicleId>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SectionBound;
    use crate::store::FileStore;
    use crate::tables::RawTable;

    struct MapTableReader {
        tables: HashMap<TableKey, RawTable>,
    }

    impl TableReader for MapTableReader {
        fn read_table(&self, key: &TableKey) -> Result<Option<RawTable>, DeltabestError> {
            Ok(self.tables.get(key).cloned())
        }
    }

    fn raw_table(headers: &[&str], rows: &[&[&str]]) -> RawTable {
        RawTable {
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: rows
                .iter()
                .map(|r| r.iter().map(|c| c.to_string()).collect())
                .collect(),
        }
    }

    fn seeded_store(tmp: &tempfile::TempDir) -> FileStore {
        let mut store = FileStore::new(tmp.path().join("store")).unwrap();
        store
            .put_track(&Track {
                id: 1,
                name: "Barber Motorsports Park".to_string(),
                abbreviation: "barber".to_string(),
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
            .put_race(&Race {
                id: 11,
                track_id: 1,
                race_number: 2,
            })
            .unwrap();
        store
    }

    fn two_race_tables() -> MapTableReader {
        let mut tables = HashMap::new();
        tables.insert(
            TableKey::sections("barber", 1),
            raw_table(
                &["NUMBER", "LAP_NUMBER", "S1", "S2"],
                &[
                    &["12", "1", "45.0", "46.5"],
                    &["12", "2", "44.2", "46.0"],
                    &["7", "1", "45.5", "45.8"],
                ],
            ),
        );
        tables.insert(
            TableKey::sections("barber", 2),
            raw_table(
                &["NUMBER", "LAP_NUMBER", "S1", "S2"],
                &[
                    &["12", "1", "44.9", "45.2"],
                    &["9", "3", "43.8", "47.0"],
                ],
            ),
        );
        MapTableReader { tables }
    }

    #[test]
    fn test_track_wide_minimum_and_source_reference() {
        let tmp = tempfile::tempdir().unwrap();
        let store = seeded_store(&tmp);
        let mut cache = TableCache::new(two_race_tables());
        let config = AnalysisConfig::default();
        let mut engine = CompositeEngine::new(&store, &mut cache, None, &config);

        let composites = engine.compute(CompositeScope::track_wide(1)).unwrap();
        assert_eq!(composites.len(), 2);

        let s1 = &composites["Section 1"];
        assert_eq!(s1.best_time_ms, 43_800);
        assert_eq!(s1.source_race_id, 11);
        assert_eq!(s1.source_lap_number, Some(3));
        assert_eq!(s1.source_vehicle_id, Some(9));
        assert_eq!(s1.race_id, None);

        let s2 = &composites["Section 2"];
        assert_eq!(s2.best_time_ms, 45_200);
        assert_eq!(s2.source_race_id, 11);
    }

    #[test]
    fn test_race_scoped_composite() {
        let tmp = tempfile::tempdir().unwrap();
        let store = seeded_store(&tmp);
        let mut cache = TableCache::new(two_race_tables());
        let config = AnalysisConfig::default();
        let mut engine = CompositeEngine::new(&store, &mut cache, None, &config);

        let composites = engine.compute(CompositeScope::race(1, 10)).unwrap();
        let s1 = &composites["Section 1"];
        assert_eq!(s1.best_time_ms, 44_200);
        assert_eq!(s1.source_race_id, 10);
        assert_eq!(s1.race_id, Some(10));
    }

    #[test]
    fn test_missing_race_table_is_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let store = seeded_store(&tmp);
        let mut tables = two_race_tables();
        tables.tables.remove(&TableKey::sections("barber", 2));
        let mut cache = TableCache::new(tables);
        let config = AnalysisConfig::default();
        let mut engine = CompositeEngine::new(&store, &mut cache, None, &config);

        let composites = engine.compute(CompositeScope::track_wide(1)).unwrap();
        assert_eq!(composites["Section 1"].best_time_ms, 44_200);
        assert_eq!(composites["Section 1"].source_race_id, 10);
    }

    #[test]
    fn test_no_usable_data_yields_empty_set() {
        let tmp = tempfile::tempdir().unwrap();
        let store = seeded_store(&tmp);
        let mut cache = TableCache::new(MapTableReader {
            tables: HashMap::new(),
        });
        let config = AnalysisConfig::default();
        let mut engine = CompositeEngine::new(&store, &mut cache, None, &config);

        let composites = engine.compute(CompositeScope::track_wide(1)).unwrap();
        assert!(composites.is_empty());
    }

    #[test]
    fn test_unknown_track_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let store = seeded_store(&tmp);
        let mut cache = TableCache::new(two_race_tables());
        let config = AnalysisConfig::default();
        let mut engine = CompositeEngine::new(&store, &mut cache, None, &config);

        let err = engine.compute(CompositeScope::track_wide(99)).unwrap_err();
        assert!(matches!(err, DeltabestError::TrackNotFound { track_id: 99 }));
    }

    #[test]
    fn test_persist_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = seeded_store(&tmp);
        let mut cache = TableCache::new(two_race_tables());
        let config = AnalysisConfig::default();

        let composites = CompositeEngine::new(&store, &mut cache, None, &config)
            .compute(CompositeScope::track_wide(1))
            .unwrap();

        let scope = CompositeScope::track_wide(1);
        persist_composites(&mut store, scope, &composites).unwrap();
        persist_composites(&mut store, scope, &composites).unwrap();

        // Exactly one active record per section after recomputation
        let active = store.active_composites(1, None).unwrap();
        assert_eq!(active.len(), 2);
        for composite in active.values() {
            assert!(composite.is_active);
        }
        let all = store.all_composites(1, None).unwrap();
        assert_eq!(all.iter().filter(|c| c.is_active).count(), 2);
    }

    struct StaticTelemetry {
        samples: Vec<TelemetrySample>,
    }

    impl TelemetrySource for StaticTelemetry {
        fn processed_telemetry(
            &self,
            _race_id: RaceId,
        ) -> Result<Option<Vec<TelemetrySample>>, DeltabestError> {
            Ok(Some(self.samples.clone()))
        }
    }

    #[test]
    fn test_kpi_profile_captured_with_bounds_and_telemetry() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = seeded_store(&tmp);
        store
            .put_track(&Track {
                id: 1,
                name: "Barber Motorsports Park".to_string(),
                abbreviation: "barber".to_string(),
                section_bounds: Some(vec![SectionBound {
                    section_name: "Section 1".to_string(),
                    start_m: 0.0,
                    end_m: 1000.0,
                }]),
            })
            .unwrap();

        let telemetry = StaticTelemetry {
            samples: vec![
                TelemetrySample {
                    lap_number: 3,
                    vehicle_id: Some(9),
                    lap_dist_m: 100.0,
                    speed_kph: 180.0,
                    brake_pressure: 0.9,
                    throttle_pct: 0.0,
                    lat_accel_g: 0.5,
                },
                TelemetrySample {
                    lap_number: 3,
                    vehicle_id: Some(9),
                    lap_dist_m: 400.0,
                    speed_kph: 120.0,
                    brake_pressure: 0.0,
                    throttle_pct: 1.0,
                    lat_accel_g: 1.2,
                },
            ],
        };

        let mut cache = TableCache::new(two_race_tables());
        let config = AnalysisConfig::default();
        let mut engine = CompositeEngine::new(&store, &mut cache, Some(&telemetry), &config);
        let composites = engine.compute(CompositeScope::track_wide(1)).unwrap();

        let profile = composites["Section 1"].kpi_profile.as_ref().unwrap();
        assert_eq!(profile.apex_speed_kph, Some(120.0));
        assert_eq!(profile.braking_point_m, Some(100.0));
        // Section 2 has no bounds, so no profile
        assert!(composites["Section 2"].kpi_profile.is_none());
    }
}
