// Batch job entrypoints
//
// Each job runs one analyser to completion for one scope with
// explicitly injected collaborators, then persists the derived records.
// Jobs never share mutable state; concurrent runs for different scopes
// are independent. Recomputing the same scope must be serialized by the
// caller's scheduler.

use log::{error, info};

use crate::analysis::pattern::{persist_pattern_recommendations, PatternAnalyser};
use crate::analysis::section::{persist_section_recommendations, SectionAnalyser};
use crate::analysis::weather::{persist_weather_recommendation, WeatherAnalyser};
use crate::composite::{persist_composites, CompositeEngine, CompositeScope};
use crate::config::AnalysisConfig;
use crate::errors::DeltabestError;
use crate::model::{RaceId, TrackId, VehicleId};
use crate::store::{FileStore, MetadataRepository, TelemetrySource};
use crate::tables::{TableCache, TableReader};

/// Compute and persist the composite for one scope. Returns the number
/// of composite sections written.
pub fn run_composites<R: TableReader>(
    store: &mut FileStore,
    tables: &mut TableCache<R>,
    telemetry: Option<&dyn TelemetrySource>,
    config: &AnalysisConfig,
    track_id: TrackId,
    race_id: Option<RaceId>,
) -> Result<usize, DeltabestError> {
    let scope = CompositeScope { track_id, race_id };
    let composites = {
        let mut engine = CompositeEngine::new(&*store, tables, telemetry, config);
        engine.compute(scope)?
    };
    persist_composites(store, scope, &composites)
}

/// Compute composites for every track (track-wide) and every race
/// (race-scoped). A failing scope is logged and skipped.
pub fn run_all_composites<R: TableReader>(
    store: &mut FileStore,
    tables: &mut TableCache<R>,
    telemetry: Option<&dyn TelemetrySource>,
    config: &AnalysisConfig,
) -> Result<usize, DeltabestError> {
    let tracks = store.list_tracks()?;
    let races = store.list_races()?;
    info!(
        "Computing composites for {} tracks and {} races",
        tracks.len(),
        races.len()
    );

    let mut total = 0;
    for track in &tracks {
        match run_composites(store, tables, telemetry, config, track.id, None) {
            Ok(count) => total += count,
            Err(e) => error!("Composite computation failed for track {}: {}", track.id, e),
        }
    }
    for race in &races {
        match run_composites(store, tables, telemetry, config, race.track_id, Some(race.id)) {
            Ok(count) => total += count,
            Err(e) => error!("Composite computation failed for race {}: {}", race.id, e),
        }
    }
    Ok(total)
}

/// Section performance analysis for one race. Returns the number of
/// recommendations written.
pub fn run_section_analysis<R: TableReader>(
    store: &mut FileStore,
    tables: &mut TableCache<R>,
    telemetry: Option<&dyn TelemetrySource>,
    config: &AnalysisConfig,
    race_id: RaceId,
) -> Result<usize, DeltabestError> {
    let recommendations = {
        let mut analyser = SectionAnalyser::new(race_id, &*store, tables, telemetry, &*store, config);
        analyser.run()?
    };
    persist_section_recommendations(store, &recommendations)
}

/// Pattern analysis for one race, optionally restricted to one vehicle.
pub fn run_pattern_analysis<R: TableReader>(
    store: &mut FileStore,
    tables: &mut TableCache<R>,
    config: &AnalysisConfig,
    race_id: RaceId,
    vehicle_id: Option<VehicleId>,
) -> Result<usize, DeltabestError> {
    let recommendations = {
        let mut analyser =
            PatternAnalyser::new(race_id, vehicle_id, &*store, tables, &*store, config);
        analyser.run()?
    };
    persist_pattern_recommendations(store, &recommendations)
}

/// Weather impact analysis for one race. Returns 1 when a record was
/// written, 0 when the race had no lap data.
pub fn run_weather_analysis<R: TableReader>(
    store: &mut FileStore,
    tables: &mut TableCache<R>,
    config: &AnalysisConfig,
    race_id: RaceId,
) -> Result<usize, DeltabestError> {
    let recommendation = {
        let mut analyser = WeatherAnalyser::new(race_id, &*store, tables, &*store, config);
        analyser.run()?
    };
    match recommendation {
        Some(recommendation) => {
            persist_weather_recommendation(store, &recommendation)?;
            Ok(1)
        }
        None => Ok(0),
    }
}

/// Run an analysis job for every race in the metadata repository. A
/// race that fails is logged and skipped; other races still run.
pub fn run_batch(
    store: &mut FileStore,
    mut job: impl FnMut(&mut FileStore, RaceId) -> Result<usize, DeltabestError>,
    job_name: &str,
) -> Result<usize, DeltabestError> {
    let races = store.list_races()?;
    info!("Running {} for {} races", job_name, races.len());

    let mut total = 0;
    for race in races {
        match job(store, race.id) {
            Ok(count) => {
                info!("{} for race {}: {} records", job_name, race.id, count);
                total += count;
            }
            Err(e) => error!("{} failed for race {}: {}", job_name, race.id, e),
        }
    }
    Ok(total)
}
