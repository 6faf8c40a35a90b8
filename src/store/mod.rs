// Repository contracts for metadata, derived records and telemetry
//
// The analysis core only ever talks to these traits; the storage
// technology behind them is a collaborator choice. `FileStore` is the
// bundled implementation.

pub mod file;

use std::collections::BTreeMap;

pub use file::{FileStore, JsonlTelemetrySource};

use crate::analysis::pattern::PatternRecommendation;
use crate::analysis::section::SectionRecommendation;
use crate::analysis::weather::WeatherRecommendation;
use crate::composite::BestCaseComposite;
use crate::errors::DeltabestError;
use crate::model::{Race, RaceId, TelemetrySample, Track, TrackId};

/// Race/track metadata lookups.
pub trait MetadataRepository {
    fn get_race(&self, race_id: RaceId) -> Result<Option<Race>, DeltabestError>;
    fn get_track(&self, track_id: TrackId) -> Result<Option<Track>, DeltabestError>;
    fn list_races(&self) -> Result<Vec<Race>, DeltabestError>;
    fn list_tracks(&self) -> Result<Vec<Track>, DeltabestError>;
    fn races_for_track(&self, track_id: TrackId) -> Result<Vec<Race>, DeltabestError>;
}

/// Derived-record store. All writes are upserts keyed by natural key so
/// recomputation overwrites rather than duplicates.
pub trait DerivedStore {
    fn put_composite(&mut self, composite: &BestCaseComposite) -> Result<(), DeltabestError>;

    /// Flip every active composite for the scope to inactive, returning
    /// how many records were deactivated. Old generations are kept for
    /// the audit trail, never deleted.
    fn deactivate_composites(
        &mut self,
        track_id: TrackId,
        race_id: Option<RaceId>,
    ) -> Result<usize, DeltabestError>;

    /// Active composites for the scope, keyed by section name.
    fn active_composites(
        &self,
        track_id: TrackId,
        race_id: Option<RaceId>,
    ) -> Result<BTreeMap<String, BestCaseComposite>, DeltabestError>;

    fn put_section_recommendation(
        &mut self,
        recommendation: &SectionRecommendation,
    ) -> Result<(), DeltabestError>;

    fn put_pattern_recommendation(
        &mut self,
        recommendation: &PatternRecommendation,
    ) -> Result<(), DeltabestError>;

    fn put_weather_recommendation(
        &mut self,
        recommendation: &WeatherRecommendation,
    ) -> Result<(), DeltabestError>;
}

/// Optional distance-aligned telemetry. `Ok(None)` means no processed
/// telemetry exists for the race, which downgrades analysis to
/// timing-only mode rather than failing.
pub trait TelemetrySource {
    fn processed_telemetry(
        &self,
        race_id: RaceId,
    ) -> Result<Option<Vec<TelemetrySample>>, DeltabestError>;
}
