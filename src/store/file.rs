// File-based document store implementation

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use log::debug;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_jsonlines::json_lines;

use crate::analysis::pattern::PatternRecommendation;
use crate::analysis::section::SectionRecommendation;
use crate::analysis::weather::WeatherRecommendation;
use crate::composite::BestCaseComposite;
use crate::errors::DeltabestError;
use crate::model::{Lap, Race, RaceId, TelemetrySample, Track, TrackId};
use crate::store::{DerivedStore, MetadataRepository, TelemetrySource};

const RACES: &str = "races";
const TRACKS: &str = "tracks";
const LAPS: &str = "laps";
const COMPOSITES: &str = "best_case_composites";
const SECTION_RECS: &str = "section_recommendations";
const PATTERN_RECS: &str = "pattern_recommendations";
const WEATHER_RECS: &str = "weather_recommendations";

/// JSON-document store rooted at a base directory: one subdirectory per
/// collection, one file per record, file name = natural key. Writing an
/// existing key overwrites the document.
pub struct FileStore {
    base_path: PathBuf,
}

impl FileStore {
    pub fn new(base_path: PathBuf) -> Result<Self, DeltabestError> {
        if !base_path.exists() {
            fs::create_dir_all(&base_path).map_err(|e| DeltabestError::StoreIoError {
                operation: "create store directory".to_string(),
                source: e,
            })?;
        }
        Ok(Self { base_path })
    }

    /// Store in the default application data directory.
    pub fn new_default() -> Result<Self, DeltabestError> {
        let base = dirs::data_dir()
            .ok_or(DeltabestError::NoStoreDir)?
            .join("deltabest")
            .join("store");
        Self::new(base)
    }

    fn doc_path(&self, collection: &str, doc_id: &str) -> PathBuf {
        self.base_path.join(collection).join(format!("{doc_id}.json"))
    }

    fn write_doc<T: Serialize>(
        &self,
        collection: &str,
        doc_id: &str,
        record: &T,
    ) -> Result<(), DeltabestError> {
        let path = self.doc_path(collection, doc_id);
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| DeltabestError::StoreIoError {
                    operation: format!("create collection {collection}"),
                    source: e,
                })?;
            }
        }
        let json = serde_json::to_string_pretty(record).map_err(|e| {
            DeltabestError::StoreSerializeError {
                doc_id: doc_id.to_string(),
                source: e,
            }
        })?;
        fs::write(&path, json).map_err(|e| DeltabestError::StoreIoError {
            operation: format!("write {collection}/{doc_id}"),
            source: e,
        })?;
        debug!("Wrote document {}/{}", collection, doc_id);
        Ok(())
    }

    fn read_doc<T: DeserializeOwned>(
        &self,
        collection: &str,
        doc_id: &str,
    ) -> Result<Option<T>, DeltabestError> {
        let path = self.doc_path(collection, doc_id);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path).map_err(|e| DeltabestError::StoreIoError {
            operation: format!("read {collection}/{doc_id}"),
            source: e,
        })?;
        let record = serde_json::from_str(&content).map_err(|e| {
            DeltabestError::StoreSerializeError {
                doc_id: doc_id.to_string(),
                source: e,
            }
        })?;
        Ok(Some(record))
    }

    fn read_collection<T: DeserializeOwned>(
        &self,
        collection: &str,
    ) -> Result<Vec<(String, T)>, DeltabestError> {
        let dir = self.base_path.join(collection);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&dir).map_err(|e| DeltabestError::StoreIoError {
            operation: format!("list {collection}"),
            source: e,
        })?;

        let mut records = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| DeltabestError::StoreIoError {
                operation: format!("list {collection}"),
                source: e,
            })?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let doc_id = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_string();
            if let Some(record) = self.read_doc(collection, &doc_id)? {
                records.push((doc_id, record));
            }
        }
        records.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(records)
    }

    // Seeding entry points used by ingestion and tests

    pub fn put_race(&mut self, race: &Race) -> Result<(), DeltabestError> {
        self.write_doc(RACES, &race.id.to_string(), race)
    }

    pub fn put_track(&mut self, track: &Track) -> Result<(), DeltabestError> {
        self.write_doc(TRACKS, &track.id.to_string(), track)
    }

    pub fn put_race_laps(&mut self, race_id: RaceId, laps: &[Lap]) -> Result<(), DeltabestError> {
        self.write_doc(LAPS, &format!("race_{race_id}"), &laps.to_vec())
    }

    pub fn get_race_laps(&self, race_id: RaceId) -> Result<Option<Vec<Lap>>, DeltabestError> {
        self.read_doc(LAPS, &format!("race_{race_id}"))
    }

    pub fn get_section_recommendation(
        &self,
        race_id: RaceId,
        lap_number: u32,
        vehicle_id: u32,
        section_name: &str,
    ) -> Result<Option<SectionRecommendation>, DeltabestError> {
        self.read_doc(
            SECTION_RECS,
            &section_rec_doc_id(race_id, lap_number, vehicle_id, section_name),
        )
    }

    pub fn get_pattern_recommendation(
        &self,
        race_id: RaceId,
        vehicle_id: u32,
    ) -> Result<Option<PatternRecommendation>, DeltabestError> {
        self.read_doc(
            PATTERN_RECS,
            &format!("race_{race_id}_vehicle_{vehicle_id}_pattern_analysis"),
        )
    }

    pub fn get_weather_recommendation(
        &self,
        race_id: RaceId,
    ) -> Result<Option<WeatherRecommendation>, DeltabestError> {
        self.read_doc(WEATHER_RECS, &format!("race_{race_id}_weather_impact"))
    }

    /// Every composite generation for the scope, active or not.
    pub fn all_composites(
        &self,
        track_id: TrackId,
        race_id: Option<RaceId>,
    ) -> Result<Vec<BestCaseComposite>, DeltabestError> {
        Ok(self
            .read_collection::<BestCaseComposite>(COMPOSITES)?
            .into_iter()
            .map(|(_, c)| c)
            .filter(|c| c.track_id == track_id && c.race_id == race_id)
            .collect())
    }
}

fn composite_doc_id(composite: &BestCaseComposite) -> String {
    let section = slug_key(&composite.section_name);
    match composite.race_id {
        Some(race_id) => format!(
            "track_{}_race_{}_section_{}",
            composite.track_id, race_id, section
        ),
        None => format!("track_{}_section_{}", composite.track_id, section),
    }
}

fn section_rec_doc_id(
    race_id: RaceId,
    lap_number: u32,
    vehicle_id: u32,
    section_name: &str,
) -> String {
    format!(
        "race_{}_lap_{}_vehicle_{}_section_{}",
        race_id,
        lap_number,
        vehicle_id,
        slug_key(section_name)
    )
}

fn slug_key(name: &str) -> String {
    name.replace([' ', '/'], "_")
}

impl MetadataRepository for FileStore {
    fn get_race(&self, race_id: RaceId) -> Result<Option<Race>, DeltabestError> {
        self.read_doc(RACES, &race_id.to_string())
    }

    fn get_track(&self, track_id: TrackId) -> Result<Option<Track>, DeltabestError> {
        self.read_doc(TRACKS, &track_id.to_string())
    }

    fn list_races(&self) -> Result<Vec<Race>, DeltabestError> {
        let mut races: Vec<Race> = self
            .read_collection(RACES)?
            .into_iter()
            .map(|(_, r)| r)
            .collect();
        races.sort_by_key(|r| r.id);
        Ok(races)
    }

    fn list_tracks(&self) -> Result<Vec<Track>, DeltabestError> {
        let mut tracks: Vec<Track> = self
            .read_collection(TRACKS)?
            .into_iter()
            .map(|(_, t)| t)
            .collect();
        tracks.sort_by_key(|t| t.id);
        Ok(tracks)
    }

    fn races_for_track(&self, track_id: TrackId) -> Result<Vec<Race>, DeltabestError> {
        Ok(self
            .list_races()?
            .into_iter()
            .filter(|r| r.track_id == track_id)
            .collect())
    }
}

impl DerivedStore for FileStore {
    fn put_composite(&mut self, composite: &BestCaseComposite) -> Result<(), DeltabestError> {
        self.write_doc(COMPOSITES, &composite_doc_id(composite), composite)
    }

    fn deactivate_composites(
        &mut self,
        track_id: TrackId,
        race_id: Option<RaceId>,
    ) -> Result<usize, DeltabestError> {
        let mut deactivated = 0;
        for (doc_id, mut composite) in self.read_collection::<BestCaseComposite>(COMPOSITES)? {
            if composite.track_id == track_id && composite.race_id == race_id && composite.is_active
            {
                composite.is_active = false;
                self.write_doc(COMPOSITES, &doc_id, &composite)?;
                deactivated += 1;
            }
        }
        debug!(
            "Deactivated {} composites for track {} race {:?}",
            deactivated, track_id, race_id
        );
        Ok(deactivated)
    }

    fn active_composites(
        &self,
        track_id: TrackId,
        race_id: Option<RaceId>,
    ) -> Result<BTreeMap<String, BestCaseComposite>, DeltabestError> {
        let mut by_section = BTreeMap::new();
        for (_, composite) in self.read_collection::<BestCaseComposite>(COMPOSITES)? {
            if composite.track_id == track_id && composite.race_id == race_id && composite.is_active
            {
                by_section.insert(composite.section_name.clone(), composite);
            }
        }
        Ok(by_section)
    }

    fn put_section_recommendation(
        &mut self,
        recommendation: &SectionRecommendation,
    ) -> Result<(), DeltabestError> {
        self.write_doc(
            SECTION_RECS,
            &section_rec_doc_id(
                recommendation.race_id,
                recommendation.lap_number,
                recommendation.vehicle_id,
                &recommendation.section_name,
            ),
            recommendation,
        )
    }

    fn put_pattern_recommendation(
        &mut self,
        recommendation: &PatternRecommendation,
    ) -> Result<(), DeltabestError> {
        self.write_doc(
            PATTERN_RECS,
            &format!(
                "race_{}_vehicle_{}_pattern_analysis",
                recommendation.race_id, recommendation.vehicle_id
            ),
            recommendation,
        )
    }

    fn put_weather_recommendation(
        &mut self,
        recommendation: &WeatherRecommendation,
    ) -> Result<(), DeltabestError> {
        self.write_doc(
            WEATHER_RECS,
            &format!("race_{}_weather_impact", recommendation.race_id),
            recommendation,
        )
    }
}

/// Reads processed telemetry from JSON-lines files, one file per race,
/// named `race_<id>.jsonl` under the source directory.
pub struct JsonlTelemetrySource {
    dir: PathBuf,
}

impl JsonlTelemetrySource {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn path_for(&self, race_id: RaceId) -> PathBuf {
        self.dir.join(format!("race_{race_id}.jsonl"))
    }

    pub fn write_race(
        &self,
        race_id: RaceId,
        samples: &[TelemetrySample],
    ) -> Result<(), DeltabestError> {
        if !self.dir.exists() {
            fs::create_dir_all(&self.dir)
                .map_err(|e| DeltabestError::TelemetryLoadError { source: e })?;
        }
        serde_jsonlines::write_json_lines(self.path_for(race_id), samples)
            .map_err(|e| DeltabestError::TelemetryLoadError { source: e })
    }
}

impl TelemetrySource for JsonlTelemetrySource {
    fn processed_telemetry(
        &self,
        race_id: RaceId,
    ) -> Result<Option<Vec<TelemetrySample>>, DeltabestError> {
        let path = self.path_for(race_id);
        if !path.exists() {
            return Ok(None);
        }
        let samples = json_lines(&path)
            .map_err(|e| DeltabestError::TelemetryLoadError { source: e })?
            .collect::<Result<Vec<TelemetrySample>, std::io::Error>>()
            .map_err(|e| DeltabestError::TelemetryLoadError { source: e })?;
        Ok(Some(samples))
    }
}
