// Ordered lap data-source strategies
//
// Each analyser loads race laps through a chain of sources tried in
// order until one has data. The chain logs which source served the
// request so a misconfigured primary is visible in the job output.

use log::{info, warn};

use crate::errors::DeltabestError;
use crate::model::{Lap, RaceId};
use crate::store::{FileStore, MetadataRepository};
use crate::tables::schema::detect_section_schema;
use crate::tables::{parse, TableCache, TableKey, TableReader};
use crate::tracks::normalize_to_folder_name;

/// One way of obtaining the laps of a race. `Ok(None)` means this source
/// has no data for the scope; the chain moves on to the next source.
pub trait LapSource {
    fn name(&self) -> &'static str;
    fn load_race_laps(&mut self, race_id: RaceId) -> Result<Option<Vec<Lap>>, DeltabestError>;
}

/// Primary source: the section-timing table exports.
pub struct TableLapSource<'a, R: TableReader> {
    metadata: &'a dyn MetadataRepository,
    tables: &'a mut TableCache<R>,
}

impl<'a, R: TableReader> TableLapSource<'a, R> {
    pub fn new(metadata: &'a dyn MetadataRepository, tables: &'a mut TableCache<R>) -> Self {
        Self { metadata, tables }
    }
}

impl<R: TableReader> LapSource for TableLapSource<'_, R> {
    fn name(&self) -> &'static str {
        "section-timing tables"
    }

    fn load_race_laps(&mut self, race_id: RaceId) -> Result<Option<Vec<Lap>>, DeltabestError> {
        let Some(race) = self.metadata.get_race(race_id)? else {
            return Ok(None);
        };
        let Some(track) = self.metadata.get_track(race.track_id)? else {
            warn!("Race {} references unknown track {}", race_id, race.track_id);
            return Ok(None);
        };

        let key = TableKey::sections(
            normalize_to_folder_name(&track.abbreviation),
            race.race_number,
        );
        let Some(table) = self.tables.get(&key)? else {
            return Ok(None);
        };

        let schema = match detect_section_schema(&table.headers) {
            Ok(schema) => schema,
            Err(e) => {
                warn!("Section table for race {} unusable: {}", race_id, e);
                return Ok(None);
            }
        };

        let laps = parse::parse_laps(race_id, &table, &schema);
        Ok((!laps.is_empty()).then_some(laps))
    }
}

/// Fallback source: lap documents previously ingested into the store.
pub struct DocumentLapSource<'a> {
    store: &'a FileStore,
}

impl<'a> DocumentLapSource<'a> {
    pub fn new(store: &'a FileStore) -> Self {
        Self { store }
    }
}

impl LapSource for DocumentLapSource<'_> {
    fn name(&self) -> &'static str {
        "lap documents"
    }

    fn load_race_laps(&mut self, race_id: RaceId) -> Result<Option<Vec<Lap>>, DeltabestError> {
        let laps = self.store.get_race_laps(race_id)?;
        Ok(laps.filter(|l| !l.is_empty()))
    }
}

/// Tries each source in order until one produces laps. A source that
/// errors is logged and skipped; the next source still gets its chance.
pub struct LapSourceChain<'a> {
    sources: Vec<Box<dyn LapSource + 'a>>,
}

impl<'a> LapSourceChain<'a> {
    pub fn new(sources: Vec<Box<dyn LapSource + 'a>>) -> Self {
        Self { sources }
    }

    pub fn load(&mut self, race_id: RaceId) -> Result<Option<Vec<Lap>>, DeltabestError> {
        for source in &mut self.sources {
            match source.load_race_laps(race_id) {
                Ok(Some(laps)) => {
                    info!(
                        "Loaded {} laps for race {} from {}",
                        laps.len(),
                        race_id,
                        source.name()
                    );
                    return Ok(Some(laps));
                }
                Ok(None) => continue,
                Err(e) => {
                    warn!(
                        "Lap source {} failed for race {}: {}. Trying next source.",
                        source.name(),
                        race_id,
                        e
                    );
                }
            }
        }
        Ok(None)
    }
}
