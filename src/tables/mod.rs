// Tabular data loading for section-timing and weather exports

pub mod parse;
pub mod schema;

use std::collections::HashMap;
use std::path::PathBuf;
use std::rc::Rc;

use log::{debug, info};

use crate::errors::DeltabestError;

/// File name templates as produced by the timing system export.
const SECTIONS_FILE_TEMPLATE: &str = "23_AnalysisEnduranceWithSections_Race {race_num}_Anonymized.CSV";
const WEATHER_FILE_TEMPLATE: &str = "26_Weather_Race {race_num}_Anonymized.CSV";

/// Default number of tables a cache holds before evicting everything.
const DEFAULT_CACHE_CAPACITY: usize = 32;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TableKind {
    Sections,
    Weather,
}

/// Identifies one table in blob storage: track folder + race number + kind.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TableKey {
    pub track_folder: String,
    pub race_number: u32,
    pub kind: TableKind,
}

impl TableKey {
    pub fn sections(track_folder: impl Into<String>, race_number: u32) -> Self {
        Self {
            track_folder: track_folder.into(),
            race_number,
            kind: TableKind::Sections,
        }
    }

    pub fn weather(track_folder: impl Into<String>, race_number: u32) -> Self {
        Self {
            track_folder: track_folder.into(),
            race_number,
            kind: TableKind::Weather,
        }
    }

    pub fn file_name(&self) -> String {
        let template = match self.kind {
            TableKind::Sections => SECTIONS_FILE_TEMPLATE,
            TableKind::Weather => WEATHER_FILE_TEMPLATE,
        };
        template.replace("{race_num}", &self.race_number.to_string())
    }
}

impl std::fmt::Display for TableKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/Race {}/{:?}",
            self.track_folder, self.race_number, self.kind
        )
    }
}

/// A loaded table: trimmed headers plus row-oriented string cells.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    /// Cell lookup tolerant of ragged rows.
    pub fn cell<'t>(row: &'t [String], column: usize) -> Option<&'t str> {
        row.get(column).map(|s| s.trim())
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Abstract blob reader for timing/weather tables. `Ok(None)` means the
/// table does not exist for this scope, which is a normal condition.
pub trait TableReader {
    fn read_table(&self, key: &TableKey) -> Result<Option<RawTable>, DeltabestError>;
}

/// Reads semicolon-delimited CSV exports from a local data-root laid out
/// as `<root>/<track-folder>/Race <n>/<file>`. Header whitespace is
/// trimmed on load; the exports carry leading spaces on most columns.
pub struct DirTableReader {
    root: PathBuf,
}

impl DirTableReader {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn path_for(&self, key: &TableKey) -> PathBuf {
        self.root
            .join(&key.track_folder)
            .join(format!("Race {}", key.race_number))
            .join(key.file_name())
    }
}

impl TableReader for DirTableReader {
    fn read_table(&self, key: &TableKey) -> Result<Option<RawTable>, DeltabestError> {
        let path = self.path_for(key);
        if !path.exists() {
            debug!("Table file does not exist: {:?}", path);
            return Ok(None);
        }

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b';')
            .flexible(true)
            .from_path(&path)
            .map_err(|e| DeltabestError::TableParseError {
                path: path.display().to_string(),
                source: e,
            })?;

        let headers = reader
            .headers()
            .map_err(|e| DeltabestError::TableParseError {
                path: path.display().to_string(),
                source: e,
            })?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| DeltabestError::TableParseError {
                path: path.display().to_string(),
                source: e,
            })?;
            rows.push(record.iter().map(|c| c.to_string()).collect());
        }

        info!("Loaded {} rows from {:?}", rows.len(), path);
        Ok(Some(RawTable { headers, rows }))
    }
}

/// Read-through table cache, process-local to one pipeline run. Bounded:
/// when the key set reaches capacity the cache is cleared rather than
/// growing without limit. Not shared across concurrent runs.
pub struct TableCache<R: TableReader> {
    reader: R,
    cache: HashMap<TableKey, Option<Rc<RawTable>>>,
    capacity: usize,
}

impl<R: TableReader> TableCache<R> {
    pub fn new(reader: R) -> Self {
        Self::with_capacity(reader, DEFAULT_CACHE_CAPACITY)
    }

    pub fn with_capacity(reader: R, capacity: usize) -> Self {
        Self {
            reader,
            cache: HashMap::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn get(&mut self, key: &TableKey) -> Result<Option<Rc<RawTable>>, DeltabestError> {
        if let Some(cached) = self.cache.get(key) {
            debug!("Table cache hit for {}", key);
            return Ok(cached.clone());
        }

        let loaded = self.reader.read_table(key)?.map(Rc::new);
        if self.cache.len() >= self.capacity {
            debug!("Table cache at capacity ({}), clearing", self.capacity);
            self.cache.clear();
        }
        self.cache.insert(key.clone(), loaded.clone());
        Ok(loaded)
    }
}
