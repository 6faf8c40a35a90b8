// Error types for deltabest

use snafu::Snafu;
use std::io;

#[derive(Debug, Snafu)]
pub enum DeltabestError {
    // Errors while reading timing/weather tables
    #[snafu(display("Error reading table file {path}"))]
    TableIoError { path: String, source: io::Error },
    #[snafu(display("Error parsing table file {path}"))]
    TableParseError { path: String, source: csv::Error },
    #[snafu(display("Table schema not recognized for {table}: {reason}"))]
    SchemaNotRecognized { table: String, reason: String },

    // Scope lookup errors. Distinct from an empty-but-valid result so
    // callers can render a "not yet processed" state.
    #[snafu(display("Race {race_id} not found in metadata repository"))]
    RaceNotFound { race_id: u32 },
    #[snafu(display("Track {track_id} not found in metadata repository"))]
    TrackNotFound { track_id: u32 },

    // Derived-record store errors
    #[snafu(display("Store I/O error during {operation}"))]
    StoreIoError { operation: String, source: io::Error },
    #[snafu(display("Error serializing store document {doc_id}"))]
    StoreSerializeError {
        doc_id: String,
        source: serde_json::Error,
    },
    #[snafu(display("Could not find application data directory for the document store"))]
    NoStoreDir,

    // Processed telemetry errors
    #[snafu(display("Error loading processed telemetry file"))]
    TelemetryLoadError { source: io::Error },

    // Config management errors
    #[snafu(display("Could not find application config directory to save config file"))]
    NoConfigDir,
    #[snafu(display("Error writing config file"))]
    ConfigIoError { source: io::Error },
    #[snafu(display("Error serializing config file"))]
    ConfigSerializeError { source: serde_json::Error },
}
