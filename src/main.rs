use std::path::PathBuf;

use clap::{Parser, Subcommand};
use log::info;

use deltabest::errors::DeltabestError;
use deltabest::store::TelemetrySource;
use deltabest::{
    AnalysisConfig, DirTableReader, FileStore, JsonlTelemetrySource, MetadataRepository,
    TableCache, jobs,
};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Args {
    /// Root directory of the timing/weather table exports
    #[arg(long)]
    data_dir: PathBuf,

    /// Document store directory (defaults to the platform data dir)
    #[arg(long)]
    store_dir: Option<PathBuf>,

    /// Directory holding processed telemetry jsonl files
    #[arg(long)]
    telemetry_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Compute best-case composites (all tracks and races by default)
    Composite {
        /// Track-wide composite for this track
        #[arg(short, long)]
        track: Option<u32>,

        /// Race-scoped composite for this race
        #[arg(short, long)]
        race: Option<u32>,
    },
    /// Section performance analysis against the active composite
    Sections {
        #[arg(short, long, required_unless_present = "batch")]
        race: Option<u32>,

        /// Process every race in the metadata repository
        #[arg(long)]
        batch: bool,
    },
    /// Lap-to-lap consistency and trend analysis
    Patterns {
        #[arg(short, long, required_unless_present = "batch")]
        race: Option<u32>,

        /// Restrict the analysis to one vehicle
        #[arg(short, long)]
        vehicle: Option<u32>,

        #[arg(long)]
        batch: bool,
    },
    /// Weather impact analysis
    Weather {
        #[arg(short, long, required_unless_present = "batch")]
        race: Option<u32>,

        #[arg(long)]
        batch: bool,
    },
    /// Composites plus all three analysers for one race
    All {
        #[arg(short, long)]
        race: u32,
    },
}

fn main() -> Result<(), DeltabestError> {
    colog::init();
    let args = Args::parse();

    let config = AnalysisConfig::from_local_file().unwrap_or_default();
    let mut store = match args.store_dir {
        Some(dir) => FileStore::new(dir)?,
        None => FileStore::new_default()?,
    };
    let mut tables = TableCache::new(DirTableReader::new(args.data_dir.clone()));
    let telemetry = args.telemetry_dir.map(JsonlTelemetrySource::new);
    let telemetry_ref: Option<&dyn TelemetrySource> =
        telemetry.as_ref().map(|t| t as &dyn TelemetrySource);

    match args.command {
        Commands::Composite { track, race } => {
            let written = match (track, race) {
                (Some(track_id), race_id) => jobs::run_composites(
                    &mut store,
                    &mut tables,
                    telemetry_ref,
                    &config,
                    track_id,
                    race_id,
                )?,
                (None, Some(race_id)) => {
                    let race = store
                        .get_race(race_id)?
                        .ok_or(DeltabestError::RaceNotFound { race_id })?;
                    jobs::run_composites(
                        &mut store,
                        &mut tables,
                        telemetry_ref,
                        &config,
                        race.track_id,
                        Some(race_id),
                    )?
                }
                (None, None) => {
                    jobs::run_all_composites(&mut store, &mut tables, telemetry_ref, &config)?
                }
            };
            info!("Composite computation complete: {} sections", written);
        }
        Commands::Sections { race, batch } => {
            let written = if batch {
                jobs::run_batch(
                    &mut store,
                    |store, race_id| {
                        jobs::run_section_analysis(
                            store,
                            &mut tables,
                            telemetry_ref,
                            &config,
                            race_id,
                        )
                    },
                    "section analysis",
                )?
            } else {
                jobs::run_section_analysis(
                    &mut store,
                    &mut tables,
                    telemetry_ref,
                    &config,
                    race.expect("clap enforces --race without --batch"),
                )?
            };
            info!("Section analysis complete: {} recommendations", written);
        }
        Commands::Patterns {
            race,
            vehicle,
            batch,
        } => {
            let written = if batch {
                jobs::run_batch(
                    &mut store,
                    |store, race_id| {
                        jobs::run_pattern_analysis(store, &mut tables, &config, race_id, vehicle)
                    },
                    "pattern analysis",
                )?
            } else {
                jobs::run_pattern_analysis(
                    &mut store,
                    &mut tables,
                    &config,
                    race.expect("clap enforces --race without --batch"),
                    vehicle,
                )?
            };
            info!("Pattern analysis complete: {} recommendations", written);
        }
        Commands::Weather { race, batch } => {
            let written = if batch {
                jobs::run_batch(
                    &mut store,
                    |store, race_id| {
                        jobs::run_weather_analysis(store, &mut tables, &config, race_id)
                    },
                    "weather analysis",
                )?
            } else {
                jobs::run_weather_analysis(
                    &mut store,
                    &mut tables,
                    &config,
                    race.expect("clap enforces --race without --batch"),
                )?
            };
            info!("Weather analysis complete: {} recommendations", written);
        }
        Commands::All { race } => {
            let race_meta = store
                .get_race(race)?
                .ok_or(DeltabestError::RaceNotFound { race_id: race })?;
            jobs::run_composites(
                &mut store,
                &mut tables,
                telemetry_ref,
                &config,
                race_meta.track_id,
                None,
            )?;
            jobs::run_composites(
                &mut store,
                &mut tables,
                telemetry_ref,
                &config,
                race_meta.track_id,
                Some(race),
            )?;
            let sections =
                jobs::run_section_analysis(&mut store, &mut tables, telemetry_ref, &config, race)?;
            let patterns =
                jobs::run_pattern_analysis(&mut store, &mut tables, &config, race, None)?;
            let weather = jobs::run_weather_analysis(&mut store, &mut tables, &config, race)?;
            info!(
                "Pipeline complete for race {}: {} section, {} pattern, {} weather records",
                race, sections, patterns, weather
            );
        }
    }

    Ok(())
}
