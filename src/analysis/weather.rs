// Weather correlation analysis against lap times

use std::collections::BTreeMap;

use itertools::Itertools;
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::config::AnalysisConfig;
use crate::errors::DeltabestError;
use crate::model::{Lap, RaceId, VehicleId, WeatherSample};
use crate::sources::{DocumentLapSource, LapSourceChain, TableLapSource};
use crate::stats;
use crate::store::{DerivedStore, FileStore, MetadataRepository};
use crate::tables::schema::detect_weather_schema;
use crate::tables::{parse, TableCache, TableKey, TableReader};
use crate::timing::ms_to_seconds;
use crate::tracks::normalize_to_folder_name;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum WeatherMetric {
    AirTemp,
    TrackTemp,
    Humidity,
    WindSpeed,
}

impl WeatherMetric {
    const ALL: [WeatherMetric; 4] = [
        WeatherMetric::AirTemp,
        WeatherMetric::TrackTemp,
        WeatherMetric::Humidity,
        WeatherMetric::WindSpeed,
    ];

    pub fn key(self) -> &'static str {
        match self {
            WeatherMetric::AirTemp => "air_temp_c",
            WeatherMetric::TrackTemp => "track_temp_c",
            WeatherMetric::Humidity => "humidity_pct",
            WeatherMetric::WindSpeed => "wind_speed_kph",
        }
    }

    fn value(self, sample: &WeatherSample) -> Option<f64> {
        match self {
            WeatherMetric::AirTemp => sample.air_temp_c,
            WeatherMetric::TrackTemp => sample.track_temp_c,
            WeatherMetric::Humidity => sample.humidity_pct,
            WeatherMetric::WindSpeed => sample.wind_speed_kph,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum CorrelationStrength {
    Moderate,
    Strong,
}

/// A weather metric whose correlation with lap time cleared the
/// significance threshold.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct MetricCorrelation {
    pub metric: WeatherMetric,
    pub correlation: f64,
    pub strength: CorrelationStrength,
}

/// Time-aligned correlation analysis output.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CorrelationAnalysis {
    /// Every computable coefficient, keyed by metric
    pub correlations: BTreeMap<String, f64>,
    pub significant: Vec<MetricCorrelation>,
    pub interpretation: String,
    /// Number of time-aligned (lap, weather) pairs
    pub data_points: usize,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct MetricStats {
    pub mean: f64,
    pub min: f64,
    pub max: f64,
}

/// Purely descriptive weather summary, produced when time alignment is
/// impossible. Makes no correlation claims.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DescriptiveSummary {
    pub data_points: usize,
    pub air_temp: Option<MetricStats>,
    pub track_temp: Option<MetricStats>,
    pub humidity: Option<MetricStats>,
    pub wind_speed: Option<MetricStats>,
    pub rain_events: usize,
    pub interpretation: String,
}

/// Either a full correlation analysis or the descriptive fallback. The
/// fallback is a deliberate degraded mode, not an error.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum WeatherAnalysis {
    Correlated(CorrelationAnalysis),
    Descriptive(DescriptiveSummary),
}

/// The vehicle with the lowest mean lap time under the observed
/// conditions.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct BestPerformer {
    pub vehicle_id: VehicleId,
    pub avg_lap_time_s: f64,
    pub best_lap_time_s: f64,
    pub std_lap_time_s: f64,
    pub lap_count: usize,
    /// 0-10 from the vehicle's own lap-time spread
    pub consistency_score: f64,
    pub summary: String,
}

/// Average conditions over the race for display next to the analysis.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct ConditionsSummary {
    pub avg_air_temp_c: Option<f64>,
    pub avg_track_temp_c: Option<f64>,
    pub avg_humidity_pct: Option<f64>,
    pub avg_wind_speed_kph: Option<f64>,
    pub rain_observed: bool,
    pub data_points: usize,
}

/// Derived weather record per race.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct WeatherRecommendation {
    pub race_id: RaceId,
    pub analysis: WeatherAnalysis,
    pub best_performer: Option<BestPerformer>,
    pub conditions: Option<ConditionsSummary>,
}

/// Correlates weather conditions with lap times for one race.
pub struct WeatherAnalyser<'a, R: TableReader> {
    race_id: RaceId,
    metadata: &'a dyn MetadataRepository,
    tables: &'a mut TableCache<R>,
    store: &'a FileStore,
    config: &'a AnalysisConfig,
}

impl<'a, R: TableReader> WeatherAnalyser<'a, R> {
    pub fn new(
        race_id: RaceId,
        metadata: &'a dyn MetadataRepository,
        tables: &'a mut TableCache<R>,
        store: &'a FileStore,
        config: &'a AnalysisConfig,
    ) -> Self {
        Self {
            race_id,
            metadata,
            tables,
            store,
            config,
        }
    }

    /// Run the analysis. `Ok(None)` means no lap data at all for the
    /// race; missing weather degrades to the descriptive summary.
    pub fn run(&mut self) -> Result<Option<WeatherRecommendation>, DeltabestError> {
        info!("Starting weather impact analysis for race {}", self.race_id);

        let laps = {
            let mut chain = LapSourceChain::new(vec![
                Box::new(TableLapSource::new(self.metadata, self.tables)),
                Box::new(DocumentLapSource::new(self.store)),
            ]);
            chain.load(self.race_id)?
        };
        let Some(laps) = laps else {
            warn!("No lap data found for race {}", self.race_id);
            return Ok(None);
        };

        let weather = self.load_weather()?;
        let analysis = self.analyze(&laps, &weather);
        let best_performer = identify_best_performer(&laps);
        let conditions = (!weather.is_empty()).then(|| summarize_conditions(&weather));

        info!("Weather impact analysis complete for race {}", self.race_id);
        Ok(Some(WeatherRecommendation {
            race_id: self.race_id,
            analysis,
            best_performer,
            conditions,
        }))
    }

    fn load_weather(&mut self) -> Result<Vec<WeatherSample>, DeltabestError> {
        let Some(race) = self.metadata.get_race(self.race_id)? else {
            return Ok(Vec::new());
        };
        let Some(track) = self.metadata.get_track(race.track_id)? else {
            return Ok(Vec::new());
        };

        let key = TableKey::weather(
            normalize_to_folder_name(&track.abbreviation),
            race.race_number,
        );
        let table = match self.tables.get(&key) {
            Ok(Some(table)) => table,
            Ok(None) => {
                warn!("No weather table for race {}", self.race_id);
                return Ok(Vec::new());
            }
            Err(e) => {
                warn!("Could not load weather table for race {}: {}", self.race_id, e);
                return Ok(Vec::new());
            }
        };
        let schema = match detect_weather_schema(&table.headers) {
            Ok(schema) => schema,
            Err(e) => {
                warn!("Weather table for race {} unusable: {}", self.race_id, e);
                return Ok(Vec::new());
            }
        };

        let samples = parse::parse_weather(&table, &schema);
        info!("Loaded {} weather samples for race {}", samples.len(), self.race_id);
        Ok(samples)
    }

    /// Time-aligned correlation when both sides carry timestamps; the
    /// descriptive summary otherwise.
    fn analyze(&self, laps: &[Lap], weather: &[WeatherSample]) -> WeatherAnalysis {
        let can_align = weather.iter().any(|w| w.timestamp_ms.is_some())
            && laps.iter().any(|l| l.lap_start_time_ms.is_some());
        if !can_align {
            warn!(
                "Not enough data for time-aligned weather analysis for race {}. Providing basic weather summary instead.",
                self.race_id
            );
            return WeatherAnalysis::Descriptive(describe_weather(weather));
        }

        let aligned = align_nearest(laps, weather);
        let mut correlations = BTreeMap::new();
        let mut significant = Vec::new();
        let mut interpretation = Vec::new();
        let thresholds = &self.config.weather_thresholds;

        for metric in WeatherMetric::ALL {
            let pairs: Vec<(f64, f64)> = aligned
                .iter()
                .filter_map(|(lap_time_s, sample)| Some((*lap_time_s, metric.value(sample)?)))
                .collect();
            let lap_times: Vec<f64> = pairs.iter().map(|(t, _)| *t).collect();
            let values: Vec<f64> = pairs.iter().map(|(_, v)| *v).collect();

            let Some(correlation) = stats::pearson(&lap_times, &values) else {
                continue;
            };
            correlations.insert(metric.key().to_string(), correlation);

            if correlation.abs() > thresholds.significant_correlation {
                significant.push(MetricCorrelation {
                    metric,
                    correlation,
                    strength: if correlation.abs() > thresholds.strong_correlation {
                        CorrelationStrength::Strong
                    } else {
                        CorrelationStrength::Moderate
                    },
                });
                if let Some(sentence) =
                    interpret_metric(metric, correlation, thresholds.significant_correlation)
                {
                    interpretation.push(sentence);
                }
            }
        }

        if interpretation.is_empty() {
            interpretation.push(
                "Weather conditions show minimal correlation with lap times in this dataset. \
                 Performance appears to be more driver/setup dependent."
                    .to_string(),
            );
        }

        WeatherAnalysis::Correlated(CorrelationAnalysis {
            correlations,
            significant,
            interpretation: interpretation.join(" "),
            data_points: aligned.len(),
        })
    }
}

/// Persist a weather recommendation through the derived store.
pub fn persist_weather_recommendation(
    store: &mut dyn DerivedStore,
    recommendation: &WeatherRecommendation,
) -> Result<(), DeltabestError> {
    store.put_weather_recommendation(recommendation)
}

/// Nearest-timestamp join: each timed lap is paired with the weather
/// sample closest in time, not necessarily an exact match.
fn align_nearest(laps: &[Lap], weather: &[WeatherSample]) -> Vec<(f64, WeatherSample)> {
    let timestamped: Vec<&WeatherSample> = weather
        .iter()
        .filter(|w| w.timestamp_ms.is_some())
        .sorted_by_key(|w| w.timestamp_ms)
        .collect();
    if timestamped.is_empty() {
        return Vec::new();
    }

    let mut aligned = Vec::new();
    for lap in laps {
        let (Some(start_ms), Some(lap_time_ms)) = (lap.lap_start_time_ms, lap.lap_time_ms) else {
            continue;
        };
        let nearest = timestamped
            .iter()
            .min_by_key(|w| (w.timestamp_ms.unwrap() - start_ms).abs())
            .unwrap();
        aligned.push((ms_to_seconds(lap_time_ms), (*nearest).clone()));
    }
    aligned
}

fn interpret_metric(metric: WeatherMetric, correlation: f64, significant: f64) -> Option<String> {
    match metric {
        WeatherMetric::TrackTemp => {
            if correlation > significant {
                Some(
                    "Higher track temperatures correlate with slower lap times, likely due to \
                     tire overheating and reduced grip."
                        .to_string(),
                )
            } else if correlation < -significant {
                Some(
                    "Lower track temperatures correlate with slower lap times, possibly due to \
                     difficulty getting tires into optimal operating window."
                        .to_string(),
                )
            } else {
                None
            }
        }
        WeatherMetric::AirTemp => {
            if correlation > significant {
                Some(
                    "Higher air temperatures correlate with slower lap times, affecting engine \
                     performance and tire grip."
                        .to_string(),
                )
            } else if correlation < -significant {
                Some(
                    "Lower air temperatures correlate with slower lap times, affecting tire \
                     warm-up and engine efficiency."
                        .to_string(),
                )
            } else {
                None
            }
        }
        WeatherMetric::Humidity => (correlation > significant).then(|| {
            "Higher humidity correlates with slower lap times, affecting engine power and \
             aerodynamics."
                .to_string()
        }),
        WeatherMetric::WindSpeed => (correlation.abs() > significant).then(|| {
            format!(
                "Wind speed shows {} correlation with lap times, affecting aerodynamics and top speed.",
                if correlation > 0.0 { "positive" } else { "negative" }
            )
        }),
    }
}

/// Descriptive statistics per channel plus a context sentence; the
/// fallback used when correlation cannot be computed.
fn describe_weather(weather: &[WeatherSample]) -> DescriptiveSummary {
    if weather.is_empty() {
        return DescriptiveSummary {
            data_points: 0,
            air_temp: None,
            track_temp: None,
            humidity: None,
            wind_speed: None,
            rain_events: 0,
            interpretation: "No weather data available.".to_string(),
        };
    }

    let channel = |metric: WeatherMetric| -> Option<MetricStats> {
        let values: Vec<f64> = weather.iter().filter_map(|w| metric.value(w)).collect();
        Some(MetricStats {
            mean: stats::mean(&values)?,
            min: stats::min(&values)?,
            max: stats::max(&values)?,
        })
    };

    let air_temp = channel(WeatherMetric::AirTemp);
    let track_temp = channel(WeatherMetric::TrackTemp);
    let humidity = channel(WeatherMetric::Humidity);
    let wind_speed = channel(WeatherMetric::WindSpeed);
    let rain_events = weather.iter().filter(|w| w.rain.unwrap_or(0) > 0).count();

    let mut parts = Vec::new();
    if let Some(stats) = &air_temp {
        parts.push(format!(
            "Air temperature averaged {:.1}\u{b0}C (range: {:.1}-{:.1}\u{b0}C).",
            stats.mean, stats.min, stats.max
        ));
    }
    if let Some(stats) = &track_temp {
        parts.push(format!("Track temperature averaged {:.1}\u{b0}C.", stats.mean));
    }
    if let Some(stats) = &humidity {
        parts.push(format!("Humidity averaged {:.1}%.", stats.mean));
    }
    if let Some(stats) = &wind_speed {
        parts.push(format!(
            "Wind speed averaged {:.1} km/h (max: {:.1} km/h).",
            stats.mean, stats.max
        ));
    }
    if rain_events > 0 {
        parts.push(format!(
            "Rain was detected during {} weather readings.",
            rain_events
        ));
    } else {
        parts.push("No rain was detected during the race.".to_string());
    }
    parts.push(
        "While detailed correlation analysis requires time-aligned lap data, these conditions \
         provide context for race performance."
            .to_string(),
    );

    DescriptiveSummary {
        data_points: weather.len(),
        air_temp,
        track_temp,
        humidity,
        wind_speed,
        rain_events,
        interpretation: parts.join(" "),
    }
}

/// Rank vehicles by mean lap time ascending and report the leader with
/// a consistency sub-score from its own spread.
fn identify_best_performer(laps: &[Lap]) -> Option<BestPerformer> {
    let mut by_vehicle: BTreeMap<VehicleId, Vec<f64>> = BTreeMap::new();
    for lap in laps {
        if let Some(lap_time_ms) = lap.lap_time_ms {
            by_vehicle
                .entry(lap.vehicle_id)
                .or_default()
                .push(ms_to_seconds(lap_time_ms));
        }
    }

    let (vehicle_id, times) = by_vehicle
        .into_iter()
        .filter(|(_, times)| !times.is_empty())
        .min_by(|a, b| {
            let mean_a = stats::mean(&a.1).unwrap_or(f64::INFINITY);
            let mean_b = stats::mean(&b.1).unwrap_or(f64::INFINITY);
            mean_a.total_cmp(&mean_b)
        })?;

    let avg_lap_time_s = stats::mean(&times)?;
    let best_lap_time_s = stats::min(&times)?;
    let std_lap_time_s = stats::std_dev(&times)?;
    let consistency_score = 10.0 - (std_lap_time_s * 10.0).min(10.0);

    Some(BestPerformer {
        vehicle_id,
        avg_lap_time_s,
        best_lap_time_s,
        std_lap_time_s,
        lap_count: times.len(),
        consistency_score,
        summary: format!(
            "Maintained consistent pace (std: {:.3}s) with average lap time of {:.3}s. \
             Adapted driving style to weather conditions effectively.",
            std_lap_time_s, avg_lap_time_s
        ),
    })
}

fn summarize_conditions(weather: &[WeatherSample]) -> ConditionsSummary {
    let average = |metric: WeatherMetric| -> Option<f64> {
        let values: Vec<f64> = weather.iter().filter_map(|w| metric.value(w)).collect();
        stats::mean(&values)
    };

    ConditionsSummary {
        avg_air_temp_c: average(WeatherMetric::AirTemp),
        avg_track_temp_c: average(WeatherMetric::TrackTemp),
        avg_humidity_pct: average(WeatherMetric::Humidity),
        avg_wind_speed_kph: average(WeatherMetric::WindSpeed),
        rain_observed: weather.iter().any(|w| w.rain.unwrap_or(0) > 0),
        data_points: weather.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Race, Track};
    use crate::tables::RawTable;
    use std::collections::HashMap;

    struct MapTableReader {
        tables: HashMap<TableKey, RawTable>,
    }

    impl TableReader for MapTableReader {
        fn read_table(&self, key: &TableKey) -> Result<Option<RawTable>, DeltabestError> {
            Ok(self.tables.get(key).cloned())
        }
    }

    fn raw_table(headers: &[&str], rows: &[Vec<String>]) -> RawTable {
        RawTable {
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: rows.to_vec(),
        }
    }

    fn seeded_store(tmp: &tempfile::TempDir) -> FileStore {
        let mut store = FileStore::new(tmp.path().join("store")).unwrap();
        store
            .put_track(&Track {
                id: 1,
                name: "Sonoma Raceway".to_string(),
                abbreviation: "sonoma".to_string(),
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

    fn timed_lap(vehicle_id: u32, lap_number: u32, lap_time_s: f64, start_s: Option<i64>) -> Lap {
        Lap {
            race_id: 10,
            vehicle_id,
            lap_number,
            lap_time_ms: Some((lap_time_s * 1000.0).round() as i64),
            is_valid: true,
            lap_start_time_ms: start_s.map(|s| s * 1000),
            sections: Vec::new(),
        }
    }

    fn weather_rows(count: usize, base_ts: i64, track_temp_per_row: &dyn Fn(usize) -> f64) -> Vec<Vec<String>> {
        (0..count)
            .map(|i| {
                vec![
                    (base_ts + i as i64 * 100).to_string(),
                    "21.0".to_string(),
                    format!("{:.1}", track_temp_per_row(i)),
                    "55.0".to_string(),
                    "0".to_string(),
                ]
            })
            .collect()
    }

    fn analyser_tables(rows: Vec<Vec<String>>, headers: &[&str]) -> TableCache<MapTableReader> {
        let mut tables = HashMap::new();
        tables.insert(TableKey::weather("sonoma", 1), raw_table(headers, &rows));
        TableCache::new(MapTableReader { tables })
    }

    #[test]
    fn test_time_aligned_correlation_flags_track_temp() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = seeded_store(&tmp);
        // Lap times rise exactly with track temperature
        let laps: Vec<Lap> = (0..6)
            .map(|i| timed_lap(12, i as u32 + 1, 90.0 + i as f64 * 0.5, Some(1000 + i as i64 * 100)))
            .collect();
        store.put_race_laps(10, &laps).unwrap();

        let mut cache = analyser_tables(
            weather_rows(6, 1000, &|i| 30.0 + i as f64),
            &["TIME_UTC_SECONDS", "AIR_TEMP", "TRACK_TEMP", "HUMIDITY", "RAIN"],
        );
        let config = AnalysisConfig::default();
        let result = WeatherAnalyser::new(10, &store, &mut cache, &store, &config)
            .run()
            .unwrap()
            .unwrap();

        let WeatherAnalysis::Correlated(analysis) = &result.analysis else {
            panic!("Expected correlated analysis");
        };
        assert_eq!(analysis.data_points, 6);
        let track_temp_r = analysis.correlations["track_temp_c"];
        assert!((track_temp_r - 1.0).abs() < 1e-9);

        let significant = analysis
            .significant
            .iter()
            .find(|c| c.metric == WeatherMetric::TrackTemp)
            .unwrap();
        assert_eq!(significant.strength, CorrelationStrength::Strong);
        assert!(analysis.interpretation.contains("Higher track temperatures"));

        // Constant channels have no defined correlation and claim nothing
        assert!(!analysis.correlations.contains_key("air_temp_c"));
        assert!(analysis
            .significant
            .iter()
            .all(|c| c.correlation.abs() > config.weather_thresholds.significant_correlation));
    }

    #[test]
    fn test_no_significant_correlation_uses_default_sentence() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = seeded_store(&tmp);
        // Lap times alternate while track temp rises: near-zero correlation
        let lap_times = [90.0, 91.0, 90.0, 91.0, 90.0, 91.0];
        let laps: Vec<Lap> = lap_times
            .iter()
            .enumerate()
            .map(|(i, t)| timed_lap(12, i as u32 + 1, *t, Some(1000 + i as i64 * 100)))
            .collect();
        store.put_race_laps(10, &laps).unwrap();

        let mut cache = analyser_tables(
            weather_rows(6, 1000, &|i| 30.0 + i as f64),
            &["TIME_UTC_SECONDS", "AIR_TEMP", "TRACK_TEMP", "HUMIDITY", "RAIN"],
        );
        let config = AnalysisConfig::default();
        let result = WeatherAnalyser::new(10, &store, &mut cache, &store, &config)
            .run()
            .unwrap()
            .unwrap();

        let WeatherAnalysis::Correlated(analysis) = &result.analysis else {
            panic!("Expected correlated analysis");
        };
        assert!(analysis.significant.is_empty());
        assert!(analysis.interpretation.contains("minimal correlation"));
    }

    #[test]
    fn test_descriptive_fallback_without_timestamps() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = seeded_store(&tmp);
        // Laps carry no start times
        store
            .put_race_laps(
                10,
                &[timed_lap(12, 1, 90.0, None), timed_lap(12, 2, 91.0, None)],
            )
            .unwrap();

        let rows = vec![
            vec!["21.0".to_string(), "31.0".to_string(), "55.0".to_string(), "0".to_string()],
            vec!["22.0".to_string(), "33.0".to_string(), "53.0".to_string(), "0".to_string()],
        ];
        let mut cache = analyser_tables(rows, &["AIR_TEMP", "TRACK_TEMP", "HUMIDITY", "RAIN"]);
        let config = AnalysisConfig::default();
        let result = WeatherAnalyser::new(10, &store, &mut cache, &store, &config)
            .run()
            .unwrap()
            .unwrap();

        let WeatherAnalysis::Descriptive(summary) = &result.analysis else {
            panic!("Expected descriptive fallback, not correlation output");
        };
        assert_eq!(summary.data_points, 2);
        assert_eq!(summary.air_temp.as_ref().unwrap().mean, 21.5);
        assert_eq!(summary.rain_events, 0);
        assert!(summary.interpretation.contains("No rain was detected"));
        assert!(summary.interpretation.contains("Air temperature averaged 21.5"));
    }

    #[test]
    fn test_missing_weather_table_still_reports_laps() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = seeded_store(&tmp);
        store
            .put_race_laps(
                10,
                &[timed_lap(12, 1, 90.0, None), timed_lap(12, 2, 91.0, None)],
            )
            .unwrap();

        let mut cache = TableCache::new(MapTableReader {
            tables: HashMap::new(),
        });
        let config = AnalysisConfig::default();
        let result = WeatherAnalyser::new(10, &store, &mut cache, &store, &config)
            .run()
            .unwrap()
            .unwrap();

        let WeatherAnalysis::Descriptive(summary) = &result.analysis else {
            panic!("Expected descriptive fallback");
        };
        assert_eq!(summary.interpretation, "No weather data available.");
        assert!(result.conditions.is_none());
        assert!(result.best_performer.is_some());
    }

    #[test]
    fn test_no_lap_data_yields_none() {
        let tmp = tempfile::tempdir().unwrap();
        let store = seeded_store(&tmp);
        let mut cache = TableCache::new(MapTableReader {
            tables: HashMap::new(),
        });
        let config = AnalysisConfig::default();
        let result = WeatherAnalyser::new(10, &store, &mut cache, &store, &config)
            .run()
            .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_best_performer_ranking() {
        let laps = vec![
            timed_lap(12, 1, 92.0, None),
            timed_lap(12, 2, 92.4, None),
            timed_lap(7, 1, 90.0, None),
            timed_lap(7, 2, 90.2, None),
            timed_lap(7, 3, 90.1, None),
        ];
        let best = identify_best_performer(&laps).unwrap();
        assert_eq!(best.vehicle_id, 7);
        assert_eq!(best.lap_count, 3);
        assert!((best.avg_lap_time_s - 90.1).abs() < 1e-9);
        assert_eq!(best.best_lap_time_s, 90.0);
        assert!(best.consistency_score > 9.0);
        assert!(best.summary.contains("average lap time of 90.100s"));
    }

    #[test]
    fn test_nearest_alignment_picks_closest_sample() {
        let laps = vec![
            timed_lap(12, 1, 90.0, Some(1000)),
            timed_lap(12, 2, 91.0, Some(1250)),
        ];
        let weather = vec![
            WeatherSample {
                timestamp_ms: Some(990_000),
                track_temp_c: Some(30.0),
                ..WeatherSample::default()
            },
            WeatherSample {
                timestamp_ms: Some(1_300_000),
                track_temp_c: Some(35.0),
                ..WeatherSample::default()
            },
        ];
        let aligned = align_nearest(&laps, &weather);
        assert_eq!(aligned.len(), 2);
        assert_eq!(aligned[0].1.track_temp_c, Some(30.0));
        // 1250s is closer to the 1300s sample than the 990s one
        assert_eq!(aligned[1].1.track_temp_c, Some(35.0));
    }
}
