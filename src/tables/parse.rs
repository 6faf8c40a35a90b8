// Row parsing: raw tables into typed laps and weather samples

use std::collections::BTreeMap;

use log::warn;

use crate::model::{Lap, RaceId, SectionTime, VehicleId, WeatherSample};
use crate::tables::schema::{SectionSchema, WeatherSchema};
use crate::tables::RawTable;
use crate::timing::{parse_time_ms, parse_timestamp_ms};

/// Parse a section-timing table into laps, grouped by (vehicle, lap).
///
/// Rows with an unparseable lap number are skipped with a warning; when
/// a (vehicle, lap) pair appears more than once only the first row is
/// used, matching the export's repeated-row quirk. Lap time falls back
/// to the sum of parsed section times when the export has no lap-time
/// column.
pub fn parse_laps(race_id: RaceId, table: &RawTable, schema: &SectionSchema) -> Vec<Lap> {
    let mut grouped: BTreeMap<(VehicleId, u32), &Vec<String>> = BTreeMap::new();

    for row in &table.rows {
        let Some(lap_number) = RawTable::cell(row, schema.lap_number).and_then(parse_count) else {
            warn!("Skipping row with unparseable lap number: {:?}", row.first());
            continue;
        };
        let vehicle_id = schema
            .vehicle
            .and_then(|idx| RawTable::cell(row, idx))
            .and_then(parse_count)
            .unwrap_or(0);

        grouped.entry((vehicle_id, lap_number)).or_insert(row);
    }

    let mut laps = Vec::with_capacity(grouped.len());
    for ((vehicle_id, lap_number), row) in grouped {
        let sections: Vec<SectionTime> = schema
            .sections
            .iter()
            .filter_map(|column| {
                let time_ms = RawTable::cell(row, column.index).and_then(parse_time_ms)?;
                (time_ms > 0).then(|| SectionTime {
                    section_name: column.section_name.clone(),
                    section_order: column.section_order,
                    time_ms,
                })
            })
            .collect();

        let lap_time_ms = schema
            .lap_time
            .and_then(|idx| RawTable::cell(row, idx))
            .and_then(parse_time_ms)
            .filter(|&ms| ms > 0)
            .or_else(|| {
                // No lap-time column: total the sections instead
                (!sections.is_empty()).then(|| sections.iter().map(|s| s.time_ms).sum())
            });

        let lap_start_time_ms = schema
            .lap_start_time
            .and_then(|idx| RawTable::cell(row, idx))
            .and_then(parse_timestamp_ms);

        laps.push(Lap {
            race_id,
            vehicle_id,
            lap_number,
            lap_time_ms,
            is_valid: true,
            lap_start_time_ms,
            sections,
        });
    }

    laps
}

/// Parse a weather table into samples. Unparseable cells become `None`
/// for that channel; a fully empty row is dropped.
pub fn parse_weather(table: &RawTable, schema: &WeatherSchema) -> Vec<WeatherSample> {
    let mut samples = Vec::with_capacity(table.rows.len());

    for row in &table.rows {
        let sample = WeatherSample {
            timestamp_ms: schema
                .timestamp
                .and_then(|idx| RawTable::cell(row, idx))
                .and_then(parse_timestamp_ms),
            air_temp_c: metric(row, schema.air_temp),
            track_temp_c: metric(row, schema.track_temp),
            humidity_pct: metric(row, schema.humidity),
            wind_speed_kph: metric(row, schema.wind_speed),
            wind_direction_deg: metric(row, schema.wind_direction),
            rain: metric(row, schema.rain).map(|v| v.round() as i64),
        };

        if sample != WeatherSample::default() {
            samples.push(sample);
        }
    }

    samples
}

fn metric(row: &[String], column: Option<usize>) -> Option<f64> {
    let value: f64 = RawTable::cell(row, column?)?.parse().ok()?;
    value.is_finite().then_some(value)
}

fn parse_count(value: &str) -> Option<u32> {
    // Exports sometimes render integers as "12.0"
    let parsed: f64 = value.trim().parse().ok()?;
    (parsed.is_finite() && parsed >= 0.0).then_some(parsed.round() as u32)
}
