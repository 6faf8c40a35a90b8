// Schema detection for the track-varying table header shapes
//
// The exports share a family of column names but vary per track and
// season. All the header sniffing lives here so the heuristics are
// testable in isolation from the analysis logic.

use crate::errors::DeltabestError;

/// One recognized section timing column.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SectionColumn {
    /// Original header (e.g. "S1")
    pub header: String,
    /// Canonical section name used across the pipeline (e.g. "Section 1")
    pub section_name: String,
    /// 1-based position of the section around the circuit
    pub section_order: u32,
    pub index: usize,
}

/// One recognized intermediate timing column (e.g. "IM1_elapsed").
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IntermediateColumn {
    pub name: String,
    pub index: usize,
}

/// Typed column map for a section-timing table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SectionSchema {
    pub lap_number: usize,
    pub vehicle: Option<usize>,
    pub lap_time: Option<usize>,
    pub lap_start_time: Option<usize>,
    pub sections: Vec<SectionColumn>,
    pub intermediates: Vec<IntermediateColumn>,
}

/// Typed column map for a weather table. Every channel is optional; the
/// stations differ per track.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WeatherSchema {
    pub timestamp: Option<usize>,
    pub air_temp: Option<usize>,
    pub track_temp: Option<usize>,
    pub humidity: Option<usize>,
    pub wind_speed: Option<usize>,
    pub wind_direction: Option<usize>,
    pub rain: Option<usize>,
}

/// Detect the column layout of a section-timing table.
///
/// Requires a lap-number column and at least one of: a section column or
/// a lap-time column. Anything less is reported as an unrecognized
/// schema rather than guessed at.
pub fn detect_section_schema(headers: &[String]) -> Result<SectionSchema, DeltabestError> {
    let mut lap_number = None;
    let mut vehicle = None;
    let mut lap_time = None;
    let mut lap_start_time = None;
    let mut sections = Vec::new();
    let mut intermediates = Vec::new();

    for (index, header) in headers.iter().enumerate() {
        let lower = header.trim().to_lowercase();

        if lower == "lap_number" || lower == "lap" {
            lap_number.get_or_insert(index);
        } else if lower.contains("lap") && lower.contains("time") && !lower.contains("improvement")
        {
            if lower.contains("start") || lower.contains("hour") {
                lap_start_time.get_or_insert(index);
            } else {
                lap_time.get_or_insert(index);
            }
        } else if lower == "hour" || (lower.contains("start") && lower.contains("time")) {
            lap_start_time.get_or_insert(index);
        } else if lower == "number"
            || lower.contains("vehicle")
            || lower.contains("car")
            || lower.contains("driver")
        {
            vehicle.get_or_insert(index);
        } else if is_section_header(&lower) {
            let section_order = lower
                .get(1..)
                .and_then(|digits| digits.parse::<u32>().ok())
                .unwrap_or(sections.len() as u32 + 1);
            sections.push(SectionColumn {
                header: header.trim().to_string(),
                section_name: format!("Section {}", section_order),
                section_order,
                index,
            });
        } else if lower.starts_with("im") && lower.ends_with("_elapsed") {
            intermediates.push(IntermediateColumn {
                name: header.trim().to_string(),
                index,
            });
        }
    }

    let Some(lap_number) = lap_number else {
        return Err(DeltabestError::SchemaNotRecognized {
            table: "sections".to_string(),
            reason: format!("no lap-number column among {:?}", headers),
        });
    };
    if sections.is_empty() && lap_time.is_none() {
        return Err(DeltabestError::SchemaNotRecognized {
            table: "sections".to_string(),
            reason: "neither section columns nor a lap-time column".to_string(),
        });
    }

    sections.sort_by_key(|s| s.section_order);
    Ok(SectionSchema {
        lap_number,
        vehicle,
        lap_time,
        lap_start_time,
        sections,
        intermediates,
    })
}

// Section columns are "S<n>" or anything labelled sector/section.
fn is_section_header(lower: &str) -> bool {
    (lower.len() >= 2
        && lower.starts_with('s')
        && lower[1..].chars().all(|c| c.is_ascii_digit()))
        || lower.contains("sector")
        || lower.contains("section")
}

/// Detect the column layout of a weather table. Errors only when no
/// weather channel at all is recognized.
pub fn detect_weather_schema(headers: &[String]) -> Result<WeatherSchema, DeltabestError> {
    let mut schema = WeatherSchema::default();

    for (index, header) in headers.iter().enumerate() {
        let lower = header.trim().to_lowercase();

        if lower.contains("time") || lower.contains("timestamp") {
            schema.timestamp.get_or_insert(index);
        } else if lower.contains("air") && lower.contains("temp") {
            schema.air_temp.get_or_insert(index);
        } else if lower.contains("track") && lower.contains("temp") {
            schema.track_temp.get_or_insert(index);
        } else if lower.contains("humidity") {
            schema.humidity.get_or_insert(index);
        } else if lower.contains("wind") && lower.contains("speed") {
            schema.wind_speed.get_or_insert(index);
        } else if lower.contains("wind") && (lower.contains("dir") || lower.contains("direction")) {
            schema.wind_direction.get_or_insert(index);
        } else if lower.contains("rain") {
            schema.rain.get_or_insert(index);
        }
    }

    let any_metric = schema.air_temp.is_some()
        || schema.track_temp.is_some()
        || schema.humidity.is_some()
        || schema.wind_speed.is_some()
        || schema.rain.is_some();
    if !any_metric {
        return Err(DeltabestError::SchemaNotRecognized {
            table: "weather".to_string(),
            reason: format!("no weather channels among {:?}", headers),
        });
    }

    Ok(schema)
}
