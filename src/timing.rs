// Parsing of heterogeneous time representations into canonical milliseconds

use chrono::{DateTime, NaiveDateTime, NaiveTime, Timelike};

/// Bare numeric values at or above this are assumed to already be in
/// milliseconds rather than seconds. Known ambiguity: a genuinely long
/// stint expressed in seconds (e.g. a 1050s endurance run) is
/// misclassified as 1050ms. The upstream timing exports never emit
/// second values this large for a single section, so the heuristic is
/// kept as-is rather than guessed around.
const ALREADY_MS_THRESHOLD: f64 = 1000.0;

/// Parse a lap or section time value into integer milliseconds.
///
/// Accepted shapes:
/// - bare numeric, assumed seconds (`"45.123"` -> 45123) unless the value
///   is >= 1000, in which case it is taken as already-milliseconds
/// - `M:SS[.mmm]` (`"1:23.456"` -> 83456)
/// - `H:MM:SS[.mmm]` (`"1:02:03.500"` -> 3723500)
///
/// Returns `None` for empty, whitespace, NaN or otherwise unparseable
/// input. Never panics; callers decide whether to skip the record.
pub fn parse_time_ms(raw: &str) -> Option<i64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if trimmed.contains(':') {
        return parse_clock_format(trimmed);
    }

    let seconds: f64 = trimmed.parse().ok()?;
    if seconds.is_nan() || seconds.is_infinite() {
        return None;
    }
    if seconds >= ALREADY_MS_THRESHOLD {
        Some(seconds.round() as i64)
    } else {
        Some((seconds * 1000.0).round() as i64)
    }
}

fn parse_clock_format(value: &str) -> Option<i64> {
    let parts: Vec<&str> = value.split(':').collect();
    let total_seconds = match parts.as_slice() {
        [minutes, seconds] => {
            let minutes: i64 = minutes.trim().parse().ok()?;
            let seconds: f64 = seconds.trim().parse().ok()?;
            if seconds.is_nan() {
                return None;
            }
            minutes as f64 * 60.0 + seconds
        }
        [hours, minutes, seconds] => {
            let hours: i64 = hours.trim().parse().ok()?;
            let minutes: i64 = minutes.trim().parse().ok()?;
            let seconds: f64 = seconds.trim().parse().ok()?;
            if seconds.is_nan() {
                return None;
            }
            hours as f64 * 3600.0 + minutes as f64 * 60.0 + seconds
        }
        _ => return None,
    };
    Some((total_seconds * 1000.0).round() as i64)
}

/// Parse a weather or lap-start timestamp into epoch (or day-relative)
/// milliseconds suitable for nearest-neighbour alignment.
///
/// Absolute formats produce epoch milliseconds; a bare `H:MM:SS` time of
/// day produces milliseconds since midnight. Alignment only needs a
/// consistent axis within one race, so mixing is fine as long as the lap
/// and weather tables use the same convention (they do in the exports).
pub fn parse_timestamp_ms(raw: &str) -> Option<i64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    // Epoch seconds, the shape of TIME_UTC_SECONDS columns
    if let Ok(epoch_seconds) = trimmed.parse::<f64>() {
        if epoch_seconds.is_nan() || epoch_seconds.is_infinite() {
            return None;
        }
        return Some((epoch_seconds * 1000.0).round() as i64);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.timestamp_millis());
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%d/%m/%Y %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(dt.and_utc().timestamp_millis());
        }
    }
    if let Ok(time) = NaiveTime::parse_from_str(trimmed, "%H:%M:%S%.f") {
        let ms_of_day = time.num_seconds_from_midnight() as i64 * 1000
            + (time.nanosecond() / 1_000_000) as i64;
        return Some(ms_of_day);
    }

    None
}

/// Convert milliseconds to seconds for display and statistics.
pub fn ms_to_seconds(ms: i64) -> f64 {
    ms as f64 / 1000.0
}
