// Analysis configuration: every threshold and weight used by the pipeline

use serde::{Deserialize, Serialize};

use crate::errors::DeltabestError;

const CONFIG_FILE_NAME: &str = "analysis.json";

/// Thresholds for KPI extraction from telemetry.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct KpiThresholds {
    /// Brake pressure fraction that marks the braking point
    pub brake_pressure: f64,
    /// Throttle fraction that marks the throttle-application point
    pub throttle_application: f64,
    /// Minimum brake pressure to count as "on brake"
    pub time_on_brake: f64,
}

impl Default for KpiThresholds {
    fn default() -> Self {
        Self {
            brake_pressure: 0.8,
            throttle_application: 0.9,
            time_on_brake: 0.1,
        }
    }
}

/// Fixed point contributions and trigger levels for the section impact
/// score. Delta sign convention: driver minus composite.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ImpactScores {
    /// Apex speed delta below this (kph) triggers the apex contribution
    pub apex_speed_delta_kph: f64,
    pub apex_speed_impact: f64,
    /// Braking point delta below this (m) counts as braking too early
    pub braking_point_early_m: f64,
    pub braking_point_early_impact: f64,
    /// Braking point delta above this (m) counts as braking too late
    pub braking_point_late_m: f64,
    pub braking_point_late_impact: f64,
    /// Throttle-on point delta above this (m) counts as throttle too late
    pub throttle_point_late_m: f64,
    pub throttle_point_impact: f64,
    /// Continuous term: points per second of absolute section time delta
    pub time_delta_multiplier: f64,
}

impl Default for ImpactScores {
    fn default() -> Self {
        Self {
            apex_speed_delta_kph: -2.0,
            apex_speed_impact: 10.0,
            braking_point_early_m: -5.0,
            braking_point_early_impact: 8.0,
            braking_point_late_m: 5.0,
            braking_point_late_impact: 8.0,
            throttle_point_late_m: 5.0,
            throttle_point_impact: 7.0,
            time_delta_multiplier: 20.0,
        }
    }
}

/// Trigger levels for the templated coaching sentences.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct RecommendationThresholds {
    pub braking_point_late_m: f64,
    pub braking_point_early_m: f64,
    pub apex_speed_slower_kph: f64,
    pub throttle_point_late_m: f64,
    pub time_on_throttle_less_pct: f64,
    /// Minimum time loss before the generic fallback recommendation fires
    pub min_time_delta_for_general_rec_ms: i64,
}

impl Default for RecommendationThresholds {
    fn default() -> Self {
        Self {
            braking_point_late_m: 5.0,
            braking_point_early_m: -5.0,
            apex_speed_slower_kph: -2.0,
            throttle_point_late_m: 5.0,
            time_on_throttle_less_pct: -5.0,
            min_time_delta_for_general_rec_ms: 100,
        }
    }
}

/// Correlation magnitude levels for the weather analysis.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct WeatherThresholds {
    pub significant_correlation: f64,
    pub strong_correlation: f64,
}

impl Default for WeatherThresholds {
    fn default() -> Self {
        Self {
            significant_correlation: 0.3,
            strong_correlation: 0.5,
        }
    }
}

/// Scoring constants for the pattern/consistency analysis.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PatternScores {
    /// Points of consistency score lost per second of lap-time std dev
    pub consistency_std_multiplier: f64,
    /// Half-mean difference (s) beyond which a trend counts as a change
    pub trend_epsilon_s: f64,
    /// Section std dev (s) below which consistency is classified high
    pub section_consistency_high_std: f64,
    /// Section std dev (s) below which consistency is classified moderate
    pub section_consistency_moderate_std: f64,
    /// Consistency score at or above which the trend summary reads improving
    pub consistency_trend_improving_score: f64,
}

impl Default for PatternScores {
    fn default() -> Self {
        Self {
            consistency_std_multiplier: 5.0,
            trend_epsilon_s: 0.1,
            section_consistency_high_std: 0.1,
            section_consistency_moderate_std: 0.3,
            consistency_trend_improving_score: 7.0,
        }
    }
}

/// General analysis parameters.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AnalysisParams {
    /// Laps required before any pattern output is produced
    pub min_laps_for_pattern: usize,
    /// Laps required before a trend classification is attempted
    pub min_laps_for_trend: usize,
}

impl Default for AnalysisParams {
    fn default() -> Self {
        Self {
            min_laps_for_pattern: 2,
            min_laps_for_trend: 3,
        }
    }
}

/// Full analysis configuration, persisted as JSON in the platform config
/// directory. Missing file means defaults; a saved file overrides them.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct AnalysisConfig {
    pub kpi_thresholds: KpiThresholds,
    pub impact_scores: ImpactScores,
    pub recommendation_thresholds: RecommendationThresholds,
    pub weather_thresholds: WeatherThresholds,
    pub pattern_scores: PatternScores,
    pub analysis_params: AnalysisParams,
}

impl AnalysisConfig {
    pub fn from_local_file() -> Option<Self> {
        let config_path = dirs::config_dir()?.join("deltabest").join(CONFIG_FILE_NAME);

        if config_path.exists() {
            let file = std::fs::File::open(config_path).ok()?;
            serde_json::from_reader(file).ok()
        } else {
            None
        }
    }

    pub fn save(&self) -> Result<(), DeltabestError> {
        let config_path = dirs::config_dir()
            .ok_or(DeltabestError::NoConfigDir)?
            .join("deltabest")
            .join(CONFIG_FILE_NAME);

        if !config_path.exists() {
            std::fs::create_dir_all(config_path.parent().unwrap())
                .map_err(|e| DeltabestError::ConfigIoError { source: e })?;
        }

        let file = std::fs::File::create(config_path)
            .map_err(|e| DeltabestError::ConfigIoError { source: e })?;
        serde_json::to_writer_pretty(file, self)
            .map_err(|e| DeltabestError::ConfigSerializeError { source: e })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_round_trip_through_json() {
        let config = AnalysisConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: AnalysisConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.impact_scores.time_delta_multiplier, 20.0);
        assert_eq!(parsed.weather_thresholds.significant_correlation, 0.3);
        assert_eq!(parsed.analysis_params.min_laps_for_pattern, 2);
    }
}
