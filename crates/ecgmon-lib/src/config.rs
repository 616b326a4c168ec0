use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors raised while loading or validating a [`MonitorConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid config: {field} {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Complete configuration of the monitoring core. Every field has a default, so a partial
/// TOML file only needs to name what differs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Acquisition rate (Hz). The core never resamples; this drives the acquisition period.
    pub sample_rate_hz: f64,
    pub detector: DetectorConfig,
    pub features: FeatureConfig,
    pub rules: RuleThresholds,
    pub query: QueryConfig,
    pub history: HistoryConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: 250.0,
            detector: DetectorConfig::default(),
            features: FeatureConfig::default(),
            rules: RuleThresholds::default(),
            query: QueryConfig::default(),
            history: HistoryConfig::default(),
        }
    }
}

/// Threshold-crossing peak detector parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Raw value a sample must exceed to register as a peak. Static; calibrate per deployment.
    pub amplitude_threshold: i64,
    /// Refractory guard: intervals must be strictly longer than this (seconds).
    pub min_rr_gap_s: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            amplitude_threshold: 15_000,
            min_rr_gap_s: 0.25,
        }
    }
}

/// Rolling feature windows and the heuristic morphology proxies fed into them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    pub rr_capacity: usize,
    /// Statistics stay undefined until the window holds more than this many entries.
    pub rr_warmup: usize,
    pub qrs_capacity: usize,
    pub qrs_warmup: usize,
    pub qt_capacity: usize,
    pub qt_warmup: usize,
    /// QRS-width proxy intercept (seconds). Heuristic, needs calibration.
    pub qrs_base_width_s: f64,
    /// Divisor applied to |amplitude - threshold| for the QRS-width proxy. Heuristic.
    pub qrs_amplitude_scale: f64,
    /// QT proxy as a fraction of the RR interval. Heuristic.
    pub qt_ratio: f64,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            rr_capacity: 60,
            rr_warmup: 6,
            qrs_capacity: 30,
            qrs_warmup: 5,
            qt_capacity: 30,
            qt_warmup: 5,
            qrs_base_width_s: 0.08,
            qrs_amplitude_scale: 100_000.0,
            qt_ratio: 0.45,
        }
    }
}

/// Trigger thresholds for the event rule table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleThresholds {
    pub brady_bpm: u32,
    pub tachy_bpm: u32,
    pub vtach_bpm: u32,
    pub asystole_s: f64,
    pub var_irregular: f64,
    pub var_sinus: f64,
    pub rr_mean_sinus: f64,
    pub rr_mean_avblock: f64,
    pub var_avblock_tight: f64,
    pub qrs_width_bbb: f64,
    pub qt_long: f64,
    pub qt_short: f64,
    /// Early repolarization fires above `amplitude_threshold * st_amplitude_ratio`.
    pub st_amplitude_ratio: f64,
    pub st_max_bpm: u32,
    /// Number of myocarditis markers that must be active together.
    pub myocarditis_min_score: usize,
}

impl Default for RuleThresholds {
    fn default() -> Self {
        Self {
            brady_bpm: 50,
            tachy_bpm: 100,
            vtach_bpm: 150,
            asystole_s: 3.5,
            var_irregular: 0.02,
            var_sinus: 0.03,
            rr_mean_sinus: 1.2,
            rr_mean_avblock: 1.0,
            var_avblock_tight: 0.005,
            qrs_width_bbb: 0.14,
            qt_long: 0.48,
            qt_short: 0.32,
            st_amplitude_ratio: 1.25,
            st_max_bpm: 100,
            myocarditis_min_score: 2,
        }
    }
}

/// Sizes of the display-ready views.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Trailing moving-average window for the smoothed series.
    pub smoothing_window: usize,
    /// Smoothed points returned by the live view.
    pub ecg_points: usize,
    /// BPM points returned by the live view.
    pub bpm_points: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            smoothing_window: 5,
            ecg_points: 1000,
            bpm_points: 300,
        }
    }
}

/// Optional caps on retained history; `None` keeps everything until reset.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub max_samples: Option<usize>,
    pub max_bpm_samples: Option<usize>,
}

impl MonitorConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: MonitorConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Sampling period of the acquisition loop (seconds).
    pub fn sample_period_s(&self) -> f64 {
        1.0 / self.sample_rate_hz
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.sample_rate_hz.is_finite() || self.sample_rate_hz <= 0.0 {
            return Err(ConfigError::invalid(
                "sample_rate_hz",
                format!("must be positive, got {}", self.sample_rate_hz),
            ));
        }
        non_negative("detector.min_rr_gap_s", self.detector.min_rr_gap_s)?;

        let f = &self.features;
        window("features.rr", f.rr_capacity, f.rr_warmup)?;
        window("features.qrs", f.qrs_capacity, f.qrs_warmup)?;
        window("features.qt", f.qt_capacity, f.qt_warmup)?;
        non_negative("features.qrs_base_width_s", f.qrs_base_width_s)?;
        if !f.qrs_amplitude_scale.is_finite() || f.qrs_amplitude_scale <= 0.0 {
            return Err(ConfigError::invalid(
                "features.qrs_amplitude_scale",
                "must be positive",
            ));
        }
        non_negative("features.qt_ratio", f.qt_ratio)?;

        let r = &self.rules;
        non_negative("rules.asystole_s", r.asystole_s)?;
        for (field, value) in [
            ("rules.var_irregular", r.var_irregular),
            ("rules.var_sinus", r.var_sinus),
            ("rules.rr_mean_sinus", r.rr_mean_sinus),
            ("rules.rr_mean_avblock", r.rr_mean_avblock),
            ("rules.var_avblock_tight", r.var_avblock_tight),
            ("rules.qrs_width_bbb", r.qrs_width_bbb),
            ("rules.qt_long", r.qt_long),
            ("rules.qt_short", r.qt_short),
            ("rules.st_amplitude_ratio", r.st_amplitude_ratio),
        ] {
            if !value.is_finite() {
                return Err(ConfigError::invalid(field, "must be finite"));
            }
        }

        if self.query.smoothing_window == 0 {
            return Err(ConfigError::invalid(
                "query.smoothing_window",
                "must be at least 1",
            ));
        }
        if self.history.max_samples == Some(0) {
            return Err(ConfigError::invalid(
                "history.max_samples",
                "must be at least 1 when set",
            ));
        }
        if self.history.max_bpm_samples == Some(0) {
            return Err(ConfigError::invalid(
                "history.max_bpm_samples",
                "must be at least 1 when set",
            ));
        }
        Ok(())
    }
}

fn non_negative(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ConfigError::invalid(
            field,
            format!("must be a non-negative number, got {}", value),
        ));
    }
    Ok(())
}

fn window(field: &'static str, capacity: usize, warmup: usize) -> Result<(), ConfigError> {
    if capacity == 0 {
        return Err(ConfigError::invalid(field, "capacity must be at least 1"));
    }
    if warmup >= capacity {
        return Err(ConfigError::invalid(
            field,
            format!("warm-up {} must be below capacity {}", warmup, capacity),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        MonitorConfig::default().validate().expect("defaults are valid");
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg = MonitorConfig::from_toml_str(
            r#"
            sample_rate_hz = 500.0

            [detector]
            amplitude_threshold = 900

            [rules]
            brady_bpm = 45
            "#,
        )
        .expect("parse");
        assert_eq!(cfg.sample_rate_hz, 500.0);
        assert_eq!(cfg.detector.amplitude_threshold, 900);
        assert_eq!(cfg.detector.min_rr_gap_s, 0.25);
        assert_eq!(cfg.rules.brady_bpm, 45);
        assert_eq!(cfg.rules.tachy_bpm, 100);
        assert_eq!(cfg.features, FeatureConfig::default());
    }

    #[test]
    fn rejects_warmup_at_capacity() {
        let err = MonitorConfig::from_toml_str(
            r#"
            [features]
            qt_capacity = 5
            qt_warmup = 5
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("features.qt"), "{}", err);
    }

    #[test]
    fn rejects_non_positive_sample_rate() {
        let cfg = MonitorConfig {
            sample_rate_hz: 0.0,
            ..MonitorConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::Invalid {
                field: "sample_rate_hz",
                ..
            })
        ));
    }

    #[test]
    fn toml_output_parses_back() {
        let cfg = MonitorConfig::default();
        let text = cfg.to_toml_string().expect("serialize");
        assert!(text.contains("[rules]"));
        let parsed = MonitorConfig::from_toml_str(&text).expect("parse back");
        assert_eq!(parsed, cfg);
    }
}
