use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::utils::error::{AppError, AppResult};

/// What the offline pipeline accumulates per packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// `size_bytes * 8` per packet, exported as bits per second
    #[default]
    Bits,
    /// `1` per packet, exported as packets per second
    Packets,
}

impl Metric {
    /// Suffix of the exported column names
    pub fn column_suffix(&self) -> &'static str {
        match self {
            Metric::Bits => "bps",
            Metric::Packets => "pps",
        }
    }
}

/// Offline analysis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    /// Window width in seconds
    pub interval: f64,

    /// Unit accumulated per packet
    pub metric: Metric,

    /// Where the bandwidth table is written
    pub output: PathBuf,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            interval: 0.1,
            metric: Metric::Bits,
            output: PathBuf::from("bandwidth_usage.csv"),
        }
    }
}

impl AnalyzerConfig {
    pub fn validate(&self) -> AppResult<()> {
        validate_interval(self.interval)
    }
}

/// Live monitoring configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Delay between the end of one sampling cycle and the start of the next
    pub sample_period: Duration,

    /// Duration of each active bandwidth probe
    pub probe_duration: Duration,

    /// Wait between starting a responder and issuing the bandwidth probe
    pub settle_delay: Duration,

    /// Wait between the bandwidth and the latency probe of one pair
    pub probe_gap: Duration,

    /// Upper bound on probe pairs measured per cycle, chosen at random
    pub max_probe_pairs: Option<usize>,

    /// Upper bound on samples kept per history, oldest dropped first
    pub history_limit: Option<usize>,

    /// Map `(a, b)` and `(b, a)` to the same link
    pub canonical_links: bool,

    /// Directory receiving the persisted records
    pub output_directory: PathBuf,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            sample_period: Duration::from_secs(5),
            probe_duration: Duration::from_secs(2),
            settle_delay: Duration::from_millis(500),
            probe_gap: Duration::from_millis(500),
            max_probe_pairs: None,
            history_limit: None,
            canonical_links: false,
            output_directory: PathBuf::from("network_stats"),
        }
    }
}

impl MonitorConfig {
    pub fn validate(&self) -> AppResult<()> {
        if self.sample_period.is_zero() {
            return Err(AppError::ConfigError(
                "sample period must be positive".to_string(),
            ));
        }
        if self.probe_duration.is_zero() {
            return Err(AppError::ConfigError(
                "probe duration must be positive".to_string(),
            ));
        }
        if self.max_probe_pairs == Some(0) {
            return Err(AppError::ConfigError(
                "max probe pairs must be at least 1 when set".to_string(),
            ));
        }
        if self.history_limit == Some(0) {
            return Err(AppError::ConfigError(
                "history limit must be at least 1 when set".to_string(),
            ));
        }
        Ok(())
    }
}

/// Application configuration for the `monitor` command
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Port for the control API
    pub port: u16,

    /// Sampling loop settings
    pub monitor: MonitorConfig,
}

/// Check a window width given in seconds
pub fn validate_interval(interval: f64) -> AppResult<()> {
    if !interval.is_finite() || interval <= 0.0 {
        return Err(AppError::ConfigError(format!(
            "interval must be a positive number of seconds, got {}",
            interval
        )));
    }
    Ok(())
}
