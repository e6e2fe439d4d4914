//! Engine configuration.
//!
//! Every field has a default, so an empty YAML document (or no file at all)
//! yields the stock thresholds.

use std::path::PathBuf;
use std::time::Duration;

use chrono::FixedOffset;
use serde::{Deserialize, Serialize};

use crate::metrics::assembler::EngineSettings;
use crate::metrics::catalog::{CatalogSource, FileCatalog, HttpCatalog, NoCatalog, DEFAULT_CATALOG_URL};
use crate::metrics::normalize::TimeBasis;
use crate::metrics::summary::DEFAULT_TOP_N;

const MAX_BURST_WINDOW: Duration = Duration::from_secs(3600);

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub thresholds: Thresholds,
    pub summary: SummaryConfig,
    pub time: TimeConfig,
    pub catalog: CatalogConfig,
}

/// Anomaly detection thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Entries with a success rate strictly below this percentage are flagged
    pub failure_rate_percent: u32,
    /// Request count above which an address/agent pair or off-peak hour is flagged
    pub traffic: u64,
    pub high_activity_rps: f64,
    /// Per-organization request budget the burst rate is compared against
    pub rate_limit_rps: f64,
    #[serde(with = "humantime_serde")]
    pub burst_window: Duration,
    pub busiest_hours: usize,
    pub off_peak_start_hour: u32,
    pub off_peak_end_hour: u32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            failure_rate_percent: 50,
            traffic: 500,
            high_activity_rps: 5.0,
            rate_limit_rps: 10.0,
            burst_window: Duration::from_secs(1),
            busiest_hours: 3,
            off_peak_start_hour: 8,
            off_peak_end_hour: 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SummaryConfig {
    pub top_n: usize,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self { top_n: DEFAULT_TOP_N }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeConfig {
    /// Fixed offset such as "+02:00"; system local time when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utc_offset: Option<String>,
}

/// Where the operation catalog comes from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub enabled: bool,
    pub url: String,
    /// Local OpenAPI document, preferred over `url` when set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: DEFAULT_CATALOG_URL.to_string(),
            path: None,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid thresholds: {0}")]
    InvalidThresholds(String),
    #[error("Invalid summary configuration: {0}")]
    InvalidSummary(String),
    #[error("Invalid UTC offset '{0}': expected Z, UTC, +HH:MM or +HHMM")]
    InvalidUtcOffset(String),
    #[error("Invalid catalog configuration: {0}")]
    InvalidCatalog(String),
}

impl Config {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.thresholds.validate()?;

        if self.summary.top_n == 0 {
            return Err(ValidationError::InvalidSummary("top_n must be at least 1".to_string()));
        }

        self.time_basis()?;

        if self.catalog.enabled {
            if self.catalog.path.is_none() && self.catalog.url.trim().is_empty() {
                return Err(ValidationError::InvalidCatalog(
                    "either url or path is required when the catalog is enabled".to_string(),
                ));
            }
            if self.catalog.timeout.is_zero() {
                return Err(ValidationError::InvalidCatalog("timeout must be positive".to_string()));
            }
        }

        Ok(())
    }

    pub fn time_basis(&self) -> Result<TimeBasis, ValidationError> {
        match self.time.utc_offset.as_deref() {
            None => Ok(TimeBasis::SystemLocal),
            Some(raw) => parse_utc_offset(raw)
                .map(TimeBasis::Fixed)
                .ok_or_else(|| ValidationError::InvalidUtcOffset(raw.to_string())),
        }
    }

    pub fn engine_settings(&self) -> Result<EngineSettings, ValidationError> {
        Ok(EngineSettings {
            thresholds: self.thresholds.clone(),
            top_n: self.summary.top_n,
            time_basis: self.time_basis()?,
        })
    }

    pub fn catalog_source(&self) -> Box<dyn CatalogSource> {
        let catalog = &self.catalog;
        if !catalog.enabled {
            return Box::new(NoCatalog);
        }
        match &catalog.path {
            Some(path) => Box::new(FileCatalog { path: path.clone() }),
            None => Box::new(HttpCatalog {
                url: catalog.url.clone(),
                timeout: catalog.timeout,
            }),
        }
    }
}

impl Thresholds {
    fn validate(&self) -> Result<(), ValidationError> {
        let invalid = |msg: &str| -> Result<(), ValidationError> {
            Err(ValidationError::InvalidThresholds(msg.to_string()))
        };

        if self.failure_rate_percent > 100 {
            return invalid("failure_rate_percent must be between 0 and 100");
        }
        if !(self.high_activity_rps > 0.0) {
            return invalid("high_activity_rps must be positive");
        }
        if !(self.rate_limit_rps > 0.0) {
            return invalid("rate_limit_rps must be positive");
        }
        if self.burst_window < Duration::from_millis(1) {
            return invalid("burst_window must be at least 1ms");
        }
        if self.burst_window > MAX_BURST_WINDOW {
            return invalid("burst_window must not exceed 1h");
        }
        if self.off_peak_start_hour > 24 || self.off_peak_end_hour > 24 {
            return invalid("off-peak hours must be within 0..=24");
        }
        if self.off_peak_start_hour >= self.off_peak_end_hour {
            return invalid("off_peak_start_hour must be before off_peak_end_hour");
        }
        Ok(())
    }
}

/// Parse `Z`, `UTC`, `+HH:MM`, `-HH:MM`, `+HHMM` or `+HH` into a fixed offset.
pub fn parse_utc_offset(raw: &str) -> Option<FixedOffset> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("z") || raw.eq_ignore_ascii_case("utc") {
        return FixedOffset::east_opt(0);
    }

    let sign = match raw.chars().next()? {
        '+' => 1,
        '-' => -1,
        _ => return None,
    };
    let digits: String = raw[1..].chars().filter(|c| *c != ':').collect();
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let (hours, minutes) = match digits.len() {
        2 => (digits.parse::<i32>().ok()?, 0),
        4 => (digits[..2].parse::<i32>().ok()?, digits[2..].parse::<i32>().ok()?),
        _ => return None,
    };
    if hours > 23 || minutes > 59 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_gives_defaults() {
        let config: Config = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.thresholds.burst_window, Duration::from_secs(1));
        assert_eq!(config.catalog.timeout, Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_overrides() {
        let yaml = r#"
thresholds:
  failure_rate_percent: 80
  burst_window: 2s
summary:
  top_n: 10
time:
  utc_offset: "-05:00"
catalog:
  enabled: false
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.thresholds.failure_rate_percent, 80);
        assert_eq!(config.thresholds.burst_window, Duration::from_secs(2));
        assert_eq!(config.thresholds.traffic, 500);
        assert_eq!(config.summary.top_n, 10);

        let settings = config.engine_settings().unwrap();
        assert_eq!(
            settings.time_basis,
            TimeBasis::Fixed(FixedOffset::west_opt(5 * 3600).unwrap())
        );
        assert_eq!(config.catalog_source().describe(), NoCatalog.describe());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = Config::default();
        config.summary.top_n = 0;
        assert!(matches!(config.validate(), Err(ValidationError::InvalidSummary(_))));

        let mut config = Config::default();
        config.thresholds.off_peak_start_hour = 20;
        config.thresholds.off_peak_end_hour = 8;
        assert!(matches!(config.validate(), Err(ValidationError::InvalidThresholds(_))));

        let mut config = Config::default();
        config.thresholds.rate_limit_rps = 0.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.thresholds.burst_window = Duration::from_secs(2 * 3600);
        assert!(matches!(config.validate(), Err(ValidationError::InvalidThresholds(_))));
        config.thresholds.burst_window = Duration::from_micros(10);
        assert!(config.validate().is_err());
        config.thresholds.burst_window = Duration::from_secs(3600);
        assert!(config.validate().is_ok());

        let mut config = Config::default();
        config.time.utc_offset = Some("+25:00".to_string());
        assert!(matches!(config.validate(), Err(ValidationError::InvalidUtcOffset(_))));
    }

    #[test]
    fn test_parse_utc_offset() {
        assert_eq!(parse_utc_offset("Z"), FixedOffset::east_opt(0));
        assert_eq!(parse_utc_offset("UTC"), FixedOffset::east_opt(0));
        assert_eq!(parse_utc_offset("+02:00"), FixedOffset::east_opt(7200));
        assert_eq!(parse_utc_offset("+0530"), FixedOffset::east_opt(5 * 3600 + 1800));
        assert_eq!(parse_utc_offset("-08"), FixedOffset::west_opt(8 * 3600));
        assert_eq!(parse_utc_offset("02:00"), None);
        assert_eq!(parse_utc_offset("+2:00"), None);
        assert_eq!(parse_utc_offset("+ab:cd"), None);
    }

    #[test]
    fn test_catalog_source_prefers_path() {
        let mut config = Config::default();
        config.catalog.path = Some(PathBuf::from("/tmp/spec3.json"));
        assert!(config.catalog_source().describe().contains("/tmp/spec3.json"));

        config.catalog.path = None;
        assert!(config.catalog_source().describe().contains(DEFAULT_CATALOG_URL));
    }
}
