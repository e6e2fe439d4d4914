//! # apimetrics - usage analytics for cloud management API logs
//!
//! This library turns raw API request logs and webhook delivery logs into
//! metrics reports: success rates broken down by actor, client agent,
//! operation, source address, hour and day, plus per-agent profiles and
//! anomaly findings.
//!
//! ## Architecture
//!
//! - `metrics`: the aggregation engine (normalize, group, enrich, profile,
//!   summarize, detect, assemble) and report writers
//! - `config`: thresholds and engine settings, YAML-backed
//! - `config_loader`: configuration file loading and CLI overrides
//!
//! ## Example
//!
//! ```no_run
//! use apimetrics::config::Config;
//! use apimetrics::metrics::{build_metrics_report, parse_request_records, Roster};
//!
//! # fn main() -> color_eyre::Result<()> {
//! let value = serde_json::from_str(r#"[{"operationId": "getX", "responseCode": 200}]"#)?;
//! let records = parse_request_records(value)?;
//!
//! let config = Config::default();
//! let report = build_metrics_report(
//!     &records,
//!     &Roster::empty(),
//!     config.catalog_source().as_ref(),
//!     &config.engine_settings()?,
//! );
//! println!("{} operations", report.operations.len());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod config_loader;
pub mod metrics;
