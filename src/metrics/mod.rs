//! Metrics aggregation for API request and webhook delivery logs.
//!
//! Turns a batch of flat log records into a multi-dimensional report:
//! success/failure counts by actor, agent, operation, address and time bucket,
//! per-agent profiles, cross-agent leaderboards and anomaly findings.

pub mod types;
pub mod input;
pub mod normalize;
pub mod grouping;
pub mod catalog;
pub mod enrich;
pub mod profile;
pub mod summary;
pub mod anomaly;
pub mod assembler;
pub mod webhook;
pub mod report;

pub use types::*;
pub use input::{parse_delivery_records, parse_request_records, parse_roster, InputShapeError};
pub use normalize::TimeBasis;
pub use catalog::{CatalogSource, OperationCatalog};
pub use enrich::Roster;
pub use assembler::{build_metrics_report, EngineSettings};
pub use webhook::build_webhook_metrics;
pub use report::{generate_json_report, generate_text_report, generate_webhook_text_report};
