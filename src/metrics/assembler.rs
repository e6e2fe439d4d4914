//! Report assembly: normalize, group, enrich, profile, summarize, detect.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};

use super::anomaly::detect_anomalies;
use super::catalog::{load_catalog, CatalogSource, OperationCatalog};
use super::enrich::{enrich_actors, enrich_operations, Roster};
use super::grouping::{group_and_count, group_and_count_where, to_sorted_metrics};
use super::normalize::{count_unparseable, normalize_requests, Normalized, TimeBasis};
use super::profile::{agent_key, build_agent_profiles};
use super::summary::{summarize_profiles, DEFAULT_TOP_N};
use super::types::*;
use crate::config::Thresholds;

pub const INVALID_TIMESTAMP: &str = "Invalid timestamp";

/// Everything a report build needs besides the data itself.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub thresholds: Thresholds,
    pub top_n: usize,
    pub time_basis: TimeBasis,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            thresholds: Thresholds::default(),
            top_n: DEFAULT_TOP_N,
            time_basis: TimeBasis::default(),
        }
    }
}

/// Build the metrics report for a batch of API requests.
///
/// Fetches the operation catalog once from `catalog_source`; if that fails the
/// report is still built against an empty catalog.
pub fn build_metrics_report(
    records: &[RequestRecord],
    roster: &Roster,
    catalog_source: &dyn CatalogSource,
    settings: &EngineSettings,
) -> MetricsReport {
    let catalog = load_catalog(catalog_source);
    assemble_report(records, roster, &catalog, settings)
}

/// Build the report against an already-loaded catalog. Pure.
pub fn assemble_report(
    records: &[RequestRecord],
    roster: &Roster,
    catalog: &OperationCatalog,
    settings: &EngineSettings,
) -> MetricsReport {
    log::info!("Building metrics report for {} requests", records.len());
    let normalized = normalize_requests(records, settings.time_basis);

    let actors = to_sorted_metrics(group_and_count(&normalized, |n| {
        DimensionKey::from_field(n.record.actor_id.as_deref())
    }));
    let agents = to_sorted_metrics(group_and_count(&normalized, |n| agent_key(n.record)));
    let operations = to_sorted_metrics(group_and_count(&normalized, |n| {
        DimensionKey::from_field(n.record.operation_id.as_deref())
    }));
    let source_addresses = to_sorted_metrics(group_and_count(&normalized, |n| {
        DimensionKey::from_field(n.record.source_address.as_deref())
    }));
    let busiest_hours = to_sorted_metrics(group_and_count_where(&normalized, |n| {
        n.buckets.as_ref().map(|b| DimensionKey::known(b.hour_key.clone()))
    }));
    let busiest_days = to_sorted_metrics(group_and_count_where(&normalized, |n| {
        n.buckets.as_ref().map(|b| DimensionKey::known(b.day_key.clone()))
    }));

    let actors = enrich_actors(actors, roster);
    let operations = enrich_operations(operations, catalog);

    let deprecated_operations: Vec<OperationMetric> =
        operations.iter().filter(|op| op.deprecated).cloned().collect();
    let beta_operations: Vec<OperationMetric> = operations
        .iter()
        .filter(|op| {
            op.metric
                .name
                .as_known()
                .and_then(|id| catalog.get(id))
                .is_some_and(|entry| entry.is_beta())
        })
        .cloned()
        .collect();

    let applications = build_agent_profiles(&normalized, roster);
    let summary = summarize_profiles(&applications, settings.top_n);

    let mut report = MetricsReport {
        actors,
        agents,
        operations,
        source_addresses,
        busiest_hours,
        busiest_days,
        applications,
        deprecated_operations,
        beta_operations,
        addresses_by_hour: addresses_by_hour(&normalized),
        meta: build_meta(&normalized),
        summary,
        anomalies: Vec::new(),
    };
    report.anomalies = detect_anomalies(&report, &normalized, catalog, &settings.thresholds);

    log::info!(
        "Report built: {} agents, {} operations, {} findings",
        report.applications.len(),
        report.operations.len(),
        report.anomalies.len()
    );
    report
}

/// Hour key -> distinct source addresses, in first-seen order.
pub fn addresses_by_hour(records: &[Normalized<'_, RequestRecord>]) -> BTreeMap<String, Vec<String>> {
    let mut by_hour: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for n in records {
        let Some(buckets) = &n.buckets else {
            continue;
        };
        let address = DimensionKey::from_field(n.record.source_address.as_deref()).to_string();
        let addresses = by_hour.entry(buckets.hour_key.clone()).or_default();
        if !addresses.contains(&address) {
            addresses.push(address);
        }
    }
    by_hour
}

fn iso(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Count, timespan and ISO bounds over the parseable timestamps.
pub fn build_meta<R>(records: &[Normalized<'_, R>]) -> ReportMeta {
    let min = records.iter().filter_map(|n| n.timestamp).min();
    let max = records.iter().filter_map(|n| n.timestamp).max();

    let (timespan_ms, start_time, end_time) = match (min, max) {
        (Some(min), Some(max)) => ((max - min).num_milliseconds(), iso(min), iso(max)),
        _ => (0, INVALID_TIMESTAMP.to_string(), INVALID_TIMESTAMP.to_string()),
    };

    ReportMeta {
        count: records.len(),
        timespan_ms,
        start_time,
        end_time,
        unparseable_timestamps: count_unparseable(records),
    }
}
