//! Rule-based anomaly detection over a finished report.
//!
//! Rules run in a fixed order and never mutate the report. Within a rule,
//! findings follow the order of the dimension the rule reads.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

use super::catalog::OperationCatalog;
use super::normalize::{hour_label, Normalized};
use super::profile::agent_key;
use super::types::*;
use crate::config::Thresholds;

/// Query parameters the API uses for cursor pagination
static PAGINATION_PARAM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|[?&])(?:perPage|startingAfter|endingBefore)=").expect("Invalid pagination regex")
});

/// First device/network scope word in an operation id
static SCOPE_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)device|network").expect("Invalid scope regex"));

const MAX_AGENT_LABEL: usize = 40;

/// Shorten long user-agent strings for entity names.
pub fn truncate_user_agent(user_agent: &str) -> String {
    if user_agent.chars().count() > MAX_AGENT_LABEL {
        let head: String = user_agent.chars().take(MAX_AGENT_LABEL).collect();
        format!("{}...", head)
    } else {
        user_agent.to_string()
    }
}

/// Run every rule against the report and the batch it was built from.
pub fn detect_anomalies(
    report: &MetricsReport,
    records: &[Normalized<'_, RequestRecord>],
    catalog: &OperationCatalog,
    thresholds: &Thresholds,
) -> Vec<AnomalyFinding> {
    let mut findings = Vec::new();

    findings.extend(high_failure_rate(report, thresholds));
    findings.extend(deprecated_operations(report, catalog));
    findings.extend(beta_operations(report, catalog));
    findings.extend(high_traffic(records, thresholds));
    findings.extend(high_activity(report, records, catalog, thresholds));
    findings.extend(busiest_hours(report, records, thresholds));
    findings.extend(off_peak_activity(report, thresholds));

    if findings.iter().all(|f| f.kind().is_informational()) {
        findings.push(AnomalyFinding::new(EntityType::System, "All", Anomaly::NoAnomalies {}));
    }

    log::debug!("Anomaly detection produced {} findings", findings.len());
    findings
}

pub fn high_failure_rate(report: &MetricsReport, thresholds: &Thresholds) -> Vec<AnomalyFinding> {
    let labels: HashMap<&DimensionKey, &ActorLabel> = report
        .actors
        .iter()
        .map(|a| (&a.metric.name, &a.display_label))
        .collect();

    let mut findings = Vec::new();
    for (dimension, metrics) in report.dimensions() {
        for metric in metrics {
            if !metric.counts.is_below_rate(thresholds.failure_rate_percent) {
                continue;
            }
            let display_label = match dimension {
                Dimension::Actor => labels
                    .get(&metric.name)
                    .filter(|l| l.is_rostered())
                    .map(|l| l.to_string()),
                _ => None,
            };
            findings.push(AnomalyFinding::new(
                dimension.into(),
                metric.name.to_string(),
                Anomaly::HighFailureRate {
                    success_rate: metric.success_rate,
                    threshold_percent: thresholds.failure_rate_percent,
                    success: metric.counts.success,
                    failure: metric.counts.failure,
                    display_label,
                },
            ));
        }
    }
    findings
}

/// Agents whose profile includes `operation`, in profile order.
fn agents_for_operation(report: &MetricsReport, operation: &DimensionKey) -> Vec<String> {
    report
        .applications
        .iter()
        .filter(|p| p.operations.iter().any(|op| &op.name == operation))
        .map(|p| p.user_agent.to_string())
        .collect()
}

fn agents_for_hour(report: &MetricsReport, hour: &DimensionKey) -> Vec<String> {
    report
        .applications
        .iter()
        .filter(|p| p.hourly_activity.iter().any(|h| &h.name == hour))
        .map(|p| p.user_agent.to_string())
        .collect()
}

/// Observed operations whose catalog entry is deprecated.
pub fn deprecated_operations(report: &MetricsReport, catalog: &OperationCatalog) -> Vec<AnomalyFinding> {
    report
        .operations
        .iter()
        .filter(|op| op.metric.total() > 0)
        .filter_map(|op| {
            let entry = catalog.get(op.metric.name.as_known()?)?;
            entry.deprecated.then(|| {
                AnomalyFinding::new(
                    EntityType::Operation,
                    op.metric.name.to_string(),
                    Anomaly::DeprecatedOperation {
                        description: entry.description.clone(),
                        user_agents: agents_for_operation(report, &op.metric.name),
                    },
                )
            })
        })
        .collect()
}

/// Observed operations tagged `beta` in the catalog.
pub fn beta_operations(report: &MetricsReport, catalog: &OperationCatalog) -> Vec<AnomalyFinding> {
    report
        .operations
        .iter()
        .filter(|op| op.metric.total() > 0)
        .filter_map(|op| {
            let entry = catalog.get(op.metric.name.as_known()?)?;
            entry.is_beta().then(|| {
                AnomalyFinding::new(
                    EntityType::Operation,
                    op.metric.name.to_string(),
                    Anomaly::BetaOperation {
                        description: entry.description.clone(),
                        user_agents: agents_for_operation(report, &op.metric.name),
                    },
                )
            })
        })
        .collect()
}

/// (source address, user agent) pairs above the traffic threshold, busiest first.
pub fn high_traffic(records: &[Normalized<'_, RequestRecord>], thresholds: &Thresholds) -> Vec<AnomalyFinding> {
    let mut index: HashMap<(DimensionKey, DimensionKey), usize> = HashMap::new();
    let mut pairs: Vec<((DimensionKey, DimensionKey), CountBucket)> = Vec::new();

    for n in records {
        let key = (
            DimensionKey::from_field(n.record.source_address.as_deref()),
            agent_key(n.record),
        );
        let idx = *index.entry(key.clone()).or_insert_with(|| {
            pairs.push((key, CountBucket::default()));
            pairs.len() - 1
        });
        pairs[idx].1.record(n.is_success);
    }

    pairs.sort_by(|a, b| b.1.total().cmp(&a.1.total()));

    pairs
        .into_iter()
        .filter(|(_, counts)| counts.total() > thresholds.traffic)
        .map(|((address, agent), counts)| {
            let address = address.to_string();
            let agent = truncate_user_agent(&agent.to_string());
            AnomalyFinding::new(
                EntityType::IpUserAgent,
                format!("{}|{}", address, agent),
                Anomaly::HighTraffic {
                    source_address: address,
                    user_agent: agent,
                    total_requests: counts.total(),
                    successful_requests: counts.success,
                    failed_requests: counts.failure,
                    success_rate: counts.success_rate(),
                    threshold: thresholds.traffic,
                },
            )
        })
        .collect()
}

/// Highest request density (req/s) seen in any window starting at a request.
/// `timestamps_ms` must be sorted ascending.
pub fn max_burst_rate(timestamps_ms: &[i64], window: Duration) -> f64 {
    let window_ms = i64::try_from(window.as_millis()).unwrap_or(i64::MAX);
    if timestamps_ms.is_empty() || window_ms <= 0 {
        return 0.0;
    }

    let mut max_count = 0usize;
    let mut end = 0usize;
    for start in 0..timestamps_ms.len() {
        end = end.max(start);
        while end < timestamps_ms.len() && timestamps_ms[end] < timestamps_ms[start].saturating_add(window_ms) {
            end += 1;
        }
        max_count = max_count.max(end - start);
    }

    max_count as f64 / window.as_secs_f64()
}

/// Steady request spacing combined with cursor-pagination query parameters.
pub fn detect_pagination(timestamps_ms: &[i64], query_strings: &[&str]) -> bool {
    let intervals: Vec<i64> = timestamps_ms.windows(2).map(|w| w[1] - w[0]).collect();
    let distinct: HashSet<i64> = intervals.iter().copied().collect();
    let consistent_intervals = distinct.len() * 2 < intervals.len();
    let has_pagination_params = query_strings.iter().any(|q| PAGINATION_PARAM.is_match(q));
    consistent_intervals && has_pagination_params
}

pub fn operation_scope(operation_id: &str) -> OperationScope {
    if operation_id.contains("Administered") {
        OperationScope::Administered
    } else if operation_id.contains("Organization") {
        OperationScope::Organization
    } else if operation_id.contains("Network") {
        OperationScope::Network
    } else if operation_id.contains("Device") {
        OperationScope::Device
    } else {
        OperationScope::Unknown
    }
}

/// Catalog operation at organization scope that covers the same resource.
pub fn organization_scoped_alternative(operation_id: &str, catalog: &OperationCatalog) -> Option<String> {
    let base = SCOPE_WORD.replacen(operation_id, 1, "organization").to_lowercase();
    catalog
        .entries()
        .iter()
        .find(|e| {
            e.operation_id.to_lowercase().contains(&base)
                && e.path.as_deref().is_some_and(|p| p.contains("/organizations/"))
        })
        .map(|e| e.operation_id.clone())
}

struct OperationTimeline<'a> {
    timestamps_ms: Vec<i64>,
    query_strings: Vec<&'a str>,
}

pub fn high_activity(
    report: &MetricsReport,
    records: &[Normalized<'_, RequestRecord>],
    catalog: &OperationCatalog,
    thresholds: &Thresholds,
) -> Vec<AnomalyFinding> {
    let mut timelines: HashMap<DimensionKey, OperationTimeline<'_>> = HashMap::new();
    for n in records {
        let timeline = timelines
            .entry(DimensionKey::from_field(n.record.operation_id.as_deref()))
            .or_insert_with(|| OperationTimeline {
                timestamps_ms: Vec::new(),
                query_strings: Vec::new(),
            });
        if let Some(ms) = n.timestamp_millis() {
            timeline.timestamps_ms.push(ms);
        }
        if let Some(q) = n.record.query_string.as_deref() {
            timeline.query_strings.push(q);
        }
    }

    let mut findings = Vec::new();
    for op in &report.operations {
        let Some(timeline) = timelines.get_mut(&op.metric.name) else {
            continue;
        };
        timeline.timestamps_ms.sort_unstable();

        let max_burst_rps = max_burst_rate(&timeline.timestamps_ms, thresholds.burst_window);
        if max_burst_rps < thresholds.high_activity_rps {
            continue;
        }

        let name = op.metric.name.to_string();
        let scope = operation_scope(&name);
        let recommended_alternative = match scope {
            OperationScope::Network | OperationScope::Device => {
                organization_scoped_alternative(&name, catalog)
            }
            _ => None,
        };

        findings.push(AnomalyFinding::new(
            EntityType::Operation,
            name,
            Anomaly::HighActivity {
                max_burst_rps,
                percent_of_rate_limit: max_burst_rps / thresholds.rate_limit_rps * 100.0,
                rate_limit_rps: thresholds.rate_limit_rps,
                is_paginating: detect_pagination(&timeline.timestamps_ms, &timeline.query_strings),
                scope,
                recommended_alternative,
            },
        ));
    }
    findings
}

/// The busiest hour buckets, always reported.
///
/// Equal volumes are ordered by the earliest request timestamp in each hour,
/// so the result does not depend on the order of the input batch.
pub fn busiest_hours(
    report: &MetricsReport,
    records: &[Normalized<'_, RequestRecord>],
    thresholds: &Thresholds,
) -> Vec<AnomalyFinding> {
    let mut earliest: HashMap<&str, i64> = HashMap::new();
    for n in records {
        if let (Some(buckets), Some(ms)) = (&n.buckets, n.timestamp_millis()) {
            earliest
                .entry(buckets.hour_key.as_str())
                .and_modify(|first| *first = (*first).min(ms))
                .or_insert(ms);
        }
    }
    let first_seen = |hour: &NamedMetric| {
        hour.name
            .as_known()
            .and_then(|k| earliest.get(k).copied())
            .unwrap_or(i64::MAX)
    };

    let mut hours: Vec<&NamedMetric> = report.busiest_hours.iter().collect();
    hours.sort_by(|a, b| {
        b.total()
            .cmp(&a.total())
            .then_with(|| first_seen(a).cmp(&first_seen(b)))
    });

    hours
        .into_iter()
        .take(thresholds.busiest_hours)
        .map(|hour| {
            let name = hour.name.to_string();
            AnomalyFinding::new(
                EntityType::BusyHour,
                name.clone(),
                Anomaly::BusiestHours {
                    total_requests: hour.total(),
                    success_rate: hour.success_rate,
                    user_agents: agents_for_hour(report, &hour.name),
                    source_addresses: report.addresses_by_hour.get(&name).cloned().unwrap_or_default(),
                },
            )
        })
        .collect()
}

/// Hour buckets outside business hours carrying more than the traffic threshold.
pub fn off_peak_activity(report: &MetricsReport, thresholds: &Thresholds) -> Vec<AnomalyFinding> {
    let off_peak: HashSet<String> = (0..24)
        .filter(|h| *h < thresholds.off_peak_start_hour || *h >= thresholds.off_peak_end_hour)
        .map(hour_label)
        .collect();

    report
        .busiest_hours
        .iter()
        .filter(|hour| hour.name.as_known().is_some_and(|k| off_peak.contains(k)))
        .filter(|hour| hour.total() > thresholds.traffic)
        .map(|hour| {
            AnomalyFinding::new(
                EntityType::Hour,
                hour.name.to_string(),
                Anomaly::OffPeakActivity {
                    total_requests: hour.total(),
                    success_rate: hour.success_rate,
                    threshold: thresholds.traffic,
                },
            )
        })
        .collect()
}
