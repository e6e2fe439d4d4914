//! Report writers.
//!
//! Generates both JSON and human-readable text reports.

use std::fs;
use std::path::Path;

use color_eyre::eyre::{Context, Result};
use serde::Serialize;

use super::types::*;

/// Generate JSON report
pub fn generate_json_report<T: Serialize>(report: &T, output_path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(report).context("Failed to serialize report to JSON")?;

    fs::write(output_path, json)
        .with_context(|| format!("Failed to write JSON report to {}", output_path.display()))?;

    log::info!("JSON report written to {}", output_path.display());
    Ok(())
}

fn banner(lines: &mut Vec<String>, title: &str) {
    lines.push("=".repeat(80));
    lines.push(format!("{:^80}", title));
    lines.push("=".repeat(80));
    lines.push(String::new());
}

fn metric_line(metric: &NamedMetric) -> String {
    format!(
        "  {:<48} {:>8} ok {:>8} failed  {:>8}",
        metric.name.to_string(),
        metric.counts.success,
        metric.counts.failure,
        metric.success_rate
    )
}

fn metric_section<'a>(lines: &mut Vec<String>, title: &str, metrics: impl IntoIterator<Item = &'a NamedMetric>) {
    lines.push(format!("{}:", title));
    let mut any = false;
    for metric in metrics {
        lines.push(metric_line(metric));
        any = true;
    }
    if !any {
        lines.push("  (none)".to_string());
    }
    lines.push(String::new());
}

fn meta_lines(lines: &mut Vec<String>, meta: &ReportMeta, noun: &str) {
    lines.push(format!("{}: {}", noun, meta.count));
    lines.push(format!("Start: {}", meta.start_time));
    lines.push(format!("End: {}", meta.end_time));
    lines.push(format!("Timespan: {:.1}s", meta.timespan_ms as f64 / 1000.0));
    if meta.unparseable_timestamps > 0 {
        lines.push(format!("Unparseable timestamps: {}", meta.unparseable_timestamps));
    }
    lines.push(String::new());
}

/// One-line explanation of a finding.
pub fn describe_finding(finding: &AnomalyFinding) -> String {
    match &finding.anomaly {
        Anomaly::HighFailureRate {
            success_rate,
            threshold_percent,
            ..
        } => format!("success rate {} is below {}%", success_rate, threshold_percent),
        Anomaly::DeprecatedOperation { user_agents, .. } => {
            format!("deprecated operation called by {} agent(s)", user_agents.len())
        }
        Anomaly::BetaOperation { user_agents, .. } => {
            format!("beta operation called by {} agent(s)", user_agents.len())
        }
        Anomaly::HighTraffic {
            total_requests,
            threshold,
            ..
        } => format!("{} requests from one address/agent pair (threshold {})", total_requests, threshold),
        Anomaly::HighActivity {
            max_burst_rps,
            percent_of_rate_limit,
            is_paginating,
            recommended_alternative,
            ..
        } => {
            let mut text = format!(
                "burst of {:.1} req/s ({:.0}% of rate limit)",
                max_burst_rps, percent_of_rate_limit
            );
            if *is_paginating {
                text.push_str(", paginating");
            }
            if let Some(alt) = recommended_alternative {
                text.push_str(&format!(", consider {}", alt));
            }
            text
        }
        Anomaly::BusiestHours {
            total_requests,
            success_rate,
            ..
        } => format!("{} requests, {} success", total_requests, success_rate),
        Anomaly::OffPeakActivity {
            total_requests,
            threshold,
            ..
        } => format!("{} requests outside business hours (threshold {})", total_requests, threshold),
        Anomaly::NoAnomalies {} => "no anomalies detected".to_string(),
    }
}

fn anomaly_section(lines: &mut Vec<String>, findings: &[AnomalyFinding]) {
    banner(lines, "ANOMALIES");
    for finding in findings {
        lines.push(format!(
            "[{}] {:?} {}: {}",
            finding.kind(),
            finding.entity_type,
            finding.entity_name,
            describe_finding(finding)
        ));
    }
    lines.push(String::new());
}

fn write_lines(lines: &[String], output_path: &Path) -> Result<()> {
    fs::write(output_path, lines.join("\n"))
        .with_context(|| format!("Failed to write text report to {}", output_path.display()))?;
    log::info!("Text report written to {}", output_path.display());
    Ok(())
}

/// Generate human-readable text report
pub fn generate_text_report(report: &MetricsReport, output_path: &Path) -> Result<()> {
    let mut lines: Vec<String> = Vec::new();

    banner(&mut lines, "API REQUEST METRICS");
    meta_lines(&mut lines, &report.meta, "Requests");

    let stats = &report.summary.overall_stats;
    lines.push(format!(
        "Overall: {} succeeded, {} failed ({})",
        stats.total_success, stats.total_failure, stats.overall_success_rate
    ));
    lines.push(String::new());

    banner(&mut lines, "DIMENSIONS");
    metric_section(&mut lines, "Actors", report.actors.iter().map(|a| &a.metric));
    metric_section(&mut lines, "User agents", &report.agents);
    metric_section(&mut lines, "Operations", report.operations.iter().map(|o| &o.metric));
    metric_section(&mut lines, "Source addresses", &report.source_addresses);
    metric_section(&mut lines, "Hours", &report.busiest_hours);
    metric_section(&mut lines, "Days", &report.busiest_days);

    if !report.deprecated_operations.is_empty() || !report.beta_operations.is_empty() {
        banner(&mut lines, "CATALOG FLAGS");
        metric_section(&mut lines, "Deprecated operations", report.deprecated_operations.iter().map(|o| &o.metric));
        metric_section(&mut lines, "Beta operations", report.beta_operations.iter().map(|o| &o.metric));
    }

    banner(&mut lines, "APPLICATIONS");
    for profile in &report.applications {
        lines.push(format!(
            "{} ({} requests, {})",
            profile.user_agent,
            profile.total(),
            profile.success_rate
        ));
        for op in &profile.operations {
            lines.push(metric_line(op));
        }
        for actor in &profile.actors {
            lines.push(format!("  actor: {} ({})", actor.details, actor.success_rate));
        }
        lines.push(String::new());
    }

    banner(&mut lines, "SUMMARY");
    metric_section(&mut lines, "Top operations", &report.summary.top_success_operations);
    metric_section(&mut lines, "Top failing operations", &report.summary.top_failure_operations);
    metric_section(&mut lines, "Most active actors", &report.summary.most_active_actors);
    metric_section(&mut lines, "Most active addresses", &report.summary.most_active_addresses);

    anomaly_section(&mut lines, &report.anomalies);
    lines.push("=".repeat(80));

    write_lines(&lines, output_path)
}

/// Generate human-readable webhook text report
pub fn generate_webhook_text_report(metrics: &WebhookMetrics, output_path: &Path) -> Result<()> {
    let mut lines: Vec<String> = Vec::new();

    banner(&mut lines, "WEBHOOK DELIVERY METRICS");
    meta_lines(&mut lines, &metrics.meta, "Deliveries");

    metric_section(&mut lines, "URLs", &metrics.urls);
    metric_section(&mut lines, "Networks", &metrics.networks);
    metric_section(&mut lines, "Alert types", &metrics.alert_types);
    metric_section(&mut lines, "Hours", &metrics.busiest_hours);
    metric_section(&mut lines, "Days", &metrics.busiest_days);

    banner(&mut lines, "RECEIVERS");
    for receiver in &metrics.receivers {
        let avg = |ms: Option<f64>| ms.map(|v| format!("{:.1}ms", v)).unwrap_or_else(|| "-".to_string());
        lines.push(format!(
            "  {:<40} {:>6} ok {:>6} failed  {:>8}  avg ok {}  avg failed {}",
            receiver.hostname.to_string(),
            receiver.counts.success,
            receiver.counts.failure,
            receiver.success_rate,
            avg(receiver.avg_success_duration_ms),
            avg(receiver.avg_failure_duration_ms)
        ));
    }
    lines.push(String::new());
    lines.push("=".repeat(80));

    write_lines(&lines, output_path)
}

/// Print summary to stdout
pub fn print_summary(report: &MetricsReport) {
    println!("\n=== API REQUEST METRICS SUMMARY ===\n");
    println!("Requests: {}", report.meta.count);
    println!("Window: {} .. {}", report.meta.start_time, report.meta.end_time);
    println!(
        "Success rate: {}",
        report.summary.overall_stats.overall_success_rate
    );
    println!("Applications: {}", report.applications.len());

    if let Some(top) = report.summary.top_success_operations.first() {
        println!("Top operation: {} ({} requests)", top.name, top.total());
    }

    let deviations: Vec<&AnomalyFinding> = report
        .anomalies
        .iter()
        .filter(|f| !f.kind().is_informational())
        .collect();
    if deviations.is_empty() {
        println!("\nNo anomalies detected");
    } else {
        println!("\nAnomalies ({}):", deviations.len());
        for finding in deviations {
            println!("  [{}] {}: {}", finding.kind(), finding.entity_name, describe_finding(finding));
        }
    }
    println!();
}

pub fn print_webhook_summary(metrics: &WebhookMetrics) {
    println!("\n=== WEBHOOK DELIVERY SUMMARY ===\n");
    println!("Deliveries: {}", metrics.meta.count);
    println!("Window: {} .. {}", metrics.meta.start_time, metrics.meta.end_time);
    println!("Receivers: {}", metrics.receivers.len());
    for receiver in &metrics.receivers {
        println!("  {}: {}", receiver.hostname, receiver.success_rate);
    }
    println!();
}
