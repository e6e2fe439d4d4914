//! Webhook delivery metrics.
//!
//! Same grouping machinery as the request report, over delivery records.
//! Hour buckets carry the date so consecutive days stay apart.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use super::assembler::build_meta;
use super::grouping::{group_and_count, group_and_count_where, to_sorted_metrics};
use super::normalize::{normalize_deliveries, Normalized, TimeBasis};
use super::types::{CountBucket, DeliveryRecord, DimensionKey, ReceiverStats, WebhookMetrics};

/// Scheme, optional userinfo, then the host (bracketed IPv6 or up to port/path).
static URL_HOST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9+.-]*://(?:[^/?#@]*@)?(\[[^\]]+\]|[^/:?#]+)").expect("Invalid URL host regex")
});

pub fn receiver_hostname(url: Option<&str>) -> DimensionKey {
    let host = url
        .and_then(|u| URL_HOST.captures(u.trim()))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_ascii_lowercase());
    DimensionKey::from_field(host.as_deref())
}

#[derive(Default)]
struct ReceiverTally {
    counts: CountBucket,
    success_ms: DurationSum,
    failure_ms: DurationSum,
}

#[derive(Default)]
struct DurationSum {
    total: f64,
    samples: u64,
}

impl DurationSum {
    fn add(&mut self, ms: f64) {
        self.total += ms;
        self.samples += 1;
    }

    fn mean(&self) -> Option<f64> {
        (self.samples > 0).then(|| self.total / self.samples as f64)
    }
}

/// Per receiver host tallies, sorted by hostname with the unknown host last.
pub fn receiver_stats(deliveries: &[Normalized<'_, DeliveryRecord>]) -> Vec<ReceiverStats> {
    let mut index: HashMap<DimensionKey, usize> = HashMap::new();
    let mut tallies: Vec<(DimensionKey, ReceiverTally)> = Vec::new();
    for n in deliveries {
        let hostname = receiver_hostname(n.record.url.as_deref());
        let idx = *index.entry(hostname.clone()).or_insert_with(|| {
            tallies.push((hostname, ReceiverTally::default()));
            tallies.len() - 1
        });
        let tally = &mut tallies[idx].1;
        tally.counts.record(n.is_success);
        if let Some(ms) = n.record.response_duration.filter(|ms| ms.is_finite()) {
            if n.is_success {
                tally.success_ms.add(ms);
            } else {
                tally.failure_ms.add(ms);
            }
        }
    }

    tallies.sort_by(|a, b| a.0.cmp(&b.0));
    tallies
        .into_iter()
        .map(|(hostname, tally)| ReceiverStats {
            hostname,
            success_rate: tally.counts.success_rate(),
            counts: tally.counts,
            avg_success_duration_ms: tally.success_ms.mean(),
            avg_failure_duration_ms: tally.failure_ms.mean(),
        })
        .collect()
}

/// Build the webhook delivery report. No catalog involved.
pub fn build_webhook_metrics(records: &[DeliveryRecord], basis: TimeBasis) -> WebhookMetrics {
    log::info!("Building webhook metrics for {} deliveries", records.len());
    let normalized = normalize_deliveries(records, basis);

    WebhookMetrics {
        urls: to_sorted_metrics(group_and_count(&normalized, |n| {
            DimensionKey::from_field(n.record.url.as_deref())
        })),
        networks: to_sorted_metrics(group_and_count(&normalized, |n| {
            DimensionKey::from_field(n.record.network_id.as_deref())
        })),
        alert_types: to_sorted_metrics(group_and_count(&normalized, |n| {
            DimensionKey::from_field(n.record.alert_type.as_deref())
        })),
        busiest_hours: to_sorted_metrics(group_and_count_where(&normalized, |n| {
            n.buckets.as_ref().map(|b| DimensionKey::known(b.dated_hour_key.clone()))
        })),
        busiest_days: to_sorted_metrics(group_and_count_where(&normalized, |n| {
            n.buckets.as_ref().map(|b| DimensionKey::known(b.day_key.clone()))
        })),
        receivers: receiver_stats(&normalized),
        meta: build_meta(&normalized),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delivery(url: &str, sent_at: &str, code: u16, duration: Option<f64>) -> DeliveryRecord {
        DeliveryRecord {
            sent_at: Some(sent_at.to_string()),
            network_id: Some("N_1".to_string()),
            alert_type: Some("Settings changed".to_string()),
            url: Some(url.to_string()),
            response_code: code,
            response_duration: duration,
            ..Default::default()
        }
    }

    #[test]
    fn test_receiver_hostname() {
        assert_eq!(
            receiver_hostname(Some("https://Hooks.Example.com:8443/path?q=1")),
            DimensionKey::known("hooks.example.com")
        );
        assert_eq!(
            receiver_hostname(Some("http://user:pw@10.1.2.3/x")),
            DimensionKey::known("10.1.2.3")
        );
        assert_eq!(receiver_hostname(Some("http://[::1]:80/")), DimensionKey::known("[::1]"));
        assert_eq!(receiver_hostname(Some("not a url")), DimensionKey::Unknown);
        assert_eq!(receiver_hostname(None), DimensionKey::Unknown);
    }

    #[test]
    fn test_receiver_stats_average_durations() {
        let records = vec![
            delivery("https://b.example.com/hook", "2024-05-01T10:00:00Z", 200, Some(100.0)),
            delivery("https://b.example.com/other", "2024-05-01T10:01:00Z", 200, Some(300.0)),
            delivery("https://a.example.com/hook", "2024-05-01T10:02:00Z", 500, Some(50.0)),
            delivery("https://a.example.com/hook", "2024-05-01T10:03:00Z", 204, None),
            delivery("garbage", "2024-05-01T10:04:00Z", 200, None),
        ];
        let metrics = build_webhook_metrics(&records, TimeBasis::utc());

        let hosts: Vec<String> = metrics.receivers.iter().map(|r| r.hostname.to_string()).collect();
        assert_eq!(hosts, vec!["a.example.com", "b.example.com", "unknown"]);

        let a = &metrics.receivers[0];
        assert_eq!(a.counts, CountBucket::new(1, 1));
        assert_eq!(a.avg_success_duration_ms, None);
        assert_eq!(a.avg_failure_duration_ms, Some(50.0));

        let b = &metrics.receivers[1];
        assert_eq!(b.avg_success_duration_ms, Some(200.0));
        assert_eq!(b.avg_failure_duration_ms, None);
    }

    #[test]
    fn test_receiver_stats_many_hosts() {
        let records: Vec<DeliveryRecord> = (0..300)
            .map(|i| {
                let url = format!("https://host{:03}.example.com/hook", i % 100);
                let code = if i < 100 { 500 } else { 200 };
                delivery(&url, "2024-05-01T10:00:00Z", code, Some(10.0))
            })
            .collect();
        let normalized = normalize_deliveries(&records, TimeBasis::utc());
        let stats = receiver_stats(&normalized);

        assert_eq!(stats.len(), 100);
        assert_eq!(stats[0].hostname, DimensionKey::known("host000.example.com"));
        assert_eq!(stats[99].hostname, DimensionKey::known("host099.example.com"));
        assert!(stats.iter().all(|r| r.counts == CountBucket::new(2, 1)));
    }

    #[test]
    fn test_dated_hour_buckets() {
        let records = vec![
            delivery("https://a.example.com", "2024-05-01T10:00:00Z", 200, None),
            delivery("https://a.example.com", "2024-05-02T10:30:00Z", 200, None),
            delivery("https://a.example.com", "2024-05-02T10:45:00Z", 500, None),
        ];
        let metrics = build_webhook_metrics(&records, TimeBasis::utc());

        assert_eq!(metrics.busiest_hours.len(), 2);
        assert_eq!(metrics.busiest_hours[0].name, DimensionKey::known("2024-05-02 10:00"));
        assert_eq!(metrics.busiest_hours[0].counts, CountBucket::new(1, 1));
        assert_eq!(metrics.busiest_days[0].name, DimensionKey::known("2024-05-02"));
        assert_eq!(metrics.meta.count, 3);
        assert_eq!(metrics.meta.start_time, "2024-05-01T10:00:00.000Z");
    }

    #[test]
    fn test_missing_fields_group_as_unknown() {
        let records = vec![DeliveryRecord {
            response_code: 200,
            ..Default::default()
        }];
        let metrics = build_webhook_metrics(&records, TimeBasis::utc());
        assert_eq!(metrics.urls[0].name, DimensionKey::Unknown);
        assert_eq!(metrics.networks[0].name, DimensionKey::Unknown);
        assert!(metrics.busiest_hours.is_empty());
        assert_eq!(metrics.meta.unparseable_timestamps, 1);
    }
}
