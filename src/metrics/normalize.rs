//! Record normalization.
//!
//! Derives the canonical fields every grouping pass relies on: the success
//! flag, the parsed timestamp, and the local hour/day bucket keys.

use chrono::{DateTime, FixedOffset, Local, NaiveDateTime, Offset, Timelike, Utc};

use super::types::{DeliveryRecord, RequestRecord};

/// Wall-clock basis used for hour and day buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeBasis {
    /// The host's local time zone, offset resolved per timestamp
    #[default]
    SystemLocal,
    Fixed(FixedOffset),
}

impl TimeBasis {
    pub fn utc() -> Self {
        TimeBasis::Fixed(Utc.fix())
    }

    pub fn to_local(&self, ts: DateTime<Utc>) -> NaiveDateTime {
        match self {
            TimeBasis::SystemLocal => ts.with_timezone(&Local).naive_local(),
            TimeBasis::Fixed(offset) => ts.with_timezone(offset).naive_local(),
        }
    }
}

/// Hour and day bucket keys for one timestamp
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeBuckets {
    pub hour_of_day: u32,
    /// "14:00 - 15:00"
    pub hour_key: String,
    /// "2024-05-01"
    pub day_key: String,
    /// "2024-05-01 14:00"
    pub dated_hour_key: String,
}

impl TimeBuckets {
    pub fn from_timestamp(ts: DateTime<Utc>, basis: TimeBasis) -> Self {
        let local = basis.to_local(ts);
        let hour = local.hour();
        let day_key = local.format("%Y-%m-%d").to_string();
        Self {
            hour_of_day: hour,
            hour_key: hour_label(hour),
            dated_hour_key: format!("{} {:02}:00", day_key, hour),
            day_key,
        }
    }
}

/// Half-open hour range label, e.g. `hour_label(14) == "14:00 - 15:00"`.
pub fn hour_label(hour: u32) -> String {
    format!("{}:00 - {}:00", hour, hour + 1)
}

pub fn is_success_code(code: u16) -> bool {
    (200..300).contains(&code)
}

/// Parse a record timestamp.
///
/// Accepts RFC 3339 (`2024-05-01T10:15:00.123Z`) and offset-less ISO forms,
/// which are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    None
}

/// A record together with its derived fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized<'a, R> {
    pub record: &'a R,
    pub is_success: bool,
    pub timestamp: Option<DateTime<Utc>>,
    /// `None` when the timestamp is missing or unparseable
    pub buckets: Option<TimeBuckets>,
}

impl<'a, R> Normalized<'a, R> {
    fn from_parts(record: &'a R, raw_ts: Option<&str>, code: u16, basis: TimeBasis) -> Self {
        let timestamp = raw_ts.and_then(parse_timestamp);
        Self {
            record,
            is_success: is_success_code(code),
            timestamp,
            buckets: timestamp.map(|ts| TimeBuckets::from_timestamp(ts, basis)),
        }
    }

    pub fn timestamp_millis(&self) -> Option<i64> {
        self.timestamp.map(|ts| ts.timestamp_millis())
    }
}

pub fn normalize_request(record: &RequestRecord, basis: TimeBasis) -> Normalized<'_, RequestRecord> {
    Normalized::from_parts(record, record.timestamp.as_deref(), record.response_code, basis)
}

pub fn normalize_delivery(record: &DeliveryRecord, basis: TimeBasis) -> Normalized<'_, DeliveryRecord> {
    Normalized::from_parts(record, record.sent_at.as_deref(), record.response_code, basis)
}

pub fn normalize_requests(records: &[RequestRecord], basis: TimeBasis) -> Vec<Normalized<'_, RequestRecord>> {
    let normalized: Vec<_> = records.iter().map(|r| normalize_request(r, basis)).collect();
    warn_unparseable(&normalized, "request");
    normalized
}

pub fn normalize_deliveries(records: &[DeliveryRecord], basis: TimeBasis) -> Vec<Normalized<'_, DeliveryRecord>> {
    let normalized: Vec<_> = records.iter().map(|r| normalize_delivery(r, basis)).collect();
    warn_unparseable(&normalized, "delivery");
    normalized
}

pub fn count_unparseable<R>(normalized: &[Normalized<'_, R>]) -> usize {
    normalized.iter().filter(|n| n.timestamp.is_none()).count()
}

fn warn_unparseable<R>(normalized: &[Normalized<'_, R>], kind: &str) {
    let unparseable = count_unparseable(normalized);
    if unparseable > 0 {
        log::warn!(
            "{} of {} {} records have a missing or unparseable timestamp; excluded from hourly/daily buckets",
            unparseable,
            normalized.len(),
            kind
        );
    }
}
