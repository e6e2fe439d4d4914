//! Core data types for request and delivery metrics.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A single API request as returned by the organization API request log.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestRecord {
    #[serde(rename = "ts", alias = "timestamp", default)]
    pub timestamp: Option<String>,
    #[serde(rename = "adminId", alias = "actorId", default)]
    pub actor_id: Option<String>,
    #[serde(rename = "sourceIp", alias = "sourceAddress", default)]
    pub source_address: Option<String>,
    #[serde(default)]
    pub operation_id: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
    /// Missing or null codes deserialize as 0 and count as failures
    #[serde(default, deserialize_with = "null_as_zero")]
    pub response_code: u16,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub query_string: Option<String>,
}

/// A single webhook delivery attempt from the webhook log.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryRecord {
    #[serde(default)]
    pub sent_at: Option<String>,
    #[serde(default)]
    pub logged_at: Option<String>,
    #[serde(default)]
    pub network_id: Option<String>,
    #[serde(default)]
    pub alert_type: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default, deserialize_with = "null_as_zero")]
    pub response_code: u16,
    /// Milliseconds
    #[serde(default)]
    pub response_duration: Option<f64>,
}

fn null_as_zero<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u16, D::Error> {
    Ok(Option::<u16>::deserialize(deserializer)?.unwrap_or(0))
}

/// Grouping key for any dimension.
///
/// Missing and empty values collapse into `Unknown`, which is kept apart from
/// any real value (including the literal string "unknown").
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DimensionKey {
    Known(String),
    Unknown,
}

impl DimensionKey {
    pub fn from_field(value: Option<&str>) -> Self {
        match value {
            Some(v) if !v.is_empty() => DimensionKey::Known(v.to_string()),
            _ => DimensionKey::Unknown,
        }
    }

    pub fn known(value: impl Into<String>) -> Self {
        DimensionKey::Known(value.into())
    }

    pub fn as_known(&self) -> Option<&str> {
        match self {
            DimensionKey::Known(v) => Some(v),
            DimensionKey::Unknown => None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, DimensionKey::Unknown)
    }
}

impl fmt::Display for DimensionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DimensionKey::Known(v) => write!(f, "{}", v),
            DimensionKey::Unknown => write!(f, "unknown"),
        }
    }
}

impl Serialize for DimensionKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            DimensionKey::Known(v) => serializer.serialize_str(v),
            DimensionKey::Unknown => serializer.serialize_none(),
        }
    }
}

impl<'de> Deserialize<'de> for DimensionKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value: Option<String> = Option::deserialize(deserializer)?;
        Ok(DimensionKey::from_field(value.as_deref()))
    }
}

/// Success rate as a percentage, or `NotApplicable` when nothing was counted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SuccessRate {
    Percent(f64),
    NotApplicable,
}

impl SuccessRate {
    pub fn from_counts(success: u64, failure: u64) -> Self {
        let total = success + failure;
        if total == 0 {
            SuccessRate::NotApplicable
        } else {
            SuccessRate::Percent(success as f64 / total as f64 * 100.0)
        }
    }

    pub fn percent(&self) -> Option<f64> {
        match self {
            SuccessRate::Percent(p) => Some(*p),
            SuccessRate::NotApplicable => None,
        }
    }
}

impl fmt::Display for SuccessRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SuccessRate::Percent(p) => write!(f, "{:.2}%", p),
            SuccessRate::NotApplicable => write!(f, "N/A"),
        }
    }
}

impl Serialize for SuccessRate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Success/failure tally for one group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountBucket {
    pub success: u64,
    pub failure: u64,
}

impl CountBucket {
    pub fn new(success: u64, failure: u64) -> Self {
        Self { success, failure }
    }

    pub fn record(&mut self, is_success: bool) {
        if is_success {
            self.success += 1;
        } else {
            self.failure += 1;
        }
    }

    pub fn merge(&mut self, other: &CountBucket) {
        self.success += other.success;
        self.failure += other.failure;
    }

    pub fn total(&self) -> u64 {
        self.success + self.failure
    }

    pub fn success_rate(&self) -> SuccessRate {
        SuccessRate::from_counts(self.success, self.failure)
    }

    /// True when the success rate is strictly below `percent`.
    /// Empty buckets are never below any threshold.
    pub fn is_below_rate(&self, percent: u32) -> bool {
        let total = self.total();
        total > 0 && self.success * 100 < u64::from(percent) * total
    }
}

/// The universal shape returned by every grouping pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NamedMetric {
    pub name: DimensionKey,
    #[serde(flatten)]
    pub counts: CountBucket,
    pub success_rate: SuccessRate,
}

impl NamedMetric {
    pub fn new(name: DimensionKey, counts: CountBucket) -> Self {
        Self {
            name,
            counts,
            success_rate: counts.success_rate(),
        }
    }

    pub fn total(&self) -> u64 {
        self.counts.total()
    }
}

/// Display identity of an actor after the roster join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActorLabel {
    Rostered { name: String, email: String },
    Unmatched,
}

impl ActorLabel {
    pub fn is_rostered(&self) -> bool {
        matches!(self, ActorLabel::Rostered { .. })
    }
}

impl fmt::Display for ActorLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActorLabel::Rostered { name, email } => write!(f, "{} ({})", name, email),
            ActorLabel::Unmatched => write!(f, "None"),
        }
    }
}

impl Serialize for ActorLabel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Actor dimension entry with its roster label.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActorMetric {
    #[serde(flatten)]
    pub metric: NamedMetric,
    pub display_label: ActorLabel,
}

/// Operation dimension entry with catalog metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationMetric {
    #[serde(flatten)]
    pub metric: NamedMetric,
    pub description: String,
    pub deprecated: bool,
}

/// Rostered actor activity inside a single agent profile.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileActor {
    pub details: String,
    #[serde(flatten)]
    pub counts: CountBucket,
    pub success_rate: SuccessRate,
}

/// Full breakdown of one client agent's own traffic.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentProfile {
    pub user_agent: DimensionKey,
    pub operations: Vec<NamedMetric>,
    pub source_addresses: Vec<NamedMetric>,
    pub actors: Vec<ProfileActor>,
    pub hourly_activity: Vec<NamedMetric>,
    pub daily_activity: Vec<NamedMetric>,
    #[serde(flatten)]
    pub counts: CountBucket,
    pub success_rate: SuccessRate,
}

impl AgentProfile {
    pub fn total(&self) -> u64 {
        self.counts.total()
    }
}

/// Batch metadata attached to every report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportMeta {
    pub count: usize,
    pub timespan_ms: i64,
    pub start_time: String,
    pub end_time: String,
    pub unparseable_timestamps: usize,
}

/// Grand totals across all agent profiles
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverallStats {
    pub total_success: u64,
    pub total_failure: u64,
    pub overall_success_rate: SuccessRate,
}

/// Cross-agent leaderboards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub top_success_operations: Vec<NamedMetric>,
    pub top_failure_operations: Vec<NamedMetric>,
    pub busiest_hours: Vec<NamedMetric>,
    pub busiest_days: Vec<NamedMetric>,
    pub most_active_actors: Vec<NamedMetric>,
    pub most_active_addresses: Vec<NamedMetric>,
    pub overall_stats: OverallStats,
}

/// Grouping dimensions across request and delivery reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dimension {
    Actor,
    Agent,
    Operation,
    SourceAddress,
    Hour,
    Day,
    Url,
    Network,
    AlertType,
}

/// Kind of entity an anomaly finding refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EntityType {
    Actor,
    Agent,
    Operation,
    Address,
    Hour,
    Day,
    #[serde(rename = "IPUserAgent")]
    IpUserAgent,
    BusyHour,
    System,
}

impl From<Dimension> for EntityType {
    fn from(dimension: Dimension) -> Self {
        match dimension {
            Dimension::Actor => EntityType::Actor,
            Dimension::Agent => EntityType::Agent,
            Dimension::Operation => EntityType::Operation,
            Dimension::SourceAddress => EntityType::Address,
            Dimension::Hour => EntityType::Hour,
            Dimension::Day => EntityType::Day,
            Dimension::Url | Dimension::Network | Dimension::AlertType => EntityType::System,
        }
    }
}

/// Operation scope inferred from its identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OperationScope {
    Administered,
    Organization,
    Network,
    Device,
    Unknown,
}

/// Rule-specific payload of a finding. The variant is the finding's type.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum Anomaly {
    HighFailureRate {
        success_rate: SuccessRate,
        threshold_percent: u32,
        success: u64,
        failure: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        display_label: Option<String>,
    },
    DeprecatedOperation {
        description: String,
        user_agents: Vec<String>,
    },
    BetaOperation {
        description: String,
        user_agents: Vec<String>,
    },
    HighTraffic {
        source_address: String,
        user_agent: String,
        total_requests: u64,
        successful_requests: u64,
        failed_requests: u64,
        success_rate: SuccessRate,
        threshold: u64,
    },
    HighActivity {
        max_burst_rps: f64,
        percent_of_rate_limit: f64,
        rate_limit_rps: f64,
        is_paginating: bool,
        scope: OperationScope,
        #[serde(skip_serializing_if = "Option::is_none")]
        recommended_alternative: Option<String>,
    },
    BusiestHours {
        total_requests: u64,
        success_rate: SuccessRate,
        user_agents: Vec<String>,
        source_addresses: Vec<String>,
    },
    OffPeakActivity {
        total_requests: u64,
        success_rate: SuccessRate,
        threshold: u64,
    },
    NoAnomalies {},
}

/// Discriminant of [`Anomaly`] for matching and counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AnomalyKind {
    HighFailureRate,
    DeprecatedOperation,
    BetaOperation,
    HighTraffic,
    HighActivity,
    BusiestHours,
    OffPeakActivity,
    NoAnomalies,
}

impl AnomalyKind {
    /// Informational findings are always reported and do not count as deviations.
    pub fn is_informational(&self) -> bool {
        matches!(self, AnomalyKind::BusiestHours | AnomalyKind::NoAnomalies)
    }
}

impl fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnomalyFinding {
    pub entity_type: EntityType,
    pub entity_name: String,
    #[serde(flatten)]
    pub anomaly: Anomaly,
}

impl AnomalyFinding {
    pub fn new(entity_type: EntityType, entity_name: impl Into<String>, anomaly: Anomaly) -> Self {
        Self {
            entity_type,
            entity_name: entity_name.into(),
            anomaly,
        }
    }

    pub fn kind(&self) -> AnomalyKind {
        match self.anomaly {
            Anomaly::HighFailureRate { .. } => AnomalyKind::HighFailureRate,
            Anomaly::DeprecatedOperation { .. } => AnomalyKind::DeprecatedOperation,
            Anomaly::BetaOperation { .. } => AnomalyKind::BetaOperation,
            Anomaly::HighTraffic { .. } => AnomalyKind::HighTraffic,
            Anomaly::HighActivity { .. } => AnomalyKind::HighActivity,
            Anomaly::BusiestHours { .. } => AnomalyKind::BusiestHours,
            Anomaly::OffPeakActivity { .. } => AnomalyKind::OffPeakActivity,
            Anomaly::NoAnomalies {} => AnomalyKind::NoAnomalies,
        }
    }
}

/// Complete output of one request-log aggregation run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsReport {
    pub actors: Vec<ActorMetric>,
    pub agents: Vec<NamedMetric>,
    pub operations: Vec<OperationMetric>,
    pub source_addresses: Vec<NamedMetric>,
    pub busiest_hours: Vec<NamedMetric>,
    pub busiest_days: Vec<NamedMetric>,
    pub applications: Vec<AgentProfile>,
    pub deprecated_operations: Vec<OperationMetric>,
    pub beta_operations: Vec<OperationMetric>,
    /// Hour key -> distinct source addresses active in that hour
    pub addresses_by_hour: BTreeMap<String, Vec<String>>,
    pub meta: ReportMeta,
    pub summary: Summary,
    pub anomalies: Vec<AnomalyFinding>,
}

impl MetricsReport {
    /// Every flat dimension of the report, in anomaly-scan order.
    pub fn dimensions(&self) -> Vec<(Dimension, Vec<&NamedMetric>)> {
        vec![
            (Dimension::Actor, self.actors.iter().map(|a| &a.metric).collect()),
            (Dimension::Agent, self.agents.iter().collect()),
            (Dimension::Operation, self.operations.iter().map(|o| &o.metric).collect()),
            (Dimension::SourceAddress, self.source_addresses.iter().collect()),
            (Dimension::Hour, self.busiest_hours.iter().collect()),
            (Dimension::Day, self.busiest_days.iter().collect()),
        ]
    }

    pub fn count_findings(&self, kind: AnomalyKind) -> usize {
        self.anomalies.iter().filter(|f| f.kind() == kind).count()
    }
}

/// Delivery stats for one webhook receiver host
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReceiverStats {
    pub hostname: DimensionKey,
    #[serde(flatten)]
    pub counts: CountBucket,
    pub success_rate: SuccessRate,
    pub avg_success_duration_ms: Option<f64>,
    pub avg_failure_duration_ms: Option<f64>,
}

/// Complete output of one webhook-log aggregation run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebhookMetrics {
    pub urls: Vec<NamedMetric>,
    pub networks: Vec<NamedMetric>,
    pub alert_types: Vec<NamedMetric>,
    pub busiest_hours: Vec<NamedMetric>,
    pub busiest_days: Vec<NamedMetric>,
    pub receivers: Vec<ReceiverStats>,
    pub meta: ReportMeta,
}

impl WebhookMetrics {
    pub fn dimensions(&self) -> Vec<(Dimension, &[NamedMetric])> {
        vec![
            (Dimension::Url, self.urls.as_slice()),
            (Dimension::Network, self.networks.as_slice()),
            (Dimension::AlertType, self.alert_types.as_slice()),
            (Dimension::Hour, self.busiest_hours.as_slice()),
            (Dimension::Day, self.busiest_days.as_slice()),
        ]
    }
}
