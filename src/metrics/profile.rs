//! Per-agent profiles.
//!
//! The batch is partitioned by user agent once, then every partition is run
//! through the grouping passes independently (in parallel with rayon).

use std::collections::HashMap;

use rayon::prelude::*;

use super::enrich::Roster;
use super::grouping::{group_and_count, group_and_count_where, sort_by_volume, to_sorted_metrics};
use super::normalize::Normalized;
use super::types::{AgentProfile, CountBucket, DimensionKey, ProfileActor, RequestRecord};

pub type RequestRef<'a, 'r> = &'a Normalized<'r, RequestRecord>;

pub fn agent_key(record: &RequestRecord) -> DimensionKey {
    DimensionKey::from_field(record.user_agent.as_deref())
}

/// Split the batch by user agent, in first-seen order.
pub fn partition_by_agent<'a, 'r>(
    records: &'a [Normalized<'r, RequestRecord>],
) -> Vec<(DimensionKey, Vec<RequestRef<'a, 'r>>)> {
    let mut index: HashMap<DimensionKey, usize> = HashMap::new();
    let mut partitions: Vec<(DimensionKey, Vec<RequestRef<'a, 'r>>)> = Vec::new();

    for record in records {
        let key = agent_key(record.record);
        let idx = *index.entry(key.clone()).or_insert_with(|| {
            partitions.push((key, Vec::new()));
            partitions.len() - 1
        });
        partitions[idx].1.push(record);
    }

    partitions
}

/// Build the profile of one agent from its own records.
///
/// Totals cover every record; the actor list only shows rostered actors.
pub fn build_agent_profile(
    user_agent: DimensionKey,
    records: &[RequestRef<'_, '_>],
    roster: &Roster,
) -> AgentProfile {
    let records = records.iter().copied();

    let operations = to_sorted_metrics(group_and_count(records.clone(), |n| {
        DimensionKey::from_field(n.record.operation_id.as_deref())
    }));
    let source_addresses = to_sorted_metrics(group_and_count(records.clone(), |n| {
        DimensionKey::from_field(n.record.source_address.as_deref())
    }));
    let hourly_activity = to_sorted_metrics(group_and_count_where(records.clone(), |n| {
        n.buckets.as_ref().map(|b| DimensionKey::known(b.hour_key.clone()))
    }));
    let daily_activity = to_sorted_metrics(group_and_count_where(records.clone(), |n| {
        n.buckets.as_ref().map(|b| DimensionKey::known(b.day_key.clone()))
    }));

    let actor_table = group_and_count(records.clone(), |n| {
        DimensionKey::from_field(n.record.actor_id.as_deref())
    });
    let counts = actor_table.total();
    let actors: Vec<ProfileActor> = to_sorted_metrics(actor_table)
        .into_iter()
        .filter_map(|metric| {
            let label = roster.label(&metric.name);
            label.is_rostered().then(|| ProfileActor {
                details: label.to_string(),
                counts: metric.counts,
                success_rate: metric.success_rate,
            })
        })
        .collect();

    AgentProfile {
        user_agent,
        operations,
        source_addresses,
        actors,
        hourly_activity,
        daily_activity,
        success_rate: counts.success_rate(),
        counts,
    }
}

/// One profile per distinct user agent (including the unknown agent),
/// sorted descending by volume.
pub fn build_agent_profiles(records: &[Normalized<'_, RequestRecord>], roster: &Roster) -> Vec<AgentProfile> {
    let partitions = partition_by_agent(records);
    log::debug!("Building profiles for {} user agents", partitions.len());

    let mut profiles: Vec<AgentProfile> = partitions
        .into_par_iter()
        .map(|(agent, agent_records)| build_agent_profile(agent, &agent_records, roster))
        .collect();

    sort_by_volume(&mut profiles, AgentProfile::total);
    profiles
}

/// Sum of profile totals.
pub fn profile_totals(profiles: &[AgentProfile]) -> CountBucket {
    let mut total = CountBucket::default();
    for profile in profiles {
        total.merge(&profile.counts);
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::enrich::ActorRosterEntry;
    use crate::metrics::normalize::{normalize_requests, TimeBasis};

    fn request(agent: &str, actor: &str, op: &str, ts: &str, code: u16) -> RequestRecord {
        RequestRecord {
            timestamp: Some(ts.to_string()),
            actor_id: Some(actor.to_string()),
            source_address: Some("10.0.0.1".to_string()),
            operation_id: Some(op.to_string()),
            user_agent: Some(agent.to_string()),
            response_code: code,
            ..Default::default()
        }
    }

    fn roster() -> Roster {
        Roster::new(vec![ActorRosterEntry {
            id: "known".to_string(),
            name: "Kim".to_string(),
            email: "kim@example.com".to_string(),
        }])
    }

    #[test]
    fn test_partition_preserves_first_seen_order() {
        let records = vec![
            request("B", "known", "op", "2024-05-01T10:00:00Z", 200),
            request("A", "known", "op", "2024-05-01T10:00:00Z", 200),
            request("B", "known", "op", "2024-05-01T10:00:00Z", 200),
        ];
        let normalized = normalize_requests(&records, TimeBasis::utc());
        let partitions = partition_by_agent(&normalized);
        assert_eq!(partitions.len(), 2);
        assert_eq!(partitions[0].0, DimensionKey::known("B"));
        assert_eq!(partitions[0].1.len(), 2);
        assert_eq!(partitions[1].0, DimensionKey::known("A"));
    }

    #[test]
    fn test_profile_totals_include_unrostered_actors() {
        let records = vec![
            request("A", "known", "getX", "2024-05-01T10:00:00Z", 200),
            request("A", "stranger", "getX", "2024-05-01T10:30:00Z", 500),
            request("A", "stranger", "getY", "2024-05-01T11:00:00Z", 200),
        ];
        let normalized = normalize_requests(&records, TimeBasis::utc());
        let profiles = build_agent_profiles(&normalized, &roster());

        assert_eq!(profiles.len(), 1);
        let profile = &profiles[0];
        assert_eq!(profile.counts, CountBucket::new(2, 1));
        assert_eq!(profile.actors.len(), 1);
        assert_eq!(profile.actors[0].details, "Kim (kim@example.com)");
        assert_eq!(profile.actors[0].counts, CountBucket::new(1, 0));

        assert_eq!(profile.operations[0].name, DimensionKey::known("getX"));
        assert_eq!(profile.operations[0].counts, CountBucket::new(1, 1));
        assert_eq!(profile.hourly_activity[0].name, DimensionKey::known("10:00 - 11:00"));
        assert_eq!(profile.hourly_activity[0].total(), 2);
        assert_eq!(profile.daily_activity.len(), 1);
    }

    #[test]
    fn test_profiles_sorted_by_volume_with_unknown_agent() {
        let mut records = vec![
            request("small", "known", "op", "2024-05-01T10:00:00Z", 200),
            request("big", "known", "op", "2024-05-01T10:00:00Z", 200),
            request("big", "known", "op", "2024-05-01T10:00:00Z", 404),
        ];
        let mut anonymous = request("", "known", "op", "bad timestamp", 200);
        anonymous.user_agent = None;
        records.push(anonymous.clone());
        records.push(anonymous.clone());
        records.push(anonymous);

        let normalized = normalize_requests(&records, TimeBasis::utc());
        let profiles = build_agent_profiles(&normalized, &roster());

        let agents: Vec<DimensionKey> = profiles.iter().map(|p| p.user_agent.clone()).collect();
        assert_eq!(
            agents,
            vec![DimensionKey::Unknown, DimensionKey::known("big"), DimensionKey::known("small")]
        );
        // Unparseable timestamps are counted but have no time buckets
        assert_eq!(profiles[0].total(), 3);
        assert!(profiles[0].hourly_activity.is_empty());
        assert_eq!(profile_totals(&profiles).total(), records.len() as u64);
    }
}
