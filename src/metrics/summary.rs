//! Cross-agent leaderboards folded from the per-agent profiles.

use super::grouping::CountTable;
use super::profile::profile_totals;
use super::types::{AgentProfile, DimensionKey, NamedMetric, OverallStats, Summary};

pub const DEFAULT_TOP_N: usize = 5;

/// Re-sum every profile's nested breakdowns and keep the top `limit` of each.
pub fn summarize_profiles(profiles: &[AgentProfile], limit: usize) -> Summary {
    let mut operations = CountTable::new();
    let mut hours = CountTable::new();
    let mut days = CountTable::new();
    let mut actors = CountTable::new();
    let mut addresses = CountTable::new();

    for profile in profiles {
        for op in &profile.operations {
            operations.add(op.name.clone(), &op.counts);
        }
        for hour in &profile.hourly_activity {
            hours.add(hour.name.clone(), &hour.counts);
        }
        for day in &profile.daily_activity {
            days.add(day.name.clone(), &day.counts);
        }
        for actor in &profile.actors {
            actors.add(DimensionKey::known(actor.details.clone()), &actor.counts);
        }
        for address in &profile.source_addresses {
            addresses.add(address.name.clone(), &address.counts);
        }
    }

    let totals = profile_totals(profiles);

    Summary {
        top_success_operations: top_by_success(&operations, limit),
        top_failure_operations: top_by_failure(&operations, limit),
        busiest_hours: top_by_success(&hours, limit),
        busiest_days: top_by_success(&days, limit),
        most_active_actors: top_by_success(&actors, limit),
        most_active_addresses: top_by_success(&addresses, limit),
        overall_stats: OverallStats {
            total_success: totals.success,
            total_failure: totals.failure,
            overall_success_rate: totals.success_rate(),
        },
    }
}

fn top_by_success(table: &CountTable, limit: usize) -> Vec<NamedMetric> {
    let mut metrics = table.clone().into_metrics();
    metrics.sort_by(|a, b| b.counts.success.cmp(&a.counts.success));
    metrics.truncate(limit);
    metrics
}

/// Entries with at least one failure, most failures first.
fn top_by_failure(table: &CountTable, limit: usize) -> Vec<NamedMetric> {
    let mut metrics: Vec<NamedMetric> = table
        .clone()
        .into_metrics()
        .into_iter()
        .filter(|m| m.counts.failure > 0)
        .collect();
    metrics.sort_by(|a, b| b.counts.failure.cmp(&a.counts.failure));
    metrics.truncate(limit);
    metrics
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::types::{CountBucket, ProfileActor};

    fn metric(name: &str, success: u64, failure: u64) -> NamedMetric {
        NamedMetric::new(DimensionKey::known(name), CountBucket::new(success, failure))
    }

    fn profile(agent: &str, operations: Vec<NamedMetric>) -> AgentProfile {
        let mut counts = CountBucket::default();
        for op in &operations {
            counts.merge(&op.counts);
        }
        AgentProfile {
            user_agent: DimensionKey::known(agent),
            source_addresses: vec![NamedMetric::new(DimensionKey::known("10.0.0.1"), counts)],
            actors: vec![ProfileActor {
                details: "Kim (kim@example.com)".to_string(),
                counts,
                success_rate: counts.success_rate(),
            }],
            hourly_activity: vec![NamedMetric::new(DimensionKey::known("9:00 - 10:00"), counts)],
            daily_activity: vec![NamedMetric::new(DimensionKey::known("2024-05-01"), counts)],
            operations,
            success_rate: counts.success_rate(),
            counts,
        }
    }

    #[test]
    fn test_sums_across_profiles() {
        let profiles = vec![
            profile("A", vec![metric("getX", 5, 1), metric("getY", 1, 4)]),
            profile("B", vec![metric("getX", 2, 0), metric("getZ", 3, 3)]),
        ];
        let summary = summarize_profiles(&profiles, DEFAULT_TOP_N);

        assert_eq!(summary.top_success_operations[0], metric("getX", 7, 1));
        assert_eq!(summary.top_success_operations[1], metric("getZ", 3, 3));
        assert_eq!(summary.top_success_operations[2], metric("getY", 1, 4));

        // Sorted by failures, not the success list reversed
        let failure_names: Vec<String> = summary
            .top_failure_operations
            .iter()
            .map(|m| m.name.to_string())
            .collect();
        assert_eq!(failure_names, vec!["getY", "getZ", "getX"]);

        assert_eq!(summary.most_active_actors.len(), 1);
        assert_eq!(summary.most_active_actors[0].counts, CountBucket::new(11, 8));
        assert_eq!(summary.busiest_hours[0].counts, CountBucket::new(11, 8));
        assert_eq!(summary.most_active_addresses[0].counts, CountBucket::new(11, 8));

        assert_eq!(summary.overall_stats.total_success, 11);
        assert_eq!(summary.overall_stats.total_failure, 8);
        assert_eq!(summary.overall_stats.overall_success_rate.to_string(), "57.89%");
    }

    #[test]
    fn test_limit_and_failure_filter() {
        let ops: Vec<NamedMetric> = (0..8).map(|i| metric(&format!("op{}", i), 10 - i, 0)).collect();
        let summary = summarize_profiles(&[profile("A", ops)], 3);
        assert_eq!(summary.top_success_operations.len(), 3);
        assert_eq!(summary.top_success_operations[0].name, DimensionKey::known("op0"));
        assert!(summary.top_failure_operations.is_empty());
    }

    #[test]
    fn test_empty_profiles() {
        let summary = summarize_profiles(&[], DEFAULT_TOP_N);
        assert!(summary.top_success_operations.is_empty());
        assert_eq!(summary.overall_stats.total_success, 0);
        assert_eq!(summary.overall_stats.overall_success_rate.to_string(), "N/A");
    }
}
