//! Group-by-key success/failure counting.
//!
//! Every dimension in a report (actor, agent, operation, address, hour, day,
//! URL, network, alert type) goes through the same two steps: tally records
//! into a [`CountTable`] keyed by [`DimensionKey`], then turn the table into a
//! list of [`NamedMetric`]s sorted by volume.

use std::collections::HashMap;

use super::normalize::Normalized;
use super::types::{CountBucket, DimensionKey, NamedMetric};

/// Anything that can be counted as a success or a failure.
pub trait Countable {
    fn is_success(&self) -> bool;
}

impl<R> Countable for Normalized<'_, R> {
    fn is_success(&self) -> bool {
        self.is_success
    }
}

/// Insertion-ordered tally of success/failure counts per key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CountTable {
    index: HashMap<DimensionKey, usize>,
    entries: Vec<(DimensionKey, CountBucket)>,
}

impl CountTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn bucket_mut(&mut self, key: DimensionKey) -> &mut CountBucket {
        let idx = match self.index.get(&key) {
            Some(&idx) => idx,
            None => {
                let idx = self.entries.len();
                self.index.insert(key.clone(), idx);
                self.entries.push((key, CountBucket::default()));
                idx
            }
        };
        &mut self.entries[idx].1
    }

    pub fn record(&mut self, key: DimensionKey, is_success: bool) {
        self.bucket_mut(key).record(is_success);
    }

    /// Add an already-counted bucket (second-order aggregation).
    pub fn add(&mut self, key: DimensionKey, counts: &CountBucket) {
        self.bucket_mut(key).merge(counts);
    }

    pub fn get(&self, key: &DimensionKey) -> Option<&CountBucket> {
        self.index.get(key).map(|&idx| &self.entries[idx].1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum over all keys
    pub fn total(&self) -> CountBucket {
        let mut total = CountBucket::default();
        for (_, counts) in &self.entries {
            total.merge(counts);
        }
        total
    }

    /// Metrics in first-seen key order, unsorted.
    pub fn into_metrics(self) -> Vec<NamedMetric> {
        self.entries
            .into_iter()
            .map(|(key, counts)| NamedMetric::new(key, counts))
            .collect()
    }
}

/// Tally `items` by the key `key_fn` extracts. Every item is counted exactly once.
pub fn group_and_count<'a, T, I, F>(items: I, mut key_fn: F) -> CountTable
where
    T: Countable + 'a,
    I: IntoIterator<Item = &'a T>,
    F: FnMut(&T) -> DimensionKey,
{
    group_and_count_where(items, |item| Some(key_fn(item)))
}

/// Like [`group_and_count`], but items whose key is `None` are left out of
/// this dimension entirely (e.g. time buckets of unparseable timestamps).
pub fn group_and_count_where<'a, T, I, F>(items: I, mut key_fn: F) -> CountTable
where
    T: Countable + 'a,
    I: IntoIterator<Item = &'a T>,
    F: FnMut(&T) -> Option<DimensionKey>,
{
    let mut table = CountTable::new();
    for item in items {
        if let Some(key) = key_fn(item) {
            table.record(key, item.is_success());
        }
    }
    table
}

/// Sort descending by volume. Stable, so equal totals keep first-seen order.
pub fn sort_by_volume<T, F>(items: &mut [T], total: F)
where
    F: Fn(&T) -> u64,
{
    items.sort_by(|a, b| total(b).cmp(&total(a)));
}

pub fn to_sorted_metrics(table: CountTable) -> Vec<NamedMetric> {
    let mut metrics = table.into_metrics();
    sort_by_volume(&mut metrics, NamedMetric::total);
    metrics
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Hit {
        key: Option<&'static str>,
        ok: bool,
    }

    impl Countable for Hit {
        fn is_success(&self) -> bool {
            self.ok
        }
    }

    fn hit(key: Option<&'static str>, ok: bool) -> Hit {
        Hit { key, ok }
    }

    #[test]
    fn test_group_counts_every_item_once() {
        let items = vec![
            hit(Some("a"), true),
            hit(Some("b"), false),
            hit(Some("a"), false),
            hit(None, true),
            hit(Some(""), false),
        ];
        let table = group_and_count(&items, |h| DimensionKey::from_field(h.key));

        assert_eq!(table.len(), 3);
        assert_eq!(table.get(&DimensionKey::known("a")), Some(&CountBucket::new(1, 1)));
        assert_eq!(table.get(&DimensionKey::known("b")), Some(&CountBucket::new(0, 1)));
        assert_eq!(table.get(&DimensionKey::Unknown), Some(&CountBucket::new(1, 1)));
        assert_eq!(table.total().total(), items.len() as u64);
    }

    #[test]
    fn test_group_where_skips_none() {
        let items = vec![hit(Some("a"), true), hit(None, true)];
        let table = group_and_count_where(&items, |h| h.key.map(DimensionKey::known));
        assert_eq!(table.len(), 1);
        assert_eq!(table.total().total(), 1);

        let table = group_and_count_where(&items, |_| None);
        assert!(table.is_empty());
        assert!(to_sorted_metrics(table).is_empty());
        assert!(CountTable::new().is_empty());
    }

    #[test]
    fn test_sorted_metrics_descending_and_stable() {
        let mut table = CountTable::new();
        table.add(DimensionKey::known("small"), &CountBucket::new(1, 0));
        table.add(DimensionKey::known("tie-first"), &CountBucket::new(2, 1));
        table.add(DimensionKey::known("big"), &CountBucket::new(5, 5));
        table.add(DimensionKey::known("tie-second"), &CountBucket::new(0, 3));

        let names: Vec<String> = to_sorted_metrics(table)
            .iter()
            .map(|m| m.name.to_string())
            .collect();
        assert_eq!(names, vec!["big", "tie-first", "tie-second", "small"]);
    }

    #[test]
    fn test_add_merges_existing_key() {
        let mut table = CountTable::new();
        table.add(DimensionKey::known("x"), &CountBucket::new(1, 2));
        table.add(DimensionKey::known("x"), &CountBucket::new(3, 4));
        assert_eq!(table.get(&DimensionKey::known("x")), Some(&CountBucket::new(4, 6)));
    }
}
