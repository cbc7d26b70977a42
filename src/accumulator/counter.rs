//! Keyed non-negative counters (cutflows)

use super::Accumulable;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Index;

/// A map from key to count where absent keys count as zero.
///
/// Zero counts are never stored, so two counters that agree on every key
/// compare equal regardless of how they were built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<K, u64>", into = "BTreeMap<K, u64>")]
#[serde(bound(
    serialize = "K: Ord + Clone + Serialize",
    deserialize = "K: Ord + Deserialize<'de>"
))]
pub struct Counter<K: Ord> {
    counts: BTreeMap<K, u64>,
}

/// Per-dataset, per-selection event counts keyed like `"<dataset>_<cut>"`
pub type Cutflow = Counter<String>;

impl<K: Ord> Counter<K> {
    pub fn new() -> Self {
        Self {
            counts: BTreeMap::new(),
        }
    }

    pub fn add(&mut self, key: K, amount: u64) {
        if amount == 0 {
            return;
        }
        let count = self.counts.entry(key).or_insert(0);
        *count = count.saturating_add(amount);
    }

    pub fn get<Q>(&self, key: &Q) -> u64
    where
        K: std::borrow::Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.counts.get(key).copied().unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, u64)> {
        self.counts.iter().map(|(key, count)| (key, *count))
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn total(&self) -> u64 {
        self.counts.values().fold(0, |acc, n| acc.saturating_add(*n))
    }
}

impl<K: Ord> Default for Counter<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Ord> Accumulable for Counter<K> {
    fn identity() -> Self {
        Self::new()
    }

    fn combine(self, other: Self) -> Self {
        Self {
            counts: self.counts.combine(other.counts),
        }
    }
}

impl<K: Ord> From<BTreeMap<K, u64>> for Counter<K> {
    fn from(counts: BTreeMap<K, u64>) -> Self {
        let mut counter = Self::new();
        for (key, count) in counts {
            counter.add(key, count);
        }
        counter
    }
}

impl<K: Ord> From<Counter<K>> for BTreeMap<K, u64> {
    fn from(counter: Counter<K>) -> Self {
        counter.counts
    }
}

impl<K: Ord, const N: usize> From<[(K, u64); N]> for Counter<K> {
    fn from(entries: [(K, u64); N]) -> Self {
        entries.into_iter().collect()
    }
}

impl<K: Ord> FromIterator<(K, u64)> for Counter<K> {
    fn from_iter<I: IntoIterator<Item = (K, u64)>>(iter: I) -> Self {
        let mut counter = Self::new();
        for (key, count) in iter {
            counter.add(key, count);
        }
        counter
    }
}

impl<K, Q> Index<&Q> for Counter<K>
where
    K: Ord + std::borrow::Borrow<Q>,
    Q: Ord + ?Sized,
{
    type Output = u64;

    fn index(&self, key: &Q) -> &u64 {
        self.counts.get(key).unwrap_or(&0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_keys_are_zero() {
        let cutflow = Cutflow::new();
        assert_eq!(cutflow.get("ZJets_pt"), 0);
        assert_eq!(cutflow["ZJets_pt"], 0);
    }

    #[test]
    fn test_zero_counts_are_not_stored() {
        let mut cutflow = Cutflow::new();
        cutflow.add("Data_mass".to_string(), 0);
        assert!(cutflow.is_empty());
        assert_eq!(cutflow, Cutflow::identity());
    }

    #[test]
    fn test_combine_sums_elementwise() {
        let a = Cutflow::from([("ZJets_pt".to_string(), 10), ("ZJets_mass".to_string(), 2)]);
        let b = Cutflow::from([("ZJets_pt".to_string(), 8), ("Data_pt".to_string(), 84)]);
        let merged = a.combine(b);

        assert_eq!(merged["ZJets_pt"], 18);
        assert_eq!(merged["ZJets_mass"], 2);
        assert_eq!(merged["Data_pt"], 84);
        assert_eq!(merged.total(), 104);
    }

    #[test]
    fn test_serialized_zeros_are_dropped() {
        let counter: Cutflow = serde_json::from_str(r#"{"a": 0, "b": 3}"#).unwrap();
        assert_eq!(counter, Cutflow::from([("b".to_string(), 3)]));
        assert_eq!(serde_json::to_string(&counter).unwrap(), r#"{"b":3}"#);
    }
}
