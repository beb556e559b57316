use std::borrow::Borrow;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use idvet_types::Person;
use serde::{Deserialize, Serialize};

/// The per-record values the ledger counts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatsEntry {
    pub first_name: String,
    pub last_name: String,
    pub age: u32,
}

impl StatsEntry {
    /// Split the name at the first space; a single word has an empty last name.
    pub fn from_person(person: &Person) -> Self {
        let (first, last) = person
            .name()
            .split_once(' ')
            .unwrap_or((person.name(), ""));
        Self {
            first_name: first.to_string(),
            last_name: last.to_string(),
            age: person.age(),
        }
    }
}

/// Point-in-time totals for reporting.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSummary {
    pub records: u64,
    pub distinct_first_names: usize,
    pub distinct_last_names: usize,
    pub distinct_ages: usize,
    pub most_common_first_name: Option<(String, u64)>,
}

/// Concurrent counters over accepted records.
#[derive(Default)]
pub struct StatsLedger {
    first_names: DashMap<String, AtomicU64>,
    last_names: DashMap<String, AtomicU64>,
    ages: DashMap<u32, AtomicU64>,
    records: AtomicU64,
}

fn increment<K: Eq + Hash>(map: &DashMap<K, AtomicU64>, key: K) {
    map.entry(key)
        .or_insert_with(|| AtomicU64::new(0))
        .fetch_add(1, Ordering::Relaxed);
}

fn count<K, Q>(map: &DashMap<K, AtomicU64>, key: &Q) -> u64
where
    K: Eq + Hash + Borrow<Q>,
    Q: Eq + Hash + ?Sized,
{
    map.get(key)
        .map(|c| c.load(Ordering::Relaxed))
        .unwrap_or(0)
}

impl StatsLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, entry: StatsEntry) {
        increment(&self.first_names, entry.first_name);
        increment(&self.last_names, entry.last_name);
        increment(&self.ages, entry.age);
        self.records.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_count(&self) -> u64 {
        self.records.load(Ordering::Relaxed)
    }

    pub fn first_name_count(&self, first_name: &str) -> u64 {
        count(&self.first_names, first_name)
    }

    pub fn last_name_count(&self, last_name: &str) -> u64 {
        count(&self.last_names, last_name)
    }

    pub fn age_count(&self, age: u32) -> u64 {
        count(&self.ages, &age)
    }

    pub fn summary(&self) -> StatsSummary {
        let most_common_first_name = self
            .first_names
            .iter()
            .map(|e| (e.key().clone(), e.value().load(Ordering::Relaxed)))
            .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(&a.0)));
        StatsSummary {
            records: self.record_count(),
            distinct_first_names: self.first_names.len(),
            distinct_last_names: self.last_names.len(),
            distinct_ages: self.ages.len(),
            most_common_first_name,
        }
    }
}
