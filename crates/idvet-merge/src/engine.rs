use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use idvet_types::{ContactDetails, Identity, IdentityId, Person};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::candidate::MergeCandidate;
use crate::config::MergeConfig;
use crate::error::{MergeError, MergeResult};
use crate::score::{MatchKey, MatchScorer};

/// Outcome of resolving one record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resolution {
    /// Folded into an existing record.
    Merged { into: IdentityId },
    /// Stored as a new record.
    Accepted { id: IdentityId },
}

impl Resolution {
    pub fn is_merged(&self) -> bool {
        matches!(self, Resolution::Merged { .. })
    }

    /// The stored record the incoming one ended up in.
    pub fn id(&self) -> IdentityId {
        match self {
            Resolution::Merged { into } => *into,
            Resolution::Accepted { id } => *id,
        }
    }
}

/// Counters describing the engine's decisions so far.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeStats {
    pub accepted: u64,
    pub merged: u64,
    /// Candidates skipped because another resolve held their lock.
    pub contended: u64,
    pub rejected: u64,
}

#[derive(Default)]
struct Counters {
    accepted: AtomicU64,
    merged: AtomicU64,
    contended: AtomicU64,
    rejected: AtomicU64,
}

/// Resolves incoming identity records against the accepted set.
///
/// The accepted set is a concurrent map keyed by identity id; there is no
/// global lock. A merge mutates one stored record under that record's own
/// lock, acquired without blocking, and publishes the result as a new
/// snapshot. Readers never contend with merges. A candidate whose lock is
/// held by a concurrent resolve is skipped, so under contention a true
/// duplicate can be stored as a new record.
pub struct MergeEngine {
    accepted: DashMap<IdentityId, Arc<Person>>,
    scorer: MatchScorer,
    counters: Counters,
}

impl MergeEngine {
    pub fn new(config: MergeConfig) -> Self {
        Self {
            accepted: DashMap::new(),
            scorer: MatchScorer::new(config),
            counters: Counters::default(),
        }
    }

    /// Resolve a record from a source. Returns `true` if it was merged into
    /// an existing record and `false` if it was stored as new.
    pub fn resolve(&self, identity: Identity) -> MergeResult<bool> {
        match identity {
            Identity::Person(person) => Ok(self.resolve_person(person).is_merged()),
            Identity::Malformed(record) => {
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                Err(MergeError::Malformed {
                    line: record.line,
                    reason: record.reason,
                })
            }
        }
    }

    pub fn resolve_person(&self, mut person: Person) -> Resolution {
        let candidates = self.candidates(&person);
        let mut contended = 0;
        let mut outcome = None;
        for candidate in &candidates {
            let Some(mut target) = candidate.person.lock().try_acquire() else {
                contended += 1;
                trace!(
                    incoming = %person.id(),
                    candidate = %candidate.person.id(),
                    "candidate lock contended, skipping"
                );
                continue;
            };
            let incoming = std::mem::take(person.contact_mut());
            merge_contact(&mut target, incoming);
            target.commit();
            outcome = Some((candidate.person.id(), candidate.score));
            break;
        }
        if contended > 0 {
            self.counters.contended.fetch_add(contended, Ordering::Relaxed);
        }

        if let Some((into, score)) = outcome {
            self.counters.merged.fetch_add(1, Ordering::Relaxed);
            debug!(incoming = %person.id(), %into, score, "merged");
            return Resolution::Merged { into };
        }

        let id = person.id();
        self.accepted.insert(id, Arc::new(person));
        self.counters.accepted.fetch_add(1, Ordering::Relaxed);
        debug!(%id, candidates = candidates.len(), contended, "accepted as new");
        Resolution::Accepted { id }
    }

    /// Accepted records scoring at or above the threshold against `person`,
    /// best first. Scores the published snapshots, so never waits on a merge.
    pub fn candidates(&self, person: &Person) -> Vec<MergeCandidate> {
        let incoming_contact = person.lock().read();
        let incoming = MatchKey::new(person.name(), &incoming_contact);
        let mut candidates: Vec<MergeCandidate> = self
            .snapshot()
            .into_iter()
            .filter_map(|stored| {
                let contact = stored.lock().read();
                let score = self
                    .scorer
                    .score_keys(&incoming, &MatchKey::new(stored.name(), &contact));
                self.scorer
                    .qualifies(score)
                    .then(|| MergeCandidate::new(Arc::clone(&stored), score))
            })
            .collect();
        candidates.sort_by(|a, b| b.cmp(a));
        candidates
    }

    /// Every accepted record matching `predicate`, ordered by id.
    pub fn search(&self, predicate: impl Fn(&Person) -> bool) -> Vec<Arc<Person>> {
        let mut found: Vec<Arc<Person>> = self
            .accepted
            .iter()
            .filter(|entry| predicate(entry.value()))
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        found.sort_by_key(|p| p.id());
        found
    }

    /// The lowest-id accepted record matching `predicate`.
    pub fn get_one(&self, predicate: impl Fn(&Person) -> bool) -> Option<Arc<Person>> {
        self.accepted
            .iter()
            .filter(|entry| predicate(entry.value()))
            .map(|entry| Arc::clone(entry.value()))
            .min_by_key(|p| p.id())
    }

    pub fn get(&self, id: IdentityId) -> Option<Arc<Person>> {
        self.accepted.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    /// All accepted records, ordered by id.
    pub fn snapshot(&self) -> Vec<Arc<Person>> {
        self.search(|_| true)
    }

    pub fn len(&self) -> usize {
        self.accepted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accepted.is_empty()
    }

    pub fn stats(&self) -> MergeStats {
        MergeStats {
            accepted: self.counters.accepted.load(Ordering::Relaxed),
            merged: self.counters.merged.load(Ordering::Relaxed),
            contended: self.counters.contended.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
        }
    }
}

impl Default for MergeEngine {
    fn default() -> Self {
        Self::new(MergeConfig::default())
    }
}

/// Fill missing email and phone, and append addresses the target lacks.
fn merge_contact(target: &mut ContactDetails, incoming: ContactDetails) {
    if target.email_address.is_none() {
        target.email_address = incoming.email_address;
    }
    if target.phone_number.is_none() {
        target.phone_number = incoming.phone_number;
    }
    for address in incoming.addresses {
        if !target.addresses.iter().any(|a| a.id() == address.id()) {
            target.addresses.push(address);
        }
    }
}
