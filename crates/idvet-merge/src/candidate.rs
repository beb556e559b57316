use std::cmp::Ordering;
use std::sync::Arc;

use idvet_types::Person;

/// An accepted record paired with its score against an incoming record.
///
/// Ordered by score; among equal scores the record with the lower id ranks
/// higher, so sorting in descending order yields a deterministic preference.
#[derive(Clone, Debug)]
pub struct MergeCandidate {
    pub person: Arc<Person>,
    pub score: u32,
}

impl MergeCandidate {
    pub fn new(person: Arc<Person>, score: u32) -> Self {
        Self { person, score }
    }
}

impl PartialEq for MergeCandidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for MergeCandidate {}

impl PartialOrd for MergeCandidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MergeCandidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .cmp(&other.score)
            .then_with(|| other.person.id().cmp(&self.person.id()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use idvet_types::{ContactDetails, IdentityId, Password};

    fn candidate(id: u64, score: u32) -> MergeCandidate {
        let person = Person::new(
            IdentityId(id),
            "u",
            Password::default(),
            "n",
            1,
            ContactDetails::default(),
        );
        MergeCandidate::new(Arc::new(person), score)
    }

    #[test]
    fn descending_sort_prefers_score_then_lower_id() {
        let mut candidates = vec![
            candidate(3, 50),
            candidate(2, 85),
            candidate(5, 100),
            candidate(1, 85),
        ];
        candidates.sort_by(|a, b| b.cmp(a));
        let order: Vec<(u64, u32)> = candidates
            .iter()
            .map(|c| (c.person.id().0, c.score))
            .collect();
        assert_eq!(order, vec![(5, 100), (1, 85), (2, 85), (3, 50)]);
    }
}
