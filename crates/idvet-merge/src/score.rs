use idvet_types::ContactDetails;

use crate::config::MergeConfig;

/// The fields a match score is computed from.
///
/// Empty strings count as absent, so two records never match on a blank.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MatchKey<'a> {
    pub name: Option<&'a str>,
    pub email: Option<&'a str>,
    pub phone: Option<&'a str>,
}

impl<'a> MatchKey<'a> {
    pub fn new(name: &'a str, contact: &'a ContactDetails) -> Self {
        Self {
            name: present(Some(name)),
            email: present(contact.email_address.as_deref()),
            phone: present(contact.phone_number.as_deref()),
        }
    }
}

fn present(field: Option<&str>) -> Option<&str> {
    field.filter(|value| !value.is_empty())
}

fn same(a: Option<&str>, b: Option<&str>) -> bool {
    matches!((a, b), (Some(a), Some(b)) if a == b)
}

/// Weighted field comparison between two identity records.
#[derive(Clone, Debug)]
pub struct MatchScorer {
    config: MergeConfig,
}

impl MatchScorer {
    pub fn new(config: MergeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MergeConfig {
        &self.config
    }

    /// Score two keys. Email and phone comparisons are case-sensitive.
    pub fn score_keys(&self, a: &MatchKey<'_>, b: &MatchKey<'_>) -> u32 {
        let mut score = 0;
        if same(a.email, b.email) {
            score += self.config.email_weight;
        }
        if same(a.phone, b.phone) {
            score += self.config.phone_weight;
        }
        if same(a.name, b.name) {
            score += self.config.name_weight;
        }
        score
    }

    pub fn qualifies(&self, score: u32) -> bool {
        score >= self.config.threshold
    }
}

impl Default for MatchScorer {
    fn default() -> Self {
        Self::new(MergeConfig::default())
    }
}
