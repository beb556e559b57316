use serde::{Deserialize, Serialize};

/// Weights and threshold used to decide whether two records are duplicates.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    /// Added when both email addresses are present and equal.
    pub email_weight: u32,
    /// Added when both phone numbers are present and equal.
    pub phone_weight: u32,
    /// Added when both names are present and equal.
    pub name_weight: u32,
    /// Minimum total score for a record to be a merge candidate.
    pub threshold: u32,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            email_weight: 50,
            phone_weight: 15,
            name_weight: 35,
            threshold: 50,
        }
    }
}

impl MergeConfig {
    /// Highest score any pair of records can reach.
    pub fn max_score(&self) -> u32 {
        self.email_weight + self.phone_weight + self.name_weight
    }
}
