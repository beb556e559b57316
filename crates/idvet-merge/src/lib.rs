//! Duplicate resolution for idvet.
//!
//! [`MergeEngine`] owns the accepted identity records. Each incoming record
//! is scored against every accepted one; the best candidate at or above the
//! threshold absorbs its missing email and phone plus its addresses, under
//! that candidate's own lock. Records with no qualifying, uncontended
//! candidate are accepted as new.

pub mod candidate;
pub mod config;
pub mod engine;
pub mod error;
pub mod score;

pub use candidate::MergeCandidate;
pub use config::MergeConfig;
pub use engine::{MergeEngine, MergeStats, Resolution};
pub use error::{MergeError, MergeResult};
pub use score::{MatchKey, MatchScorer};
