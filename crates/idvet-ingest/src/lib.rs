//! Record ingestion for idvet.
//!
//! Turns a line-oriented source into identity records and drives them
//! through verification and duplicate resolution.
//!
//! # Key Types
//!
//! - [`IdentityReader`] — Tab-separated reader for the supported [`Layout`]s
//! - [`IdentityPipeline`] — Verify, validate, format, and resolve each record concurrently
//! - [`StatsLedger`] — Concurrent name and age counters over accepted records
//! - [`MalformedRepository`] — Sink for rejected records; [`FireAndForget`] makes it non-blocking

pub mod config;
pub mod error;
pub mod format;
pub mod malformed;
pub mod pipeline;
pub mod reader;
pub mod stats;

pub use config::PipelineConfig;
pub use error::{FormatError, IngestError, IngestResult};
pub use format::{format_contact, format_email, format_phone};
pub use malformed::{FireAndForget, InMemoryMalformedRepository, MalformedEntry, MalformedRepository};
pub use pipeline::{validate_addresses, IdentityPipeline, PipelineReport};
pub use reader::{parse_line, IdentityReader, Layout};
pub use stats::{StatsEntry, StatsLedger, StatsSummary};
