use std::sync::Arc;
use std::time::Instant;

use idvet_merge::{MergeEngine, Resolution};
use idvet_throttle::{SharedVerifier, VerifyError};
use idvet_types::{Identity, Person};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::error::{IngestError, IngestResult};
use crate::format::format_contact;
use crate::malformed::{MalformedEntry, MalformedRepository};
use crate::stats::{StatsEntry, StatsLedger};

/// Totals for one pipeline run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineReport {
    /// Records produced by the source, malformed ones included.
    pub read: u64,
    /// Records stored as new identities.
    pub accepted: u64,
    /// Records folded into an existing identity.
    pub merged: u64,
    /// Lines the source could not parse.
    pub malformed: u64,
    /// Parsed records that failed verification, validation, or formatting.
    pub rejected: u64,
    pub elapsed_ms: u64,
}

enum Outcome {
    Accepted,
    Merged,
    Rejected,
}

/// Reads records, verifies their addresses, and resolves them against the
/// merge engine.
///
/// Each parsed record goes through: verify addresses, require at least one
/// verified address, normalise phone and email, resolve. Records stored as
/// new are counted in the stats ledger. Anything that fails on the way is
/// sent to the malformed repository with the reason.
pub struct IdentityPipeline {
    verifier: SharedVerifier,
    engine: Arc<MergeEngine>,
    stats: Arc<StatsLedger>,
    malformed: Arc<dyn MalformedRepository>,
    config: PipelineConfig,
}

impl IdentityPipeline {
    pub fn new(
        verifier: SharedVerifier,
        engine: Arc<MergeEngine>,
        stats: Arc<StatsLedger>,
        malformed: Arc<dyn MalformedRepository>,
        config: PipelineConfig,
    ) -> IngestResult<Self> {
        if config.max_in_flight == 0 {
            return Err(IngestError::Config("max_in_flight must be at least 1".into()));
        }
        Ok(Self {
            verifier,
            engine,
            stats,
            malformed,
            config,
        })
    }

    pub fn engine(&self) -> &Arc<MergeEngine> {
        &self.engine
    }

    pub fn stats(&self) -> &Arc<StatsLedger> {
        &self.stats
    }

    /// Drive every record from `records` through the pipeline.
    ///
    /// An I/O error from the source stops reading; records already in flight
    /// finish before the error is returned.
    pub async fn process<I>(&self, records: I) -> IngestResult<PipelineReport>
    where
        I: IntoIterator<Item = IngestResult<Identity>>,
    {
        let started = Instant::now();
        let slots = Arc::new(Semaphore::new(self.config.max_in_flight));
        let mut tasks = JoinSet::new();
        let mut report = PipelineReport::default();
        let mut failure = None;

        for record in records {
            let identity = match record {
                Ok(identity) => identity,
                Err(err) => {
                    warn!(error = %err, "source failed, stopping");
                    failure = Some(err);
                    break;
                }
            };
            report.read += 1;
            let person = match identity {
                Identity::Person(person) => person,
                Identity::Malformed(record) => {
                    report.malformed += 1;
                    self.malformed.add(MalformedEntry::from_record(&record)).await;
                    continue;
                }
            };

            let slot = Arc::clone(&slots)
                .acquire_owned()
                .await
                .map_err(|_| IngestError::Task("pipeline slots closed".into()))?;
            let stage = Stage {
                verifier: Arc::clone(&self.verifier),
                engine: Arc::clone(&self.engine),
                stats: Arc::clone(&self.stats),
                malformed: Arc::clone(&self.malformed),
                config: self.config.clone(),
            };
            tasks.spawn(async move {
                let _slot = slot;
                stage.run(person).await
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Outcome::Accepted) => report.accepted += 1,
                Ok(Outcome::Merged) => report.merged += 1,
                Ok(Outcome::Rejected) => report.rejected += 1,
                Err(err) => {
                    warn!(error = %err, "pipeline task failed");
                    failure.get_or_insert(IngestError::Task(err.to_string()));
                }
            }
        }

        report.elapsed_ms = started.elapsed().as_millis() as u64;
        if let Some(err) = failure {
            return Err(err);
        }
        info!(
            read = report.read,
            accepted = report.accepted,
            merged = report.merged,
            malformed = report.malformed,
            rejected = report.rejected,
            "pipeline finished"
        );
        Ok(report)
    }
}

/// Everything one record's task needs.
struct Stage {
    verifier: SharedVerifier,
    engine: Arc<MergeEngine>,
    stats: Arc<StatsLedger>,
    malformed: Arc<dyn MalformedRepository>,
    config: PipelineConfig,
}

impl Stage {
    async fn run(self, mut person: Person) -> Outcome {
        if let Err(reason) = self.prepare(&mut person).await {
            debug!(id = %person.id(), %reason, "record rejected");
            self.malformed
                .add(MalformedEntry::from_person(&person, reason))
                .await;
            return Outcome::Rejected;
        }

        let entry = StatsEntry::from_person(&person);
        match self.engine.resolve_person(person) {
            Resolution::Merged { .. } => Outcome::Merged,
            Resolution::Accepted { .. } => {
                self.stats.record(entry);
                Outcome::Accepted
            }
        }
    }

    /// Verify, validate, and format. Returns the rejection reason on failure.
    async fn prepare(&self, person: &mut Person) -> Result<(), String> {
        let addresses = person.addresses();
        let verified = tokio::time::timeout(
            self.config.verify_timeout(),
            self.verifier.verify(&addresses),
        )
        .await;
        match verified {
            Err(_) => {
                return Err(format!(
                    "verification timed out after {}ms",
                    self.config.verify_timeout_ms
                ))
            }
            Ok(Err(err)) => return Err(err.to_string()),
            Ok(Ok(())) => {}
        }
        validate_addresses(person).map_err(|err| err.to_string())?;
        format_contact(person.contact_mut()).map_err(|err| err.to_string())
    }
}

/// Require at least one verified address.
pub fn validate_addresses(person: &Person) -> Result<(), VerifyError> {
    if person.addresses().iter().any(|a| a.is_verified()) {
        Ok(())
    } else {
        Err(VerifyError::NoValidAddresses)
    }
}
