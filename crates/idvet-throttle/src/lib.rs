//! Verification layer for idvet.
//!
//! Every strategy here implements [`AddressVerifier`] and wraps another
//! verifier, so they compose in front of the real downstream call.
//!
//! # Strategies
//!
//! - [`AdmissionGate`] — bounds concurrent delegate calls with a resizable permit pool
//! - [`BackpressureGate`] — fixed queue plus worker pool; rejects when the queue is full
//! - [`Batcher`] — coalesces submitted items into delegate batches, either with a
//!   generation barrier ([`BarrierBatcher`]) or a phaser and fetcher loop ([`PhaseBatcher`])
//! - [`SimulatedVerifier`] — in-process verifier with configurable latency
//!
//! [`VerifierConfig::build`] selects a strategy from configuration.

pub mod admission;
pub mod backpressure;
pub mod batch;
pub mod config;
pub mod error;
pub mod permits;
pub mod simulated;
pub mod verifier;

#[cfg(test)]
pub(crate) mod testing;

pub use admission::AdmissionGate;
pub use backpressure::BackpressureGate;
pub use batch::{
    BarrierBatcher, BatchHandle, BatchStats, Batcher, BatchingVerifier, FlushReason, PhaseBatcher,
};
pub use config::{BatchConfig, Strategy, VerifierConfig};
pub use error::{DelegateMessage, VerifyError, VerifyResult};
pub use permits::{Permit, PermitPool};
pub use simulated::SimulatedVerifier;
pub use verifier::{AddressVerifier, SharedVerifier};
