//! Foundation types for idvet.
//!
//! This crate provides the data model shared by the verification layer, the
//! merge engine, and the ingest pipeline. Every other idvet crate depends on
//! `idvet-types`.
//!
//! # Key Types
//!
//! - [`Address`] — Street address with a write-once `verified` flag
//! - [`IdGenerator`] — Injectable monotonic id source (no process-wide statics)
//! - [`Person`] — Identity record whose mutable contact fields sit behind a [`RecordLock`]
//! - [`Identity`] — Either a [`Person`] or the [`MalformedRecord`] sentinel
//! - [`RecordLock`] — Per-record lock with a non-blocking exclusive acquire

pub mod address;
pub mod error;
pub mod id;
pub mod identity;
pub mod lock;

pub use address::Address;
pub use error::TypeError;
pub use id::{AddressId, IdGenerator, IdentityId};
pub use identity::{ContactDetails, Identity, MalformedRecord, Password, Person};
pub use lock::{RecordGuard, RecordLock};
