use std::fmt;
use std::sync::OnceLock;

use crate::error::TypeError;
use crate::id::{AddressId, IdGenerator};

/// A street address attached to an identity.
///
/// Everything except the verification result is immutable. The result is
/// written at most once, by whichever verification call processes the address;
/// until then the address reads as unverified.
#[derive(Debug)]
pub struct Address {
    id: AddressId,
    street: String,
    city: String,
    state: String,
    zip_code: String,
    verified: OnceLock<bool>,
}

impl Address {
    /// Create an address, drawing its id from `ids`.
    pub fn new(
        ids: &IdGenerator,
        street: impl Into<String>,
        city: impl Into<String>,
        state: impl Into<String>,
        zip_code: impl Into<String>,
    ) -> Self {
        Self::with_id(ids.next_address_id(), street, city, state, zip_code)
    }

    /// Create an address with an explicit id.
    pub fn with_id(
        id: AddressId,
        street: impl Into<String>,
        city: impl Into<String>,
        state: impl Into<String>,
        zip_code: impl Into<String>,
    ) -> Self {
        Self {
            id,
            street: street.into(),
            city: city.into(),
            state: state.into(),
            zip_code: zip_code.into(),
            verified: OnceLock::new(),
        }
    }

    pub fn id(&self) -> AddressId {
        self.id
    }

    pub fn street(&self) -> &str {
        &self.street
    }

    pub fn city(&self) -> &str {
        &self.city
    }

    pub fn state(&self) -> &str {
        &self.state
    }

    pub fn zip_code(&self) -> &str {
        &self.zip_code
    }

    /// Record the verification result.
    ///
    /// Fails with [`TypeError::AlreadyVerified`] if a result was already
    /// recorded; the first result always wins.
    pub fn mark_verified(&self, verified: bool) -> Result<(), TypeError> {
        self.verified
            .set(verified)
            .map_err(|_| TypeError::AlreadyVerified {
                id: self.id,
                current: self.is_verified(),
            })
    }

    /// `true` once a verifier has marked this address as valid.
    pub fn is_verified(&self) -> bool {
        self.verified.get().copied().unwrap_or(false)
    }

    /// The recorded result, or `None` if no verifier has processed the address.
    pub fn verification(&self) -> Option<bool> {
        self.verified.get().copied()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address {}", self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn sample(ids: &IdGenerator) -> Address {
        Address::new(ids, "1 Main St", "Springfield", "IL", "62701")
    }

    #[test]
    fn new_address_is_unverified() {
        let ids = IdGenerator::new();
        let addr = sample(&ids);
        assert!(!addr.is_verified());
        assert_eq!(addr.verification(), None);
        assert_eq!(addr.id(), AddressId(1));
        assert_eq!(addr.city(), "Springfield");
    }

    #[test]
    fn verified_flag_is_write_once() {
        let ids = IdGenerator::new();
        let addr = sample(&ids);
        addr.mark_verified(true).unwrap();
        assert!(addr.is_verified());

        let err = addr.mark_verified(false).unwrap_err();
        assert_eq!(
            err,
            TypeError::AlreadyVerified {
                id: addr.id(),
                current: true
            }
        );
        assert!(addr.is_verified());
    }

    #[test]
    fn rejected_result_reads_as_unverified() {
        let ids = IdGenerator::new();
        let addr = sample(&ids);
        addr.mark_verified(false).unwrap();
        assert!(!addr.is_verified());
        assert_eq!(addr.verification(), Some(false));
    }

    #[test]
    fn concurrent_markers_race_to_a_single_write() {
        let ids = IdGenerator::new();
        let addr = Arc::new(sample(&ids));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let addr = Arc::clone(&addr);
                thread::spawn(move || addr.mark_verified(i % 2 == 0).is_ok())
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
        assert!(addr.verification().is_some());
    }

    #[test]
    fn display_uses_id() {
        let addr = Address::with_id(AddressId(12), "s", "c", "st", "z");
        assert_eq!(addr.to_string(), "Address addr#12");
    }
}
