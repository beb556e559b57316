use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::id::IdentityId;
use crate::lock::RecordLock;

/// Credential carried through from the input. Never printed.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Password(String);

impl Password {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password(***)")
    }
}

/// The mutable part of a [`Person`]: fields a merge may fill in or extend.
#[derive(Clone, Debug, Default)]
pub struct ContactDetails {
    pub phone_number: Option<String>,
    pub email_address: Option<String>,
    pub addresses: Vec<Arc<Address>>,
}

impl ContactDetails {
    pub fn new(
        phone_number: Option<String>,
        email_address: Option<String>,
        addresses: Vec<Arc<Address>>,
    ) -> Self {
        Self {
            phone_number,
            email_address,
            addresses,
        }
    }

    /// Number of addresses that a verifier marked valid.
    pub fn verified_count(&self) -> usize {
        self.addresses.iter().filter(|a| a.is_verified()).count()
    }
}

/// A well-formed identity record.
///
/// `id`, `username`, `password`, `name` and `age` are settled at construction
/// and readable without locking. Phone, email and the address list live behind
/// the record's own [`RecordLock`]; accessors read its published snapshot.
#[derive(Debug)]
pub struct Person {
    id: IdentityId,
    username: String,
    password: Password,
    name: String,
    age: u32,
    contact: RecordLock<ContactDetails>,
}

impl Person {
    pub fn new(
        id: IdentityId,
        username: impl Into<String>,
        password: Password,
        name: impl Into<String>,
        age: u32,
        contact: ContactDetails,
    ) -> Self {
        Self {
            id,
            username: username.into(),
            password,
            name: name.into(),
            age,
            contact: RecordLock::new(contact),
        }
    }

    pub fn id(&self) -> IdentityId {
        self.id
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &Password {
        &self.password
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn age(&self) -> u32 {
        self.age
    }

    /// Consistent snapshot of the mutable fields.
    pub fn contact(&self) -> ContactDetails {
        ContactDetails::clone(&self.contact.read())
    }

    pub fn phone_number(&self) -> Option<String> {
        self.contact.read().phone_number.clone()
    }

    pub fn email_address(&self) -> Option<String> {
        self.contact.read().email_address.clone()
    }

    pub fn addresses(&self) -> Vec<Arc<Address>> {
        self.contact.read().addresses.clone()
    }

    /// The per-record lock guarding the contact fields.
    pub fn lock(&self) -> &RecordLock<ContactDetails> {
        &self.contact
    }

    /// Unsynchronised access, available only while the record is exclusively
    /// owned (before it is shared with other threads).
    pub fn contact_mut(&mut self) -> &mut ContactDetails {
        self.contact.get_mut()
    }
}

impl fmt::Display for Person {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Person {} ({})", self.id, self.username)
    }
}

/// Sentinel for an input line that could not be parsed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MalformedRecord {
    /// 1-based line number in the source.
    pub line: usize,
    pub content: String,
    pub reason: String,
}

/// A record produced by a source: either a person or a malformed marker.
///
/// The malformed variant must never be stored or merged.
#[derive(Debug)]
pub enum Identity {
    Person(Person),
    Malformed(MalformedRecord),
}

impl Identity {
    pub fn malformed(line: usize, content: impl Into<String>, reason: impl Into<String>) -> Self {
        Identity::Malformed(MalformedRecord {
            line,
            content: content.into(),
            reason: reason.into(),
        })
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, Identity::Malformed(_))
    }

    pub fn as_person(&self) -> Option<&Person> {
        match self {
            Identity::Person(p) => Some(p),
            Identity::Malformed(_) => None,
        }
    }

    pub fn into_person(self) -> Option<Person> {
        match self {
            Identity::Person(p) => Some(p),
            Identity::Malformed(_) => None,
        }
    }
}

impl From<Person> for Identity {
    fn from(person: Person) -> Self {
        Identity::Person(person)
    }
}
