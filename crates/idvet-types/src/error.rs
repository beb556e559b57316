use thiserror::Error;

use crate::id::AddressId;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("address {id} already carries a verification result (verified={current})")]
    AlreadyVerified { id: AddressId, current: bool },
}
