//! Error types for RepDB
//!
//! Both categories are fatal to the simulation: they indicate a malformed
//! script, not a runtime contention condition. Contention (a transaction
//! waiting or blocked) is normal state, never an error.

use crate::types::{SiteId, VariableId};
use thiserror::Error;

/// Result type alias using RepDB's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for RepDB
#[derive(Error, Debug)]
pub enum Error {
    // Protocol violations
    #[error("protocol violation: {0}")]
    Protocol(#[from] ProtocolError),

    // Data-integrity violations
    #[error("data integrity violation: {0}")]
    Data(#[from] DataError),
}

/// A script step that violates the transaction or site protocol.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("transaction {0} already exists")]
    TransactionExists(String),

    #[error("transaction {0} does not exist")]
    UnknownTransaction(String),

    #[error("transaction {txn} received {operation} while it is {state}")]
    UnexpectedOperation {
        txn: String,
        operation: String,
        state: String,
    },

    #[error("{0} has already failed")]
    SiteAlreadyFailed(SiteId),

    #[error("{0} is not in a failed state")]
    SiteNotFailed(SiteId),

    #[error("{0} does not exist")]
    UnknownSite(SiteId),
}

/// Internal state that should be unreachable given valid input, checked
/// defensively.
#[derive(Error, Debug)]
pub enum DataError {
    #[error("variable {variable} is not hosted at {site}")]
    NotHosted { site: SiteId, variable: VariableId },

    #[error("variable {variable} has no committed value at or before tick {tick}")]
    NoVersion { variable: VariableId, tick: u64 },

    #[error("variable {variable} committed with no pending write")]
    NoPendingWrite { variable: VariableId },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::from(ProtocolError::TransactionExists("T1".into()));
        assert_eq!(
            err.to_string(),
            "protocol violation: transaction T1 already exists"
        );

        let err = Error::from(DataError::NotHosted {
            site: SiteId(3),
            variable: VariableId(5),
        });
        assert!(err.to_string().contains("x5 is not hosted at site 3"));
    }
}
