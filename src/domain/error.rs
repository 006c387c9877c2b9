//! Domain Error Types
//!
//! Pure domain errors that don't depend on infrastructure.

use thiserror::Error;

use crate::identifier::{Identifier, IdentifierError};

use super::AmountError;

/// Business rule violations and invalid domain input.
///
/// Independent of the web and storage layers.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
    /// Debited account cannot cover the posting
    #[error("Insufficient funds in account {account_id}: required {required}, available {available}")]
    InsufficientFunds {
        account_id: Identifier,
        required: i64,
        available: i64,
    },

    /// Posting references a closed account
    #[error("Account is closed: {0}")]
    AccountClosed(Identifier),

    /// Debit and credit account are the same
    #[error("Debit and credit account must differ")]
    SameAccount,

    #[error("Invalid amount: {0}")]
    InvalidAmount(#[from] AmountError),

    #[error(transparent)]
    InvalidIdentifier(#[from] IdentifierError),

    /// Unknown enum text or malformed field
    #[error("Invalid value: {0}")]
    InvalidValue(String),
}

impl DomainError {
    pub fn insufficient_funds(account_id: Identifier, required: i64, available: i64) -> Self {
        Self::InsufficientFunds {
            account_id,
            required,
            available,
        }
    }
}
