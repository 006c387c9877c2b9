//! Ledger Store Errors
//!
//! Error types for ledger store operations, with classification of
//! database failures into retryable conflicts and store outages.

use crate::domain::DomainError;

/// Serialization failure under SERIALIZABLE isolation
const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";
/// Class 08: connection exceptions
const CONNECTION_EXCEPTION_CLASS: &str = "08";
const ADMIN_SHUTDOWN: &str = "57P01";
const CANNOT_CONNECT_NOW: &str = "57P03";
pub(crate) const UNIQUE_VIOLATION: &str = "23505";
pub(crate) const FOREIGN_KEY_VIOLATION: &str = "23503";

/// Errors that can occur in the ledger store
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Business rule violation (insufficient funds, closed account, ...)
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("User already exists: {0}")]
    UserAlreadyExists(String),

    #[error("Invalid page limit: {0}")]
    InvalidLimit(String),

    /// Concurrent transaction conflict; the whole operation may be retried
    #[error("Transaction conflict, safe to retry: {0}")]
    ConflictRetryable(String),

    /// Connection or transport failure to the database
    #[error("Ledger store unavailable: {0}")]
    StoreUnavailable(String),

    /// Row that does not satisfy the schema contract
    #[error("Corrupt ledger data: {0}")]
    CorruptData(String),

    #[error("Database error: {0}")]
    Database(sqlx::Error),
}

impl LedgerError {
    /// Check if the failed operation may be retried from the start
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::ConflictRetryable(_))
    }

    pub fn is_insufficient_funds(&self) -> bool {
        matches!(
            self,
            LedgerError::Domain(DomainError::InsufficientFunds { .. })
        )
    }
}

/// SQLSTATE of a database error, if any
pub(crate) fn sqlstate(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().map(|code| code.into_owned()),
        _ => None,
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(err: sqlx::Error) -> Self {
        if let Some(code) = sqlstate(&err) {
            if code == SERIALIZATION_FAILURE || code == DEADLOCK_DETECTED {
                return LedgerError::ConflictRetryable(err.to_string());
            }
            if code.starts_with(CONNECTION_EXCEPTION_CLASS)
                || code == ADMIN_SHUTDOWN
                || code == CANNOT_CONNECT_NOW
            {
                return LedgerError::StoreUnavailable(err.to_string());
            }
            return LedgerError::Database(err);
        }

        if matches!(
            err,
            sqlx::Error::Io(_)
                | sqlx::Error::Tls(_)
                | sqlx::Error::PoolTimedOut
                | sqlx::Error::PoolClosed
                | sqlx::Error::WorkerCrashed
        ) {
            return LedgerError::StoreUnavailable(err.to_string());
        }

        LedgerError::Database(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifier::{Identifier, ACCOUNT_PREFIX};

    #[test]
    fn test_pool_errors_are_store_unavailable() {
        assert!(matches!(
            LedgerError::from(sqlx::Error::PoolTimedOut),
            LedgerError::StoreUnavailable(_)
        ));
        assert!(matches!(
            LedgerError::from(sqlx::Error::PoolClosed),
            LedgerError::StoreUnavailable(_)
        ));

        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        assert!(matches!(
            LedgerError::from(sqlx::Error::Io(io)),
            LedgerError::StoreUnavailable(_)
        ));
    }

    #[test]
    fn test_other_errors_are_database() {
        let err = LedgerError::from(sqlx::Error::RowNotFound);
        assert!(matches!(err, LedgerError::Database(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_only_conflicts_are_retryable() {
        assert!(LedgerError::ConflictRetryable("40001".to_string()).is_retryable());
        assert!(!LedgerError::StoreUnavailable("down".to_string()).is_retryable());

        let insufficient: LedgerError =
            DomainError::insufficient_funds(Identifier::generate(ACCOUNT_PREFIX), 100, 99).into();
        assert!(!insufficient.is_retryable());
        assert!(insufficient.is_insufficient_funds());
    }
}
