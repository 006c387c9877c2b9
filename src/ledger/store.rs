//! Ledger Store
//!
//! Handle over the connection pool shared by posting, balance, listing and
//! provisioning operations.

use sqlx::{PgPool, Postgres, Transaction};

use super::listing::PageLimits;
use super::LedgerError;

/// Attempts per posting before a serialization conflict is surfaced
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Ledger store over the `accounts`, `users`, `transactions` and
/// `ledger_entries` tables.
///
/// All writes to account rows go through SERIALIZABLE transactions; there is
/// no application-level locking.
#[derive(Debug, Clone)]
pub struct LedgerStore {
    pub(super) pool: PgPool,
    pub(super) max_attempts: u32,
    pub(super) page_limits: PageLimits,
}

impl LedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            page_limits: PageLimits::default(),
        }
    }

    /// Set how many times a posting is attempted on serialization conflicts.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_page_limits(mut self, page_limits: PageLimits) -> Self {
        self.page_limits = page_limits;
        self
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn page_limits(&self) -> PageLimits {
        self.page_limits
    }

    /// Begin a transaction at SERIALIZABLE isolation.
    ///
    /// Dropping the returned transaction without committing rolls it back.
    pub async fn begin_serializable(&self) -> Result<Transaction<'static, Postgres>, LedgerError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await?;
        Ok(tx)
    }
}
