//! Ledger Store
//!
//! Double-entry ledger persisted in Postgres: account and user provisioning,
//! postings, balances and transaction listing.

mod accounts;
mod balance;
mod error;
mod listing;
mod posting;
mod store;


pub use accounts::{Account, User};
pub use error::LedgerError;
pub use listing::{PageLimits, TransactionFilter, TransactionPage, TransactionRecord};
pub use posting::{PostedTransaction, PostingPolicy, PostingRequest};
pub use store::{LedgerStore, DEFAULT_MAX_ATTEMPTS};
