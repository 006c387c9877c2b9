//! Ledger Service Library
//!
//! Double-entry ledger over Postgres with an axum HTTP gateway.
//! Re-exports modules for the server binary, tools and integration tests.

pub mod api;
pub mod config;
pub mod db;
pub mod domain;
pub mod handlers;
pub mod idempotency;
pub mod identifier;
pub mod jobs;
pub mod ledger;

mod error;

pub use config::Config;
pub use domain::{Amount, AmountError, Balance, DomainError, OperationContext};
pub use error::{AppError, AppResult, ErrorResponse};
pub use identifier::{Identifier, IdentifierError};
pub use ledger::{LedgerError, LedgerStore};
