//! Domain module
//!
//! Core domain types and business rules.

pub mod amount;
pub mod context;
pub mod error;
pub mod types;

pub use amount::{Amount, AmountError, Balance, MINOR_PER_MAJOR};
pub use context::OperationContext;
pub use error::DomainError;
pub use types::{AccountState, AccountType, Direction, TransactionStatus};
