//! Command Handlers module
//!
//! Handlers validate commands and drive the ledger store.

mod account_handler;
mod commands;
mod funds_handler;
mod user_handler;


pub use account_handler::CreateAccountHandler;
pub use commands::*;
pub use funds_handler::{default_accounts, FundsHandler};
pub use user_handler::CreateUserHandler;
