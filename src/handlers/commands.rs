//! Command definitions
//!
//! Commands represent intentions to change the ledger.

use serde::{Deserialize, Serialize};

use crate::domain::{AccountState, AccountType};
use crate::error::AppError;
use crate::identifier::Identifier;

const MAX_EMAIL_LEN: usize = 254;
const MAX_NAME_LEN: usize = 200;

// =========================================================================
// CreateUserCommand
// =========================================================================

/// Command to create a new user with its two accounts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUserCommand {
    pub email: String,
    pub name: String,
}

impl CreateUserCommand {
    pub fn new(email: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            email: email.into().trim().to_string(),
            name: name.into().trim().to_string(),
        }
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if !self.email.contains('@') || self.email.len() > MAX_EMAIL_LEN {
            return Err(AppError::InvalidRequest("email must be a valid address".to_string()));
        }
        if self.name.is_empty() || self.name.len() > MAX_NAME_LEN {
            return Err(AppError::InvalidRequest("name must not be empty".to_string()));
        }
        Ok(())
    }
}

// =========================================================================
// CreateAccountCommand
// =========================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CreateAccountCommand {
    pub state: AccountState,
    pub account_type: AccountType,
}

impl CreateAccountCommand {
    pub fn new(state: AccountState, account_type: AccountType) -> Self {
        Self {
            state,
            account_type,
        }
    }
}

// =========================================================================
// FundsCommand
// =========================================================================

/// Command to deposit, withdraw or transfer funds
///
/// Deposits and withdrawals may omit the account ids; they then default to
/// the user's own external and internal accounts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundsCommand {
    /// Major units as supplied by the caller
    pub amount: f64,
    /// Recorded as the creator of the transaction
    pub user_id: Identifier,
    pub debit_account_id: Option<Identifier>,
    pub credit_account_id: Option<Identifier>,
}

impl FundsCommand {
    pub fn new(amount: f64, user_id: Identifier) -> Self {
        Self {
            amount,
            user_id,
            debit_account_id: None,
            credit_account_id: None,
        }
    }

    pub fn with_accounts(
        mut self,
        debit_account_id: Option<Identifier>,
        credit_account_id: Option<Identifier>,
    ) -> Self {
        self.debit_account_id = debit_account_id;
        self.credit_account_id = credit_account_id;
        self
    }
}
