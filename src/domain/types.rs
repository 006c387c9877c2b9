//! Ledger value types
//!
//! Enumerations persisted as TEXT columns.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::DomainError;

/// Lifecycle state of an account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountState {
    Open,
    Closed,
}

/// Normal balance side of an account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    /// Debit-normal
    Debit,
    /// Credit-normal
    Credit,
}

/// Side of a ledger entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Debit,
    Credit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Success,
    Failed,
}

impl AccountState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountState::Open => "open",
            AccountState::Closed => "closed",
        }
    }
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Debit => "debit",
            AccountType::Credit => "credit",
        }
    }
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Debit => "debit",
            Direction::Credit => "credit",
        }
    }

    /// Sign applied to an entry amount when summing a balance
    pub fn sign(&self) -> i64 {
        match self {
            Direction::Debit => -1,
            Direction::Credit => 1,
        }
    }
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Success => "success",
            TransactionStatus::Failed => "failed",
        }
    }
}

macro_rules! text_enum {
    ($ty:ident, $name:literal, { $($text:literal => $variant:ident),+ $(,)? }) => {
        impl FromStr for $ty {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($ty::$variant),)+
                    other => Err(DomainError::InvalidValue(format!(
                        "unknown {} '{}'",
                        $name, other
                    ))),
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

text_enum!(AccountState, "account state", { "open" => Open, "closed" => Closed });
text_enum!(AccountType, "account type", { "debit" => Debit, "credit" => Credit });
text_enum!(Direction, "direction", { "debit" => Debit, "credit" => Credit });
text_enum!(TransactionStatus, "transaction status", { "success" => Success, "failed" => Failed });
