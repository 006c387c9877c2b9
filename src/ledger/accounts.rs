//! Accounts and users
//!
//! Row-level persistence for accounts and users. User creation inserts both
//! of the user's accounts and the user row in a single transaction.

use serde::Serialize;
use sqlx::PgConnection;

use crate::domain::{AccountState, AccountType};
use crate::identifier::{Identifier, ACCOUNT_PREFIX, USER_PREFIX};

use super::error::{sqlstate, UNIQUE_VIOLATION};
use super::{LedgerError, LedgerStore};

/// Ledger account
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Account {
    pub id: Identifier,
    pub state: AccountState,
    #[serde(rename = "type")]
    pub account_type: AccountType,
}

/// User with their internal (custody) and external (counterparty) accounts
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: Identifier,
    pub email: String,
    pub name: String,
    pub internal_account_id: Identifier,
    pub external_account_id: Identifier,
}

impl LedgerStore {
    /// Create a single account.
    pub async fn create_account(
        &self,
        state: AccountState,
        account_type: AccountType,
    ) -> Result<Account, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let id = insert_account(&mut conn, state, account_type).await?;

        Ok(Account {
            id,
            state,
            account_type,
        })
    }

    /// Create a user together with an internal and an external account.
    ///
    /// All three rows commit together or not at all.
    pub async fn create_user(&self, email: &str, name: &str) -> Result<User, LedgerError> {
        let mut tx = self.pool.begin().await?;

        let internal_account_id =
            insert_account(&mut tx, AccountState::Open, AccountType::Debit).await?;
        let external_account_id =
            insert_account(&mut tx, AccountState::Open, AccountType::Credit).await?;

        let id = Identifier::generate(USER_PREFIX);
        sqlx::query(
            r#"
            INSERT INTO users (id, email, name, int_ledger_account_id, ext_ledger_account_id)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(&id)
        .bind(email)
        .bind(name)
        .bind(&internal_account_id)
        .bind(&external_account_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| match sqlstate(&e).as_deref() {
            Some(UNIQUE_VIOLATION) => LedgerError::UserAlreadyExists(email.to_string()),
            _ => LedgerError::from(e),
        })?;

        tx.commit().await?;

        Ok(User {
            id,
            email: email.to_string(),
            name: name.to_string(),
            internal_account_id,
            external_account_id,
        })
    }

    pub async fn get_account(&self, account_id: &Identifier) -> Result<Account, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        fetch_account(&mut conn, account_id)
            .await?
            .ok_or_else(|| LedgerError::AccountNotFound(account_id.to_string()))
    }

    pub async fn get_user(&self, user_id: &Identifier) -> Result<User, LedgerError> {
        let row: Option<(Identifier, String, String, Identifier, Identifier)> = sqlx::query_as(
            r#"
            SELECT id, email, name, int_ledger_account_id, ext_ledger_account_id
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        let (id, email, name, internal_account_id, external_account_id) =
            row.ok_or_else(|| LedgerError::UserNotFound(user_id.to_string()))?;

        Ok(User {
            id,
            email,
            name,
            internal_account_id,
            external_account_id,
        })
    }
}

pub(crate) async fn insert_account(
    conn: &mut PgConnection,
    state: AccountState,
    account_type: AccountType,
) -> Result<Identifier, LedgerError> {
    let id = Identifier::generate(ACCOUNT_PREFIX);

    sqlx::query(
        r#"
        INSERT INTO accounts (id, account_state, account_type)
        VALUES ($1, $2, $3)
        "#,
    )
    .bind(&id)
    .bind(state.as_str())
    .bind(account_type.as_str())
    .execute(&mut *conn)
    .await?;

    Ok(id)
}

pub(crate) async fn fetch_account(
    conn: &mut PgConnection,
    account_id: &Identifier,
) -> Result<Option<Account>, LedgerError> {
    let row: Option<(Identifier, String, String)> = sqlx::query_as(
        r#"
        SELECT id, account_state, account_type
        FROM accounts
        WHERE id = $1
        "#,
    )
    .bind(account_id)
    .fetch_optional(&mut *conn)
    .await?;

    row.map(|(id, state, account_type)| {
        Ok(Account {
            id,
            state: state
                .parse()
                .map_err(|e| LedgerError::CorruptData(format!("account {}: {}", account_id, e)))?,
            account_type: account_type
                .parse()
                .map_err(|e| LedgerError::CorruptData(format!("account {}: {}", account_id, e)))?,
        })
    })
    .transpose()
}
