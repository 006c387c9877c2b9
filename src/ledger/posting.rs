//! Double-entry posting
//!
//! Every movement of funds writes one transaction row and exactly two ledger
//! entries (a debit and a credit of the same amount) in one SERIALIZABLE
//! database transaction.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use sqlx::PgConnection;

use crate::domain::{AccountState, Amount, Direction, DomainError, TransactionStatus};
use crate::identifier::{Identifier, LEDGER_ENTRY_PREFIX, TRANSACTION_PREFIX};

use super::accounts::fetch_account;
use super::balance::balance_of;
use super::error::{sqlstate, FOREIGN_KEY_VIOLATION};
use super::{LedgerError, LedgerStore};

/// Kind of posting. Decides whether the debited account must cover the amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PostingPolicy {
    /// External account funds the internal account; may overdraw the source
    Deposit,
    Withdraw,
    Transfer,
}

impl PostingPolicy {
    pub fn requires_sufficiency_check(&self) -> bool {
        match self {
            PostingPolicy::Deposit => false,
            PostingPolicy::Withdraw | PostingPolicy::Transfer => true,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PostingPolicy::Deposit => "deposit",
            PostingPolicy::Withdraw => "withdraw",
            PostingPolicy::Transfer => "transfer",
        }
    }
}

impl fmt::Display for PostingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated request to move `amount` from the debit to the credit account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostingRequest {
    pub amount: Amount,
    pub created_by: Identifier,
    pub debit_account_id: Identifier,
    pub credit_account_id: Identifier,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PostedTransaction {
    pub transaction_id: Identifier,
    pub debit_entry_id: Identifier,
    pub credit_entry_id: Identifier,
    pub amount: Amount,
    pub policy: PostingPolicy,
}

impl LedgerStore {
    pub async fn deposit(&self, request: PostingRequest) -> Result<PostedTransaction, LedgerError> {
        self.post(PostingPolicy::Deposit, request).await
    }

    pub async fn withdraw(&self, request: PostingRequest) -> Result<PostedTransaction, LedgerError> {
        self.post(PostingPolicy::Withdraw, request).await
    }

    pub async fn transfer(&self, request: PostingRequest) -> Result<PostedTransaction, LedgerError> {
        self.post(PostingPolicy::Transfer, request).await
    }

    // =========================================================================
    // post with retry
    // =========================================================================

    /// Post a transaction, re-running the whole protocol on serialization
    /// conflicts up to the configured number of attempts.
    pub async fn post(
        &self,
        policy: PostingPolicy,
        request: PostingRequest,
    ) -> Result<PostedTransaction, LedgerError> {
        if request.debit_account_id == request.credit_account_id {
            return Err(DomainError::SameAccount.into());
        }

        let mut attempt = 1;
        loop {
            match self.post_once(policy, &request).await {
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    tracing::warn!(
                        policy = %policy,
                        attempt = attempt,
                        max_attempts = self.max_attempts,
                        error = %e,
                        "Serialization conflict, retrying posting"
                    );
                    tokio::time::sleep(Duration::from_millis(50 * u64::from(attempt))).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    // =========================================================================
    // post_once (single attempt)
    // =========================================================================

    /// Run the posting protocol once.
    pub async fn post_once(
        &self,
        policy: PostingPolicy,
        request: &PostingRequest,
    ) -> Result<PostedTransaction, LedgerError> {
        if request.debit_account_id == request.credit_account_id {
            return Err(DomainError::SameAccount.into());
        }

        let mut tx = self.begin_serializable().await?;

        let posted = match write_posting(&mut tx, policy, request).await {
            Ok(posted) => posted,
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::debug!(error = %rollback_err, "Rollback after failed posting");
                }
                log_failure(policy, request, &e);
                return Err(e);
            }
        };

        if let Err(e) = tx.commit().await {
            let e = LedgerError::from(e);
            log_failure(policy, request, &e);
            return Err(e);
        }

        tracing::info!(
            transaction_id = %posted.transaction_id,
            policy = %policy,
            amount_minor = request.amount.minor_units(),
            debit_account_id = %request.debit_account_id,
            credit_account_id = %request.credit_account_id,
            created_by = %request.created_by,
            "Posted transaction"
        );

        Ok(posted)
    }
}

fn log_failure(policy: PostingPolicy, request: &PostingRequest, err: &LedgerError) {
    match err {
        LedgerError::StoreUnavailable(_) | LedgerError::Database(_) | LedgerError::CorruptData(_) => {
            tracing::error!(
                policy = %policy,
                debit_account_id = %request.debit_account_id,
                credit_account_id = %request.credit_account_id,
                error = %err,
                "Posting failed"
            );
        }
        _ if err.is_insufficient_funds() => {
            tracing::warn!(
                policy = %policy,
                amount_minor = request.amount.minor_units(),
                debit_account_id = %request.debit_account_id,
                "Insufficient funds"
            );
        }
        _ => {
            tracing::debug!(policy = %policy, error = %err, "Posting rejected");
        }
    }
}

/// Write a posting on an open transaction. Nothing is committed here.
pub(crate) async fn write_posting(
    conn: &mut PgConnection,
    policy: PostingPolicy,
    request: &PostingRequest,
) -> Result<PostedTransaction, LedgerError> {
    ensure_open(conn, &request.debit_account_id).await?;
    ensure_open(conn, &request.credit_account_id).await?;

    if policy.requires_sufficiency_check() {
        let available = balance_of(conn, &request.debit_account_id).await?;
        if !available.is_sufficient_for(&request.amount) {
            return Err(DomainError::insufficient_funds(
                request.debit_account_id.clone(),
                request.amount.minor_units(),
                available.minor_units(),
            )
            .into());
        }
    }

    let transaction_id = insert_transaction_row(conn, request).await?;
    let debit_entry_id = insert_entry(
        conn,
        &transaction_id,
        &request.debit_account_id,
        Direction::Debit,
        request,
    )
    .await?;
    let credit_entry_id = insert_entry(
        conn,
        &transaction_id,
        &request.credit_account_id,
        Direction::Credit,
        request,
    )
    .await?;

    Ok(PostedTransaction {
        transaction_id,
        debit_entry_id,
        credit_entry_id,
        amount: request.amount,
        policy,
    })
}

async fn ensure_open(conn: &mut PgConnection, account_id: &Identifier) -> Result<(), LedgerError> {
    let account = fetch_account(conn, account_id)
        .await?
        .ok_or_else(|| LedgerError::AccountNotFound(account_id.to_string()))?;

    if account.state != AccountState::Open {
        return Err(DomainError::AccountClosed(account_id.clone()).into());
    }
    Ok(())
}

pub(crate) async fn insert_transaction_row(
    conn: &mut PgConnection,
    request: &PostingRequest,
) -> Result<Identifier, LedgerError> {
    let id = Identifier::generate(TRANSACTION_PREFIX);

    sqlx::query(
        r#"
        INSERT INTO transactions (id, amount, status, created_by)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(&id)
    .bind(request.amount.minor_units())
    .bind(TransactionStatus::Success.as_str())
    .bind(&request.created_by)
    .execute(&mut *conn)
    .await?;

    Ok(id)
}

pub(crate) async fn insert_entry(
    conn: &mut PgConnection,
    transaction_id: &Identifier,
    account_id: &Identifier,
    direction: Direction,
    request: &PostingRequest,
) -> Result<Identifier, LedgerError> {
    let id = Identifier::generate(LEDGER_ENTRY_PREFIX);

    sqlx::query(
        r#"
        INSERT INTO ledger_entries (id, transaction_id, account_id, amount, direction, created_by)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(&id)
    .bind(transaction_id)
    .bind(account_id)
    .bind(request.amount.minor_units())
    .bind(direction.as_str())
    .bind(&request.created_by)
    .execute(&mut *conn)
    .await
    .map_err(|e| match sqlstate(&e).as_deref() {
        Some(FOREIGN_KEY_VIOLATION) => LedgerError::AccountNotFound(account_id.to_string()),
        _ => LedgerError::from(e),
    })?;

    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_deposit_skips_sufficiency() {
        assert!(!PostingPolicy::Deposit.requires_sufficiency_check());
        assert!(PostingPolicy::Withdraw.requires_sufficiency_check());
        assert!(PostingPolicy::Transfer.requires_sufficiency_check());
    }

    #[test]
    fn test_policy_display() {
        assert_eq!(PostingPolicy::Withdraw.to_string(), "withdraw");
        assert_eq!(
            serde_json::to_string(&PostingPolicy::Deposit).unwrap(),
            "\"deposit\""
        );
    }
}
