//! Balance computation
//!
//! Balances are never stored; they are summed from ledger entries on read.

use sqlx::PgConnection;

use crate::domain::Balance;
use crate::identifier::Identifier;

use super::{LedgerError, LedgerStore};

impl LedgerStore {
    /// Balance of an account (credits minus debits).
    ///
    /// An account without entries has a zero balance. An unknown account is
    /// `AccountNotFound`.
    pub async fn get_balance(&self, account_id: &Identifier) -> Result<Balance, LedgerError> {
        let balance: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT (
                SELECT COALESCE(SUM(CASE WHEN le.direction = 'credit' THEN le.amount ELSE -le.amount END), 0)::BIGINT
                FROM ledger_entries le
                WHERE le.account_id = a.id
            )
            FROM accounts a
            WHERE a.id = $1
            "#,
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?;

        balance
            .map(Balance::from_minor)
            .ok_or_else(|| LedgerError::AccountNotFound(account_id.to_string()))
    }
}

/// Balance read on an existing connection, typically inside a posting
/// transaction so the read takes part in serializable conflict detection.
pub(crate) async fn balance_of(
    conn: &mut PgConnection,
    account_id: &Identifier,
) -> Result<Balance, LedgerError> {
    let balance: i64 = sqlx::query_scalar(
        r#"
        SELECT COALESCE(SUM(CASE WHEN direction = 'credit' THEN amount ELSE -amount END), 0)::BIGINT
        FROM ledger_entries
        WHERE account_id = $1
        "#,
    )
    .bind(account_id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(Balance::from_minor(balance))
}
