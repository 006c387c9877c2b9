//! Transaction listing
//!
//! Seek pagination over transactions in identifier order.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, Postgres, QueryBuilder};

use crate::domain::{Direction, TransactionStatus};
use crate::identifier::Identifier;

use super::{LedgerError, LedgerStore};

/// Page size bounds for listing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLimits {
    pub default_limit: u32,
    pub max_limit: u32,
}

impl Default for PageLimits {
    fn default() -> Self {
        Self {
            default_limit: 50,
            max_limit: 1000,
        }
    }
}

impl PageLimits {
    /// Resolve a requested page size.
    ///
    /// Absent uses the default, zero is rejected, oversize is clamped.
    pub fn resolve(&self, requested: Option<u32>) -> Result<u32, LedgerError> {
        match requested {
            None => Ok(self.default_limit.min(self.max_limit)),
            Some(0) => Err(LedgerError::InvalidLimit(
                "limit must be at least 1".to_string(),
            )),
            Some(limit) => Ok(limit.min(self.max_limit)),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    /// Only transactions with an entry on this account
    pub account_id: Option<Identifier>,
    /// Id of the first transaction of the page, inclusive.
    ///
    /// Pass a previous page's `next_cursor` here, not the last id seen.
    pub cursor: Option<Identifier>,
    pub limit: Option<u32>,
}

#[derive(Debug, FromRow)]
struct TransactionRow {
    id: Identifier,
    account_id: Option<Identifier>,
    direction: Option<String>,
    amount: i64,
    status: String,
    created_by: Identifier,
    created_at: DateTime<Utc>,
}

/// A transaction as seen from the listing, optionally from one account's side
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionRecord {
    pub id: Identifier,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_id: Option<Identifier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<Direction>,
    /// Minor units
    pub amount: i64,
    pub status: TransactionStatus,
    pub created_by: Identifier,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<TransactionRow> for TransactionRecord {
    type Error = LedgerError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        let corrupt = |e| LedgerError::CorruptData(format!("transaction {}: {}", row.id, e));

        let direction = match row.direction.as_deref() {
            Some(d) => Some(d.parse::<Direction>().map_err(corrupt)?),
            None => None,
        };
        let status = row.status.parse::<TransactionStatus>().map_err(corrupt)?;

        Ok(Self {
            id: row.id,
            account_id: row.account_id,
            direction,
            amount: row.amount,
            status,
            created_by: row.created_by,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionPage {
    pub transactions: Vec<TransactionRecord>,
    /// Id of the first transaction on the next page
    pub next_cursor: Option<Identifier>,
}

impl LedgerStore {
    /// List transactions in ascending id order.
    ///
    /// With an account filter each row carries that account's entry direction.
    pub async fn list_transactions(
        &self,
        filter: &TransactionFilter,
    ) -> Result<TransactionPage, LedgerError> {
        let limit = self.page_limits.resolve(filter.limit)?;

        let mut query = build_list_query(filter, limit);
        let rows: Vec<TransactionRow> = query.build_query_as().fetch_all(&self.pool).await?;

        let mut transactions = rows
            .into_iter()
            .map(TransactionRecord::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        let next_cursor = if transactions.len() > limit as usize {
            transactions.pop().map(|extra| extra.id)
        } else {
            None
        };

        tracing::debug!(
            account_id = ?filter.account_id,
            cursor = ?filter.cursor,
            limit = limit,
            returned = transactions.len(),
            has_more = next_cursor.is_some(),
            "Listed transactions"
        );

        Ok(TransactionPage {
            transactions,
            next_cursor,
        })
    }
}

fn build_list_query(filter: &TransactionFilter, limit: u32) -> QueryBuilder<'_, Postgres> {
    let mut query = QueryBuilder::new("");

    match &filter.account_id {
        Some(account_id) => {
            query.push(
                "SELECT t.id, le.account_id, le.direction, t.amount, t.status, t.created_by, t.created_at \
                 FROM transactions t \
                 JOIN ledger_entries le ON le.transaction_id = t.id \
                 WHERE le.account_id = ",
            );
            query.push_bind(account_id);
        }
        None => {
            query.push(
                "SELECT t.id, NULL::TEXT AS account_id, NULL::TEXT AS direction, \
                 t.amount, t.status, t.created_by, t.created_at \
                 FROM transactions t \
                 WHERE TRUE",
            );
        }
    }

    if let Some(cursor) = &filter.cursor {
        query.push(" AND t.id >= ");
        query.push_bind(cursor);
    }

    query.push(" ORDER BY t.id ASC LIMIT ");
    query.push_bind(i64::from(limit) + 1);

    query
}
