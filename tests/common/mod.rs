//! Common test utilities
//!
//! Tests share one database and never truncate it; each test provisions its
//! own users and accounts and only asserts on those.

#![allow(dead_code)]

use std::time::Duration;

use axum::Router;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use ledger_service::api::{self, AppState, RateLimiter};
use ledger_service::domain::Amount;
use ledger_service::idempotency::IdempotencyStore;
use ledger_service::identifier::Identifier;
use ledger_service::ledger::{LedgerStore, PostingRequest, User};

/// Connect to DATABASE_URL and apply migrations
pub async fn setup_test_db() -> PgPool {
    dotenvy::dotenv().ok();
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for tests");

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await
        .expect("Failed to connect to DB");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    pool
}

pub async fn setup_ledger() -> LedgerStore {
    LedgerStore::new(setup_test_db().await)
}

/// Full application router as served by the binary, without rate limiting
pub fn test_app(ledger: LedgerStore) -> (Router, IdempotencyStore) {
    let idempotency = IdempotencyStore::new(Duration::from_secs(60));
    let app = api::build_router(
        AppState::new(ledger, idempotency.clone()),
        RateLimiter::new(0),
        Duration::from_secs(10),
    );
    (app, idempotency)
}

pub fn unique_email(tag: &str) -> String {
    format!("{}-{}@example.com", tag, uuid::Uuid::new_v4().simple())
}

pub async fn create_user(ledger: &LedgerStore, tag: &str) -> User {
    ledger
        .create_user(&unique_email(tag), tag)
        .await
        .expect("Failed to create user")
}

/// Deposit `minor` units into the user's internal account
pub async fn deposit(ledger: &LedgerStore, user: &User, minor: i64) -> Identifier {
    ledger
        .deposit(PostingRequest {
            amount: Amount::from_minor(minor).unwrap(),
            created_by: user.id.clone(),
            debit_account_id: user.external_account_id.clone(),
            credit_account_id: user.internal_account_id.clone(),
        })
        .await
        .expect("Failed to deposit")
        .transaction_id
}

pub fn withdrawal(user: &User, minor: i64) -> PostingRequest {
    PostingRequest {
        amount: Amount::from_minor(minor).unwrap(),
        created_by: user.id.clone(),
        debit_account_id: user.internal_account_id.clone(),
        credit_account_id: user.external_account_id.clone(),
    }
}

/// Balance recomputed straight from the entries table
pub async fn recomputed_balance(pool: &PgPool, account_id: &Identifier) -> i64 {
    let rows: Vec<(i64, String)> =
        sqlx::query_as("SELECT amount, direction FROM ledger_entries WHERE account_id = $1")
            .bind(account_id)
            .fetch_all(pool)
            .await
            .expect("Failed to load entries");

    rows.into_iter()
        .map(|(amount, direction)| if direction == "credit" { amount } else { -amount })
        .sum()
}
