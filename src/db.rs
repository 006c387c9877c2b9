//! Database module
//!
//! Connection, migration and schema checks run at startup.

use sqlx::migrate::MigrateError;
use sqlx::PgPool;

/// Tables the ledger store reads and writes
const REQUIRED_TABLES: [&str; 4] = ["accounts", "users", "transactions", "ledger_entries"];

/// Simple connectivity check
pub async fn verify_connection(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Apply the embedded migrations in `migrations/`
pub async fn run_migrations(pool: &PgPool) -> Result<(), MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    tracing::info!("Database migrations applied");
    Ok(())
}

/// Check that every required table exists
pub async fn check_schema(pool: &PgPool) -> Result<bool, sqlx::Error> {
    for table in REQUIRED_TABLES {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = current_schema() AND table_name = $1
            )
            "#,
        )
        .bind(table)
        .fetch_one(pool)
        .await?;

        if !exists {
            tracing::error!(table = table, "Required table does not exist");
            return Ok(false);
        }
    }

    Ok(true)
}
