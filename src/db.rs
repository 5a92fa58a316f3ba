//! Database module
//!
//! Database connection and schema checks.

use sqlx::PgPool;

/// Tables created by migrations/001_reconcile.sql
const REQUIRED_TABLES: &[&str] = &["ledger_entries", "tuition_payments", "payroll_entries"];

/// Verify database connectivity
pub async fn verify_connection(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Check if required tables and the origin index exist
pub async fn check_schema(pool: &PgPool) -> Result<bool, sqlx::Error> {
    for table in REQUIRED_TABLES {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = 'public' AND table_name = $1
            )
            "#,
        )
        .bind(table)
        .fetch_one(pool)
        .await?;

        if !exists {
            tracing::error!("Required table '{}' does not exist", table);
            return Ok(false);
        }
    }

    // conditional inserts rely on this index
    let index_exists: bool = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM pg_indexes WHERE indexname = 'ux_ledger_entries_origin')",
    )
    .fetch_one(pool)
    .await?;

    if !index_exists {
        tracing::error!("Unique index 'ux_ledger_entries_origin' does not exist");
        return Ok(false);
    }

    tracing::info!("Schema verified: {}", REQUIRED_TABLES.join(", "));
    Ok(true)
}
