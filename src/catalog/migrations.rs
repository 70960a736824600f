//! Forward-only schema migrations for the metadata store.
//!
//! Each step runs in one transaction together with the row that records it
//! in `schema_version`, so a store is never left half-migrated.

use sqlx::sqlite::SqlitePool;
use sqlx::{Sqlite, Transaction};
use tracing::info;

use crate::error::{GatewayError, Result};

/// Ordered schema steps. A step's version is its position plus one.
const STEPS: &[&[&str]] = &[&[
    r#"CREATE TABLE databases (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE,
        database_type TEXT NOT NULL,
        host BLOB,
        database BLOB,
        username BLOB NOT NULL,
        password BLOB NOT NULL,
        connect_string BLOB,
        port INTEGER,
        created_at TEXT NOT NULL DEFAULT (datetime('now')),
        updated_at TEXT NOT NULL DEFAULT (datetime('now'))
    )"#,
    r#"CREATE TABLE query_gateway_queries (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        group_name TEXT,
        database_id INTEGER NOT NULL REFERENCES databases(id),
        sql TEXT NOT NULL,
        variable_map TEXT,
        replacement_map TEXT,
        is_query_active INTEGER NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL DEFAULT (datetime('now')),
        updated_at TEXT NOT NULL DEFAULT (datetime('now'))
    )"#,
    "CREATE INDEX idx_query_gateway_queries_group ON query_gateway_queries(group_name)",
]];

fn latest_version() -> i64 {
    STEPS.len() as i64
}

/// Brings the store up to the latest schema.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
    )
    .execute(pool)
    .await
    .map_err(|e| migration_error("create schema_version", e))?;

    let (applied,): (i64,) = sqlx::query_as("SELECT COALESCE(MAX(version), 0) FROM schema_version")
        .fetch_one(pool)
        .await
        .map_err(|e| migration_error("read schema_version", e))?;

    if applied > latest_version() {
        return Err(GatewayError::metadata(format!(
            "Metadata schema version ({applied}) is newer than supported version ({})",
            latest_version()
        )));
    }

    for (index, statements) in STEPS.iter().enumerate().skip(applied as usize) {
        let version = index as i64 + 1;
        let mut tx = pool
            .begin()
            .await
            .map_err(|e| migration_error("begin", e))?;
        apply_step(&mut tx, version, statements).await?;
        tx.commit()
            .await
            .map_err(|e| migration_error("commit", e))?;
        info!("Metadata store migrated to v{}", version);
    }

    Ok(())
}

async fn apply_step(
    tx: &mut Transaction<'_, Sqlite>,
    version: i64,
    statements: &[&str],
) -> Result<()> {
    for statement in statements {
        sqlx::query(statement)
            .execute(&mut **tx)
            .await
            .map_err(|e| migration_error(&format!("v{version}"), e))?;
    }

    sqlx::query("INSERT INTO schema_version (version) VALUES (?)")
        .bind(version)
        .execute(&mut **tx)
        .await
        .map_err(|e| migration_error(&format!("record v{version}"), e))?;
    Ok(())
}

fn migration_error(step: &str, e: sqlx::Error) -> GatewayError {
    GatewayError::metadata(format!("Migration step {step} failed: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap()
    }

    async fn versions(pool: &SqlitePool) -> Vec<i64> {
        sqlx::query_as::<_, (i64,)>("SELECT version FROM schema_version ORDER BY version")
            .fetch_all(pool)
            .await
            .unwrap()
            .into_iter()
            .map(|(v,)| v)
            .collect()
    }

    #[tokio::test]
    async fn test_fresh_store_reaches_latest_version() {
        let pool = test_pool().await;
        run_migrations(&pool).await.unwrap();

        assert_eq!(versions(&pool).await, vec![1]);

        let tables: Vec<(String,)> =
            sqlx::query_as("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
                .fetch_all(&pool)
                .await
                .unwrap();
        let names: Vec<&str> = tables.iter().map(|(n,)| n.as_str()).collect();
        assert!(names.contains(&"databases"));
        assert!(names.contains(&"query_gateway_queries"));
    }

    #[tokio::test]
    async fn test_rerun_applies_nothing() {
        let pool = test_pool().await;
        run_migrations(&pool).await.unwrap();
        run_migrations(&pool).await.unwrap();

        assert_eq!(versions(&pool).await, vec![1]);
    }

    #[tokio::test]
    async fn test_newer_schema_is_rejected() {
        let pool = test_pool().await;
        run_migrations(&pool).await.unwrap();
        sqlx::query("INSERT INTO schema_version (version) VALUES (99)")
            .execute(&pool)
            .await
            .unwrap();

        let err = run_migrations(&pool).await.unwrap_err();
        assert!(err.to_string().contains("newer than supported"));
    }

    #[tokio::test]
    async fn test_failed_step_leaves_no_partial_schema() {
        let pool = test_pool().await;
        // The index name is taken, so the last statement of v1 fails after
        // both tables were created inside the step's transaction.
        sqlx::query("CREATE TABLE other (g TEXT)")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("CREATE INDEX idx_query_gateway_queries_group ON other(g)")
            .execute(&pool)
            .await
            .unwrap();

        let err = run_migrations(&pool).await.unwrap_err();
        assert!(matches!(err, GatewayError::Metadata(_)));
        assert!(versions(&pool).await.is_empty());

        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name IN ('databases', 'query_gateway_queries')",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(count, 0);
    }
}
