//! SQLite-backed metadata store.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::query::QueryAs;
use sqlx::sqlite::{
    Sqlite, SqliteArguments, SqliteConnectOptions, SqliteJournalMode, SqlitePool,
    SqlitePoolOptions,
};
use sqlx::FromRow;
use tracing::{debug, info};

use super::migrations;
use super::{
    DatabaseProfile, MetadataRepository, NewDatabaseProfile, NewQueryDefinition, QueryDefinition,
    QueryFilter,
};
use crate::error::{GatewayError, Result};

const MAX_RETRY_ATTEMPTS: u32 = 3;
const RETRY_DELAY_MS: u64 = 100;
const MAX_CONNECTIONS: u32 = 4;

type SqliteQueryAs<'q, O> = QueryAs<'q, Sqlite, O, SqliteArguments<'q>>;

#[derive(Debug, FromRow)]
struct DatabaseRow {
    id: i64,
    name: String,
    database_type: String,
    host: Option<Vec<u8>>,
    database: Option<Vec<u8>>,
    username: Vec<u8>,
    password: Vec<u8>,
    connect_string: Option<Vec<u8>>,
    port: Option<i64>,
}

impl TryFrom<DatabaseRow> for DatabaseProfile {
    type Error = GatewayError;

    fn try_from(row: DatabaseRow) -> Result<Self> {
        let port = match row.port {
            None | Some(0) => None,
            Some(p) => Some(u16::try_from(p).map_err(|_| {
                GatewayError::metadata(format!("Database {} has invalid port {p}", row.id))
            })?),
        };

        Ok(Self {
            id: row.id,
            name: row.name,
            database_type: row.database_type,
            host: row.host,
            database: row.database,
            username: row.username,
            password: row.password,
            connect_string: row.connect_string,
            port,
        })
    }
}

#[derive(Debug, FromRow)]
struct QueryRow {
    id: i64,
    name: String,
    group_name: Option<String>,
    database_id: i64,
    sql: String,
    variable_map: Option<String>,
    replacement_map: Option<String>,
    is_query_active: bool,
    created_at: String,
    updated_at: String,
}

impl TryFrom<QueryRow> for QueryDefinition {
    type Error = GatewayError;

    fn try_from(row: QueryRow) -> Result<Self> {
        let variable_map = parse_json_column(row.id, "variable_map", row.variable_map.as_deref())?;
        let replacement_map =
            parse_json_column(row.id, "replacement_map", row.replacement_map.as_deref())?;

        Ok(Self {
            id: row.id,
            name: row.name,
            group_name: row.group_name,
            database_id: row.database_id,
            sql: row.sql,
            variable_map,
            replacement_map,
            is_query_active: row.is_query_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn parse_json_column(id: i64, column: &str, text: Option<&str>) -> Result<Option<Value>> {
    let Some(text) = text.filter(|t| !t.trim().is_empty()) else {
        return Ok(None);
    };

    match serde_json::from_str(text) {
        Ok(Value::Null) => Ok(None),
        Ok(value) => Ok(Some(value)),
        Err(e) => Err(GatewayError::metadata(format!(
            "Query {id} has malformed {column}: {e}"
        ))),
    }
}

fn bind_json<'q, O>(query: SqliteQueryAs<'q, O>, value: &Value) -> SqliteQueryAs<'q, O> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => query.bind(i),
            None => query.bind(n.as_f64()),
        },
        Value::String(s) => query.bind(s.clone()),
        other => query.bind(other.to_string()),
    }
}

fn json_column(value: &Option<Value>) -> Option<String> {
    value.as_ref().map(Value::to_string)
}

/// Metadata store backed by a SQLite file.
#[derive(Debug, Clone)]
pub struct SqliteCatalog {
    pool: SqlitePool,
    path: Option<PathBuf>,
}

impl SqliteCatalog {
    /// Opens or creates the metadata store at the given path.
    pub async fn open(path: &Path) -> Result<Self> {
        ensure_parent_dirs(path)?;

        let mut last_error = None;
        for attempt in 0..MAX_RETRY_ATTEMPTS {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_millis(RETRY_DELAY_MS * 2u64.pow(attempt)))
                    .await;
            }

            match connect(path).await {
                Ok(pool) => {
                    migrations::run_migrations(&pool).await?;
                    info!("Metadata store opened at {}", path.display());
                    return Ok(Self {
                        pool,
                        path: Some(path.to_path_buf()),
                    });
                }
                Err(e) => last_error = Some(e),
            }
        }

        Err(last_error
            .unwrap_or_else(|| GatewayError::metadata("Failed to open metadata store after retries")))
    }

    /// Opens a private in-memory store.
    pub async fn open_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| GatewayError::metadata(format!("Failed to open in-memory store: {e}")))?;
        migrations::run_migrations(&pool).await?;

        Ok(Self { pool, path: None })
    }

    /// Path of the backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Inserts a database profile and returns its id.
    pub async fn insert_database(&self, profile: &NewDatabaseProfile) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO databases
                (name, database_type, host, database, username, password, connect_string, port)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&profile.name)
        .bind(&profile.database_type)
        .bind(&profile.host)
        .bind(&profile.database)
        .bind(&profile.username)
        .bind(&profile.password)
        .bind(&profile.connect_string)
        .bind(profile.port.map(i64::from))
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if e.to_string().contains("UNIQUE constraint") {
                GatewayError::metadata(format!("Database '{}' already exists", profile.name))
            } else {
                GatewayError::metadata(format!("Failed to insert database: {e}"))
            }
        })?;

        Ok(result.last_insert_rowid())
    }

    /// Inserts a query definition and returns its id.
    pub async fn insert_query(&self, query: &NewQueryDefinition) -> Result<i64> {
        if self.find_database_profile(query.database_id).await?.is_none() {
            return Err(GatewayError::metadata(format!(
                "Database id {} does not exist",
                query.database_id
            )));
        }

        let result = sqlx::query(
            r#"
            INSERT INTO query_gateway_queries
                (name, group_name, database_id, sql, variable_map, replacement_map, is_query_active)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&query.name)
        .bind(&query.group_name)
        .bind(query.database_id)
        .bind(&query.sql)
        .bind(json_column(&query.variable_map))
        .bind(json_column(&query.replacement_map))
        .bind(query.is_query_active)
        .execute(&self.pool)
        .await
        .map_err(|e| GatewayError::metadata(format!("Failed to insert query: {e}")))?;

        Ok(result.last_insert_rowid())
    }

    /// Closes the connection pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl MetadataRepository for SqliteCatalog {
    async fn find_database_profile(&self, id: i64) -> Result<Option<DatabaseProfile>> {
        let row: Option<DatabaseRow> = sqlx::query_as(
            r#"
            SELECT id, name, database_type, host, database, username, password,
                   connect_string, port
            FROM databases
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| GatewayError::metadata(format!("Failed to get database {id}: {e}")))?;

        row.map(DatabaseProfile::try_from).transpose()
    }

    async fn find_database_profile_by_name(&self, name: &str) -> Result<Option<DatabaseProfile>> {
        let row: Option<DatabaseRow> = sqlx::query_as(
            r#"
            SELECT id, name, database_type, host, database, username, password,
                   connect_string, port
            FROM databases
            WHERE name = ?
            "#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| GatewayError::metadata(format!("Failed to get database '{name}': {e}")))?;

        row.map(DatabaseProfile::try_from).transpose()
    }

    async fn find_query_definitions(&self, filter: &QueryFilter) -> Result<Vec<QueryDefinition>> {
        let (mut conditions, bindings) = filter.to_sql_conditions()?;
        if conditions.is_empty() {
            conditions.push("1=1".to_string());
        }

        let sql = format!(
            r#"
            SELECT id, name, group_name, database_id, sql, variable_map, replacement_map,
                   is_query_active, created_at, updated_at
            FROM query_gateway_queries
            WHERE {}
            ORDER BY id
            "#,
            conditions.join(" AND ")
        );
        debug!("Selecting query definitions where {}", filter);

        let mut query = sqlx::query_as::<_, QueryRow>(&sql);
        for value in &bindings {
            query = bind_json(query, value);
        }

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| GatewayError::metadata(format!("Failed to select queries: {e}")))?;

        rows.into_iter().map(QueryDefinition::try_from).collect()
    }
}

async fn connect(path: &Path) -> Result<SqlitePool> {
    let conn_str = format!("sqlite:{}?mode=rwc", path.display());
    let options = SqliteConnectOptions::from_str(&conn_str)
        .map_err(|e| GatewayError::metadata(format!("Invalid metadata path: {e}")))?
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5))
        .create_if_missing(true);

    SqlitePoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .acquire_timeout(Duration::from_secs(10))
        .connect_with(options)
        .await
        .map_err(|e| GatewayError::metadata(format!("Failed to connect to metadata store: {e}")))
}

fn ensure_parent_dirs(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            GatewayError::metadata(format!(
                "Failed to create metadata directory {}: {e}",
                parent.display()
            ))
        })?;
    }
    Ok(())
}
