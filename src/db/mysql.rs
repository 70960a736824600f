//! MySQL session over a single sqlx connection.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::Value;
use sqlx::mysql::{MySql, MySqlArguments, MySqlConnectOptions, MySqlConnection, MySqlRow, MySqlSslMode};
use sqlx::query::Query;
use sqlx::{
    Column, ConnectOptions, Connection, Decode, Executor, Row as SqlxRow, Type, TypeInfo,
};
use tracing::debug;

use super::{IntoCell, Row, Session};
use crate::connection::{Dialect, NetworkDescriptor};
use crate::error::{GatewayError, Result};
use crate::query::placeholders;
use crate::query::Statement;

/// A MySQL connection driven through one transaction.
pub struct MySqlSession {
    conn: Option<MySqlConnection>,
}

impl MySqlSession {
    /// Opens a connection. Transport encryption follows the descriptor options.
    pub async fn connect(descriptor: &NetworkDescriptor) -> Result<Self> {
        let ssl_mode = if descriptor.options.encrypt {
            MySqlSslMode::Required
        } else {
            MySqlSslMode::Disabled
        };

        let options = MySqlConnectOptions::new()
            .host(descriptor.host.expose())
            .port(descriptor.port.unwrap_or(Dialect::MySql.default_port()))
            .database(descriptor.database.expose())
            .username(descriptor.username.expose())
            .password(descriptor.password.expose())
            .ssl_mode(ssl_mode);

        let conn = options
            .connect()
            .await
            .map_err(|e| GatewayError::connection(format!("MySQL connection failed: {e}")))?;

        debug!("MySQL connection opened");
        Ok(Self { conn: Some(conn) })
    }

    fn conn(&mut self) -> Result<&mut MySqlConnection> {
        self.conn
            .as_mut()
            .ok_or_else(|| GatewayError::internal("MySQL session is already closed"))
    }

    /// Sends unprepared text, which may hold several statements.
    async fn run_raw(&mut self, sql: &str, step: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(sql)
            .await
            .map_err(|e| GatewayError::execution(format!("MySQL {step} failed: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl Session for MySqlSession {
    async fn begin(&mut self) -> Result<()> {
        self.run_raw("START TRANSACTION", "begin").await
    }

    async fn execute(&mut self, statement: &Statement) -> Result<Vec<Row>> {
        // Session variables must exist before the template runs on this connection.
        if !statement.preamble.is_empty() {
            self.run_raw(&statement.preamble, "preamble").await?;
        }

        let bound = placeholders::bind(
            &statement.template,
            statement.replacements.as_ref(),
            Dialect::MySql.placeholder_style(),
        )?;
        let conn = self.conn()?;

        let rows = if bound.params.is_empty() {
            conn.fetch_all(bound.sql.as_str()).await
        } else {
            let mut query = sqlx::query(&bound.sql);
            for value in &bound.params {
                query = bind_value(query, value);
            }
            conn.fetch_all(query).await
        }
        .map_err(|e| GatewayError::execution(format!("MySQL query failed: {e}")))?;

        Ok(rows.iter().map(row_to_record).collect())
    }

    async fn commit(&mut self) -> Result<()> {
        self.run_raw("COMMIT", "commit").await
    }

    async fn rollback(&mut self) -> Result<()> {
        self.run_raw("ROLLBACK", "rollback").await
    }

    async fn close(&mut self) -> Result<()> {
        match self.conn.take() {
            Some(conn) => conn
                .close()
                .await
                .map_err(|e| GatewayError::connection(format!("MySQL close failed: {e}"))),
            None => Ok(()),
        }
    }
}

fn bind_value<'q>(
    query: Query<'q, MySql, MySqlArguments>,
    value: &Value,
) -> Query<'q, MySql, MySqlArguments> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                query.bind(i)
            } else if let Some(u) = n.as_u64() {
                query.bind(u)
            } else {
                query.bind(n.as_f64())
            }
        }
        Value::String(s) => query.bind(s.clone()),
        other => query.bind(other.to_string()),
    }
}

fn row_to_record(row: &MySqlRow) -> Row {
    row.columns()
        .iter()
        .map(|col| {
            (
                col.name().to_string(),
                convert_value(row, col.ordinal(), col.type_info().name()),
            )
        })
        .collect()
}

/// Decodes one cell, returning `None` if the type does not fit.
fn cell<'r, T>(row: &'r MySqlRow, index: usize) -> Option<Value>
where
    T: Decode<'r, MySql> + Type<MySql> + IntoCell,
{
    row.try_get::<Option<T>, _>(index)
        .ok()
        .map(IntoCell::into_cell)
}

fn convert_value(row: &MySqlRow, index: usize, type_name: &str) -> Value {
    let decoded = match type_name.to_uppercase().as_str() {
        "NULL" => Some(Value::Null),
        "BOOLEAN" => cell::<bool>(row, index),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => cell::<i64>(row, index)
            .or_else(|| cell::<i32>(row, index))
            .or_else(|| cell::<i16>(row, index))
            .or_else(|| cell::<i8>(row, index)),
        "FLOAT" => cell::<f32>(row, index),
        "DOUBLE" => cell::<f64>(row, index),
        "DATE" => cell::<NaiveDate>(row, index),
        "TIME" => cell::<NaiveTime>(row, index),
        "DATETIME" => cell::<NaiveDateTime>(row, index),
        "TIMESTAMP" => cell::<DateTime<Utc>>(row, index),
        "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BINARY" | "VARBINARY" | "BIT" => row
            .try_get_unchecked::<Option<Vec<u8>>, _>(index)
            .ok()
            .map(IntoCell::into_cell),
        "JSON" => row
            .try_get_unchecked::<Option<String>, _>(index)
            .ok()
            .map(|text| match text {
                Some(text) => serde_json::from_str(&text).unwrap_or(Value::String(text)),
                None => Value::Null,
            }),
        unsigned if unsigned.ends_with("UNSIGNED") => cell::<u64>(row, index)
            .or_else(|| cell::<u32>(row, index))
            .or_else(|| cell::<u16>(row, index))
            .or_else(|| cell::<u8>(row, index)),
        // DECIMAL, YEAR, text and anything else go through the text fallback.
        _ => None,
    };

    decoded.unwrap_or_else(|| text_fallback(row, index))
}

fn text_fallback(row: &MySqlRow, index: usize) -> Value {
    row.try_get_unchecked::<Option<String>, _>(index)
        .ok()
        .map(IntoCell::into_cell)
        .or_else(|| {
            row.try_get_unchecked::<Option<Vec<u8>>, _>(index)
                .ok()
                .map(IntoCell::into_cell)
        })
        .unwrap_or(Value::Null)
}
