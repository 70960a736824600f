//! Oracle session over the synchronous `oracle` driver.
//!
//! Every driver call runs on tokio's blocking pool. Oracle connections start
//! a transaction implicitly, so `begin` has nothing to send.
//!
//! A blocking call cannot be cancelled by dropping its future. When the
//! request timeout drops a call that is still running, the session asks the
//! server to break the statement so the connection stops working on it.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDateTime};
use oracle::sql_type::{OracleType, ToSql};
use oracle::{Connection, Row as OracleRow};
use serde_json::Value;
use tracing::{debug, warn};

use super::{decimal_cell, IntoCell, Row, Session};
use crate::connection::{Dialect, OracleDescriptor};
use crate::error::{GatewayError, Result};
use crate::query::placeholders;
use crate::query::Statement;

/// An Oracle connection driven through one transaction.
pub struct OracleSession {
    conn: Option<Arc<Connection>>,
}

impl OracleSession {
    pub async fn connect(descriptor: &OracleDescriptor) -> Result<Self> {
        let username = descriptor.username.expose().to_string();
        let password = descriptor.password.expose().to_string();
        let connect_string = descriptor.connect_string.expose().to_string();

        let conn = tokio::task::spawn_blocking(move || {
            Connection::connect(&username, &password, &connect_string)
        })
        .await
        .map_err(|e| GatewayError::internal(format!("Oracle connect task failed: {e}")))?
        .map_err(|e| GatewayError::connection(format!("Oracle connection failed: {e}")))?;

        debug!("Oracle connection opened");
        Ok(Self {
            conn: Some(Arc::new(conn)),
        })
    }

    /// Runs `op` against the connection on the blocking pool.
    async fn blocking<T, F>(&self, step: &'static str, op: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> std::result::Result<T, oracle::Error> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self
            .conn
            .clone()
            .ok_or_else(|| GatewayError::internal("Oracle session is already closed"))?;

        let interrupt = InterruptOnDrop::new({
            let conn = Arc::clone(&conn);
            move || break_execution(conn, step)
        });

        let result = tokio::task::spawn_blocking(move || op(&conn)).await;
        interrupt.disarm();

        result
            .map_err(|e| GatewayError::internal(format!("Oracle {step} task failed: {e}")))?
            .map_err(|e| GatewayError::execution(format!("Oracle {step} failed: {e}")))
    }
}

/// Asks the server to stop the statement running on `conn`.
fn break_execution(conn: Arc<Connection>, step: &'static str) {
    let Ok(handle) = tokio::runtime::Handle::try_current() else {
        return;
    };
    warn!("Oracle {} abandoned before completion; breaking execution", step);
    handle.spawn_blocking(move || {
        if let Err(e) = conn.break_execution() {
            warn!("Oracle break after abandoned {} failed: {}", step, e);
        }
    });
}

/// Runs its callback when dropped, unless disarmed first.
struct InterruptOnDrop<F: FnOnce()> {
    on_drop: Option<F>,
}

impl<F: FnOnce()> InterruptOnDrop<F> {
    fn new(on_drop: F) -> Self {
        Self {
            on_drop: Some(on_drop),
        }
    }

    fn disarm(mut self) {
        self.on_drop = None;
    }
}

impl<F: FnOnce()> Drop for InterruptOnDrop<F> {
    fn drop(&mut self) {
        if let Some(on_drop) = self.on_drop.take() {
            on_drop();
        }
    }
}

#[async_trait]
impl Session for OracleSession {
    async fn begin(&mut self) -> Result<()> {
        Ok(())
    }

    async fn execute(&mut self, statement: &Statement) -> Result<Vec<Row>> {
        let bound = placeholders::bind(
            &statement.sql(),
            statement.replacements.as_ref(),
            Dialect::Oracle.placeholder_style(),
        )?;
        let sql = bound.sql;
        let params: Vec<OracleBind> = bound.params.into_iter().map(OracleBind::from).collect();

        self.blocking("query", move |conn| {
            let binds: Vec<&dyn ToSql> = params.iter().map(OracleBind::as_sql).collect();
            let result_set = conn.query(&sql, &binds)?;

            let columns: Vec<(String, OracleType)> = result_set
                .column_info()
                .iter()
                .map(|c| (c.name().to_string(), c.oracle_type().clone()))
                .collect();

            let mut rows = Vec::new();
            for row in result_set {
                let row = row?;
                let record: Row = columns
                    .iter()
                    .enumerate()
                    .map(|(i, (name, ty))| (name.clone(), convert_value(&row, i, ty)))
                    .collect();
                rows.push(record);
            }
            Ok(rows)
        })
        .await
    }

    async fn commit(&mut self) -> Result<()> {
        self.blocking("commit", |conn| conn.commit()).await
    }

    async fn rollback(&mut self) -> Result<()> {
        self.blocking("rollback", |conn| conn.rollback()).await
    }

    async fn close(&mut self) -> Result<()> {
        if self.conn.is_none() {
            return Ok(());
        }
        let result = self.blocking("close", |conn| conn.close()).await;
        self.conn = None;
        result
    }
}

/// An owned bind value with a concrete `ToSql` type.
#[derive(Debug)]
enum OracleBind {
    Int(i64),
    Float(f64),
    Text(Option<String>),
}

impl OracleBind {
    fn as_sql(&self) -> &dyn ToSql {
        match self {
            Self::Int(v) => v,
            Self::Float(v) => v,
            Self::Text(v) => v,
        }
    }
}

impl From<Value> for OracleBind {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Text(None),
            // Oracle before 23c has no SQL boolean.
            Value::Bool(b) => Self::Int(i64::from(b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => n
                    .as_f64()
                    .map(Self::Float)
                    .unwrap_or_else(|| Self::Text(Some(n.to_string()))),
            },
            Value::String(s) => Self::Text(Some(s)),
            other => Self::Text(Some(other.to_string())),
        }
    }
}

fn get<T>(row: &OracleRow, index: usize) -> Value
where
    T: oracle::sql_type::FromSql + IntoCell,
{
    row.get::<usize, Option<T>>(index)
        .ok()
        .flatten()
        .into_cell()
}

fn convert_value(row: &OracleRow, index: usize, oracle_type: &OracleType) -> Value {
    match oracle_type {
        OracleType::Number(_, _) | OracleType::Float(_) => row
            .get::<usize, Option<String>>(index)
            .ok()
            .flatten()
            .map(decimal_cell)
            .unwrap_or(Value::Null),
        OracleType::BinaryFloat | OracleType::BinaryDouble => get::<f64>(row, index),
        OracleType::Int64 => get::<i64>(row, index),
        OracleType::UInt64 => get::<u64>(row, index),
        OracleType::Boolean => get::<bool>(row, index),
        OracleType::Date | OracleType::Timestamp(_) => get::<NaiveDateTime>(row, index),
        OracleType::TimestampTZ(_) | OracleType::TimestampLTZ(_) => {
            get::<DateTime<FixedOffset>>(row, index)
        }
        OracleType::Raw(_) | OracleType::LongRaw | OracleType::BLOB => {
            get::<Vec<u8>>(row, index)
        }
        _ => get::<String>(row, index),
    }
}
