//! SQL Server session over tiberius.
//!
//! `DECLARE`d variables are scoped to one batch, so the preamble and the
//! template always travel together.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use serde_json::Value;
use tiberius::{AuthMethod, Client, ColumnData, Config, EncryptionLevel, FromSql, Query};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::debug;

use super::{IntoCell, Row, Session};
use crate::connection::{Dialect, NetworkDescriptor};
use crate::error::{GatewayError, Result};
use crate::query::placeholders;
use crate::query::Statement;

type MssqlClient = Client<Compat<TcpStream>>;

/// A SQL Server connection driven through one transaction.
pub struct MssqlSession {
    client: Option<MssqlClient>,
}

impl MssqlSession {
    pub async fn connect(descriptor: &NetworkDescriptor) -> Result<Self> {
        let mut config = Config::new();
        config.host(descriptor.host.expose());
        config.port(descriptor.port.unwrap_or(Dialect::SqlServer.default_port()));
        config.database(descriptor.database.expose());
        config.authentication(AuthMethod::sql_server(
            descriptor.username.expose(),
            descriptor.password.expose(),
        ));
        config.encryption(if descriptor.options.encrypt {
            EncryptionLevel::Required
        } else {
            EncryptionLevel::Off
        });
        if descriptor.options.trust_server_certificate {
            config.trust_cert();
        }

        let tcp = TcpStream::connect(config.get_addr())
            .await
            .map_err(|e| GatewayError::connection(format!("SQL Server TCP connect failed: {e}")))?;
        tcp.set_nodelay(true)
            .map_err(|e| GatewayError::connection(format!("SQL Server socket setup failed: {e}")))?;

        let client = Client::connect(config, tcp.compat_write())
            .await
            .map_err(|e| GatewayError::connection(format!("SQL Server login failed: {e}")))?;

        debug!("SQL Server connection opened");
        Ok(Self {
            client: Some(client),
        })
    }

    fn client(&mut self) -> Result<&mut MssqlClient> {
        self.client
            .as_mut()
            .ok_or_else(|| GatewayError::internal("SQL Server session is already closed"))
    }

    /// Runs a batch outside `sp_executesql`, so transaction state survives it.
    async fn run_batch(&mut self, sql: &str, step: &str) -> Result<()> {
        let client = self.client()?;
        client
            .simple_query(sql)
            .await
            .map_err(|e| GatewayError::execution(format!("SQL Server {step} failed: {e}")))?
            .into_results()
            .await
            .map_err(|e| GatewayError::execution(format!("SQL Server {step} failed: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl Session for MssqlSession {
    async fn begin(&mut self) -> Result<()> {
        self.run_batch("BEGIN TRANSACTION", "begin").await
    }

    async fn execute(&mut self, statement: &Statement) -> Result<Vec<Row>> {
        let bound = placeholders::bind(
            &statement.sql(),
            statement.replacements.as_ref(),
            Dialect::SqlServer.placeholder_style(),
        )?;
        let client = self.client()?;

        let stream = if bound.params.is_empty() {
            client.simple_query(bound.sql).await
        } else {
            let mut query = Query::new(bound.sql);
            for value in bound.params {
                bind_value(&mut query, value);
            }
            query.query(client).await
        }
        .map_err(|e| GatewayError::execution(format!("SQL Server query failed: {e}")))?;

        let rows = stream
            .into_first_result()
            .await
            .map_err(|e| GatewayError::execution(format!("SQL Server query failed: {e}")))?;

        Ok(rows.into_iter().map(row_to_record).collect())
    }

    async fn commit(&mut self) -> Result<()> {
        self.run_batch("COMMIT TRANSACTION", "commit").await
    }

    async fn rollback(&mut self) -> Result<()> {
        self.run_batch("IF @@TRANCOUNT > 0 ROLLBACK TRANSACTION", "rollback")
            .await
    }

    async fn close(&mut self) -> Result<()> {
        match self.client.take() {
            Some(client) => client
                .close()
                .await
                .map_err(|e| GatewayError::connection(format!("SQL Server close failed: {e}"))),
            None => Ok(()),
        }
    }
}

fn bind_value(query: &mut Query<'_>, value: Value) {
    match value {
        Value::Null => query.bind(Option::<String>::None),
        Value::Bool(b) => query.bind(b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => query.bind(i),
            None => query.bind(n.as_f64()),
        },
        Value::String(s) => query.bind(s),
        other => query.bind(other.to_string()),
    }
}

fn row_to_record(row: tiberius::Row) -> Row {
    let names: Vec<String> = row
        .columns()
        .iter()
        .map(|c| c.name().to_string())
        .collect();

    names
        .into_iter()
        .zip(row.into_iter().map(convert_value))
        .collect()
}

fn from_sql_cell<'a, T>(data: &'a ColumnData<'static>) -> Value
where
    T: FromSql<'a> + IntoCell,
{
    T::from_sql(data).ok().flatten().into_cell()
}

fn convert_value(data: ColumnData<'static>) -> Value {
    match data {
        ColumnData::U8(v) => v.into_cell(),
        ColumnData::I16(v) => v.into_cell(),
        ColumnData::I32(v) => v.into_cell(),
        ColumnData::I64(v) => v.into_cell(),
        ColumnData::F32(v) => v.into_cell(),
        ColumnData::F64(v) => v.into_cell(),
        ColumnData::Bit(v) => v.into_cell(),
        ColumnData::String(v) => v.map(|s| s.into_owned()).into_cell(),
        ColumnData::Guid(v) => v.map(|g| g.to_string()).into_cell(),
        ColumnData::Binary(v) => v.map(|b| b.into_owned()).into_cell(),
        ColumnData::Numeric(v) => v.map(|n| n.to_string()).into_cell(),
        ColumnData::Xml(v) => v.map(|x| x.into_owned().into_string()).into_cell(),
        data @ (ColumnData::DateTime(_)
        | ColumnData::SmallDateTime(_)
        | ColumnData::DateTime2(_)) => from_sql_cell::<NaiveDateTime>(&data),
        data @ ColumnData::Date(_) => from_sql_cell::<NaiveDate>(&data),
        data @ ColumnData::Time(_) => from_sql_cell::<NaiveTime>(&data),
        data @ ColumnData::DateTimeOffset(_) => from_sql_cell::<DateTime<FixedOffset>>(&data),
    }
}
