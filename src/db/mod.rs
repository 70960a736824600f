//! Database abstraction layer.
//!
//! Provides a trait-based interface over the three supported drivers. A
//! [`Connector`] opens one [`Session`] per execution; sessions are never
//! shared or pooled.

mod mock;
mod mssql;
mod mysql;
mod oracle;
mod types;

pub use mock::{single_column_row, FailingConnector, MockCall, MockConnector, SessionStep};
pub use mssql::MssqlSession;
pub use mysql::MySqlSession;
pub use oracle::OracleSession;
pub use types::{decimal_cell, IntoCell, Row};

use crate::connection::ConnectionDescriptor;
use crate::error::Result;
use crate::query::Statement;
use async_trait::async_trait;

/// One open connection to a target database.
///
/// The executor drives a session through begin, execute, commit or
/// rollback, and close, in that order.
#[async_trait]
pub trait Session: Send {
    /// Begins a transaction.
    async fn begin(&mut self) -> Result<()>;

    /// Runs the statement inside the open transaction and returns its rows.
    async fn execute(&mut self, statement: &Statement) -> Result<Vec<Row>>;

    /// Commits the open transaction.
    async fn commit(&mut self) -> Result<()>;

    /// Rolls back the open transaction.
    async fn rollback(&mut self) -> Result<()>;

    /// Releases the connection.
    async fn close(&mut self) -> Result<()>;
}

/// Opens sessions from connection descriptors.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, descriptor: &ConnectionDescriptor) -> Result<Box<dyn Session>>;
}

/// The production connector, dispatching on the descriptor's dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct DriverConnector;

#[async_trait]
impl Connector for DriverConnector {
    async fn connect(&self, descriptor: &ConnectionDescriptor) -> Result<Box<dyn Session>> {
        match descriptor {
            ConnectionDescriptor::MySql(d) => Ok(Box::new(MySqlSession::connect(d).await?)),
            ConnectionDescriptor::SqlServer(d) => Ok(Box::new(MssqlSession::connect(d).await?)),
            ConnectionDescriptor::Oracle(d) => Ok(Box::new(OracleSession::connect(d).await?)),
        }
    }
}
