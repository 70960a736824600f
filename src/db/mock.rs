//! Scripted connectors for testing.
//!
//! [`MockConnector`] records every session call and can be told to fail or
//! panic at chosen steps, so executor and batch behaviour can be checked
//! without a live database.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Barrier;

use super::{Connector, Row, Session};
use crate::connection::{ConnectionDescriptor, Dialect};
use crate::error::{GatewayError, Result};
use crate::query::Statement;

/// A call made against a mock session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStep {
    Connect,
    Begin,
    Execute,
    Commit,
    Rollback,
    Close,
}

/// One recorded call, with the SQL sent for `Execute`.
#[derive(Debug, Clone, PartialEq)]
pub struct MockCall {
    pub step: SessionStep,
    pub dialect: Dialect,
    pub sql: Option<String>,
}

/// A connector whose sessions follow a script.
///
/// By default every step succeeds and `execute` echoes the SQL back as a
/// single row.
#[derive(Clone, Default)]
pub struct MockConnector {
    rows: Option<Vec<Row>>,
    fail_on: Vec<SessionStep>,
    fail_sql: Vec<String>,
    panic_sql: Vec<String>,
    execute_delay: Option<Duration>,
    barrier: Option<Arc<Barrier>>,
    log: Arc<Mutex<Vec<MockCall>>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows returned by every successful `execute`.
    pub fn with_rows(mut self, rows: Vec<Row>) -> Self {
        self.rows = Some(rows);
        self
    }

    /// Makes the given step fail on every session.
    pub fn failing_on(mut self, step: SessionStep) -> Self {
        self.fail_on.push(step);
        self
    }

    /// Makes `execute` fail when the SQL contains `fragment`.
    pub fn failing_sql(mut self, fragment: impl Into<String>) -> Self {
        self.fail_sql.push(fragment.into());
        self
    }

    /// Makes `execute` panic when the SQL contains `fragment`.
    pub fn panicking_sql(mut self, fragment: impl Into<String>) -> Self {
        self.panic_sql.push(fragment.into());
        self
    }

    pub fn with_execute_delay(mut self, delay: Duration) -> Self {
        self.execute_delay = Some(delay);
        self
    }

    /// Every `execute` waits on the barrier before returning.
    pub fn with_barrier(mut self, barrier: Arc<Barrier>) -> Self {
        self.barrier = Some(barrier);
        self
    }

    /// All recorded calls, in order.
    pub fn calls(&self) -> Vec<MockCall> {
        self.log.lock().map(|log| log.clone()).unwrap_or_default()
    }

    pub fn steps(&self) -> Vec<SessionStep> {
        self.calls().into_iter().map(|c| c.step).collect()
    }

    /// SQL sent to `execute`, in order.
    pub fn executed_sql(&self) -> Vec<String> {
        self.calls().into_iter().filter_map(|c| c.sql).collect()
    }

    fn record(&self, step: SessionStep, dialect: Dialect, sql: Option<String>) {
        if let Ok(mut log) = self.log.lock() {
            log.push(MockCall { step, dialect, sql });
        }
    }

    fn check(&self, step: SessionStep) -> Result<()> {
        if !self.fail_on.contains(&step) {
            return Ok(());
        }
        let message = format!("mock failure at {step:?}");
        Err(match step {
            SessionStep::Connect | SessionStep::Close => GatewayError::connection(message),
            _ => GatewayError::execution(message),
        })
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, descriptor: &ConnectionDescriptor) -> Result<Box<dyn Session>> {
        let dialect = descriptor.dialect();
        self.record(SessionStep::Connect, dialect, None);
        self.check(SessionStep::Connect)?;
        Ok(Box::new(MockSession {
            script: self.clone(),
            dialect,
        }))
    }
}

struct MockSession {
    script: MockConnector,
    dialect: Dialect,
}

impl MockSession {
    fn step(&self, step: SessionStep) -> Result<()> {
        self.script.record(step, self.dialect, None);
        self.script.check(step)
    }
}

#[async_trait]
impl Session for MockSession {
    async fn begin(&mut self) -> Result<()> {
        self.step(SessionStep::Begin)
    }

    async fn execute(&mut self, statement: &Statement) -> Result<Vec<Row>> {
        let sql = statement.sql();
        self.script
            .record(SessionStep::Execute, self.dialect, Some(sql.clone()));

        if let Some(barrier) = &self.script.barrier {
            barrier.wait().await;
        }
        if let Some(delay) = self.script.execute_delay {
            tokio::time::sleep(delay).await;
        }
        if self.script.panic_sql.iter().any(|f| sql.contains(f.as_str())) {
            panic!("mock panic while executing: {sql}");
        }
        if self.script.fail_sql.iter().any(|f| sql.contains(f.as_str())) {
            return Err(GatewayError::execution(format!("mock failure for: {sql}")));
        }
        self.script.check(SessionStep::Execute)?;

        Ok(match &self.script.rows {
            Some(rows) => rows.clone(),
            None => vec![echo_row(&sql)],
        })
    }

    async fn commit(&mut self) -> Result<()> {
        self.step(SessionStep::Commit)
    }

    async fn rollback(&mut self) -> Result<()> {
        self.step(SessionStep::Rollback)
    }

    async fn close(&mut self) -> Result<()> {
        self.step(SessionStep::Close)
    }
}

fn echo_row(sql: &str) -> Row {
    single_column_row("result", Value::String(format!("Mock result for: {sql}")))
}

/// A connector that can never connect.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingConnector;

#[async_trait]
impl Connector for FailingConnector {
    async fn connect(&self, descriptor: &ConnectionDescriptor) -> Result<Box<dyn Session>> {
        Err(GatewayError::connection(format!(
            "connection refused for {}",
            descriptor.display_string()
        )))
    }
}

/// A single-column row, for building scripted results.
pub fn single_column_row(column: &str, value: Value) -> Row {
    let mut row = Row::new();
    row.insert(column.to_string(), value);
    row
}
