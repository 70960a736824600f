//! Transaction-scoped execution of one statement.
//!
//! Every execution opens its own session, runs the statement inside a
//! transaction, commits or rolls back, and always closes the session.
//! Cleanup failures are logged and discarded; they never replace the
//! primary result.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::connection::ConnectionDescriptor;
use crate::db::{Connector, Row, Session};
use crate::error::{GatewayError, Result};
use crate::query::Statement;

/// States an execution passes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionState {
    Idle,
    Connected,
    TransactionOpen,
    Executed,
    Committed,
    RolledBack,
    Closed,
}

/// Outcome of one execution, with the states it visited in order.
#[derive(Debug)]
pub struct ExecutionReport {
    pub result: Result<Vec<Row>>,
    pub trace: Vec<ExecutionState>,
}

impl ExecutionReport {
    pub fn reached(&self, state: ExecutionState) -> bool {
        self.trace.contains(&state)
    }
}

/// Runs statements against sessions opened by a [`Connector`].
#[derive(Clone)]
pub struct QueryExecutor {
    connector: Arc<dyn Connector>,
}

impl QueryExecutor {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self { connector }
    }

    /// Executes the statement and returns its rows.
    pub async fn execute(
        &self,
        descriptor: &ConnectionDescriptor,
        statement: &Statement,
    ) -> Result<Vec<Row>> {
        self.execute_traced(descriptor, statement).await.result
    }

    /// Executes the statement, recording every state transition.
    pub async fn execute_traced(
        &self,
        descriptor: &ConnectionDescriptor,
        statement: &Statement,
    ) -> ExecutionReport {
        let mut trace = vec![ExecutionState::Idle];
        let timeout = descriptor.request_timeout();

        let result = match self.connector.connect(descriptor).await {
            Ok(mut session) => {
                trace.push(ExecutionState::Connected);
                debug!("Opened {}", descriptor.display_string());

                let result =
                    run_transaction(session.as_mut(), statement, timeout, &mut trace).await;

                log_and_discard_cleanup_failure(
                    "close",
                    bounded(timeout, "close", session.close()).await,
                );
                result
            }
            // Drivers release a half-open connection on their own; there is
            // no session to close.
            Err(e) => Err(e),
        };

        trace.push(ExecutionState::Closed);
        debug!("Execution finished: {:?}", trace);
        ExecutionReport { result, trace }
    }
}

async fn run_transaction(
    session: &mut dyn Session,
    statement: &Statement,
    timeout: Option<Duration>,
    trace: &mut Vec<ExecutionState>,
) -> Result<Vec<Row>> {
    bounded(timeout, "begin", session.begin()).await?;
    trace.push(ExecutionState::TransactionOpen);

    let rows = match bounded(timeout, "execute", session.execute(statement)).await {
        Ok(rows) => rows,
        Err(e) => {
            roll_back(session, timeout, trace).await;
            return Err(e);
        }
    };
    trace.push(ExecutionState::Executed);

    match bounded(timeout, "commit", session.commit()).await {
        Ok(()) => {
            trace.push(ExecutionState::Committed);
            Ok(rows)
        }
        Err(e) => {
            roll_back(session, timeout, trace).await;
            Err(e)
        }
    }
}

async fn roll_back(
    session: &mut dyn Session,
    timeout: Option<Duration>,
    trace: &mut Vec<ExecutionState>,
) {
    log_and_discard_cleanup_failure(
        "rollback",
        bounded(timeout, "rollback", session.rollback()).await,
    );
    trace.push(ExecutionState::RolledBack);
}

/// Cleanup steps never escalate: a failure is logged and dropped.
fn log_and_discard_cleanup_failure(step: &str, result: Result<()>) {
    if let Err(e) = result {
        warn!("Discarded {} failure during cleanup: {}", step, e);
    }
}

/// Applies the request timeout, if any, to one session call.
async fn bounded<T>(
    timeout: Option<Duration>,
    step: &str,
    call: impl Future<Output = Result<T>>,
) -> Result<T> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, call).await.map_err(|_| {
            GatewayError::execution(format!(
                "{step} timed out after {} ms",
                limit.as_millis()
            ))
        })?,
        None => call.await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{ConnectionOptions, NetworkDescriptor};
    use crate::credentials::Secret;
    use crate::db::{single_column_row, FailingConnector, MockConnector, SessionStep};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use ExecutionState::*;

    fn descriptor(timeout: Option<Duration>) -> ConnectionDescriptor {
        ConnectionDescriptor::SqlServer(NetworkDescriptor {
            host: Secret::new("db.internal"),
            database: Secret::new("sales"),
            username: Secret::new("svc"),
            password: Secret::new("hunter2"),
            port: Some(1433),
            options: ConnectionOptions {
                request_timeout: timeout,
                ..ConnectionOptions::default()
            },
        })
    }

    fn executor(connector: &MockConnector) -> QueryExecutor {
        QueryExecutor::new(Arc::new(connector.clone()))
    }

    #[tokio::test]
    async fn test_successful_execution_commits_and_closes() {
        let connector = MockConnector::new().with_rows(vec![single_column_row("n", json!(1))]);
        let report = executor(&connector)
            .execute_traced(&descriptor(None), &Statement::raw("SELECT 1 AS n"))
            .await;

        assert_eq!(report.result.unwrap(), vec![single_column_row("n", json!(1))]);
        assert_eq!(
            report.trace,
            vec![Idle, Connected, TransactionOpen, Executed, Committed, Closed]
        );
        assert_eq!(
            connector.steps(),
            vec![
                SessionStep::Connect,
                SessionStep::Begin,
                SessionStep::Execute,
                SessionStep::Commit,
                SessionStep::Close
            ]
        );
    }

    #[tokio::test]
    async fn test_connect_failure_still_reaches_closed() {
        let executor = QueryExecutor::new(Arc::new(FailingConnector));
        let report = executor
            .execute_traced(&descriptor(None), &Statement::raw("SELECT 1"))
            .await;

        assert!(matches!(report.result, Err(GatewayError::Connection(_))));
        assert_eq!(report.trace, vec![Idle, Closed]);
    }

    #[tokio::test]
    async fn test_execute_failure_rolls_back() {
        let connector = MockConnector::new().failing_sql("missing_table");
        let report = executor(&connector)
            .execute_traced(
                &descriptor(None),
                &Statement::raw("SELECT * FROM missing_table"),
            )
            .await;

        assert!(matches!(report.result, Err(GatewayError::Execution(_))));
        assert_eq!(
            report.trace,
            vec![Idle, Connected, TransactionOpen, RolledBack, Closed]
        );
        assert!(!connector.steps().contains(&SessionStep::Commit));
        assert!(connector.steps().contains(&SessionStep::Rollback));
    }

    #[tokio::test]
    async fn test_commit_failure_rolls_back_and_reports_commit_error() {
        let connector = MockConnector::new().failing_on(SessionStep::Commit);
        let report = executor(&connector)
            .execute_traced(&descriptor(None), &Statement::raw("UPDATE t SET x = 1"))
            .await;

        let err = report.result.as_ref().unwrap_err();
        assert!(err.to_string().contains("Commit"));
        assert!(report.reached(Executed));
        assert!(report.reached(RolledBack));
        assert!(!report.reached(Committed));
        assert_eq!(report.trace.last(), Some(&Closed));
    }

    #[tokio::test]
    async fn test_rollback_failure_does_not_mask_primary_error() {
        let connector = MockConnector::new()
            .failing_sql("boom")
            .failing_on(SessionStep::Rollback)
            .failing_on(SessionStep::Close);
        let report = executor(&connector)
            .execute_traced(&descriptor(None), &Statement::raw("SELECT boom"))
            .await;

        let err = report.result.unwrap_err();
        assert!(err.to_string().contains("mock failure for: SELECT boom"));
        assert_eq!(report.trace.last(), Some(&Closed));
    }

    #[tokio::test]
    async fn test_close_failure_keeps_rows() {
        let connector = MockConnector::new().failing_on(SessionStep::Close);
        let rows = executor(&connector)
            .execute(&descriptor(None), &Statement::raw("SELECT 1"))
            .await
            .unwrap();

        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn test_request_timeout_bounds_execute() {
        let connector = MockConnector::new().with_execute_delay(Duration::from_millis(500));
        let report = executor(&connector)
            .execute_traced(
                &descriptor(Some(Duration::from_millis(20))),
                &Statement::raw("SELECT SLEEP(1)"),
            )
            .await;

        let err = report.result.unwrap_err();
        assert!(matches!(err, GatewayError::Execution(_)));
        assert!(err.to_string().contains("execute timed out after 20 ms"));
        assert_eq!(
            report.trace,
            vec![Idle, Connected, TransactionOpen, RolledBack, Closed]
        );
    }

    #[tokio::test]
    async fn test_no_timeout_waits_for_slow_statement() {
        let connector = MockConnector::new().with_execute_delay(Duration::from_millis(50));
        let result = executor(&connector)
            .execute(&descriptor(None), &Statement::raw("SELECT 1"))
            .await;

        tokio_test::assert_ok!(result);
    }
}
