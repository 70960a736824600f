//! Live MySQL tests.
//!
//! Set QUERY_GATEWAY_TEST_MYSQL_HOST, _DATABASE, _USER and _PASSWORD (and
//! optionally _PORT) to run them against a real server.

use std::sync::Arc;

use query_gateway::connection::{ConnectionDescriptor, ConnectionOptions, NetworkDescriptor};
use query_gateway::credentials::Secret;
use query_gateway::db::{Connector, DriverConnector};
use query_gateway::error::GatewayError;
use query_gateway::query::{ExecutionState, QueryExecutor, Statement};
use serde_json::json;

fn env(name: &str) -> Option<String> {
    std::env::var(format!("QUERY_GATEWAY_TEST_MYSQL_{name}")).ok()
}

/// Helper to build a descriptor from the environment.
fn test_descriptor() -> Option<ConnectionDescriptor> {
    Some(ConnectionDescriptor::MySql(NetworkDescriptor {
        host: Secret::new(env("HOST")?),
        database: Secret::new(env("DATABASE")?),
        username: Secret::new(env("USER")?),
        password: Secret::new(env("PASSWORD")?),
        port: env("PORT").and_then(|p| p.parse().ok()),
        options: ConnectionOptions::default(),
    }))
}

#[tokio::test]
async fn test_preamble_and_bound_replacements() {
    let Some(descriptor) = test_descriptor() else {
        eprintln!("Skipping test: QUERY_GATEWAY_TEST_MYSQL_HOST not set");
        return;
    };

    let statement = Statement {
        preamble: "SET @greeting = 'hello'; ".to_string(),
        template: "SELECT @greeting AS greeting, :n + 1 AS next, 'a:b' AS literal".to_string(),
        replacements: json!({"n": 41}).as_object().cloned(),
    };
    let rows = QueryExecutor::new(Arc::new(DriverConnector))
        .execute(&descriptor, &statement)
        .await
        .unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["greeting"], json!("hello"));
    assert_eq!(rows[0]["next"], json!(42));
    assert_eq!(rows[0]["literal"], json!("a:b"));
}

#[tokio::test]
async fn test_sql_error_rolls_back() {
    let Some(descriptor) = test_descriptor() else {
        eprintln!("Skipping test: QUERY_GATEWAY_TEST_MYSQL_HOST not set");
        return;
    };

    let report = QueryExecutor::new(Arc::new(DriverConnector))
        .execute_traced(&descriptor, &Statement::raw("SELECT * FROM no_such_table_qg"))
        .await;

    assert!(matches!(report.result, Err(GatewayError::Execution(_))));
    assert!(report.reached(ExecutionState::RolledBack));
    assert!(report.reached(ExecutionState::Closed));
}

#[tokio::test(flavor = "current_thread")]
async fn test_connect_to_closed_port_fails() {
    let descriptor = ConnectionDescriptor::MySql(NetworkDescriptor {
        host: Secret::new("127.0.0.1"),
        database: Secret::new("testdb"),
        username: Secret::new("testuser"),
        password: Secret::new("testpass"),
        port: Some(59999), // Unlikely to be in use
        options: ConnectionOptions::default(),
    });

    let err = DriverConnector.connect(&descriptor).await.err().unwrap();
    assert!(matches!(err, GatewayError::Connection(_)));
    assert!(!err.payload().message.contains("testpass"));
}
