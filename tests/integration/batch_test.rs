//! Batch execution over a real metadata store with scripted connectors.

use std::sync::Arc;

use pretty_assertions::assert_eq;
use query_gateway::catalog::SqliteCatalog;
use query_gateway::config::ExecutionConfig;
use query_gateway::db::{Connector, FailingConnector, MockConnector, SessionStep};
use query_gateway::error::ErrorPayload;
use query_gateway::query::{BatchCoordinator, Outcome, OverrideRequest};
use serde_json::{json, Map, Value};

use super::common::{create_test_catalog, new_query, network_profile, test_codec, with_variables};

fn coordinator(catalog: SqliteCatalog, connector: Arc<dyn Connector>) -> BatchCoordinator {
    BatchCoordinator::new(
        Arc::new(catalog),
        Arc::new(test_codec()),
        connector,
        ExecutionConfig::default(),
    )
}

fn object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap()
}

#[tokio::test]
async fn test_every_selected_definition_gets_one_entry() {
    let (catalog, _dir) = create_test_catalog().await;
    let codec = test_codec();
    let mysql = catalog
        .insert_database(&network_profile(&codec, "mysql", "MySQL"))
        .await
        .unwrap();
    let legacy = catalog
        .insert_database(&network_profile(&codec, "legacy", "Sybase"))
        .await
        .unwrap();

    let names = ["ok_a", "fails_b", "ok_c", "legacy_d", "fails_e"];
    for name in names {
        let db = if name.starts_with("legacy") { legacy } else { mysql };
        catalog
            .insert_query(&new_query(name, db, &format!("SELECT '{name}'")))
            .await
            .unwrap();
    }

    let connector = MockConnector::new().failing_sql("fails_");
    let outcome = coordinator(catalog, Arc::new(connector.clone()))
        .run(OverrideRequest::default())
        .await
        .unwrap();

    assert_eq!(outcome.len(), names.len());
    assert_eq!(outcome.error_count(), 3);
    assert_eq!(outcome.success_count(), 2);

    let failed = outcome.get("legacy_d").unwrap();
    assert_eq!(failed.outcome, Outcome::Error(ErrorPayload::query_failure()));
    assert_eq!(failed.query.database_id, legacy);

    // The unsupported dialect never reached the connector.
    assert_eq!(
        connector
            .steps()
            .iter()
            .filter(|s| **s == SessionStep::Connect)
            .count(),
        4
    );
}

#[tokio::test]
async fn test_connection_failures_fail_every_entry_but_not_the_batch() {
    let (catalog, _dir) = create_test_catalog().await;
    let codec = test_codec();
    let db = catalog
        .insert_database(&network_profile(&codec, "down", "SQL Server"))
        .await
        .unwrap();
    for name in ["one", "two", "three"] {
        catalog
            .insert_query(&new_query(name, db, "SELECT 1"))
            .await
            .unwrap();
    }

    let outcome = coordinator(catalog, Arc::new(FailingConnector))
        .run(OverrideRequest::default())
        .await
        .unwrap();

    assert_eq!(outcome.len(), 3);
    assert_eq!(outcome.error_count(), 3);
}

#[tokio::test]
async fn test_override_precedence_end_to_end() {
    let (catalog, _dir) = create_test_catalog().await;
    let codec = test_codec();
    let db = catalog
        .insert_database(&network_profile(&codec, "mysql", "MySQL"))
        .await
        .unwrap();
    catalog
        .insert_query(&with_variables(
            new_query("stored_only", db, "SELECT @region"),
            json!({"region": "eu"}),
        ))
        .await
        .unwrap();
    catalog
        .insert_query(&with_variables(
            new_query("per_query", db, "SELECT @region"),
            json!({"region": "eu"}),
        ))
        .await
        .unwrap();

    // Per-query overrides replace the stored map for one query.
    let request = OverrideRequest::default().with_per_query(
        "per_query",
        object(json!({"variable_map": {"region": "us", "limit": 10}})),
    );
    let connector = MockConnector::new();
    coordinator(catalog.clone(), Arc::new(connector.clone()))
        .run(request)
        .await
        .unwrap();

    let mut sql = connector.executed_sql();
    sql.sort();
    assert_eq!(
        sql,
        vec![
            "SET @region = 'eu'; SELECT @region".to_string(),
            "SET @region = 'us'; SET @limit = 10; SELECT @region".to_string(),
        ]
    );

    // The global map beats the per-query map.
    let request = OverrideRequest::default()
        .with_global(object(json!({"variable_map": null})))
        .with_per_query(
            "per_query",
            object(json!({"variable_map": {"region": "us"}})),
        );
    let connector = MockConnector::new();
    coordinator(catalog, Arc::new(connector.clone()))
        .run(request)
        .await
        .unwrap();

    assert_eq!(
        connector.executed_sql(),
        vec!["SELECT @region".to_string(), "SELECT @region".to_string()]
    );
}

#[tokio::test]
async fn test_invalid_override_type_fails_only_that_query() {
    let (catalog, _dir) = create_test_catalog().await;
    let codec = test_codec();
    let db = catalog
        .insert_database(&network_profile(&codec, "mysql", "MySQL"))
        .await
        .unwrap();
    catalog
        .insert_query(&new_query("good", db, "SELECT 1"))
        .await
        .unwrap();
    catalog
        .insert_query(&new_query("bad", db, "SELECT 2"))
        .await
        .unwrap();

    let request = OverrideRequest::from_body(&json!({
        "perQuery": {"bad": {"sql": 42}}
    }));
    let outcome = coordinator(catalog, Arc::new(MockConnector::new()))
        .run(request)
        .await
        .unwrap();

    assert!(outcome.get("good").unwrap().is_success());
    assert!(!outcome.get("bad").unwrap().is_success());
}

#[tokio::test]
async fn test_database_override_switches_target() {
    let (catalog, _dir) = create_test_catalog().await;
    let codec = test_codec();
    let mysql = catalog
        .insert_database(&network_profile(&codec, "mysql", "MySQL"))
        .await
        .unwrap();
    let mssql = catalog
        .insert_database(&network_profile(&codec, "mssql", "SQL Server"))
        .await
        .unwrap();
    catalog
        .insert_query(&with_variables(
            new_query("moved", mysql, "SELECT @n"),
            json!({"n": {"dataType": "INT", "value": 7}}),
        ))
        .await
        .unwrap();

    let request = OverrideRequest::from_body(&json!({
        "globalReplacementMap": {"database_id": mssql}
    }));
    let connector = MockConnector::new();
    coordinator(catalog, Arc::new(connector.clone()))
        .run(request)
        .await
        .unwrap();

    let calls = connector.calls();
    assert_eq!(
        calls[0].dialect,
        query_gateway::connection::Dialect::SqlServer
    );
    assert_eq!(
        connector.executed_sql(),
        vec!["DECLARE @n INT = 7; SELECT @n".to_string()]
    );
}
