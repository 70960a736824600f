//! Request-level tests of the two gateway contracts.

use std::sync::Arc;

use pretty_assertions::assert_eq;
use query_gateway::catalog::SqliteCatalog;
use query_gateway::config::ExecutionConfig;
use query_gateway::db::{single_column_row, MockConnector};
use query_gateway::gateway::{Gateway, GatewayResponse};
use serde_json::json;

use super::common::{create_test_catalog, in_group, new_query, network_profile, test_codec};

async fn seeded() -> (SqliteCatalog, tempfile::TempDir) {
    let (catalog, dir) = create_test_catalog().await;
    let codec = test_codec();
    let mysql = catalog
        .insert_database(&network_profile(&codec, "warehouse", "MySQL"))
        .await
        .unwrap();
    catalog
        .insert_database(&network_profile(&codec, "legacy", "Informix"))
        .await
        .unwrap();
    catalog
        .insert_query(&in_group(new_query("orders", mysql, "SELECT 'orders'"), "daily"))
        .await
        .unwrap();
    catalog
        .insert_query(&in_group(new_query("refunds", mysql, "SELECT 'refunds'"), "daily"))
        .await
        .unwrap();
    catalog
        .insert_query(&in_group(new_query("audit", mysql, "SELECT 'audit'"), "weekly"))
        .await
        .unwrap();
    (catalog, dir)
}

fn gateway(catalog: SqliteCatalog, connector: &MockConnector) -> Gateway {
    Gateway::new(
        Arc::new(catalog),
        Arc::new(test_codec()),
        Arc::new(connector.clone()),
        ExecutionConfig::default(),
    )
}

#[tokio::test]
async fn test_create_query_data_by_group() {
    let (catalog, _dir) = seeded().await;
    let connector = MockConnector::new().failing_sql("refunds");

    let response = gateway(catalog, &connector)
        .create_query_data(&json!({"filterMap": {"group_name": "daily"}}))
        .await;

    assert_eq!(
        response,
        GatewayResponse::ok(json!({
            "data": {
                "orders": [{"result": "Mock result for: SELECT 'orders'"}],
                "refunds": {
                    "message": "The query data creation process encountered a technical issue.",
                    "suggestion": "Please try again later or contact support if the issue persists."
                }
            }
        }))
    );
}

#[tokio::test]
async fn test_detailed_output() {
    let (catalog, _dir) = seeded().await;
    let connector = MockConnector::new().failing_sql("audit");

    let response = gateway(catalog, &connector)
        .create_query_data_detailed(&json!({"filterMap": {"name": ["orders", "audit"]}}))
        .await;

    assert_eq!(response.status, 200);
    let data = &response.body["data"];
    assert_eq!(data["orders"]["status"], json!(true));
    assert_eq!(data["orders"]["metadata"]["name"], json!("orders"));
    assert_eq!(data["orders"]["metadata"]["isQueryActive"], json!(true));
    assert_eq!(data["audit"]["status"], json!(false));
    assert_eq!(data["audit"]["metadata"]["groupName"], json!("weekly"));
    assert!(data["audit"]["data"]["message"].is_string());
    assert!(data.get("refunds").is_none());
}

#[tokio::test]
async fn test_malformed_filter_map_selects_all_active() {
    let (catalog, _dir) = seeded().await;
    let connector = MockConnector::new();

    let response = gateway(catalog, &connector)
        .create_query_data(&json!({"filterMap": "everything"}))
        .await;

    let data = response.body["data"].as_object().unwrap();
    assert_eq!(data.len(), 3);
}

#[tokio::test]
async fn test_run_ad_hoc() {
    let (catalog, _dir) = seeded().await;
    let connector = MockConnector::new().with_rows(vec![single_column_row("total", json!(12))]);
    let gateway = gateway(catalog, &connector);

    let response = gateway
        .run_ad_hoc(&json!({"databaseName": "warehouse", "sql": "SELECT COUNT(*) AS total FROM t"}))
        .await;
    assert_eq!(response, GatewayResponse::ok(json!([{"total": 12}])));

    let response = gateway
        .run_ad_hoc(&json!({"databaseName": "legacy", "sql": "SELECT 1"}))
        .await;
    assert_eq!(response.status, 500);
    assert_eq!(
        response.body["message"],
        json!("Unsupported database type: Informix.")
    );

    let response = gateway
        .run_ad_hoc(&json!({"databaseName": "warehouse"}))
        .await;
    assert_eq!(response.status, 400);

    let response = gateway
        .run_ad_hoc(&json!({"databaseName": "nowhere", "sql": "SELECT 1"}))
        .await;
    assert_eq!(response.status, 404);
}

#[tokio::test]
async fn test_ad_hoc_execution_failure_is_generic() {
    let (catalog, _dir) = seeded().await;
    let connector = MockConnector::new().failing_sql("secret_table");

    let response = gateway(catalog, &connector)
        .run_ad_hoc(&json!({"databaseName": "warehouse", "sql": "SELECT * FROM secret_table"}))
        .await;

    assert_eq!(response.status, 500);
    assert_eq!(
        response.body,
        json!({
            "message": "Something went wrong.",
            "suggestion": "Please try again later. If this issue persists, contact our support team for assistance."
        })
    );
}
