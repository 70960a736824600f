//! Integration tests for the SQLite metadata store.

use pretty_assertions::assert_eq;
use query_gateway::catalog::{MetadataRepository, QueryFilter, SqliteCatalog};
use query_gateway::connection::{build_descriptor, ConnectionDescriptor, ConnectionOptions};
use query_gateway::credentials::CredentialField;
use query_gateway::error::GatewayError;
use serde_json::json;

use super::common::{
    create_test_catalog, in_group, new_query, network_profile, test_codec, with_variables,
    OPENSSL_HUNTER2_HEX,
};

#[tokio::test]
async fn test_store_file_is_created() {
    let (catalog, dir) = create_test_catalog().await;
    assert!(dir.path().join("metadata.db").exists());
    assert_eq!(catalog.path(), Some(dir.path().join("metadata.db").as_path()));
    catalog.close().await;
}

#[tokio::test]
async fn test_reopen_keeps_data() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("metadata.db");
    let codec = test_codec();

    let catalog = SqliteCatalog::open(&path).await.unwrap();
    let id = catalog
        .insert_database(&network_profile(&codec, "reporting", "MySQL"))
        .await
        .unwrap();
    catalog.close().await;

    let catalog = SqliteCatalog::open(&path).await.unwrap();
    let profile = catalog.find_database_profile(id).await.unwrap().unwrap();
    assert_eq!(profile.name, "reporting");
    catalog.close().await;
}

#[tokio::test]
async fn test_profile_round_trip_keeps_ciphertext() {
    let (catalog, _dir) = create_test_catalog().await;
    let codec = test_codec();

    let id = catalog
        .insert_database(&network_profile(&codec, "reporting", "SQL Server"))
        .await
        .unwrap();
    let profile = catalog
        .find_database_profile_by_name("reporting")
        .await
        .unwrap()
        .unwrap();

    assert_eq!(profile.id, id);
    assert_eq!(profile.database_type, "SQL Server");
    assert_eq!(profile.port, Some(3306));
    let host = profile.ciphertext(CredentialField::Host).unwrap();
    assert_ne!(host, b"db.internal");
    assert_eq!(
        codec.decrypt(CredentialField::Host, host).unwrap().expose(),
        "db.internal"
    );

    assert!(catalog
        .find_database_profile_by_name("missing")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_externally_encrypted_password_decrypts() {
    let (catalog, _dir) = create_test_catalog().await;
    let codec = test_codec();

    let mut profile = network_profile(&codec, "legacy", "MySQL");
    profile.password = OPENSSL_HUNTER2_HEX.to_vec();
    let id = catalog.insert_database(&profile).await.unwrap();

    let stored = catalog.find_database_profile(id).await.unwrap().unwrap();
    let descriptor = build_descriptor(&stored, &codec, ConnectionOptions::default()).unwrap();
    match descriptor {
        ConnectionDescriptor::MySql(network) => {
            assert_eq!(network.password.expose(), "hunter2");
            assert_eq!(network.username.expose(), "reader");
        }
        other => panic!("unexpected descriptor {other:?}"),
    }
}

#[tokio::test]
async fn test_duplicate_database_name_is_rejected() {
    let (catalog, _dir) = create_test_catalog().await;
    let codec = test_codec();

    catalog
        .insert_database(&network_profile(&codec, "reporting", "MySQL"))
        .await
        .unwrap();
    let err = catalog
        .insert_database(&network_profile(&codec, "reporting", "MySQL"))
        .await
        .unwrap_err();

    assert!(matches!(err, GatewayError::Metadata(_)));
    assert!(err.to_string().contains("already exists"));
}

#[tokio::test]
async fn test_query_for_unknown_database_is_rejected() {
    let (catalog, _dir) = create_test_catalog().await;
    let err = catalog
        .insert_query(&new_query("orphan", 42, "SELECT 1"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("42"));
}

#[tokio::test]
async fn test_filter_selection() {
    let (catalog, _dir) = create_test_catalog().await;
    let codec = test_codec();
    let db = catalog
        .insert_database(&network_profile(&codec, "reporting", "MySQL"))
        .await
        .unwrap();

    let mut ids = Vec::new();
    for (name, group) in [("a", "daily"), ("b", "daily"), ("c", "weekly"), ("d", "daily")] {
        ids.push(
            catalog
                .insert_query(&in_group(new_query(name, db, "SELECT 1"), group))
                .await
                .unwrap(),
        );
    }
    let mut inactive = in_group(new_query("e", db, "SELECT 1"), "daily");
    inactive.is_query_active = false;
    catalog.insert_query(&inactive).await.unwrap();

    let names = |defs: Vec<query_gateway::catalog::QueryDefinition>| {
        defs.into_iter().map(|d| d.name).collect::<Vec<_>>()
    };

    // group_name = 'daily' AND id IN (a, b, c)
    let filter = QueryFilter::from_filter_map(Some(&json!({
        "group_name": "daily",
        "id": [ids[0], ids[1], ids[2]],
    })));
    assert_eq!(
        names(catalog.find_query_definitions(&filter).await.unwrap()),
        vec!["a", "b"]
    );

    // No filter: every active definition, in id order.
    let all = catalog
        .find_query_definitions(&QueryFilter::all_active())
        .await
        .unwrap();
    assert_eq!(names(all), vec!["a", "b", "c", "d"]);

    // Constraining the active flag reaches inactive definitions.
    let filter = QueryFilter::from_filter_map(Some(&json!({"is_query_active": false})));
    assert_eq!(
        names(catalog.find_query_definitions(&filter).await.unwrap()),
        vec!["e"]
    );

    // An empty set matches nothing.
    let filter = QueryFilter::from_filter_map(Some(&json!({"id": []})));
    assert!(catalog
        .find_query_definitions(&filter)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_unknown_filter_column_is_rejected() {
    let (catalog, _dir) = create_test_catalog().await;
    let filter = QueryFilter::from_filter_map(Some(&json!({"name; DROP TABLE x": "a"})));

    let err = catalog.find_query_definitions(&filter).await.unwrap_err();
    assert_eq!(err.status_code(), 400);
}

#[tokio::test]
async fn test_json_maps_round_trip() {
    let (catalog, _dir) = create_test_catalog().await;
    let codec = test_codec();
    let db = catalog
        .insert_database(&network_profile(&codec, "reporting", "SQL Server"))
        .await
        .unwrap();

    let mut query = with_variables(
        new_query("vars", db, "SELECT @start"),
        json!({"start": {"dataType": "DATE", "value": "2024-01-01"}}),
    );
    query.replacement_map = Some(json!({"ids": [1, 2, 3]}));
    catalog.insert_query(&query).await.unwrap();

    let defs = catalog
        .find_query_definitions(&QueryFilter::all_active().with_equals("name", json!("vars")))
        .await
        .unwrap();
    assert_eq!(defs.len(), 1);
    assert_eq!(
        defs[0].variable_map,
        Some(json!({"start": {"dataType": "DATE", "value": "2024-01-01"}}))
    );
    assert_eq!(defs[0].replacement_map, Some(json!({"ids": [1, 2, 3]})));
    assert!(defs[0].is_query_active);
    assert!(!defs[0].created_at.is_empty());
}
