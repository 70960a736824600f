//! Shared fixtures: a keyed codec and a seeded metadata store.

use query_gateway::catalog::{NewDatabaseProfile, NewQueryDefinition, SqliteCatalog};
use query_gateway::credentials::{
    CiphertextEncoding, CredentialCodec, CredentialField, CredentialKeys, FieldKey,
};
use serde_json::Value;
use tempfile::TempDir;

pub const TEST_KEY: &str = "0123456789abcdef0123456789abcdef";
pub const TEST_IV: &str = "fedcba9876543210";

/// `hunter2` under TEST_KEY/TEST_IV, hex-encoded by `openssl enc -aes-256-cbc`.
pub const OPENSSL_HUNTER2_HEX: &[u8] = b"0207328a4cb51eaf64bb463c5664a24a";

/// A codec with the same key pair for every field.
pub fn test_codec() -> CredentialCodec {
    let mut keys = CredentialKeys::new();
    for field in CredentialField::ALL {
        keys = keys.with_field(field, FieldKey::parse(TEST_KEY, TEST_IV).unwrap());
    }
    CredentialCodec::new(keys, CiphertextEncoding::Hex)
}

/// An on-disk store in a fresh temporary directory.
pub async fn create_test_catalog() -> (SqliteCatalog, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let catalog = SqliteCatalog::open(&dir.path().join("metadata.db"))
        .await
        .unwrap();
    (catalog, dir)
}

/// Encrypts a network profile for the given dialect tag.
pub fn network_profile(
    codec: &CredentialCodec,
    name: &str,
    database_type: &str,
) -> NewDatabaseProfile {
    let enc = |field, value: &str| codec.encrypt(field, value).unwrap();
    NewDatabaseProfile {
        name: name.to_string(),
        database_type: database_type.to_string(),
        host: Some(enc(CredentialField::Host, "db.internal")),
        database: Some(enc(CredentialField::Database, "sales")),
        username: enc(CredentialField::Username, "reader"),
        password: enc(CredentialField::Password, "hunter2"),
        connect_string: None,
        port: Some(3306),
    }
}

pub fn new_query(name: &str, database_id: i64, sql: &str) -> NewQueryDefinition {
    NewQueryDefinition {
        name: name.to_string(),
        group_name: None,
        database_id,
        sql: sql.to_string(),
        variable_map: None,
        replacement_map: None,
        is_query_active: true,
    }
}

pub fn in_group(mut query: NewQueryDefinition, group: &str) -> NewQueryDefinition {
    query.group_name = Some(group.to_string());
    query
}

pub fn with_variables(mut query: NewQueryDefinition, variables: Value) -> NewQueryDefinition {
    query.variable_map = Some(variables);
    query
}
