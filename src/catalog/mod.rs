//! Metadata store for query definitions and database profiles.
//!
//! The engine reads definitions and profiles only through the
//! [`MetadataRepository`] trait. [`SqliteCatalog`] is the on-disk store;
//! [`InMemoryCatalog`] serves tests and embedding.

mod filter;
mod memory;
mod migrations;
mod sqlite;

pub use filter::{Constraint, QueryFilter, FILTERABLE_COLUMNS};
pub use memory::InMemoryCatalog;
pub use sqlite::SqliteCatalog;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::credentials::CredentialField;
use crate::error::Result;

/// A stored SQL template bound to a target database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryDefinition {
    pub id: i64,
    pub name: String,
    pub group_name: Option<String>,
    pub database_id: i64,
    pub sql: String,
    pub variable_map: Option<Value>,
    pub replacement_map: Option<Value>,
    pub is_query_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl QueryDefinition {
    /// The definition as a column-name keyed record.
    pub fn to_record(&self) -> Map<String, Value> {
        let mut record = Map::new();
        record.insert("id".into(), self.id.into());
        record.insert("name".into(), self.name.clone().into());
        record.insert(
            "group_name".into(),
            self.group_name.clone().map_or(Value::Null, Value::String),
        );
        record.insert("database_id".into(), self.database_id.into());
        record.insert("sql".into(), self.sql.clone().into());
        record.insert(
            "variable_map".into(),
            self.variable_map.clone().unwrap_or(Value::Null),
        );
        record.insert(
            "replacement_map".into(),
            self.replacement_map.clone().unwrap_or(Value::Null),
        );
        record.insert("is_query_active".into(), self.is_query_active.into());
        record.insert("created_at".into(), self.created_at.clone().into());
        record.insert("updated_at".into(), self.updated_at.clone().into());
        record
    }

    /// The stored value of a resolvable parameter column, if any.
    pub fn stored(&self, column: &str) -> Option<Value> {
        match column {
            "database_id" => Some(self.database_id.into()),
            "sql" => Some(self.sql.clone().into()),
            "variable_map" => self.variable_map.clone(),
            "replacement_map" => self.replacement_map.clone(),
            _ => None,
        }
    }
}

/// Identity and timestamps of a definition, carried on every result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryMetadata {
    pub id: i64,
    pub name: String,
    pub group_name: Option<String>,
    pub database_id: i64,
    pub is_query_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl From<&QueryDefinition> for QueryMetadata {
    fn from(def: &QueryDefinition) -> Self {
        Self {
            id: def.id,
            name: def.name.clone(),
            group_name: def.group_name.clone(),
            database_id: def.database_id,
            is_query_active: def.is_query_active,
            created_at: def.created_at.clone(),
            updated_at: def.updated_at.clone(),
        }
    }
}

/// A target database with its encrypted connection fields.
///
/// Encrypted columns hold encoded ciphertext; nothing here is plaintext.
#[derive(Clone, PartialEq)]
pub struct DatabaseProfile {
    pub id: i64,
    pub name: String,
    pub database_type: String,
    pub host: Option<Vec<u8>>,
    pub database: Option<Vec<u8>>,
    pub username: Vec<u8>,
    pub password: Vec<u8>,
    pub connect_string: Option<Vec<u8>>,
    pub port: Option<u16>,
}

impl DatabaseProfile {
    /// Returns the stored ciphertext for a field, if present.
    pub fn ciphertext(&self, field: CredentialField) -> Option<&[u8]> {
        match field {
            CredentialField::Host => self.host.as_deref(),
            CredentialField::Database => self.database.as_deref(),
            CredentialField::Username => Some(&self.username),
            CredentialField::Password => Some(&self.password),
            CredentialField::ConnectString => self.connect_string.as_deref(),
        }
    }
}

impl fmt::Debug for DatabaseProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseProfile")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("database_type", &self.database_type)
            .field("port", &self.port)
            .finish_non_exhaustive()
    }
}

/// A database profile to be inserted, ciphertext already encoded.
#[derive(Debug, Clone)]
pub struct NewDatabaseProfile {
    pub name: String,
    pub database_type: String,
    pub host: Option<Vec<u8>>,
    pub database: Option<Vec<u8>>,
    pub username: Vec<u8>,
    pub password: Vec<u8>,
    pub connect_string: Option<Vec<u8>>,
    pub port: Option<u16>,
}

/// A query definition to be inserted.
#[derive(Debug, Clone)]
pub struct NewQueryDefinition {
    pub name: String,
    pub group_name: Option<String>,
    pub database_id: i64,
    pub sql: String,
    pub variable_map: Option<Value>,
    pub replacement_map: Option<Value>,
    pub is_query_active: bool,
}

/// Read access to the metadata store.
#[async_trait]
pub trait MetadataRepository: Send + Sync {
    /// Looks up a database profile by id.
    async fn find_database_profile(&self, id: i64) -> Result<Option<DatabaseProfile>>;

    /// Looks up a database profile by its unique name.
    async fn find_database_profile_by_name(&self, name: &str) -> Result<Option<DatabaseProfile>>;

    /// Returns the definitions selected by the filter, ordered by id.
    async fn find_query_definitions(&self, filter: &QueryFilter) -> Result<Vec<QueryDefinition>>;
}
