//! Single ad hoc execution against a named database.

use std::sync::Arc;

use serde_json::Value;
use tracing::{error, info};

use crate::catalog::MetadataRepository;
use crate::config::ExecutionConfig;
use crate::connection::{build_descriptor, ConnectionOptions, ExecutionPath};
use crate::credentials::CredentialCodec;
use crate::db::{Connector, Row};
use crate::error::{GatewayError, Result};
use crate::query::executor::QueryExecutor;
use crate::query::Statement;

/// A validated `{databaseName, sql}` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdHocRequest {
    pub database_name: String,
    pub sql: String,
}

impl AdHocRequest {
    pub fn new(database_name: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            database_name: database_name.into(),
            sql: sql.into(),
        }
    }

    /// Validates the body shape. Failures carry the caller-facing message.
    pub fn from_body(body: &Value) -> Result<Self> {
        let Value::Object(body) = body else {
            return Err(GatewayError::validation(
                "Invalid request format. Request body must be a valid JSON object.",
                "Please check your request format and ensure you are sending a properly \
                 structured JSON object.",
            ));
        };

        let database_name = body
            .get("databaseName")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                GatewayError::validation(
                    "Missing or invalid database name. Database name must be a string.",
                    "Please provide a valid database name as a string in your request.",
                )
            })?;

        let sql = body.get("sql").and_then(Value::as_str).ok_or_else(|| {
            GatewayError::validation(
                "Missing or invalid SQL query. SQL query must be a string.",
                "Please provide a valid SQL query as a string in your request.",
            )
        })?;

        Ok(Self::new(database_name, sql))
    }
}

/// Runs raw SQL against a database looked up by name.
#[derive(Clone)]
pub struct AdHocRunner {
    catalog: Arc<dyn MetadataRepository>,
    codec: Arc<CredentialCodec>,
    executor: QueryExecutor,
    execution: ExecutionConfig,
}

impl AdHocRunner {
    pub fn new(
        catalog: Arc<dyn MetadataRepository>,
        codec: Arc<CredentialCodec>,
        connector: Arc<dyn Connector>,
        execution: ExecutionConfig,
    ) -> Self {
        Self {
            catalog,
            codec,
            executor: QueryExecutor::new(connector),
            execution,
        }
    }

    pub async fn run(&self, request: &AdHocRequest) -> Result<Vec<Row>> {
        let result = self.run_inner(request).await;
        match &result {
            Ok(rows) => info!(
                "Ad hoc query on \"{}\" returned {} rows",
                request.database_name,
                rows.len()
            ),
            Err(e) => error!(
                "Ad hoc query on \"{}\" failed [{}]: {}",
                request.database_name,
                e.category(),
                e
            ),
        }
        result
    }

    async fn run_inner(&self, request: &AdHocRequest) -> Result<Vec<Row>> {
        let profile = self
            .catalog
            .find_database_profile_by_name(&request.database_name)
            .await?
            .ok_or_else(|| GatewayError::not_found(&request.database_name))?;

        let options = ConnectionOptions::for_path(ExecutionPath::AdHoc, &self.execution);
        let descriptor = build_descriptor(&profile, &self.codec, options)?;

        self.executor
            .execute(&descriptor, &Statement::raw(&request.sql))
            .await
    }
}
