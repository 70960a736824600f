//! The gateway's two request contracts.
//!
//! [`Gateway`] takes JSON request bodies and returns a status code with a
//! JSON body, the way an HTTP handler would.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};

use crate::catalog::MetadataRepository;
use crate::config::ExecutionConfig;
use crate::credentials::CredentialCodec;
use crate::db::{Connector, Row};
use crate::error::GatewayError;
use crate::query::{AdHocRequest, AdHocRunner, BatchCoordinator, OverrideRequest};

/// A status code and JSON body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GatewayResponse {
    pub status: u16,
    pub body: Value,
}

impl GatewayResponse {
    pub fn ok(body: Value) -> Self {
        Self { status: 200, body }
    }

    /// The error's status with its caller-facing payload.
    pub fn error(err: &GatewayError) -> Self {
        Self {
            status: err.status_code(),
            body: json!(err.payload()),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Batch and ad hoc execution over one metadata store and connector.
#[derive(Clone)]
pub struct Gateway {
    batch: BatchCoordinator,
    ad_hoc: AdHocRunner,
}

impl Gateway {
    pub fn new(
        catalog: Arc<dyn MetadataRepository>,
        codec: Arc<CredentialCodec>,
        connector: Arc<dyn Connector>,
        execution: ExecutionConfig,
    ) -> Self {
        Self {
            batch: BatchCoordinator::new(
                Arc::clone(&catalog),
                Arc::clone(&codec),
                Arc::clone(&connector),
                execution.clone(),
            ),
            ad_hoc: AdHocRunner::new(catalog, codec, connector, execution),
        }
    }

    pub fn batch(&self) -> &BatchCoordinator {
        &self.batch
    }

    /// Runs every selected definition and returns `{"data": {name: ...}}`.
    ///
    /// Failed entries do not change the status; only a rejected filter or a
    /// metadata store failure does.
    pub async fn create_query_data(&self, body: &Value) -> GatewayResponse {
        self.run_batch(body, false).await
    }

    /// Like [`Gateway::create_query_data`], with metadata and timing per entry.
    pub async fn create_query_data_detailed(&self, body: &Value) -> GatewayResponse {
        self.run_batch(body, true).await
    }

    async fn run_batch(&self, body: &Value, detailed: bool) -> GatewayResponse {
        let request = OverrideRequest::from_body(body);
        match self.batch.run(request).await {
            Ok(outcome) => GatewayResponse::ok(json!({ "data": outcome.to_json(detailed) })),
            Err(e) => {
                tracing::error!("Batch request failed [{}]: {}", e.category(), e);
                GatewayResponse::error(&e)
            }
        }
    }

    /// Runs `{databaseName, sql}` and returns the raw rows.
    pub async fn run_ad_hoc(&self, body: &Value) -> GatewayResponse {
        let result = match AdHocRequest::from_body(body) {
            Ok(request) => self.ad_hoc.run(&request).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(rows) => GatewayResponse::ok(rows_json(rows)),
            Err(e) => GatewayResponse::error(&e),
        }
    }
}

fn rows_json(rows: Vec<Row>) -> Value {
    Value::Array(rows.into_iter().map(Value::Object).collect())
}
