//! Concurrent batch execution of stored query definitions.
//!
//! Each selected definition runs in its own task with its own connection.
//! Any failure, including a panic, becomes an error entry for that query
//! alone; the batch itself always completes.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, SecondsFormat, Utc};
use futures::future::join_all;
use serde_json::{json, Map, Value};
use tracing::{error, info};

use crate::catalog::{MetadataRepository, QueryDefinition, QueryMetadata};
use crate::config::ExecutionConfig;
use crate::connection::{build_descriptor, ConnectionOptions, ExecutionPath};
use crate::credentials::CredentialCodec;
use crate::db::{Connector, Row};
use crate::error::{ErrorPayload, GatewayError, Result};
use crate::query::executor::QueryExecutor;
use crate::query::params::{EffectiveParameters, OverrideRequest, SharedRequest};

/// Success rows or the caller-facing error pair.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success { data: Vec<Row> },
    Error(ErrorPayload),
}

/// The result of one definition within a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    pub query: QueryMetadata,
    pub outcome: Outcome,
    pub elapsed: Duration,
    pub finished_at: DateTime<Utc>,
}

impl ExecutionResult {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Success { .. })
    }

    /// Rows on success, `{message, suggestion}` on failure.
    pub fn data_json(&self) -> Value {
        match &self.outcome {
            Outcome::Success { data } => {
                Value::Array(data.iter().cloned().map(Value::Object).collect())
            }
            Outcome::Error(payload) => json!(payload),
        }
    }

    /// The entry with its query metadata, status and timing.
    pub fn detailed_json(&self) -> Value {
        json!({
            "metadata": self.query,
            "status": self.is_success(),
            "elapsedMs": u64::try_from(self.elapsed.as_millis()).unwrap_or(u64::MAX),
            "timestamp": self.finished_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            "data": self.data_json(),
        })
    }
}

/// Results of a batch keyed by query name.
///
/// Definitions sharing a name collapse to one entry; the one selected last
/// wins.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchOutcome {
    results: BTreeMap<String, ExecutionResult>,
}

impl BatchOutcome {
    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&ExecutionResult> {
        self.results.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ExecutionResult)> {
        self.results.iter()
    }

    pub fn error_count(&self) -> usize {
        self.results.values().filter(|r| !r.is_success()).count()
    }

    pub fn success_count(&self) -> usize {
        self.len() - self.error_count()
    }

    /// `{ name: rows | {message, suggestion} }`, or the detailed entries.
    pub fn to_json(&self, detailed: bool) -> Value {
        let entries: Map<String, Value> = self
            .results
            .iter()
            .map(|(name, result)| {
                let value = if detailed {
                    result.detailed_json()
                } else {
                    result.data_json()
                };
                (name.clone(), value)
            })
            .collect();
        Value::Object(entries)
    }
}

/// Selects definitions and fans their execution out across tasks.
#[derive(Clone)]
pub struct BatchCoordinator {
    catalog: Arc<dyn MetadataRepository>,
    codec: Arc<CredentialCodec>,
    executor: QueryExecutor,
    execution: ExecutionConfig,
}

impl BatchCoordinator {
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

    /// Definitions chosen by the request's filter map.
    ///
    /// An unknown filter field fails the whole request.
    pub async fn select(&self, request: &OverrideRequest) -> Result<Vec<QueryDefinition>> {
        request.filter().validate()?;
        self.catalog.find_query_definitions(request.filter()).await
    }

    /// Selects and executes in one step.
    pub async fn run(&self, request: OverrideRequest) -> Result<BatchOutcome> {
        let definitions = self.select(&request).await?;
        Ok(self.execute_batch(definitions, Arc::new(request)).await)
    }

    /// Executes every definition concurrently and waits for all of them.
    pub async fn execute_batch(
        &self,
        definitions: Vec<QueryDefinition>,
        request: SharedRequest,
    ) -> BatchOutcome {
        let batch_started = Instant::now();
        let total = definitions.len();

        let (queries, handles): (Vec<_>, Vec<_>) = definitions
            .into_iter()
            .map(|definition| {
                let query = QueryMetadata::from(&definition);
                let coordinator = self.clone();
                let request = Arc::clone(&request);
                let handle = tokio::spawn(async move {
                    let started = Instant::now();
                    let result = coordinator.execute_one(&definition, &request).await;
                    (result, started.elapsed())
                });
                (query, handle)
            })
            .unzip();

        let joined = join_all(handles).await;

        let mut outcome = BatchOutcome::default();
        for (query, joined) in queries.into_iter().zip(joined) {
            let (result, elapsed) = match joined {
                Ok(finished) => finished,
                Err(e) => (
                    Err(GatewayError::internal(format!("execution task failed: {e}"))),
                    batch_started.elapsed(),
                ),
            };

            let outcome_entry = match result {
                Ok(data) => Outcome::Success { data },
                Err(e) => {
                    error!(
                        "Query \"{}\" (id {}) failed [{}]: {}",
                        query.name,
                        query.id,
                        e.category(),
                        e
                    );
                    Outcome::Error(ErrorPayload::query_failure())
                }
            };

            outcome.results.insert(
                query.name.clone(),
                ExecutionResult {
                    query,
                    outcome: outcome_entry,
                    elapsed,
                    finished_at: Utc::now(),
                },
            );
        }

        info!(
            "Batch of {} queries finished in {} ms: {} succeeded, {} failed",
            total,
            batch_started.elapsed().as_millis(),
            outcome.success_count(),
            outcome.error_count()
        );
        outcome
    }

    async fn execute_one(
        &self,
        definition: &QueryDefinition,
        request: &OverrideRequest,
    ) -> Result<Vec<Row>> {
        let params = EffectiveParameters::resolve(definition, request)?;

        let profile = self
            .catalog
            .find_database_profile(params.database_id)
            .await?
            .ok_or_else(|| {
                GatewayError::metadata(format!(
                    "database {} referenced by query \"{}\" does not exist",
                    params.database_id, definition.name
                ))
            })?;

        let options = ConnectionOptions::for_path(ExecutionPath::Batch, &self.execution);
        let descriptor = build_descriptor(&profile, &self.codec, options)?;
        let statement = params.into_statement(descriptor.dialect());

        self.executor.execute(&descriptor, &statement).await
    }
}
