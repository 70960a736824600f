//! Configuration management for the query gateway.
//!
//! Handles loading configuration from a TOML file and environment variables:
//! where the metadata store lives, execution timeouts, and how stored
//! ciphertext is encoded. Encryption keys are not part of the file; they are
//! read separately into [`crate::credentials::CredentialKeys`].

use crate::credentials::CiphertextEncoding;
use crate::error::{GatewayError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable that overrides the metadata store path.
pub const METADATA_PATH_ENV: &str = "QUERY_GATEWAY_METADATA_PATH";

const DEFAULT_BATCH_TIMEOUT_MS: u64 = 30_000;

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct GatewayConfig {
    #[serde(default)]
    pub metadata: MetadataConfig,

    #[serde(default)]
    pub execution: ExecutionConfig,

    #[serde(default)]
    pub credentials: CredentialsConfig,
}

/// Location of the SQLite metadata store.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct MetadataConfig {
    /// Path to the database file. Falls back to the platform data directory.
    pub path: Option<PathBuf>,
}

impl MetadataConfig {
    /// Applies `QUERY_GATEWAY_METADATA_PATH` when no path is configured.
    pub fn apply_env_defaults(&mut self) {
        if self.path.is_none() {
            self.path = std::env::var(METADATA_PATH_ENV).ok().map(PathBuf::from);
        }
    }

    /// Returns the configured path, or the platform default.
    pub fn resolved_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(default_metadata_path)
    }
}

/// Request timeouts for the two execution paths.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionConfig {
    /// Timeout applied to every request inside a batch execution.
    #[serde(default = "default_batch_timeout")]
    pub batch_request_timeout_ms: Option<u64>,

    /// Timeout applied to ad hoc executions. Unset means no timeout.
    #[serde(default)]
    pub ad_hoc_request_timeout_ms: Option<u64>,
}

fn default_batch_timeout() -> Option<u64> {
    Some(DEFAULT_BATCH_TIMEOUT_MS)
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            batch_request_timeout_ms: default_batch_timeout(),
            ad_hoc_request_timeout_ms: None,
        }
    }
}

impl ExecutionConfig {
    pub fn batch_timeout(&self) -> Option<Duration> {
        self.batch_request_timeout_ms.map(Duration::from_millis)
    }

    pub fn ad_hoc_timeout(&self) -> Option<Duration> {
        self.ad_hoc_request_timeout_ms.map(Duration::from_millis)
    }
}

/// How ciphertext columns are encoded in the metadata store.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct CredentialsConfig {
    #[serde(default)]
    pub encoding: CiphertextEncoding,
}

/// Returns the default metadata store path for the current platform.
pub fn default_metadata_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("query-gateway")
        .join("metadata.db")
}

impl GatewayConfig {
    /// Returns the default config file path for the current platform.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("query-gateway")
            .join("config.toml")
    }

    /// Loads configuration from a TOML file. A missing file yields defaults.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| GatewayError::config(format!("Failed to read config file: {e}")))?;

        Self::parse_toml(&content, path)
    }

    /// Parses configuration from a TOML string.
    fn parse_toml(content: &str, path: &Path) -> Result<Self> {
        toml::from_str(content).map_err(|e| {
            GatewayError::config(format!(
                "Configuration error in {}:\n  {}",
                path.display(),
                e
            ))
        })
    }
}
