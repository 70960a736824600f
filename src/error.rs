//! Error types for the query gateway.
//!
//! Defines the main error enum used throughout the engine, and the
//! user-facing `{message, suggestion}` payload every error collapses to
//! before it leaves the process.

use serde::{Deserialize, Serialize};
use thiserror::Error;

const GENERIC_MESSAGE: &str = "Something went wrong.";
const GENERIC_SUGGESTION: &str =
    "Please try again later. If this issue persists, contact our support team for assistance.";

const QUERY_FAILURE_MESSAGE: &str =
    "The query data creation process encountered a technical issue.";
const QUERY_FAILURE_SUGGESTION: &str =
    "Please try again later or contact support if the issue persists.";

/// Main error type for gateway operations.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Malformed request shape. Carries an actionable message for the caller.
    #[error("Validation error: {message}")]
    Validation { message: String, suggestion: String },

    /// A referenced database profile does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Dialect tag outside {Oracle, SQL Server, MySQL}.
    #[error("Unsupported database type: {0}")]
    UnsupportedDialect(String),

    /// Network or authentication failure while opening a connection.
    #[error("Connection error: {0}")]
    Connection(String),

    /// SQL failure, timeout, or transaction failure on an open connection.
    #[error("Execution error: {0}")]
    Execution(String),

    /// Missing or malformed process configuration (keys, config file).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Ciphertext could not be decoded or decrypted.
    #[error("Decryption error: {0}")]
    Decryption(String),

    /// The metadata store failed or returned unusable data.
    #[error("Metadata error: {0}")]
    Metadata(String),

    /// Internal application errors (unexpected states, bugs, etc.)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Creates a validation error with the given caller-facing message and suggestion.
    pub fn validation(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Creates a not-found error for the given database name.
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound(name.into())
    }

    /// Creates an unsupported dialect error for the given tag.
    pub fn unsupported_dialect(tag: impl Into<String>) -> Self {
        Self::UnsupportedDialect(tag.into())
    }

    /// Creates a connection error with the given message.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Creates an execution error with the given message.
    pub fn execution(msg: impl Into<String>) -> Self {
        Self::Execution(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a decryption error with the given message.
    pub fn decryption(msg: impl Into<String>) -> Self {
        Self::Decryption(msg.into())
    }

    /// Creates a metadata store error with the given message.
    pub fn metadata(msg: impl Into<String>) -> Self {
        Self::Metadata(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "Validation Error",
            Self::NotFound(_) => "Not Found",
            Self::UnsupportedDialect(_) => "Unsupported Dialect",
            Self::Connection(_) => "Connection Error",
            Self::Execution(_) => "Execution Error",
            Self::Config(_) => "Configuration Error",
            Self::Decryption(_) => "Decryption Error",
            Self::Metadata(_) => "Metadata Error",
            Self::Internal(_) => "Internal Error",
        }
    }

    /// Returns the HTTP status code this error maps to on the ad hoc path.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation { .. } => 400,
            Self::NotFound(_) => 404,
            _ => 500,
        }
    }

    /// Returns the payload shown to the caller.
    ///
    /// Only validation, not-found and dialect errors say anything specific;
    /// driver, decryption and configuration detail never leaves the process.
    pub fn payload(&self) -> ErrorPayload {
        match self {
            Self::Validation {
                message,
                suggestion,
            } => ErrorPayload::new(message.clone(), suggestion.clone()),
            Self::NotFound(name) => ErrorPayload::new(
                format!("Database with name \"{name}\" not found."),
                "Please verify the database name and ensure it exists in the system.",
            ),
            Self::UnsupportedDialect(tag) => ErrorPayload::new(
                format!("Unsupported database type: {tag}."),
                "This operation only supports Oracle, SQL Server, and MySQL databases. \
                 Please use a supported database type.",
            ),
            _ => ErrorPayload::generic(),
        }
    }
}

/// Result type alias using GatewayError.
pub type Result<T> = std::result::Result<T, GatewayError>;

/// The `{message, suggestion}` pair returned to callers in place of internal errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
    pub suggestion: String,
}

impl ErrorPayload {
    pub fn new(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Fallback payload for unexpected failures.
    pub fn generic() -> Self {
        Self::new(GENERIC_MESSAGE, GENERIC_SUGGESTION)
    }

    /// Payload attached to every failed entry of a batch.
    pub fn query_failure() -> Self {
        Self::new(QUERY_FAILURE_MESSAGE, QUERY_FAILURE_SUGGESTION)
    }
}
