//! query-gateway - a metadata-driven SQL query gateway.
//!
//! Stored query definitions are resolved against request overrides,
//! executed against Oracle, SQL Server or MySQL inside a transaction, and
//! returned as named per-query results.

pub mod catalog;
pub mod cli;
pub mod config;
pub mod connection;
pub mod credentials;
pub mod db;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod query;
