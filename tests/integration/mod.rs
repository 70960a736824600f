//! Integration tests for the query gateway.

pub mod batch_test;
pub mod catalog_test;
pub mod common;
pub mod gateway_test;
pub mod mysql_test;
