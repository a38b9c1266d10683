//! Integration tests for ch-http.

pub mod command_test;
pub mod query_test;
pub mod stub;
