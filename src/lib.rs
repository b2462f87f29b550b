//! db-chat - ask a MySQL database questions in plain language.
//!
//! A question goes through schema introspection, SQL generation by a
//! language model and execution against the live connection; the exchange
//! is recorded as chat turns. This library exposes the pipeline for the
//! binary and for integration tests.

pub mod cli;
pub mod config;
pub mod connection;
pub mod db;
pub mod error;
pub mod llm;
pub mod logging;
pub mod query;
pub mod repl;
pub mod schema;
pub mod session;
