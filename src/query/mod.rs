//! Query classification and execution for db-chat.
//!
//! Isolates statement classification and execution from the session, so
//! both can be tested against a mock connection.

pub mod classify;
pub mod executor;

pub use classify::{changes_database, StatementKind, READ_PREFIXES};
pub use executor::{ExecutionResult, QueryExecutor};
