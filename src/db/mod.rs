//! Database abstraction layer for db-chat.
//!
//! Provides a trait-based interface over a single MySQL connection, so the
//! pipeline can run against a live server or the in-memory [`MockServer`].

mod mock;
mod mysql;
mod types;

pub use mock::{MockDatabaseClient, MockEvent, MockServer};
pub use mysql::{MySqlClient, MySqlConnector};
pub use types::{ColumnInfo, QueryResult, Row, Value};

use crate::connection::ConnectionProfile;
use crate::error::Result;
use crate::schema::TableSchema;
use async_trait::async_trait;

/// Trait defining the interface for a single live database connection.
///
/// All database operations are async and return Results with ChatError.
#[async_trait]
pub trait DatabaseClient: Send + Sync {
    /// Returns the database this connection is bound to.
    fn database(&self) -> &str;

    /// Returns false once the connection has been closed.
    fn is_open(&self) -> bool;

    /// Lists every database visible to the user (`SHOW DATABASES`).
    async fn list_databases(&self) -> Result<Vec<String>>;

    /// Lists the tables of the bound database (`SHOW TABLES`).
    async fn list_tables(&self) -> Result<Vec<String>>;

    /// Describes one table of the bound database (`DESCRIBE`).
    async fn describe_table(&self, table: &str) -> Result<TableSchema>;

    /// Runs a statement and returns every row it produces.
    async fn fetch_all(&self, sql: &str) -> Result<QueryResult>;

    /// Runs a statement and returns the number of affected rows.
    async fn execute(&self, sql: &str) -> Result<u64>;

    /// Starts a transaction.
    async fn begin(&self) -> Result<()>;

    /// Commits the open transaction.
    async fn commit(&self) -> Result<()>;

    /// Rolls back the open transaction.
    async fn rollback(&self) -> Result<()>;

    /// Closes the connection. Closing twice is a no-op.
    async fn close(&self) -> Result<()>;
}

/// Opens database connections for a profile.
///
/// The connection manager only sees this trait, which lets tests swap the
/// MySQL driver for [`MockServer`].
#[async_trait]
pub trait Connector: Send + Sync {
    /// Opens a connection bound to `profile.database()`.
    async fn connect(&self, profile: &ConnectionProfile) -> Result<Box<dyn DatabaseClient>>;
}
