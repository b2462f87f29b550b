//! Statement execution with read/write classification.
//!
//! Reads return their rows untouched by transactions. Writes run inside an
//! explicit transaction that is committed on success and rolled back on
//! failure. Writes are never retried.

use std::future::Future;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::db::{DatabaseClient, QueryResult};
use crate::error::{ChatError, Result};
use crate::query::{changes_database, StatementKind};

/// Query executor bound to one live connection.
pub struct QueryExecutor<'a> {
    db: &'a dyn DatabaseClient,
    timeout: Duration,
}

impl<'a> QueryExecutor<'a> {
    /// Creates a new query executor.
    pub fn new(db: &'a dyn DatabaseClient, timeout: Duration) -> Self {
        Self { db, timeout }
    }

    /// Classifies and executes a statement.
    ///
    /// Every failure, including a timeout, is an `Execution` error carrying
    /// the driver's message. `USE` statements are refused without reaching
    /// the server; the bound database only changes through a switch.
    pub async fn execute(&self, sql: &str) -> Result<ExecutionResult> {
        if changes_database(sql) {
            warn!(database = self.db.database(), sql, "Refusing USE statement");
            return Err(ChatError::execution(
                "USE statements are not executed; switch databases with /use <database>",
            ));
        }

        let kind = StatementKind::classify(sql);
        debug!(%kind, database = self.db.database(), "Executing statement");

        match kind {
            StatementKind::Read => self.execute_read(sql).await.map(ExecutionResult::Rows),
            StatementKind::Write => {
                let rows_affected = self.execute_write(sql).await?;
                Ok(ExecutionResult::Applied { rows_affected })
            }
        }
    }

    async fn execute_read(&self, sql: &str) -> Result<QueryResult> {
        let start = Instant::now();
        let result = self.bounded(self.db.fetch_all(sql)).await?;
        debug!(
            row_count = result.row_count,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Read statement finished"
        );
        Ok(result)
    }

    async fn execute_write(&self, sql: &str) -> Result<u64> {
        if let Err(e) = self.bounded(self.db.begin()).await {
            self.rollback_quietly().await;
            return Err(e);
        }

        match self.bounded(self.db.execute(sql)).await {
            Ok(rows_affected) => match self.bounded(self.db.commit()).await {
                Ok(()) => {
                    debug!(rows_affected, "Write statement committed");
                    Ok(rows_affected)
                }
                Err(e) => {
                    // A failed or timed-out COMMIT leaves the outcome unknown.
                    warn!(
                        sql,
                        database = self.db.database(),
                        "Commit failed, write may have been applied: {e}"
                    );
                    Err(ChatError::execution(format!(
                        "{} (commit outcome unknown; the write may have been applied)",
                        e.message()
                    )))
                }
            },
            Err(e) => {
                self.rollback_quietly().await;
                Err(e)
            }
        }
    }

    async fn rollback_quietly(&self) {
        match self.bounded(self.db.rollback()).await {
            Ok(()) => debug!("Write statement rolled back"),
            Err(e) => warn!("Rollback failed: {e}"),
        }
    }

    async fn bounded<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result.map_err(into_execution_error),
            Err(_) => Err(ChatError::execution(format!(
                "Statement timed out after {} seconds",
                self.timeout.as_secs()
            ))),
        }
    }
}

fn into_execution_error(error: ChatError) -> ChatError {
    match error {
        ChatError::Execution(_) => error,
        other => ChatError::execution(other.message()),
    }
}

/// Outcome of executing one statement.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionResult {
    /// Rows returned by a read statement (possibly none).
    Rows(QueryResult),
    /// A committed write statement.
    Applied { rows_affected: u64 },
}

impl ExecutionResult {
    /// Returns the statement kind that produced this result.
    pub fn kind(&self) -> StatementKind {
        match self {
            Self::Rows(_) => StatementKind::Read,
            Self::Applied { .. } => StatementKind::Write,
        }
    }
}
