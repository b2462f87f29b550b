//! Builds schema summaries from a live connection.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::db::DatabaseClient;
use crate::error::{ChatError, Result};
use crate::schema::{SchemaCache, SchemaSummary, TableSchema};

/// Reads table definitions through a live connection.
///
/// With caching enabled, summaries are memoized per database name until
/// invalidated.
#[derive(Debug)]
pub struct SchemaIntrospector {
    cache: Option<SchemaCache>,
}

impl SchemaIntrospector {
    /// Creates an introspector, with or without the summary cache.
    pub fn new(cache_enabled: bool) -> Self {
        Self {
            cache: cache_enabled.then(SchemaCache::new),
        }
    }

    /// Describes one table of the bound database.
    pub async fn describe_table(
        &self,
        db: &dyn DatabaseClient,
        table: &str,
    ) -> Result<TableSchema> {
        db.describe_table(table).await.map_err(into_query_error)
    }

    /// Lists and describes every table of the bound database.
    ///
    /// Failing to list tables is an error. A table whose description fails is
    /// left out of the summary and recorded in `omitted`.
    pub async fn build_summary(&self, db: &dyn DatabaseClient) -> Result<SchemaSummary> {
        let table_names = db.list_tables().await.map_err(into_query_error)?;

        let mut summary = SchemaSummary::new(db.database());
        summary.tables.reserve(table_names.len());

        for table in &table_names {
            match self.describe_table(db, table).await {
                Ok(schema) => summary.tables.push(schema),
                Err(e) => {
                    warn!(table = %table, database = db.database(), "Omitting table from schema: {e}");
                    summary.omitted.push(table.clone());
                }
            }
        }
        summary.table_names = table_names;

        debug!(
            database = %summary.database,
            tables = summary.tables.len(),
            omitted = summary.omitted.len(),
            "Built schema summary"
        );
        Ok(summary)
    }

    /// Returns the summary of the bound database, from the cache when possible.
    pub async fn summary(&mut self, db: &dyn DatabaseClient) -> Result<Arc<SchemaSummary>> {
        if let Some(cached) = self.cache.as_ref().and_then(|c| c.get(db.database())) {
            debug!(database = db.database(), "Schema cache hit");
            return Ok(cached);
        }

        let summary = self.build_summary(db).await?;
        Ok(match self.cache.as_mut() {
            Some(cache) => cache.insert(summary),
            None => Arc::new(summary),
        })
    }

    /// Drops the cached summary of one database.
    pub fn invalidate(&mut self, database: &str) {
        if let Some(cache) = self.cache.as_mut() {
            cache.invalidate(database);
        }
    }

    /// Drops every cached summary.
    pub fn clear(&mut self) {
        if let Some(cache) = self.cache.as_mut() {
            cache.clear();
        }
    }

    pub fn is_caching(&self) -> bool {
        self.cache.is_some()
    }
}

fn into_query_error(error: ChatError) -> ChatError {
    match error {
        ChatError::Query(_) => error,
        other => ChatError::query(other.message()),
    }
}
