//! Per-database memo of schema summaries.

use std::collections::HashMap;
use std::sync::Arc;

use crate::schema::SchemaSummary;

/// Cache of schema summaries keyed by database name.
///
/// Avoids describing every table on every generation request when the
/// schema hasn't changed.
#[derive(Debug, Default)]
pub struct SchemaCache {
    summaries: HashMap<String, Arc<SchemaSummary>>,
}

impl SchemaCache {
    /// Creates a new empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached summary of a database.
    pub fn get(&self, database: &str) -> Option<Arc<SchemaSummary>> {
        self.summaries.get(database).map(Arc::clone)
    }

    /// Stores a summary under its own database name.
    pub fn insert(&mut self, summary: SchemaSummary) -> Arc<SchemaSummary> {
        let summary = Arc::new(summary);
        self.summaries
            .insert(summary.database.clone(), Arc::clone(&summary));
        summary
    }

    /// Drops the summary of one database.
    pub fn invalidate(&mut self, database: &str) {
        self.summaries.remove(database);
    }

    /// Drops every summary.
    pub fn clear(&mut self) {
        self.summaries.clear();
    }

    pub fn len(&self) -> usize {
        self.summaries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.summaries.is_empty()
    }
}
