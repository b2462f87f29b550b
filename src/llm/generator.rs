//! Natural-language to SQL generation.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{ChatError, Result};
use crate::llm::prompt::build_messages;
use crate::llm::sanitize::clean_generated_sql;
use crate::llm::LlmClient;
use crate::schema::SchemaSummary;

/// Default bound on a single generation call, in seconds.
pub const DEFAULT_GENERATION_TIMEOUT_SECS: u64 = 120;

/// Produces one cleaned SQL statement per request.
///
/// The generator is stateless: every call sends exactly the system prompt
/// and the request, so earlier turns never leak into a new generation.
#[derive(Clone)]
pub struct QueryGenerator {
    client: Arc<dyn LlmClient>,
    timeout: Duration,
}

impl std::fmt::Debug for QueryGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryGenerator")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl QueryGenerator {
    /// Creates a generator over the given client.
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self {
            client,
            timeout: Duration::from_secs(DEFAULT_GENERATION_TIMEOUT_SECS),
        }
    }

    /// Sets the bound on a single model call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Generates a statement for `request`, grounded on `schema`.
    ///
    /// Fails with a generation error when the model is unreachable, times
    /// out, or answers with nothing usable after cleanup.
    pub async fn generate(&self, request: &str, schema: &SchemaSummary) -> Result<String> {
        let messages = build_messages(schema, request);
        debug!(
            database = %schema.database,
            tables = schema.table_names.len(),
            "Requesting SQL generation"
        );

        let raw = tokio::time::timeout(self.timeout, self.client.complete(&messages))
            .await
            .map_err(|_| {
                ChatError::generation(format!(
                    "Model did not answer within {} seconds",
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| match e {
                ChatError::Generation(_) => e,
                other => ChatError::generation(other.message()),
            })?;

        let sql = clean_generated_sql(&raw);
        if sql.is_empty() {
            return Err(ChatError::generation("Model returned an empty query"));
        }

        info!(sql = %sql, "Generated query");
        Ok(sql)
    }
}
