//! The conversational state machine of one chat session.
//!
//! A session is either not connected or connected to exactly one database.
//! Submitting a question runs introspect, generate and execute against the
//! live connection and records a user turn plus one assistant turn. Any
//! failure inside that pipeline becomes an error turn and leaves the
//! session connected.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::connection::{ConnectionManager, ConnectionProfile};
use crate::db::{Connector, QueryResult};
use crate::error::{ChatError, Result};
use crate::llm::QueryGenerator;
use crate::query::{ExecutionResult, QueryExecutor};
use crate::schema::{SchemaIntrospector, SchemaSummary};
use crate::session::{
    ChatHistory, ChatTurn, SessionPhase, SessionSettings, SessionSnapshot, SessionState,
};

/// One chat session over a single MySQL connection.
pub struct Session {
    connections: ConnectionManager,
    introspector: SchemaIntrospector,
    generator: QueryGenerator,
    settings: SessionSettings,
    state: SessionState,
    phase: watch::Sender<SessionPhase>,
}

impl Session {
    /// Creates a session that is not connected yet.
    pub fn new(
        connector: Arc<dyn Connector>,
        generator: QueryGenerator,
        settings: SessionSettings,
    ) -> Self {
        let (phase, _) = watch::channel(SessionPhase::Idle);
        Self {
            connections: ConnectionManager::new(connector),
            introspector: SchemaIntrospector::new(settings.cache_schema),
            generator,
            settings,
            state: SessionState::default(),
            phase,
        }
    }

    /// Subscribes to phase changes.
    pub fn phase_receiver(&self) -> watch::Receiver<SessionPhase> {
        self.phase.subscribe()
    }

    pub fn phase(&self) -> SessionPhase {
        *self.phase.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.connections.is_connected()
    }

    /// Returns the database of the live connection.
    pub fn current_database(&self) -> Option<&str> {
        self.connections.current_database()
    }

    pub fn profile(&self) -> Option<&ConnectionProfile> {
        self.connections.active().map(|c| c.profile())
    }

    pub fn history(&self) -> &ChatHistory {
        &self.state.history
    }

    pub fn query_count(&self) -> u64 {
        self.state.query_count
    }

    pub fn available_databases(&self) -> &[String] {
        &self.state.available_databases
    }

    pub fn available_tables(&self) -> &[String] {
        &self.state.available_tables
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Captures the observable state of the session.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            connected: self.is_connected(),
            current_database: self.current_database().map(str::to_string),
            connection: self.profile().map(ConnectionProfile::display_string),
            query_count: self.state.query_count,
            history_len: self.state.history.len(),
            available_databases: self.state.available_databases.clone(),
            available_tables: self.state.available_tables.clone(),
        }
    }

    /// Opens a connection and starts a fresh session on it.
    ///
    /// On failure the session keeps whatever connection it had before, so a
    /// session that was not connected stays not connected.
    pub async fn connect(&mut self, profile: ConnectionProfile) -> Result<()> {
        self.phase.send_replace(SessionPhase::Connecting);
        let opened = self.connections.open(profile).await;
        if opened.is_ok() {
            self.state.reset();
            self.introspector.clear();
            self.load_catalog().await;
        }
        self.phase.send_replace(SessionPhase::Idle);
        opened
    }

    /// Rebinds the session to another database on the same server.
    ///
    /// On failure the previous connection stays bound and usable.
    pub async fn switch_database(&mut self, database: &str) -> Result<()> {
        let database = database.trim();
        if database.is_empty() {
            return Err(ChatError::connection("No database name given"));
        }
        let previous = self
            .connections
            .current_database()
            .map(str::to_string)
            .ok_or_else(|| ChatError::connection("Not connected"))?;
        if previous == database {
            return Ok(());
        }

        self.phase.send_replace(SessionPhase::Connecting);
        let switched = self.connections.switch(database).await;
        if switched.is_ok() {
            self.rebind(&previous, database).await;
        }
        self.phase.send_replace(SessionPhase::Idle);
        switched
    }

    /// Updates cached schemas and catalog after a successful switch.
    async fn rebind(&mut self, previous: &str, database: &str) {
        self.introspector.invalidate(previous);
        self.introspector.invalidate(database);
        if self.settings.clear_history_on_switch {
            self.state.history.clear();
        }
        if !self.state.available_databases.iter().any(|d| d == database) {
            self.state.available_databases.push(database.to_string());
        }
        self.state.available_tables = self.load_tables().await;
    }

    /// Closes the connection and discards all session state.
    pub async fn disconnect(&mut self) -> Result<()> {
        let closed = self.connections.close().await;
        self.state.reset();
        self.introspector.clear();
        self.phase.send_replace(SessionPhase::Idle);
        closed
    }

    /// Re-reads the database and table lists and drops cached schemas.
    pub async fn refresh(&mut self) -> Result<()> {
        if !self.is_connected() {
            return Err(ChatError::connection("Not connected"));
        }
        self.introspector.clear();
        self.load_catalog().await;
        Ok(())
    }

    /// Empties the transcript and resets the query counter.
    pub fn clear_history(&mut self) {
        self.state.history.clear();
        self.state.query_count = 0;
    }

    /// Returns the schema summary of the active database.
    pub async fn schema(&mut self) -> Result<Arc<SchemaSummary>> {
        let db = self
            .connections
            .db()
            .ok_or_else(|| ChatError::connection("Not connected"))?;
        self.introspector.summary(db).await
    }

    /// Answers one natural-language request.
    ///
    /// Blank input is ignored. Otherwise the user turn and exactly one
    /// assistant turn are recorded and the assistant turn is returned.
    pub async fn submit(&mut self, text: &str) -> Result<Option<ChatTurn>> {
        let request = text.trim();
        if request.is_empty() {
            return Ok(None);
        }
        let database = self
            .connections
            .current_database()
            .map(str::to_string)
            .ok_or_else(|| ChatError::connection("Not connected"))?;

        self.state
            .history
            .push(ChatTurn::user(request, database.as_str()));
        self.state.query_count += 1;
        debug!(
            database = %database,
            query_count = self.state.query_count,
            "Processing request"
        );

        let turn = self.answer(request, &database).await;
        self.phase.send_replace(SessionPhase::Idle);

        if let Some(error) = &turn.error_message {
            warn!(database = %database, "Request failed: {error}");
        }
        self.state.history.push(turn.clone());
        Ok(Some(turn))
    }

    async fn answer(&mut self, request: &str, database: &str) -> ChatTurn {
        let Some(db) = self.connections.db() else {
            return failure_turn(&ChatError::connection("Not connected"), None, database);
        };

        self.phase.send_replace(SessionPhase::Introspecting);
        let schema = match self.introspector.summary(db).await {
            Ok(schema) => schema,
            Err(e) => return failure_turn(&e, None, database),
        };

        self.phase.send_replace(SessionPhase::Generating);
        let sql = match self.generator.generate(request, &schema).await {
            Ok(sql) => sql,
            Err(e) => return failure_turn(&e, None, database),
        };

        self.phase.send_replace(SessionPhase::Executing);
        let executor = QueryExecutor::new(db, self.settings.query_timeout);
        match executor.execute(&sql).await {
            Ok(ExecutionResult::Rows(result)) => {
                info!(database, row_count = result.row_count, "Read statement answered");
                ChatTurn::assistant(rows_message(&result, database), database)
                    .with_sql(sql)
                    .with_result(result)
            }
            Ok(ExecutionResult::Applied { rows_affected }) => {
                info!(database, rows_affected, "Write statement committed");
                self.introspector.invalidate(database);
                ChatTurn::assistant(applied_message(rows_affected, database), database)
                    .with_sql(sql)
                    .with_rows_affected(rows_affected)
            }
            Err(e) => failure_turn(&e, Some(sql), database),
        }
    }

    async fn load_catalog(&mut self) {
        let current = self
            .connections
            .current_database()
            .map(str::to_string)
            .unwrap_or_default();

        self.state.available_databases = match self.connections.list_databases().await {
            Ok(databases) => databases,
            Err(e) => {
                warn!("Failed to list databases: {e}");
                vec![current]
            }
        };
        self.state.available_tables = self.load_tables().await;
    }

    async fn load_tables(&self) -> Vec<String> {
        match self.connections.list_tables().await {
            Ok(tables) => tables,
            Err(e) => {
                warn!("Failed to list tables: {e}");
                Vec::new()
            }
        }
    }
}

fn rows_message(result: &QueryResult, database: &str) -> String {
    if result.is_empty() {
        format!(
            "Query executed successfully on '{database}' database, but no results were returned."
        )
    } else {
        format!(
            "I found {} result(s) for your query in the '{database}' database.",
            result.row_count
        )
    }
}

fn applied_message(rows_affected: u64, database: &str) -> String {
    format!(
        "Query executed successfully on '{database}' database. {rows_affected} row(s) affected."
    )
}

fn failure_turn(error: &ChatError, sql: Option<String>, database: &str) -> ChatTurn {
    let text = match error {
        ChatError::Execution(_) => format!(
            "I encountered an error while executing your query on the '{database}' database. \
             Please check the SQL syntax or try rephrasing your request."
        ),
        other => format!(
            "Sorry, there was an error processing your query on the '{database}' database: {}",
            other.message()
        ),
    };
    let turn = ChatTurn::assistant(text, database).with_error(error.to_string());
    match sql {
        Some(sql) => turn.with_sql(sql),
        None => turn,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MockEvent, MockServer};
    use crate::llm::MockLlmClient;
    use crate::session::TurnRole;

    fn profile(database: &str) -> ConnectionProfile {
        ConnectionProfile::new("localhost", 3306, "root", "secret", database)
    }

    fn session_with(server: &MockServer, llm: MockLlmClient, settings: SessionSettings) -> Session {
        Session::new(
            Arc::new(server.clone()),
            QueryGenerator::new(Arc::new(llm)),
            settings,
        )
    }

    async fn connected(server: &MockServer, llm: MockLlmClient) -> Session {
        let mut session = session_with(server, llm, SessionSettings::default());
        session.connect(profile("shop")).await.unwrap();
        session
    }

    #[tokio::test]
    async fn test_connect_fills_catalog() {
        let server = MockServer::shop();
        let session = connected(&server, MockLlmClient::new()).await;

        assert!(session.is_connected());
        assert_eq!(session.current_database(), Some("shop"));
        assert_eq!(session.available_databases(), &["shop", "billing"]);
        assert_eq!(session.available_tables(), &["orders", "customers"]);
        assert_eq!(session.query_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_connect_stays_disconnected() {
        let server = MockServer::shop();
        let mut session = session_with(&server, MockLlmClient::new(), SessionSettings::default());

        let err = session.connect(profile("ghost")).await.unwrap_err();

        assert!(matches!(err, ChatError::Connection(_)));
        assert!(!session.is_connected());
        assert_eq!(session.current_database(), None);
    }

    #[tokio::test]
    async fn test_submit_read_records_both_turns() {
        let server = MockServer::shop();
        let mut session = connected(&server, MockLlmClient::new()).await;

        let turn = session
            .submit("show me all customers")
            .await
            .unwrap()
            .unwrap();

        assert_eq!(turn.role, TurnRole::Assistant);
        assert_eq!(turn.generated_sql.as_deref(), Some("SELECT * FROM customers;"));
        let result = turn.result.as_ref().unwrap();
        assert!(!result.is_empty());
        assert!(turn.text.starts_with("I found 2 result(s)"));
        assert_eq!(session.query_count(), 1);
        assert_eq!(session.history().len(), 2);
        assert_eq!(session.history().turns()[0].role, TurnRole::User);
        assert_eq!(session.phase(), SessionPhase::Idle);
    }

    #[tokio::test]
    async fn test_blank_submit_is_ignored() {
        let server = MockServer::shop();
        let mut session = connected(&server, MockLlmClient::new()).await;

        assert!(session.submit("   ").await.unwrap().is_none());
        assert_eq!(session.query_count(), 0);
        assert!(session.history().is_empty());
    }

    #[tokio::test]
    async fn test_submit_without_connection_is_error() {
        let server = MockServer::shop();
        let mut session = session_with(&server, MockLlmClient::new(), SessionSettings::default());

        let err = session.submit("show me all customers").await.unwrap_err();
        assert!(matches!(err, ChatError::Connection(_)));
        assert_eq!(session.query_count(), 0);
    }

    #[tokio::test]
    async fn test_execution_failure_becomes_error_turn() {
        let server = MockServer::shop();
        let llm = MockLlmClient::new().with_response("ghosts", "SELECT * FROM nonexistent;");
        let mut session = connected(&server, llm).await;

        let turn = session.submit("list ghosts").await.unwrap().unwrap();

        assert!(turn.is_error());
        assert_eq!(turn.generated_sql.as_deref(), Some("SELECT * FROM nonexistent;"));
        assert!(turn
            .error_message
            .as_deref()
            .unwrap()
            .starts_with("Execution error:"));
        assert_eq!(session.query_count(), 1);
        assert!(session.is_connected());
    }

    #[tokio::test]
    async fn test_generated_use_keeps_bound_database() {
        let server = MockServer::shop();
        let llm = MockLlmClient::new().with_response("switch to billing", "USE billing;");
        let mut session = connected(&server, llm).await;
        server.clear_events();

        let turn = session.submit("switch to billing").await.unwrap().unwrap();

        assert!(turn.is_error());
        assert_eq!(turn.generated_sql.as_deref(), Some("USE billing;"));
        assert_eq!(session.current_database(), Some("shop"));
        assert!(!server
            .events()
            .iter()
            .any(|e| matches!(e, MockEvent::Execute(_) | MockEvent::Begin | MockEvent::Commit)));

        let turn = session.submit("show me all customers").await.unwrap().unwrap();
        assert!(!turn.is_error());
        assert_eq!(turn.database.as_str(), "shop");
    }

    #[tokio::test]
    async fn test_generation_failure_has_no_sql() {
        let server = MockServer::shop();
        let llm = MockLlmClient::new().failing("Failed to connect to Ollama");
        let mut session = connected(&server, llm).await;

        let turn = session.submit("show me all customers").await.unwrap().unwrap();

        assert!(turn.is_error());
        assert!(turn.generated_sql.is_none());
        assert!(turn.text.contains("Failed to connect to Ollama"));
        assert_eq!(session.query_count(), 1);
    }

    #[tokio::test]
    async fn test_write_commits_and_invalidates_schema() {
        let server = MockServer::shop();
        let llm = MockLlmClient::new().with_response(
            "audit table",
            "CREATE TABLE audit (id INT);",
        );
        let mut session = connected(&server, llm).await;

        session.schema().await.unwrap();
        let turn = session.submit("create an audit table").await.unwrap().unwrap();

        assert_eq!(turn.rows_affected, Some(0));
        assert!(server.events().contains(&MockEvent::Commit));
        let schema = session.schema().await.unwrap();
        assert!(schema.table("audit").is_some());
    }

    #[tokio::test]
    async fn test_failed_switch_keeps_connection() {
        let server = MockServer::shop();
        let mut session = connected(&server, MockLlmClient::new()).await;

        let err = session.switch_database("ghost").await.unwrap_err();

        assert!(matches!(err, ChatError::Connection(_)));
        assert_eq!(session.current_database(), Some("shop"));
        let turn = session.submit("show me all customers").await.unwrap().unwrap();
        assert!(!turn.is_error());
    }

    #[tokio::test]
    async fn test_switch_keeps_history_by_default() {
        let server = MockServer::shop();
        let mut session = connected(&server, MockLlmClient::new()).await;
        session.submit("show me all customers").await.unwrap();

        session.switch_database("billing").await.unwrap();

        assert_eq!(session.current_database(), Some("billing"));
        assert_eq!(session.available_tables(), &["invoices"]);
        assert_eq!(session.history().len(), 2);
        assert_eq!(server.open_connections(), 1);
    }

    #[tokio::test]
    async fn test_switch_clears_history_when_configured() {
        let server = MockServer::shop();
        let settings = SessionSettings {
            clear_history_on_switch: true,
            ..SessionSettings::default()
        };
        let mut session = session_with(&server, MockLlmClient::new(), settings);
        session.connect(profile("shop")).await.unwrap();
        session.submit("show me all customers").await.unwrap();

        session.switch_database("billing").await.unwrap();

        assert!(session.history().is_empty());
        assert_eq!(session.query_count(), 1);
    }

    #[tokio::test]
    async fn test_disconnect_discards_state() {
        let server = MockServer::shop();
        let mut session = connected(&server, MockLlmClient::new()).await;
        session.submit("show me all customers").await.unwrap();

        session.disconnect().await.unwrap();
        session.disconnect().await.unwrap();

        assert!(!session.is_connected());
        assert!(session.history().is_empty());
        assert_eq!(session.query_count(), 0);
        assert!(session.available_tables().is_empty());
        assert_eq!(server.open_connections(), 0);
    }

    #[tokio::test]
    async fn test_clear_history_resets_count() {
        let server = MockServer::shop();
        let mut session = connected(&server, MockLlmClient::new()).await;
        session.submit("show me all customers").await.unwrap();

        session.clear_history();

        assert!(session.history().is_empty());
        assert_eq!(session.query_count(), 0);
        assert!(session.is_connected());
    }

    #[tokio::test]
    async fn test_phase_receiver_sees_idle_after_submit() {
        let server = MockServer::shop();
        let mut session = connected(&server, MockLlmClient::new()).await;
        let mut phases = session.phase_receiver();

        session.submit("show me all customers").await.unwrap();

        assert!(phases.has_changed().unwrap());
        assert_eq!(*phases.borrow_and_update(), SessionPhase::Idle);
    }

    #[tokio::test]
    async fn test_snapshot_hides_password() {
        let server = MockServer::shop();
        let session = connected(&server, MockLlmClient::new()).await;

        let snapshot = session.snapshot();

        assert!(snapshot.connected);
        assert_eq!(snapshot.current_database.as_deref(), Some("shop"));
        assert_eq!(snapshot.connection.as_deref(), Some("root@localhost:3306/shop"));
        assert!(!format!("{snapshot:?}").contains("secret"));
    }
}
