//! Mock MySQL server for testing.
//!
//! Provides an in-memory server with named databases, tables and rows. It
//! answers the statements the pipeline issues (`SHOW`, `DESCRIBE`, simple
//! `SELECT ... FROM`) and records every call so tests can check connection
//! lifecycles and transaction boundaries.

use super::{ColumnInfo, Connector, DatabaseClient, QueryResult, Row, Value};
use crate::connection::ConnectionProfile;
use crate::error::{ChatError, Result};
use crate::schema::{Column, TableSchema};
use async_trait::async_trait;
use regex::Regex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock, Mutex, MutexGuard};
use std::time::Duration;

/// Statement keywords the mock accepts; anything else is a syntax error.
const KNOWN_KEYWORDS: &[&str] = &[
    "SELECT", "SHOW", "DESCRIBE", "DESC", "EXPLAIN", "INSERT", "UPDATE", "DELETE", "REPLACE",
    "CREATE", "DROP", "ALTER", "TRUNCATE", "SET", "USE", "START", "COMMIT", "ROLLBACK",
];

/// A call observed by the mock server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockEvent {
    Connect(String),
    Fetch(String),
    Execute(String),
    Begin,
    Commit,
    Rollback,
    Close(String),
}

#[derive(Debug, Default)]
struct MockTable {
    schema: TableSchema,
    rows: Vec<Row>,
}

#[derive(Debug, Default)]
struct MockDatabase {
    name: String,
    tables: Vec<MockTable>,
}

impl MockDatabase {
    fn table(&self, name: &str) -> Option<&MockTable> {
        self.tables
            .iter()
            .find(|t| t.schema.name.eq_ignore_ascii_case(name))
    }
}

#[derive(Debug, Default)]
struct ServerState {
    databases: Vec<MockDatabase>,
    password: Option<String>,
    unreachable: bool,
    latency: Option<Duration>,
    fail_describe: HashSet<String>,
    failing_statements: Vec<(String, String)>,
    open_connections: usize,
    events: Vec<MockEvent>,
}

impl ServerState {
    fn database(&self, name: &str) -> Option<&MockDatabase> {
        self.databases.iter().find(|d| d.name == name)
    }

    fn database_mut(&mut self, name: &str) -> &mut MockDatabase {
        let index = match self.databases.iter().position(|d| d.name == name) {
            Some(index) => index,
            None => {
                self.databases.push(MockDatabase {
                    name: name.to_string(),
                    tables: Vec::new(),
                });
                self.databases.len() - 1
            }
        };
        &mut self.databases[index]
    }

    fn injected_failure(&self, sql: &str) -> Option<String> {
        let upper = sql.to_uppercase();
        self.failing_statements
            .iter()
            .find(|(fragment, _)| upper.contains(fragment.as_str()))
            .map(|(_, message)| message.clone())
    }
}

/// In-memory MySQL server shared by every connection it hands out.
///
/// Cloning is cheap; clones observe the same state.
#[derive(Debug, Clone, Default)]
pub struct MockServer {
    state: Arc<Mutex<ServerState>>,
}

impl MockServer {
    /// Creates a server with no databases.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the `shop` fixture: `orders` and `customers` in `shop`, an
    /// `invoices` table in `billing`, and two system databases.
    pub fn shop() -> Self {
        Self::new()
            .with_database("information_schema")
            .with_database("mysql")
            .with_table(
                "shop",
                TableSchema::new(
                    "orders",
                    vec![
                        Column::new("id", "int")
                            .nullable(false)
                            .with_key("PRI")
                            .with_extra("auto_increment"),
                        Column::new("customer_id", "int").with_key("MUL"),
                        Column::new("total", "decimal(10,2)"),
                    ],
                ),
                vec![
                    vec![Value::Int(1), Value::Int(1), Value::Decimal("19.90".into())],
                    vec![Value::Int(2), Value::Int(2), Value::Decimal("5.00".into())],
                ],
            )
            .with_table(
                "shop",
                TableSchema::new(
                    "customers",
                    vec![
                        Column::new("id", "int").nullable(false).with_key("PRI"),
                        Column::new("name", "varchar(100)"),
                        Column::new("email", "varchar(255)"),
                    ],
                ),
                vec![
                    vec![
                        Value::Int(1),
                        Value::from("Alice"),
                        Value::from("alice@example.com"),
                    ],
                    vec![Value::Int(2), Value::from("Bob"), Value::Null],
                ],
            )
            .with_table(
                "billing",
                TableSchema::new(
                    "invoices",
                    vec![
                        Column::new("id", "int").nullable(false).with_key("PRI"),
                        Column::new("amount", "decimal(10,2)"),
                    ],
                ),
                vec![vec![Value::Int(1), Value::Decimal("42.00".into())]],
            )
    }

    fn lock(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Adds an empty database.
    pub fn with_database(self, name: &str) -> Self {
        self.lock().database_mut(name);
        self
    }

    /// Adds a table with rows, creating the database if needed.
    pub fn with_table(self, database: &str, schema: TableSchema, rows: Vec<Row>) -> Self {
        self.lock()
            .database_mut(database)
            .tables
            .push(MockTable { schema, rows });
        self
    }

    /// Requires this password on connect.
    pub fn with_password(self, password: &str) -> Self {
        self.lock().password = Some(password.to_string());
        self
    }

    /// Delays every connection attempt and statement by the given duration.
    pub fn with_latency(self, latency: Duration) -> Self {
        self.lock().latency = Some(latency);
        self
    }

    /// Makes every connection attempt fail as if the host were down.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.lock().unreachable = unreachable;
    }

    /// Makes `DESCRIBE` of the given table fail.
    pub fn fail_describe(&self, table: &str) {
        self.lock().fail_describe.insert(table.to_string());
    }

    /// Makes any statement containing `fragment` (case-insensitive) fail.
    pub fn fail_statement(&self, fragment: &str, message: &str) {
        self.lock()
            .failing_statements
            .push((fragment.to_uppercase(), message.to_string()));
    }

    /// Returns the number of connections that are open right now.
    pub fn open_connections(&self) -> usize {
        self.lock().open_connections
    }

    /// Returns every recorded call in order.
    pub fn events(&self) -> Vec<MockEvent> {
        self.lock().events.clone()
    }

    /// Forgets recorded calls.
    pub fn clear_events(&self) {
        self.lock().events.clear();
    }
}

#[async_trait]
impl Connector for MockServer {
    async fn connect(&self, profile: &ConnectionProfile) -> Result<Box<dyn DatabaseClient>> {
        let latency = self.lock().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.lock();

        if state.unreachable {
            return Err(ChatError::connection(format!(
                "Cannot connect to {}:{}. Check that the server is running.",
                profile.host(),
                profile.port()
            )));
        }
        if let Some(expected) = &state.password {
            if expected != profile.password() {
                return Err(ChatError::connection(format!(
                    "Access denied for user '{}'. Check your credentials.",
                    profile.username()
                )));
            }
        }
        if state.database(profile.database()).is_none() {
            return Err(ChatError::connection(format!(
                "Unknown database '{}'.",
                profile.database()
            )));
        }

        state.open_connections += 1;
        state
            .events
            .push(MockEvent::Connect(profile.database().to_string()));

        Ok(Box::new(MockDatabaseClient {
            server: self.clone(),
            database: profile.database().to_string(),
            open: AtomicBool::new(true),
        }))
    }
}

/// A connection handed out by [`MockServer`].
#[derive(Debug)]
pub struct MockDatabaseClient {
    server: MockServer,
    database: String,
    open: AtomicBool,
}

impl MockDatabaseClient {
    fn ensure_open(&self) -> Result<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(ChatError::connection("Connection is closed"))
        }
    }

    async fn simulate_latency(&self) {
        let latency = self.server.lock().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn missing_table(&self, table: &str) -> String {
        format!("1146 (42S02): Table '{}.{}' doesn't exist", self.database, table)
    }

    fn check_statement(&self, state: &ServerState, sql: &str) -> std::result::Result<(), String> {
        if let Some(message) = state.injected_failure(sql) {
            return Err(message);
        }
        let first = sql
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_uppercase();
        if KNOWN_KEYWORDS.contains(&first.as_str()) {
            Ok(())
        } else {
            Err(format!(
                "1064 (42000): You have an error in your SQL syntax near '{}'",
                sql.trim()
            ))
        }
    }

    fn describe_rows(schema: &TableSchema) -> QueryResult {
        let columns = ["Field", "Type", "Null", "Key", "Default", "Extra"]
            .iter()
            .map(|name| ColumnInfo::new(*name, "VARCHAR"))
            .collect();
        let rows = schema
            .columns
            .iter()
            .map(|c| {
                vec![
                    Value::from(c.name.as_str()),
                    Value::from(c.data_type.as_str()),
                    Value::from(if c.is_nullable { "YES" } else { "NO" }),
                    Value::from(c.key.as_str()),
                    Value::from(c.default.clone()),
                    Value::from(c.extra.as_str()),
                ]
            })
            .collect();
        QueryResult::with_data(columns, rows)
    }

    fn names(column: &str, names: Vec<String>) -> QueryResult {
        QueryResult::with_data(
            vec![ColumnInfo::new(column, "VARCHAR")],
            names.into_iter().map(|n| vec![Value::String(n)]).collect(),
        )
    }
}

static TARGET_TABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:FROM|INTO|UPDATE|TABLE|DESCRIBE|DESC)\s+`?([A-Za-z0-9_$]+)`?")
        .expect("table pattern is valid")
});

fn target_table(sql: &str) -> Option<String> {
    TARGET_TABLE.captures(sql).map(|c| c[1].to_string())
}

#[async_trait]
impl DatabaseClient for MockDatabaseClient {
    fn database(&self) -> &str {
        &self.database
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn list_databases(&self) -> Result<Vec<String>> {
        self.ensure_open()?;
        let mut state = self.server.lock();
        state.events.push(MockEvent::Fetch("SHOW DATABASES".to_string()));
        if let Some(message) = state.injected_failure("SHOW DATABASES") {
            return Err(ChatError::query(message));
        }
        Ok(state.databases.iter().map(|d| d.name.clone()).collect())
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        self.ensure_open()?;
        let mut state = self.server.lock();
        state.events.push(MockEvent::Fetch("SHOW TABLES".to_string()));
        if let Some(message) = state.injected_failure("SHOW TABLES") {
            return Err(ChatError::query(message));
        }
        Ok(state
            .database(&self.database)
            .map(|d| d.tables.iter().map(|t| t.schema.name.clone()).collect())
            .unwrap_or_default())
    }

    async fn describe_table(&self, table: &str) -> Result<TableSchema> {
        self.ensure_open()?;
        let mut state = self.server.lock();
        state
            .events
            .push(MockEvent::Fetch(format!("DESCRIBE `{table}`")));
        if state.fail_describe.contains(table) {
            return Err(ChatError::query(format!(
                "1142 (42000): SELECT command denied for table '{table}'"
            )));
        }
        state
            .database(&self.database)
            .and_then(|d| d.table(table))
            .map(|t| t.schema.clone())
            .ok_or_else(|| ChatError::query(self.missing_table(table)))
    }

    async fn fetch_all(&self, sql: &str) -> Result<QueryResult> {
        self.ensure_open()?;
        self.simulate_latency().await;

        let mut state = self.server.lock();
        state.events.push(MockEvent::Fetch(sql.to_string()));
        self.check_statement(&state, sql)
            .map_err(ChatError::execution)?;

        let statement = sql.trim().trim_end_matches(';').trim();
        let upper = statement.to_uppercase();
        let database = state.database(&self.database);

        if upper == "SHOW DATABASES" {
            let names = state.databases.iter().map(|d| d.name.clone()).collect();
            return Ok(Self::names("Database", names));
        }
        if upper == "SHOW TABLES" {
            let names = database
                .map(|d| d.tables.iter().map(|t| t.schema.name.clone()).collect())
                .unwrap_or_default();
            return Ok(Self::names(&format!("Tables_in_{}", self.database), names));
        }

        let Some(table_name) = target_table(statement) else {
            // `SELECT <expr>` echoes the expression text back.
            if upper.starts_with("SELECT ") {
                let expr = statement[7..].trim();
                return Ok(QueryResult::with_data(
                    vec![ColumnInfo::new(expr, "VARCHAR")],
                    vec![vec![Value::from(expr)]],
                ));
            }
            return Ok(QueryResult::new());
        };

        let table = database
            .and_then(|d| d.table(&table_name))
            .ok_or_else(|| ChatError::execution(self.missing_table(&table_name)))?;

        if upper.starts_with("DESCRIBE") || upper.starts_with("DESC ") {
            return Ok(Self::describe_rows(&table.schema));
        }
        if upper.starts_with("SELECT") {
            let columns = table
                .schema
                .columns
                .iter()
                .map(|c| ColumnInfo::new(c.name.as_str(), c.data_type.to_uppercase()))
                .collect();
            return Ok(QueryResult::with_data(columns, table.rows.clone())
                .with_execution_time(Duration::from_millis(1)));
        }
        Ok(QueryResult::new())
    }

    async fn execute(&self, sql: &str) -> Result<u64> {
        self.ensure_open()?;
        self.simulate_latency().await;

        let mut state = self.server.lock();
        state.events.push(MockEvent::Execute(sql.to_string()));
        self.check_statement(&state, sql)
            .map_err(ChatError::execution)?;

        let upper = sql.trim().to_uppercase();
        let Some(table_name) = target_table(sql) else {
            return Ok(0);
        };

        if upper.starts_with("CREATE TABLE") {
            let database = state.database_mut(&self.database);
            if database.table(&table_name).is_some() {
                return Err(ChatError::execution(format!(
                    "1050 (42S01): Table '{table_name}' already exists"
                )));
            }
            database.tables.push(MockTable {
                schema: TableSchema::new(table_name, Vec::new()),
                rows: Vec::new(),
            });
            return Ok(0);
        }

        let exists = state
            .database(&self.database)
            .and_then(|d| d.table(&table_name))
            .is_some();
        if !exists {
            return Err(ChatError::execution(self.missing_table(&table_name)));
        }

        if upper.starts_with("DROP TABLE") {
            state
                .database_mut(&self.database)
                .tables
                .retain(|t| !t.schema.name.eq_ignore_ascii_case(&table_name));
            return Ok(0);
        }
        Ok(1)
    }

    async fn begin(&self) -> Result<()> {
        self.ensure_open()?;
        let mut state = self.server.lock();
        state.events.push(MockEvent::Begin);
        match state.injected_failure("START TRANSACTION") {
            Some(message) => Err(ChatError::execution(message)),
            None => Ok(()),
        }
    }

    async fn commit(&self) -> Result<()> {
        self.ensure_open()?;
        let mut state = self.server.lock();
        state.events.push(MockEvent::Commit);
        match state.injected_failure("COMMIT") {
            Some(message) => Err(ChatError::execution(message)),
            None => Ok(()),
        }
    }

    async fn rollback(&self) -> Result<()> {
        self.ensure_open()?;
        self.server.lock().events.push(MockEvent::Rollback);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if self.open.swap(false, Ordering::SeqCst) {
            let mut state = self.server.lock();
            state.open_connections = state.open_connections.saturating_sub(1);
            state.events.push(MockEvent::Close(self.database.clone()));
        }
        Ok(())
    }
}
