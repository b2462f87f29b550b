//! MySQL database client implementation.
//!
//! Provides the `MySqlClient` struct that implements the `DatabaseClient` trait
//! over a sqlx pool capped at one connection, so transaction boundaries and
//! the statement between them always land on the same server session.
//! Generated statements are sent through the text protocol, so every column
//! arrives as text and is converted by its reported type name.

use crate::connection::ConnectionProfile;
use crate::db::{ColumnInfo, Connector, DatabaseClient, QueryResult, Row, Value};
use crate::error::{ChatError, Result};
use crate::schema::{Column, TableSchema};
use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlDatabaseError, MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::{Column as SqlxColumn, Executor, Row as SqlxRow, TypeInfo, ValueRef};
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Default upper bound on a single statement, in seconds.
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 30;

/// Upper bound on a single connection attempt, in seconds.
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Maximum number of connection retry attempts.
const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Base delay between retry attempts (doubles each retry).
const RETRY_BASE_DELAY_MS: u64 = 500;

/// MySQL client bound to one database.
#[derive(Debug)]
pub struct MySqlClient {
    database: String,
    pool: MySqlPool,
    timeout: Duration,
}

impl MySqlClient {
    /// Opens a connection for the profile, retrying transient failures.
    pub async fn connect(profile: &ConnectionProfile, timeout: Duration) -> Result<Self> {
        let options = MySqlConnectOptions::new()
            .host(profile.host())
            .port(profile.port())
            .username(profile.username())
            .password(profile.password())
            .database(profile.database());

        let mut delay = Duration::from_millis(RETRY_BASE_DELAY_MS);
        let mut attempt = 1;

        loop {
            debug!(attempt, max = MAX_RETRY_ATTEMPTS, "Connection attempt");

            match try_connect(options.clone()).await {
                Ok(pool) => {
                    debug!(database = profile.database(), "Connected to MySQL");
                    return Ok(Self {
                        database: profile.database().to_string(),
                        pool,
                        timeout,
                    });
                }
                Err(e) => {
                    if attempt < MAX_RETRY_ATTEMPTS && is_transient_error(&e) {
                        warn!(
                            "Connection attempt {} failed (transient error), retrying in {:?}",
                            attempt, delay
                        );
                        tokio::time::sleep(delay).await;
                        delay *= 2;
                        attempt += 1;
                        continue;
                    }
                    return Err(map_connection_error(&e, profile));
                }
            }
        }
    }

    /// Runs a driver future under the statement timeout.
    async fn bounded<T, F>(&self, fut: F) -> std::result::Result<T, String>
    where
        F: Future<Output = std::result::Result<T, sqlx::Error>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(format_query_error(&e)),
            Err(_) => Err(format!(
                "Statement timed out after {} seconds",
                self.timeout.as_secs()
            )),
        }
    }

    fn require_open(&self) -> Result<()> {
        if self.pool.is_closed() {
            Err(closed_error())
        } else {
            Ok(())
        }
    }

    /// Runs a statement that returns one name per row.
    async fn fetch_names(&self, sql: &str) -> Result<Vec<String>> {
        self.require_open()?;

        let rows = self
            .bounded(sqlx::raw_sql(sql).fetch_all(&self.pool))
            .await
            .map_err(ChatError::query)?;

        rows.iter()
            .map(|row| {
                row.try_get_unchecked::<String, _>(0)
                    .map_err(|e| ChatError::query(format!("Unreadable result of {sql}: {e}")))
            })
            .collect()
    }

    /// Runs a control statement (transaction boundaries).
    async fn control(&self, sql: &str) -> Result<()> {
        self.require_open().map_err(|e| ChatError::execution(e.message()))?;

        self.bounded(sqlx::raw_sql(sql).execute(&self.pool))
            .await
            .map(|_| ())
            .map_err(ChatError::execution)
    }
}

#[async_trait]
impl DatabaseClient for MySqlClient {
    fn database(&self) -> &str {
        &self.database
    }

    fn is_open(&self) -> bool {
        !self.pool.is_closed()
    }

    async fn list_databases(&self) -> Result<Vec<String>> {
        self.fetch_names("SHOW DATABASES").await
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        self.fetch_names("SHOW TABLES").await
    }

    async fn describe_table(&self, table: &str) -> Result<TableSchema> {
        self.require_open()?;
        let sql = format!("DESCRIBE {}", quote_identifier(table));

        let rows = self
            .bounded(sqlx::raw_sql(&sql).fetch_all(&self.pool))
            .await
            .map_err(ChatError::query)?;

        let columns = rows
            .iter()
            .map(convert_describe_row)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| ChatError::query(format!("Unreadable DESCRIBE output for {table}: {e}")))?;

        Ok(TableSchema::new(table, columns))
    }

    async fn fetch_all(&self, sql: &str) -> Result<QueryResult> {
        self.require_open()?;
        let start = Instant::now();

        let result = self
            .bounded(sqlx::raw_sql(sql).fetch_all(&self.pool))
            .await
            .map_err(ChatError::execution)?;

        let execution_time = start.elapsed();

        let columns: Vec<ColumnInfo> = match result.first() {
            Some(first_row) => column_info(first_row.columns()),
            None => {
                // Best effort; some statements cannot be prepared.
                match self.bounded((&self.pool).describe(sql)).await {
                    Ok(described) => column_info(described.columns()),
                    Err(_) => Vec::new(),
                }
            }
        };

        let rows: Vec<Row> = result.iter().map(convert_row).collect();
        let row_count = rows.len();

        debug!(row_count, ?execution_time, "Statement returned rows");

        Ok(QueryResult {
            columns,
            rows,
            execution_time,
            row_count,
        })
    }

    async fn execute(&self, sql: &str) -> Result<u64> {
        self.require_open()?;

        let done = self
            .bounded(sqlx::raw_sql(sql).execute(&self.pool))
            .await
            .map_err(ChatError::execution)?;

        Ok(done.rows_affected())
    }

    async fn begin(&self) -> Result<()> {
        self.control("START TRANSACTION").await
    }

    async fn commit(&self) -> Result<()> {
        self.control("COMMIT").await
    }

    async fn rollback(&self) -> Result<()> {
        self.control("ROLLBACK").await
    }

    async fn close(&self) -> Result<()> {
        if !self.pool.is_closed() {
            self.pool.close().await;
            debug!(database = %self.database, "Connection closed");
        }
        Ok(())
    }
}

/// Opens live MySQL connections.
#[derive(Debug, Clone)]
pub struct MySqlConnector {
    query_timeout: Duration,
}

impl MySqlConnector {
    /// Creates a connector whose connections use the given statement timeout.
    pub fn new(query_timeout: Duration) -> Self {
        Self { query_timeout }
    }
}

impl Default for MySqlConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_QUERY_TIMEOUT_SECS))
    }
}

#[async_trait]
impl Connector for MySqlConnector {
    async fn connect(&self, profile: &ConnectionProfile) -> Result<Box<dyn DatabaseClient>> {
        let client = MySqlClient::connect(profile, self.query_timeout).await?;
        Ok(Box::new(client))
    }
}

/// Pool settings that pin a client to one server session.
///
/// The connection is never recycled, so session state (the bound database
/// and any open transaction) lives as long as the client.
fn single_session_options() -> MySqlPoolOptions {
    MySqlPoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .test_before_acquire(false)
        .acquire_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
}

/// Builds the pool and opens its connection eagerly.
async fn try_connect(options: MySqlConnectOptions) -> std::result::Result<MySqlPool, sqlx::Error> {
    single_session_options().connect_with(options).await
}

fn closed_error() -> ChatError {
    ChatError::connection("Connection is closed")
}

/// Quotes an identifier with backticks, doubling embedded backticks.
pub(crate) fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

fn column_info(columns: &[sqlx::mysql::MySqlColumn]) -> Vec<ColumnInfo> {
    columns
        .iter()
        .map(|col| ColumnInfo::new(col.name(), col.type_info().name()))
        .collect()
}

fn convert_describe_row(row: &MySqlRow) -> std::result::Result<Column, sqlx::Error> {
    let name: String = row.try_get_unchecked("Field")?;
    let data_type: String = row.try_get_unchecked("Type")?;
    let null: String = row.try_get_unchecked("Null")?;
    let key: Option<String> = row.try_get_unchecked("Key")?;
    let default: Option<String> = row.try_get_unchecked("Default")?;
    let extra: Option<String> = row.try_get_unchecked("Extra")?;

    Ok(Column {
        name,
        data_type,
        is_nullable: null.eq_ignore_ascii_case("YES"),
        key: key.unwrap_or_default(),
        default,
        extra: extra.unwrap_or_default(),
    })
}

/// Converts a sqlx MySqlRow to our Row type.
fn convert_row(row: &MySqlRow) -> Row {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, col)| convert_value(row, i, col.type_info().name()))
        .collect()
}

/// Converts a single text-protocol column value to our Value type.
fn convert_value(row: &MySqlRow, index: usize, type_name: &str) -> Value {
    match row.try_get_raw(index) {
        Ok(raw) if raw.is_null() => return Value::Null,
        Err(_) => return Value::Null,
        Ok(_) => {}
    }

    if is_binary_type(type_name) {
        return row
            .try_get_unchecked::<Vec<u8>, _>(index)
            .map(Value::Bytes)
            .unwrap_or(Value::Null);
    }

    match row.try_get_unchecked::<String, _>(index) {
        Ok(text) => parse_text_value(type_name, text),
        Err(_) => row
            .try_get_unchecked::<Vec<u8>, _>(index)
            .map(Value::Bytes)
            .unwrap_or(Value::Null),
    }
}

fn is_binary_type(type_name: &str) -> bool {
    matches!(
        type_name.to_uppercase().as_str(),
        "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BINARY" | "VARBINARY" | "BIT"
            | "GEOMETRY"
    )
}

/// Interprets the textual form of a value by its MySQL type name.
///
/// Falls back to `Value::String` when the text does not parse.
pub(crate) fn parse_text_value(type_name: &str, text: String) -> Value {
    let upper = type_name.to_uppercase();
    let unsigned = upper.ends_with(" UNSIGNED");
    let base = upper.trim_end_matches(" UNSIGNED");

    let parsed = match base {
        "BOOLEAN" => match text.as_str() {
            "1" => Some(Value::Bool(true)),
            "0" => Some(Value::Bool(false)),
            _ => None,
        },
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" | "YEAR" if unsigned => {
            text.parse::<u64>().ok().map(Value::UInt)
        }
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" | "YEAR" => {
            text.parse::<i64>().ok().map(Value::Int)
        }
        "FLOAT" | "DOUBLE" => text.parse::<f64>().ok().map(Value::Float),
        "DECIMAL" => Some(Value::Decimal(text.clone())),
        _ => None,
    };

    parsed.unwrap_or(Value::String(text))
}

/// Determines if an error is transient and worth retrying.
fn is_transient_error(error: &sqlx::Error) -> bool {
    let error_str = error.to_string().to_lowercase();

    // Authentication and unknown-database errors are never transient
    if error_str.contains("access denied") || error_str.contains("unknown database") {
        return false;
    }

    error_str.contains("connection refused")
        || error_str.contains("timed out")
        || error_str.contains("timeout")
        || error_str.contains("temporarily unavailable")
        || error_str.contains("connection reset")
        || error_str.contains("broken pipe")
}

/// Maps sqlx connection errors to user-friendly messages.
fn map_connection_error(error: &sqlx::Error, profile: &ConnectionProfile) -> ChatError {
    let host = profile.host();
    let port = profile.port();
    let error_str = error.to_string().to_lowercase();

    if error_str.contains("access denied") {
        ChatError::connection(format!(
            "Access denied for user '{}'. Check your credentials.",
            profile.username()
        ))
    } else if error_str.contains("unknown database") {
        ChatError::connection(format!("Unknown database '{}'.", profile.database()))
    } else if error_str.contains("connection refused") {
        ChatError::connection(format!(
            "Cannot connect to {host}:{port}. Check that the server is running."
        ))
    } else if error_str.contains("timed out") || error_str.contains("timeout") {
        ChatError::connection(format!(
            "Connection to {host}:{port} timed out. The server may be overloaded or unreachable."
        ))
    } else if error_str.contains("lookup") || error_str.contains("not known") {
        ChatError::connection(format!("Cannot resolve host '{host}'."))
    } else {
        ChatError::connection(error.to_string())
    }
}

/// Formats a driver error as `number (SQLSTATE): message` when available.
fn format_query_error(error: &sqlx::Error) -> String {
    match error.as_database_error() {
        Some(db_error) => match db_error.try_downcast_ref::<MySqlDatabaseError>() {
            Some(mysql_error) => match mysql_error.code() {
                Some(state) => format!(
                    "{} ({}): {}",
                    mysql_error.number(),
                    state,
                    mysql_error.message()
                ),
                None => format!("{}: {}", mysql_error.number(), mysql_error.message()),
            },
            None => db_error.message().to_string(),
        },
        None => error.to_string(),
    }
}
