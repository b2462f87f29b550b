//! Session state, settings and progress phases.

use serde::Serialize;
use std::fmt;
use std::time::Duration;

use crate::config::SessionConfig;
use crate::session::ChatHistory;

/// Behavior switches for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    /// Empty the transcript whenever the active database changes.
    pub clear_history_on_switch: bool,
    /// Memoize schema summaries per database.
    pub cache_schema: bool,
    /// Bound on every database call made while executing a statement.
    pub query_timeout: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from(&SessionConfig::default())
    }
}

impl From<&SessionConfig> for SessionSettings {
    fn from(config: &SessionConfig) -> Self {
        Self {
            clear_history_on_switch: config.clear_history_on_switch,
            cache_schema: config.cache_schema,
            query_timeout: Duration::from_secs(config.query_timeout_secs),
        }
    }
}

/// Everything a session knows besides its live connection.
///
/// The current database is not stored here; it is always read from the
/// live connection.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub history: ChatHistory,
    pub query_count: u64,
    pub available_databases: Vec<String>,
    pub available_tables: Vec<String>,
}

impl SessionState {
    /// Discards everything.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// What the session is busy with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    #[default]
    Idle,
    /// Opening a connection or switching databases.
    Connecting,
    Introspecting,
    Generating,
    Executing,
}

impl SessionPhase {
    pub fn is_working(&self) -> bool {
        !matches!(self, Self::Idle)
    }

    /// Short status line for the shell.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Introspecting => "reading schema",
            Self::Generating => "generating query",
            Self::Executing => "executing query",
        }
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Point-in-time view of a session, for status displays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub connected: bool,
    pub current_database: Option<String>,
    /// `user@host:port/db`, never the password.
    pub connection: Option<String>,
    pub query_count: u64,
    pub history_len: usize,
    pub available_databases: Vec<String>,
    pub available_tables: Vec<String>,
}
