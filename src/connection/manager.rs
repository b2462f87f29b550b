//! Connection manager for database lifecycle and switching.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::connection::ConnectionProfile;
use crate::db::{Connector, DatabaseClient};
use crate::error::{ChatError, Result};

/// Databases MySQL creates for itself.
pub const SYSTEM_DATABASES: &[&str] = &["information_schema", "mysql", "performance_schema", "sys"];

/// An open connection together with the profile it was opened with.
///
/// The bound database is the profile's database; there is no separate copy
/// that could disagree with it.
pub struct LiveConnection {
    profile: ConnectionProfile,
    db: Box<dyn DatabaseClient>,
}

impl LiveConnection {
    /// Returns the profile this connection was opened with.
    pub fn profile(&self) -> &ConnectionProfile {
        &self.profile
    }

    /// Returns the database this connection is bound to.
    pub fn database(&self) -> &str {
        self.profile.database()
    }

    /// Returns the underlying database client.
    pub fn db(&self) -> &dyn DatabaseClient {
        self.db.as_ref()
    }

    pub fn is_open(&self) -> bool {
        self.db.is_open()
    }
}

/// Manages the live connection of one session.
pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    active: Option<LiveConnection>,
}

impl ConnectionManager {
    /// Creates a new connection manager with no connection.
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            active: None,
        }
    }

    /// Opens a connection for the profile, replacing any previous one.
    ///
    /// On failure the previous connection, if any, is left untouched.
    pub async fn open(&mut self, profile: ConnectionProfile) -> Result<()> {
        let db = self.connector.connect(&profile).await?;
        info!(
            host = profile.host(),
            database = profile.database(),
            "Connected"
        );

        if let Some(old) = self.active.replace(LiveConnection { profile, db }) {
            close_quietly(old).await;
        }
        Ok(())
    }

    /// Rebinds the session to another database on the same server.
    ///
    /// The new connection is opened first; the old one is closed only once
    /// the new one is live. On failure nothing changes.
    pub async fn switch(&mut self, database: &str) -> Result<()> {
        let current = self
            .active
            .as_ref()
            .ok_or_else(|| ChatError::connection("Not connected"))?;

        if current.database() == database {
            debug!(database, "Already on requested database");
            return Ok(());
        }

        let profile = current.profile.with_database(database);
        let db = self.connector.connect(&profile).await.map_err(|e| {
            warn!(database, "Database switch failed: {e}");
            e
        })?;

        let old = self.active.replace(LiveConnection { profile, db });
        if let Some(old) = old {
            info!(from = old.database(), to = database, "Switched database");
            close_quietly(old).await;
        }
        Ok(())
    }

    /// Lists user databases, hiding MySQL's own unless nothing else is left.
    pub async fn list_databases(&self) -> Result<Vec<String>> {
        let names = self.require()?.db.list_databases().await?;
        Ok(filter_system_databases(names))
    }

    /// Lists the tables of the bound database.
    pub async fn list_tables(&self) -> Result<Vec<String>> {
        self.require()?.db.list_tables().await
    }

    /// Returns the live connection, if any.
    pub fn active(&self) -> Option<&LiveConnection> {
        self.active.as_ref()
    }

    /// Returns the active database client.
    pub fn db(&self) -> Option<&dyn DatabaseClient> {
        self.active.as_ref().map(LiveConnection::db)
    }

    /// Returns the bound database, if connected.
    pub fn current_database(&self) -> Option<&str> {
        self.active.as_ref().map(LiveConnection::database)
    }

    pub fn is_connected(&self) -> bool {
        self.active.is_some()
    }

    /// Closes the live connection. Closing when nothing is open is a no-op.
    pub async fn close(&mut self) -> Result<()> {
        if let Some(conn) = self.active.take() {
            conn.db.close().await?;
            info!(database = conn.database(), "Disconnected");
        }
        Ok(())
    }

    fn require(&self) -> Result<&LiveConnection> {
        self.active
            .as_ref()
            .ok_or_else(|| ChatError::connection("Not connected"))
    }
}

async fn close_quietly(conn: LiveConnection) {
    if let Err(e) = conn.db.close().await {
        warn!(database = conn.database(), "Failed to close connection: {e}");
    }
}

/// Removes MySQL system databases, unless that would leave nothing.
pub fn filter_system_databases(names: Vec<String>) -> Vec<String> {
    let user: Vec<String> = names
        .iter()
        .filter(|name| !SYSTEM_DATABASES.contains(&name.as_str()))
        .cloned()
        .collect();

    if user.is_empty() {
        names
    } else {
        user
    }
}
