//! Connection management for db-chat.
//!
//! Centralizes the lifecycle of the single live connection of a session and
//! switching it between databases.

pub mod manager;
pub mod profile;

pub use manager::{filter_system_databases, ConnectionManager, LiveConnection, SYSTEM_DATABASES};
pub use profile::ConnectionProfile;
