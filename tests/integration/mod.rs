//! Integration tests for db-chat.

pub mod connection_test;
pub mod query_test;
pub mod schema_test;
pub mod session_test;

use db_chat::config::ConnectionConfig;
use db_chat::connection::ConnectionProfile;

/// Profile for the `shop` fixture of `MockServer`.
pub fn shop_profile() -> ConnectionProfile {
    ConnectionProfile::new("localhost", 3306, "root", "secret", "shop")
}

/// Profile for a real server, when `MYSQL_TEST_URL` is set.
pub fn live_profile() -> Option<ConnectionProfile> {
    let url = std::env::var("MYSQL_TEST_URL").ok()?;
    ConnectionConfig::from_connection_string(&url)
        .ok()?
        .to_profile()
        .ok()
}
