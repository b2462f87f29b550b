//! Connection integration tests.
//!
//! Tests opening, switching and closing connections and their error paths.

use std::sync::Arc;
use std::time::Duration;

use db_chat::connection::{ConnectionManager, ConnectionProfile};
use db_chat::db::{Connector, DatabaseClient, MockEvent, MockServer, MySqlClient};
use db_chat::error::ChatError;
use tokio_test::{assert_err, assert_ok};

use super::{live_profile, shop_profile};

fn manager(server: &MockServer) -> ConnectionManager {
    ConnectionManager::new(Arc::new(server.clone()))
}

#[tokio::test]
async fn test_open_then_close_leaves_nothing_open() {
    let server = MockServer::shop();
    let mut connections = manager(&server);

    assert_ok!(connections.open(shop_profile()).await);
    assert_eq!(server.open_connections(), 1);

    assert_ok!(connections.close().await);
    assert_ok!(connections.close().await);
    assert_eq!(server.open_connections(), 0);
    assert!(!connections.is_connected());
}

#[tokio::test]
async fn test_shop_lists_tables_in_order() {
    let server = MockServer::shop();
    let mut connections = manager(&server);
    connections.open(shop_profile()).await.unwrap();

    let tables = connections.list_tables().await.unwrap();
    assert_eq!(tables, vec!["orders", "customers"]);
}

#[tokio::test]
async fn test_list_databases_hides_system_databases() {
    let server = MockServer::shop();
    let mut connections = manager(&server);
    connections.open(shop_profile()).await.unwrap();

    let databases = connections.list_databases().await.unwrap();
    assert_eq!(databases, vec!["shop", "billing"]);
}

#[tokio::test]
async fn test_list_databases_keeps_system_databases_when_alone() {
    let server = MockServer::new()
        .with_database("information_schema")
        .with_database("mysql");
    let mut connections = manager(&server);
    let profile = ConnectionProfile::new("localhost", 3306, "root", "", "mysql");
    connections.open(profile).await.unwrap();

    let databases = connections.list_databases().await.unwrap();
    assert_eq!(databases, vec!["information_schema", "mysql"]);
}

#[tokio::test]
async fn test_wrong_password_is_connection_error() {
    let server = MockServer::shop().with_password("right");
    let mut connections = manager(&server);

    let err = assert_err!(connections.open(shop_profile()).await);
    assert!(matches!(err, ChatError::Connection(_)));
    assert!(err.to_string().contains("Access denied for user 'root'"));
    assert!(!connections.is_connected());
}

#[tokio::test]
async fn test_unreachable_host_is_connection_error() {
    let server = MockServer::shop();
    server.set_unreachable(true);
    let mut connections = manager(&server);

    let err = assert_err!(connections.open(shop_profile()).await);
    assert!(err.to_string().contains("Cannot connect to localhost:3306"));
}

#[tokio::test]
async fn test_switch_opens_new_before_closing_old() {
    let server = MockServer::shop();
    let mut connections = manager(&server);
    connections.open(shop_profile()).await.unwrap();
    server.clear_events();

    connections.switch("billing").await.unwrap();

    assert_eq!(
        server.events(),
        vec![
            MockEvent::Connect("billing".to_string()),
            MockEvent::Close("shop".to_string()),
        ]
    );
    assert_eq!(connections.current_database(), Some("billing"));
    assert_eq!(connections.db().map(|db| db.database()), Some("billing"));
    assert_eq!(server.open_connections(), 1);
}

#[tokio::test]
async fn test_failed_switch_keeps_previous_connection_usable() {
    let server = MockServer::shop();
    let mut connections = manager(&server);
    connections.open(shop_profile()).await.unwrap();

    let err = assert_err!(connections.switch("ghost").await);

    assert!(matches!(err, ChatError::Connection(_)));
    assert_eq!(connections.current_database(), Some("shop"));
    let tables = connections.list_tables().await.unwrap();
    assert_eq!(tables, vec!["orders", "customers"]);
}

#[tokio::test]
async fn test_switch_to_same_database_is_noop() {
    let server = MockServer::shop();
    let mut connections = manager(&server);
    connections.open(shop_profile()).await.unwrap();
    server.clear_events();

    connections.switch("shop").await.unwrap();

    assert!(server.events().is_empty());
}

#[tokio::test]
async fn test_closed_client_rejects_calls() {
    let server = MockServer::shop();
    let client = server.connect(&shop_profile()).await.unwrap();
    client.close().await.unwrap();

    assert!(!client.is_open());
    assert!(client.list_tables().await.is_err());
}

#[tokio::test(flavor = "current_thread")]
async fn test_real_connect_with_invalid_host() {
    let profile = ConnectionProfile::new(
        "invalid.host.that.does.not.exist.local",
        3306,
        "root",
        "x",
        "shop",
    );

    let err = assert_err!(MySqlClient::connect(&profile, Duration::from_secs(5)).await);
    assert!(matches!(err, ChatError::Connection(_)));
}

#[tokio::test]
async fn test_real_connect_and_close() {
    let Some(profile) = live_profile() else {
        eprintln!("Skipping test: MYSQL_TEST_URL not set");
        return;
    };

    let client = MySqlClient::connect(&profile, Duration::from_secs(30))
        .await
        .unwrap();
    assert_eq!(client.database(), profile.database());
    client.close().await.unwrap();
    client.close().await.unwrap();
    assert!(!client.is_open());
}
