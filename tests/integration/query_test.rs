//! Query execution integration tests.
//!
//! Covers classification, the read and write paths, and running against a
//! real server when one is configured.

use std::time::Duration;

use db_chat::db::{Connector, DatabaseClient, MockEvent, MockServer, MySqlClient, Value};
use db_chat::error::ChatError;
use db_chat::query::{ExecutionResult, QueryExecutor, StatementKind};
use pretty_assertions::assert_eq;

use super::{live_profile, shop_profile};

const TIMEOUT: Duration = Duration::from_secs(5);

fn transaction_calls(server: &MockServer) -> usize {
    server
        .events()
        .iter()
        .filter(|e| matches!(e, MockEvent::Begin | MockEvent::Commit | MockEvent::Rollback))
        .count()
}

#[test]
fn test_classification() {
    assert_eq!(StatementKind::classify("  select 1"), StatementKind::Read);
    assert_eq!(StatementKind::classify("SHOW TABLES"), StatementKind::Read);
    assert_eq!(StatementKind::classify("describe orders"), StatementKind::Read);
    assert_eq!(StatementKind::classify("EXPLAIN SELECT 1"), StatementKind::Read);
    assert_eq!(
        StatementKind::classify("INSERT INTO customers VALUES (3)"),
        StatementKind::Write
    );
    assert_eq!(
        StatementKind::classify("WITH t AS (SELECT 1) SELECT * FROM t"),
        StatementKind::Write
    );
}

#[tokio::test]
async fn test_select_all_customers_returns_rows_by_name() {
    let server = MockServer::shop();
    let db = server.connect(&shop_profile()).await.unwrap();
    server.clear_events();

    let result = QueryExecutor::new(db.as_ref(), TIMEOUT)
        .execute("SELECT * FROM customers;")
        .await
        .unwrap();

    let ExecutionResult::Rows(rows) = result else {
        panic!("Expected rows");
    };
    assert_eq!(rows.column_names(), vec!["id", "name", "email"]);
    assert_eq!(rows.get(0, "name"), Some(&Value::from("Alice")));
    assert_eq!(rows.get(1, "email"), Some(&Value::Null));
    assert_eq!(transaction_calls(&server), 0);
}

#[tokio::test]
async fn test_empty_read_is_success() {
    let server = MockServer::shop();
    let db = server.connect(&shop_profile()).await.unwrap();
    db.execute("CREATE TABLE audit (id INT)").await.unwrap();

    let result = QueryExecutor::new(db.as_ref(), TIMEOUT)
        .execute("SELECT * FROM audit")
        .await
        .unwrap();

    assert!(matches!(result, ExecutionResult::Rows(rows) if rows.is_empty()));
}

#[tokio::test]
async fn test_nonexistent_table_is_execution_error() {
    let server = MockServer::shop();
    let db = server.connect(&shop_profile()).await.unwrap();

    let err = QueryExecutor::new(db.as_ref(), TIMEOUT)
        .execute("SELECT * FROM nonexistent;")
        .await
        .unwrap_err();

    assert!(matches!(err, ChatError::Execution(_)));
    assert!(err.to_string().contains("1146"));
}

#[tokio::test]
async fn test_every_write_calls_exactly_one_of_commit_or_rollback() {
    let statements = [
        "INSERT INTO customers (name) VALUES ('Carol')",
        "UPDATE ghost SET x = 1",
        "DELETE FROM orders WHERE id = 1",
        "FROBNICATE everything",
    ];

    for sql in statements {
        let server = MockServer::shop();
        let db = server.connect(&shop_profile()).await.unwrap();
        server.clear_events();

        let _ = QueryExecutor::new(db.as_ref(), TIMEOUT).execute(sql).await;

        let events = server.events();
        let commits = events.iter().filter(|e| **e == MockEvent::Commit).count();
        let rollbacks = events.iter().filter(|e| **e == MockEvent::Rollback).count();
        assert_eq!(commits + rollbacks, 1, "statement {sql:?}");
    }
}

#[tokio::test]
async fn test_real_read_and_rolled_back_write() {
    let Some(profile) = live_profile() else {
        eprintln!("Skipping test: MYSQL_TEST_URL not set");
        return;
    };
    let client = MySqlClient::connect(&profile, Duration::from_secs(30))
        .await
        .unwrap();
    let executor = QueryExecutor::new(&client, Duration::from_secs(30));

    let result = executor.execute("SELECT 1 AS one").await.unwrap();
    let ExecutionResult::Rows(rows) = result else {
        panic!("Expected rows");
    };
    assert_eq!(rows.row_count, 1);

    let err = executor
        .execute("INSERT INTO db_chat_table_that_does_not_exist VALUES (1)")
        .await
        .unwrap_err();
    assert!(matches!(err, ChatError::Execution(_)));

    client.close().await.unwrap();
}
