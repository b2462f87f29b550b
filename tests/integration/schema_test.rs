//! Schema introspection integration tests.

use std::sync::Arc;

use db_chat::db::{Connector, MockEvent, MockServer};
use db_chat::error::ChatError;
use db_chat::schema::SchemaIntrospector;
use pretty_assertions::assert_eq;

use super::shop_profile;

#[tokio::test]
async fn test_describe_orders() {
    let server = MockServer::shop();
    let db = server.connect(&shop_profile()).await.unwrap();

    let orders = SchemaIntrospector::new(true)
        .describe_table(db.as_ref(), "orders")
        .await
        .unwrap();

    assert_eq!(
        orders.column_types(),
        vec![
            ("id", "int"),
            ("customer_id", "int"),
            ("total", "decimal(10,2)"),
        ]
    );
    assert!(!orders.columns[0].is_nullable);
    assert_eq!(orders.columns[0].key, "PRI");
}

#[tokio::test]
async fn test_describe_missing_table_is_query_error() {
    let server = MockServer::shop();
    let db = server.connect(&shop_profile()).await.unwrap();

    let err = SchemaIntrospector::new(true)
        .describe_table(db.as_ref(), "ghosts")
        .await
        .unwrap_err();

    assert!(matches!(err, ChatError::Query(_)));
    assert!(err.to_string().contains("doesn't exist"));
}

#[tokio::test]
async fn test_summary_grounds_every_table() {
    let server = MockServer::shop();
    let db = server.connect(&shop_profile()).await.unwrap();

    let summary = SchemaIntrospector::new(false)
        .build_summary(db.as_ref())
        .await
        .unwrap();

    assert_eq!(summary.database, "shop");
    assert_eq!(summary.table_names, vec!["orders", "customers"]);
    let text = summary.format_for_llm();
    assert!(text.contains("Tables: orders, customers"));
    assert!(text.contains("  - email: varchar(255)"));
}

#[tokio::test]
async fn test_failing_table_is_omitted() {
    let server = MockServer::shop();
    server.fail_describe("customers");
    let db = server.connect(&shop_profile()).await.unwrap();

    let summary = SchemaIntrospector::new(false)
        .build_summary(db.as_ref())
        .await
        .unwrap();

    assert_eq!(summary.tables.len(), 1);
    assert!(summary.table("orders").is_some());
    assert_eq!(summary.omitted, vec!["customers"]);
}

#[tokio::test]
async fn test_cached_summary_is_reused_until_invalidated() {
    let server = MockServer::shop();
    let db = server.connect(&shop_profile()).await.unwrap();
    let mut introspector = SchemaIntrospector::new(true);

    let first = introspector.summary(db.as_ref()).await.unwrap();
    server.clear_events();
    let second = introspector.summary(db.as_ref()).await.unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert!(server.events().is_empty());

    introspector.invalidate("shop");
    introspector.summary(db.as_ref()).await.unwrap();
    assert!(!server.events().is_empty());
}

#[tokio::test]
async fn test_uncached_summary_is_rebuilt() {
    let server = MockServer::shop();
    let db = server.connect(&shop_profile()).await.unwrap();
    let mut introspector = SchemaIntrospector::new(false);

    introspector.summary(db.as_ref()).await.unwrap();
    server.clear_events();
    introspector.summary(db.as_ref()).await.unwrap();

    assert!(server
        .events()
        .iter()
        .any(|e| matches!(e, MockEvent::Fetch(sql) if sql.starts_with("DESCRIBE"))));
}
