//! End-to-end session tests through the actor handle.

use std::sync::Arc;

use db_chat::db::{MockEvent, MockServer};
use db_chat::error::ChatError;
use db_chat::llm::{MockLlmClient, QueryGenerator, Role};
use db_chat::session::{Session, SessionActor, SessionHandle, SessionSettings, TurnRole};
use tokio::task::JoinHandle;

use super::shop_profile;

async fn start(server: &MockServer, llm: MockLlmClient) -> (SessionHandle, JoinHandle<()>) {
    let session = Session::new(
        Arc::new(server.clone()),
        QueryGenerator::new(Arc::new(llm)),
        SessionSettings::default(),
    );
    let (handle, actor) = SessionActor::spawn(session);
    let task = tokio::spawn(actor.run());
    handle.connect(shop_profile()).await.unwrap();
    (handle, task)
}

async fn stop(handle: SessionHandle, task: JoinHandle<()>) {
    handle.close().await.unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn test_show_me_all_customers() {
    let server = MockServer::shop();
    let llm = MockLlmClient::new();
    let (handle, task) = start(&server, llm.clone()).await;

    let turn = handle
        .submit("show me all customers")
        .await
        .unwrap()
        .unwrap();

    assert_eq!(turn.generated_sql.as_deref(), Some("SELECT * FROM customers;"));
    let rows = turn.result.as_ref().unwrap();
    assert_eq!(rows.row_count, 2);
    assert_eq!(turn.database, "shop");
    assert_eq!(
        turn.text,
        "I found 2 result(s) for your query in the 'shop' database."
    );

    // The model saw the schema, then only the request.
    let requests = llm.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0][0].role, Role::System);
    assert!(requests[0][0].content.contains("Table: customers"));
    assert_eq!(
        requests[0][1].content,
        "Generate a MySQL query based on the following prompt: show me all customers"
    );

    stop(handle, task).await;
}

#[tokio::test]
async fn test_nonexistent_table_records_error_turn() {
    let server = MockServer::shop();
    let llm = MockLlmClient::new().with_response("ghost", "```sql\nSELECT * FROM nonexistent;\n```");
    let (handle, task) = start(&server, llm).await;

    let turn = handle.submit("show the ghost table").await.unwrap().unwrap();

    assert_eq!(turn.role, TurnRole::Assistant);
    assert!(turn.is_error());
    assert!(turn.result.is_none());
    assert_eq!(turn.generated_sql.as_deref(), Some("SELECT * FROM nonexistent;"));

    let snapshot = handle.snapshot().await.unwrap();
    assert!(snapshot.connected);
    assert_eq!(snapshot.query_count, 1);
    assert_eq!(snapshot.history_len, 2);

    stop(handle, task).await;
}

#[tokio::test]
async fn test_switch_to_ghost_keeps_shop() {
    let server = MockServer::shop();
    let (handle, task) = start(&server, MockLlmClient::new()).await;

    let err = handle.switch_database("ghost").await.unwrap_err();
    assert!(matches!(err, ChatError::Connection(_)));

    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.current_database.as_deref(), Some("shop"));

    let turn = handle.submit("show me all customers").await.unwrap().unwrap();
    assert!(!turn.is_error());
    assert_eq!(turn.database, "shop");

    stop(handle, task).await;
}

#[tokio::test]
async fn test_switch_regrounds_generation_on_new_database() {
    let server = MockServer::shop();
    let llm = MockLlmClient::new().with_response("invoices", "SELECT * FROM invoices;");
    let (handle, task) = start(&server, llm.clone()).await;
    handle.submit("show me all customers").await.unwrap();

    handle.switch_database("billing").await.unwrap();
    let turn = handle.submit("list invoices").await.unwrap().unwrap();

    assert_eq!(turn.database, "billing");
    assert_eq!(turn.result.as_ref().map(|r| r.row_count), Some(1));
    let last = llm.requests().pop().unwrap();
    assert!(last[0].content.contains("Table: invoices"));
    assert!(!last[0].content.contains("Table: customers"));

    let history = handle.history().await.unwrap();
    assert_eq!(history.len(), 4);
    assert_eq!(history[1].database, "shop");
    assert_eq!(history[3].database, "billing");

    stop(handle, task).await;
}

#[tokio::test]
async fn test_write_through_session_commits() {
    let server = MockServer::shop();
    let (handle, task) = start(&server, MockLlmClient::new()).await;
    server.clear_events();

    let turn = handle.submit("add a new customer").await.unwrap().unwrap();

    assert_eq!(turn.rows_affected, Some(1));
    assert!(turn.result.is_none());
    let events = server.events();
    assert!(events.contains(&MockEvent::Begin));
    assert!(events.contains(&MockEvent::Commit));
    assert!(!events.contains(&MockEvent::Rollback));

    stop(handle, task).await;
}

#[tokio::test]
async fn test_unintelligible_model_answer_becomes_error_turn() {
    let server = MockServer::shop();
    let (handle, task) = start(&server, MockLlmClient::new()).await;

    let turn = handle.submit("what is the meaning of life").await.unwrap().unwrap();

    // The model's prose is executed as-is and rejected by the server.
    assert!(turn.is_error());
    assert!(turn.generated_sql.is_some());
    assert_eq!(handle.snapshot().await.unwrap().query_count, 1);

    stop(handle, task).await;
}

#[tokio::test]
async fn test_disconnect_closes_everything() {
    let server = MockServer::shop();
    let (handle, task) = start(&server, MockLlmClient::new()).await;
    handle.submit("count orders").await.unwrap();

    handle.disconnect().await.unwrap();

    let snapshot = handle.snapshot().await.unwrap();
    assert!(!snapshot.connected);
    assert_eq!(snapshot.query_count, 0);
    assert_eq!(server.open_connections(), 0);
    assert!(handle.submit("count orders").await.is_err());

    stop(handle, task).await;
}
