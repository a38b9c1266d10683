//! Query execution tests.
//!
//! Checks what actually goes over the wire: parameter strategy, SQL body,
//! query pairs, and how failures come back.

use std::time::Duration;

use ch_http::{ChError, Command, Connection, ConnectionState};
use pretty_assertions::assert_eq;
use rust_decimal::Decimal;

use super::stub::{StubResponse, StubServer};

#[tokio::test]
async fn test_server_error_carries_message_and_sql() {
    let server = StubServer::start(|_| {
        StubResponse::with_status(500, "Code: 62. DB::Exception: Syntax error: failed at position 1")
    })
    .await;
    let conn = Connection::from_connection_string(&server.connection_string("")).unwrap();

    let err = Command::on(&conn, "SELEC 1")
        .execute_non_query()
        .await
        .unwrap_err();

    assert!(err.to_string().contains("Syntax error"));
    assert!(err.to_string().contains("SELEC 1"));
    match err {
        ChError::Server {
            status, code, sql, ..
        } => {
            assert_eq!(status, 500);
            assert_eq!(code, Some(62));
            assert_eq!(sql, "SELEC 1");
        }
        other => panic!("Expected server error, got {:?}", other),
    }
    // No parameters, so no handshake was needed.
    assert_eq!(conn.state(), ConnectionState::Closed);
}

#[tokio::test]
async fn test_exception_code_header_wins() {
    let server = StubServer::start(|_| {
        StubResponse::with_status(404, "Table default.missing does not exist")
            .header("X-ClickHouse-Exception-Code", "60")
    })
    .await;
    let conn = Connection::from_connection_string(&server.connection_string("")).unwrap();

    let err = Command::on(&conn, "SELECT * FROM missing")
        .execute_non_query()
        .await
        .unwrap_err();

    assert_eq!(err.server_code(), Some(60));
}

#[tokio::test]
async fn test_native_parameters_go_in_query_string() {
    let server = StubServer::clickhouse("22.3.1.1", |_| StubResponse::ok("1\n")).await;
    let conn = Connection::from_connection_string(&server.connection_string("")).unwrap();

    let mut cmd = Command::on(&conn, "SELECT {id:UInt32}, {name:String}")
        .bind("id", "UInt32", 42u32)
        .bind("name", "String", "a\tb");
    cmd.execute_non_query().await.unwrap();

    let queries = server.queries();
    assert_eq!(queries.len(), 1);
    let query = &queries[0];
    assert_eq!(query.sql(), "SELECT {id:UInt32}, {name:String}");
    assert_eq!(query.query_param("param_id").as_deref(), Some("42"));
    assert_eq!(query.query_param("param_name").as_deref(), Some("a\\tb"));
    assert_eq!(server.probe_count(), 1);
}

#[tokio::test]
async fn test_old_server_gets_literals() {
    let server = StubServer::clickhouse("19.1.6.1", |_| StubResponse::ok("")).await;
    let conn = Connection::from_connection_string(&server.connection_string("")).unwrap();

    let mut cmd = Command::on(&conn, "SELECT * FROM t WHERE name = {name:String}")
        .bind("name", "String", "O'Brien");
    cmd.execute_non_query().await.unwrap();

    let queries = server.queries();
    let query = &queries[0];
    assert_eq!(query.sql(), "SELECT * FROM t WHERE name = 'O\\'Brien'");
    assert_eq!(query.query_param("param_name"), None);
}

#[tokio::test]
async fn test_inexpressible_type_forces_literals_for_whole_query() {
    // Supports HTTP parameters but predates Decimal ones.
    let server = StubServer::clickhouse("19.12.1.1", |_| StubResponse::ok("")).await;
    let conn = Connection::from_connection_string(&server.connection_string("")).unwrap();

    let mut cmd = Command::on(&conn, "SELECT {id:Int32}, {price:Decimal(9, 2)}")
        .bind("id", "Int32", 7)
        .bind("price", "Decimal(9, 2)", Decimal::new(150, 2));
    cmd.execute_non_query().await.unwrap();

    let queries = server.queries();
    let query = &queries[0];
    assert_eq!(query.sql(), "SELECT 7, toDecimal32('1.50', 2)");
    assert_eq!(query.query_param("param_id"), None);
    assert_eq!(query.query_param("param_price"), None);
}

#[tokio::test]
async fn test_invalid_parameter_fails_before_any_request() {
    let server = StubServer::clickhouse("22.3.1.1", |_| StubResponse::ok("")).await;
    let conn = Connection::from_connection_string(&server.connection_string("")).unwrap();

    let err = Command::on(&conn, "SELECT {n:UInt8}")
        .bind("n", "UInt8", 300)
        .execute_non_query()
        .await
        .unwrap_err();

    assert!(matches!(err, ChError::InvalidParameterValue { .. }));
    assert!(server.requests().is_empty());
    assert_eq!(conn.state(), ConnectionState::Closed);
}

#[tokio::test]
async fn test_missing_parameter_on_literal_path() {
    let server = StubServer::clickhouse("19.1.6.1", |_| StubResponse::ok("")).await;
    let conn = Connection::from_connection_string(&server.connection_string("")).unwrap();

    let err = Command::on(&conn, "SELECT {a:Int32}, {b:Int32}")
        .bind("a", "Int32", 1)
        .execute_non_query()
        .await
        .unwrap_err();

    assert!(matches!(err, ChError::ParameterNotFound(ref name) if name == "b"));
    assert!(server.queries().is_empty());
}

#[tokio::test]
async fn test_connection_pairs_and_settings() {
    let server = StubServer::start(|_| StubResponse::ok("")).await;
    let conn = Connection::from_connection_string(
        &server.connection_string("Database=logs;set_max_threads=4"),
    )
    .unwrap();
    conn.set_custom_setting("readonly", "1");

    let mut cmd = Command::on(&conn, "SELECT 1").with_query_id("q-42");
    cmd.execute_non_query().await.unwrap();

    let requests = server.requests();
    let query = &requests[0];
    assert_eq!(query.query_param("database").as_deref(), Some("logs"));
    assert_eq!(query.query_param("query_id").as_deref(), Some("q-42"));
    assert_eq!(query.query_param("max_threads").as_deref(), Some("4"));
    assert_eq!(query.query_param("readonly").as_deref(), Some("1"));
    assert_eq!(query.query_param("enable_http_compression"), None);
    assert_eq!(query.header("content-type"), Some("text/plain; charset=utf-8"));
}

#[tokio::test]
async fn test_timeout_surfaces_as_transport_error() {
    let server = StubServer::start(|_| StubResponse::ok("1\n").delayed(Duration::from_secs(5))).await;
    let conn = Connection::from_connection_string(&server.connection_string("")).unwrap();

    let err = Command::on(&conn, "SELECT sleep(3)")
        .with_timeout(Duration::from_millis(100))
        .execute_non_query()
        .await
        .unwrap_err();

    assert!(err.is_timeout());
}
