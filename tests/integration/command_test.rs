//! Command façade tests.
//!
//! Readers and scalars run through the mock decoder, which reads the stub's
//! tab-separated bodies.

use std::sync::Arc;
use std::time::Duration;

use ch_http::decode::MockRowDecoder;
use ch_http::{ChError, Command, CommandShape, Connection, Value};
use futures::StreamExt;
use pretty_assertions::assert_eq;

use super::stub::{StubResponse, StubServer};

const SUMMARY: &str = r#"{"read_rows":"10","read_bytes":"80","written_rows":"0","written_bytes":"0","total_rows_to_read":"10","result_rows":"2"}"#;

fn connect(server: &StubServer) -> Connection {
    Connection::from_connection_string(&server.connection_string(""))
        .unwrap()
        .with_decoder(Arc::new(MockRowDecoder::new()))
}

#[tokio::test]
async fn test_execute_reader_returns_rows() {
    let server = StubServer::start(|_| StubResponse::ok("1\ta\n2\tb\n")).await;
    let conn = connect(&server);

    let mut cmd = Command::on(&conn, "SELECT n, s FROM t;");
    let rows = cmd.execute_reader().await.unwrap().collect_rows().await.unwrap();

    assert_eq!(
        rows,
        vec![
            vec![Value::from("1"), Value::from("a")],
            vec![Value::from("2"), Value::from("b")],
        ]
    );
    let requests = server.requests();
    assert_eq!(
        requests[0].sql(),
        "SELECT n, s FROM t FORMAT RowBinaryWithNamesAndTypes"
    );
}

#[tokio::test]
async fn test_single_row_shape_appends_limit() {
    let server = StubServer::start(|_| StubResponse::ok("1\n")).await;
    let conn = connect(&server);

    let mut cmd = Command::on(&conn, "SELECT 1");
    let mut reader = cmd
        .execute_reader_with(CommandShape::SingleRow)
        .await
        .unwrap();
    assert_eq!(reader.next().await.unwrap().unwrap(), vec![Value::from("1")]);
    assert!(reader.next().await.is_none());
    assert_eq!(reader.rows_read(), 1);

    let requests = server.requests();
    assert_eq!(
        requests[0].sql(),
        "SELECT 1 LIMIT 1 FORMAT RowBinaryWithNamesAndTypes"
    );
}

#[tokio::test]
async fn test_schema_only_shape_appends_limit_zero() {
    let server = StubServer::start(|_| StubResponse::ok("")).await;
    let conn = connect(&server);

    let mut cmd = Command::on(&conn, "SELECT * FROM t");
    let rows = cmd
        .execute_reader_with(CommandShape::SchemaOnly)
        .await
        .unwrap()
        .collect_rows()
        .await
        .unwrap();

    assert!(rows.is_empty());
    let requests = server.requests();
    assert_eq!(
        requests[0].sql(),
        "SELECT * FROM t LIMIT 0 FORMAT RowBinaryWithNamesAndTypes"
    );
}

#[tokio::test]
async fn test_execute_scalar() {
    let server = StubServer::start(|_| StubResponse::ok("42\tignored\n7\n")).await;
    let conn = connect(&server);

    let value = Command::on(&conn, "SELECT count(), 'x' FROM t")
        .execute_scalar()
        .await
        .unwrap();

    assert_eq!(value, Some(Value::from("42")));
}

#[tokio::test]
async fn test_execute_scalar_on_empty_result() {
    let server = StubServer::start(|_| StubResponse::ok("")).await;
    let conn = connect(&server);

    let value = Command::on(&conn, "SELECT 1 WHERE 0")
        .execute_scalar()
        .await
        .unwrap();

    assert_eq!(value, None);
}

#[tokio::test]
async fn test_execute_non_query_reads_count() {
    let server = StubServer::start(|_| StubResponse::ok("3\n")).await;
    let conn = connect(&server);

    let mut cmd = Command::on(&conn, "INSERT INTO t VALUES (1), (2), (3)");
    assert_eq!(cmd.execute_non_query().await.unwrap(), 3);

    // Statements run as sent, with no format directive.
    let requests = server.requests();
    assert_eq!(requests[0].sql(), "INSERT INTO t VALUES (1), (2), (3)");
}

#[tokio::test]
async fn test_execute_raw_returns_body() {
    let server = StubServer::start(|_| StubResponse::ok("name\tvalue\nx\t1\n")).await;
    let conn = connect(&server);

    let body = Command::on(&conn, "SELECT * FROM settings FORMAT TSVWithNames")
        .execute_raw()
        .await
        .unwrap();

    assert_eq!(body, "name\tvalue\nx\t1\n");
}

#[tokio::test]
async fn test_query_stats_from_summary_header() {
    let server = StubServer::start(|_| {
        StubResponse::ok("1\n2\n").header("X-ClickHouse-Summary", SUMMARY)
    })
    .await;
    let conn = connect(&server);

    let mut cmd = Command::on(&conn, "SELECT number FROM numbers(2)");
    assert_eq!(cmd.query_stats(), None);
    let reader = cmd.execute_reader().await.unwrap();

    let stats = cmd.query_stats().unwrap();
    assert_eq!(stats.read_rows, 10);
    assert_eq!(stats.read_bytes, 80);
    assert_eq!(stats.result_rows, 2);
    assert_eq!(reader.stats(), Some(stats));
}

#[tokio::test]
async fn test_cancel_before_send() {
    let server = StubServer::start(|_| StubResponse::ok("1\n")).await;
    let conn = connect(&server);

    let mut cmd = Command::on(&conn, "SELECT 1");
    cmd.cancel();

    assert!(matches!(
        cmd.execute_non_query().await,
        Err(ChError::Cancelled)
    ));
    assert!(server.requests().is_empty());
}

#[tokio::test]
async fn test_cancel_during_send() {
    let server =
        StubServer::start(|_| StubResponse::ok("1\n").delayed(Duration::from_secs(2))).await;
    let conn = connect(&server);

    let mut cmd = Command::on(&conn, "SELECT sleep(2)");
    let token = cmd.cancellation_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();
    });

    let started = std::time::Instant::now();
    assert!(matches!(
        cmd.execute_non_query().await,
        Err(ChError::Cancelled)
    ));
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_cancel_only_affects_own_command() {
    let server = StubServer::start(|_| StubResponse::ok("1\n")).await;
    let conn = connect(&server);

    let mut cancelled = Command::on(&conn, "SELECT 1");
    let mut other = Command::on(&conn, "SELECT 2");
    cancelled.cancel();

    assert!(cancelled.execute_non_query().await.is_err());
    assert_eq!(other.execute_non_query().await.unwrap(), 1);
}

#[tokio::test]
async fn test_fresh_token_allows_rerun() {
    let server = StubServer::start(|_| StubResponse::ok("1\n")).await;
    let conn = connect(&server);

    let mut cmd = Command::on(&conn, "SELECT 1");
    cmd.cancel();
    assert!(cmd.execute_non_query().await.is_err());

    cmd.set_cancellation_token(Default::default());
    assert_eq!(cmd.execute_non_query().await.unwrap(), 1);
}

#[tokio::test]
async fn test_reader_into_stream() {
    let server = StubServer::start(|_| StubResponse::ok("a\nb\nc\n")).await;
    let conn = connect(&server);

    let mut cmd = Command::on(&conn, "SELECT s FROM t");
    let values: Vec<Value> = cmd
        .execute_reader()
        .await
        .unwrap()
        .into_stream()
        .map(|row| row.unwrap().remove(0))
        .collect()
        .await;

    assert_eq!(
        values,
        vec![Value::from("a"), Value::from("b"), Value::from("c")]
    );
}

#[tokio::test]
async fn test_parameterized_reader_uses_native_parameters() {
    let server = StubServer::clickhouse("23.3.1.1", |_| StubResponse::ok("x\n")).await;
    let conn = connect(&server);

    let mut cmd = Command::on(&conn, "SELECT s FROM t WHERE id = {id:UUID}").bind(
        "id",
        "UUID",
        uuid::Uuid::nil(),
    );
    let rows = cmd.execute_reader().await.unwrap().collect_rows().await.unwrap();

    assert_eq!(rows.len(), 1);
    let queries = server.queries();
    assert_eq!(
        queries[0].query_param("param_id").as_deref(),
        Some("00000000-0000-0000-0000-000000000000")
    );
    assert_eq!(
        queries[0].sql(),
        "SELECT s FROM t WHERE id = {id:UUID} FORMAT RowBinaryWithNamesAndTypes"
    );
}
