#![cfg(feature = "http")]

use logtide::http::HttpTransport;
use logtide::record::{LogLevel, LogRecord};
use logtide::transport::{Transport, TransportError};
use logtide::{ClientError, ClientOptions, LogTideClient};
use mockito::{Matcher, Server};
use std::sync::Arc;
use std::time::Duration;

fn batch() -> Vec<Arc<LogRecord>> {
    vec![
        Arc::new(
            LogRecord::new(LogLevel::Info, "api-gateway", "Server started")
                .with_trace_id(Some("req-1".to_string())),
        ),
        Arc::new(LogRecord::new(LogLevel::Warn, "cache", "Cache miss")),
    ]
}

#[tokio::test]
async fn posts_batch_with_api_key() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/api/v1/ingest")
        .match_header("x-api-key", "lp_test")
        .match_header("content-type", "application/json")
        .match_body(Matcher::AllOf(vec![
            Matcher::Regex(r#"^\{"logs":\["#.to_string()),
            Matcher::Regex(r#""service":"api-gateway","level":"info","message":"Server started""#.to_string()),
            Matcher::Regex(r#""trace_id":"req-1""#.to_string()),
            Matcher::Regex(r#""service":"cache","level":"warn","message":"Cache miss""#.to_string()),
        ]))
        .with_status(202)
        .create_async()
        .await;

    let transport = HttpTransport::new(&ClientOptions::new(server.url(), "lp_test")).unwrap();
    transport.send_batch(&batch()).await.unwrap();

    mock.assert_async().await;
}

#[tokio::test]
async fn server_errors_are_retryable() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/api/v1/ingest")
        .with_status(503)
        .with_body("overloaded")
        .create_async()
        .await;

    let transport = HttpTransport::new(&ClientOptions::new(server.url(), "lp_test")).unwrap();
    let err = transport.send_batch(&batch()).await.unwrap_err();

    assert!(err.is_retryable());
    assert!(err.to_string().contains("overloaded"));
}

#[tokio::test]
async fn auth_failures_are_not_retryable() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/api/v1/ingest")
        .with_status(401)
        .create_async()
        .await;

    let transport = HttpTransport::new(&ClientOptions::new(server.url(), "bad_key")).unwrap();
    let err = transport.send_batch(&batch()).await.unwrap_err();

    assert!(matches!(err, TransportError::NonRetryable(_)));
}

#[tokio::test]
async fn unreachable_endpoint_is_retryable() {
    let transport = HttpTransport::new(&ClientOptions::new("http://127.0.0.1:9", "lp_test")).unwrap();
    let err = transport.send_batch(&batch()).await.unwrap_err();
    assert!(err.is_retryable());
}

#[tokio::test]
async fn client_retries_server_errors_over_http() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/api/v1/ingest")
        .with_status(500)
        .expect(2)
        .create_async()
        .await;

    let client = LogTideClient::new(ClientOptions {
        max_retries: 1,
        retry_delay: Duration::from_millis(10),
        flush_interval: Duration::from_secs(3600),
        ..ClientOptions::new(server.url(), "lp_test")
    })
    .unwrap();

    client.info("api", "request handled");
    let result = client.flush().await;

    assert_eq!(result, Err(ClientError::Incomplete { sent: 0, dropped: 1 }));
    assert_eq!(client.get_metrics().retries, 1);
    mock.assert_async().await;
    client.close().await;
}

#[tokio::test]
async fn client_delivers_over_http() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/api/v1/ingest")
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    let client = LogTideClient::new(ClientOptions {
        flush_interval: Duration::from_secs(3600),
        ..ClientOptions::new(server.url(), "lp_test")
    })
    .unwrap();

    client.info("api", "one");
    client.info("api", "two");
    let report = client.flush().await.unwrap();

    assert_eq!(report.sent, 2);
    assert_eq!(client.get_metrics().logs_sent, 2);
    mock.assert_async().await;
    client.close().await;
}
