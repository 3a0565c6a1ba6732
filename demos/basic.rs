use logtide::{ClientOptions, LogLevel, LogTideClient, Metadata};
use serde_json::json;
use std::time::Duration;

#[tokio::main]
async fn main() {
    let mut global = Metadata::new();
    global.insert("env".to_string(), json!("production"));
    global.insert("version".to_string(), json!("1.0.0"));

    let client = LogTideClient::new(ClientOptions {
        batch_size: 50,
        flush_interval: Duration::from_secs(3),
        global_metadata: global,
        ..ClientOptions::new("http://localhost:8080", "lp_your_api_key_here")
    })
    .expect("valid client options");

    let mut metadata = Metadata::new();
    metadata.insert("port".to_string(), json!(3000));
    client.log(LogLevel::Info, "api-gateway", "Server started", metadata);
    client.warn("cache", "Cache miss");

    let cause = std::io::Error::new(std::io::ErrorKind::TimedOut, "database connection timeout");
    client.error_with_cause("database", "Connection failed", &cause);

    client
        .with_trace_id("request-123", async {
            client.info("api", "Processing request");
            client.info("database", "Querying users");
            client.info("api", "Sending response");
        })
        .await;

    match client.flush().await {
        Ok(report) => println!("flushed {} logs", report.sent),
        Err(e) => println!("flush incomplete: {e}"),
    }

    let metrics = client.get_metrics();
    println!(
        "sent={} dropped={} errors={} retries={} avg_latency={:.1}ms breaker={}",
        metrics.logs_sent,
        metrics.logs_dropped,
        metrics.errors,
        metrics.retries,
        metrics.avg_latency_ms,
        client.get_circuit_breaker_state()
    );

    client.close().await;
}
