use std::sync::Arc;
use std::time::{Duration, Instant};

use logtide::transport::NoopTransport;
use logtide::{ClientOptions, LogTideClient};

#[tokio::main]
async fn main() {
    let client = LogTideClient::with_transport(
        ClientOptions {
            batch_size: 1_000,
            max_buffer_size: 50_000,
            flush_interval: Duration::from_millis(200),
            ..ClientOptions::new("http://localhost:8080", "lp_load_test")
        },
        Arc::new(NoopTransport),
    )
    .expect("valid client options");

    let n: u64 = 100_000;
    let start = Instant::now();

    for i in 0..n {
        client.error("load", format!("load test error {i}"));
    }

    let elapsed = start.elapsed();
    println!(
        "enqueued {} records in {:?} (~{:.0} rec/s)",
        n,
        elapsed,
        n as f64 / elapsed.as_secs_f64()
    );

    client.close().await;
    let metrics = client.get_metrics();
    println!("sent={} dropped={}", metrics.logs_sent, metrics.logs_dropped);
}
