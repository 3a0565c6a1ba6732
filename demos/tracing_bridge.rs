use logtide::init::{init_tracing_with_config, LayerConfig};
use logtide::{ClientOptions, LogTideClient};
use std::sync::Arc;
use tracing::{error, info, Level};

#[tokio::main]
async fn main() {
    let options = ClientOptions::from_env()
        .unwrap_or_else(|_| ClientOptions::new("http://localhost:8080", "lp_your_api_key_here"));
    let client = Arc::new(LogTideClient::new(options).expect("valid client options"));

    init_tracing_with_config(
        Arc::clone(&client),
        LayerConfig {
            service: "auth-service".to_string(),
            min_level: Level::INFO,
            enable_stdout: true,
        },
    )
    .expect("no other global subscriber");

    info!("starting service");
    error!(user_id = 42, reason = "invalid password", "authentication failed");

    client.close().await;
}
