use crate::options::{ClientOptions, ConfigError};
use crate::record::{LogLevel, LogRecord, Metadata};
use crate::transport::{Transport, TransportError};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Per-request timeout for ingestion calls.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const INGEST_PATH: &str = "/api/v1/ingest";
const API_KEY_HEADER: &str = "X-API-Key";

/// [`Transport`] that posts batches to the LogTide HTTP ingestion API.
///
/// Each batch becomes one `POST {api_url}/api/v1/ingest` with a JSON body
/// of the form `{"logs": [...]}`, authenticated by the `X-API-Key` header.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl HttpTransport {
    /// Construct a transport for the endpoint and key in `options`.
    ///
    /// **Returns**
    /// - `Err(ConfigError::Transport)` if the underlying HTTP client could
    ///   not be built (e.g. TLS backend initialisation failed).
    pub fn new(options: &ClientOptions) -> Result<Self, ConfigError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ConfigError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: format!("{}{}", options.api_url.trim_end_matches('/'), INGEST_PATH),
            api_key: options.api_key.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn map_record(record: &LogRecord) -> IngestLog<'_> {
        let metadata = match &record.error {
            Some(error) => {
                let mut metadata = record.metadata.clone();
                metadata.insert(
                    "error".to_string(),
                    serde_json::to_value(error).unwrap_or(serde_json::Value::Null),
                );
                std::borrow::Cow::Owned(metadata)
            }
            None => std::borrow::Cow::Borrowed(&record.metadata),
        };

        IngestLog {
            time: record.timestamp.to_rfc3339(),
            service: &record.service,
            level: record.level,
            message: &record.message,
            metadata,
            trace_id: record.trace_id.as_deref(),
        }
    }
}

#[derive(Serialize)]
struct IngestRequest<'a> {
    logs: Vec<IngestLog<'a>>,
}

#[derive(Serialize)]
struct IngestLog<'a> {
    time: String,
    service: &'a str,
    level: LogLevel,
    message: &'a str,
    metadata: std::borrow::Cow<'a, Metadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    trace_id: Option<&'a str>,
}

/// Map an HTTP status to the retry classification used by the engine.
fn classify_status(status: StatusCode) -> Option<bool> {
    if status.is_success() {
        None
    } else {
        Some(
            status.is_server_error()
                || status == StatusCode::REQUEST_TIMEOUT
                || status == StatusCode::TOO_MANY_REQUESTS,
        )
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send_batch(&self, batch: &[Arc<LogRecord>]) -> Result<(), TransportError> {
        let body = IngestRequest {
            logs: batch.iter().map(|r| Self::map_record(r)).collect(),
        };

        let resp = self
            .client
            .post(&self.endpoint)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_builder() {
                    TransportError::NonRetryable(e.to_string())
                } else {
                    TransportError::Retryable(e.to_string())
                }
            })?;

        let status = resp.status();
        match classify_status(status) {
            None => Ok(()),
            Some(retryable) => {
                let text = resp.text().await.unwrap_or_else(|_| "<no body>".to_string());
                let message = format!("ingest failed with status {}: {}", status, text);
                if retryable {
                    Err(TransportError::Retryable(message))
                } else {
                    Err(TransportError::NonRetryable(message))
                }
            }
        }
    }
}
