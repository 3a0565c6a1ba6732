pub mod record;
pub mod trace;
pub mod metrics;
pub mod buffer;
pub mod circuit_breaker;
pub mod transport;

#[cfg(feature = "http")]
pub mod http;

pub mod delivery;
pub mod scheduler;
pub mod options;
pub mod env;
pub mod client;
pub mod layer;
pub mod init;

pub use client::{ClientError, LogTideClient};
pub use options::{ClientOptions, ConfigError};
pub use record::{LogLevel, LogRecord, Metadata};
