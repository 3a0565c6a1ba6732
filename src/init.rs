use crate::client::LogTideClient;
use crate::layer::LogTideLayer;
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::Registry;

/// Configuration of the `tracing` bridge.
///
/// **Fields**
/// - `service`: service name stamped on every forwarded record.
/// - `min_level`: least severe level that is forwarded.
/// - `enable_stdout`: if `true`, a `tracing_subscriber::fmt::Layer` is
///   installed alongside the bridge so events are also printed.
#[derive(Clone, Debug)]
pub struct LayerConfig {
    pub service: String,
    pub min_level: Level,
    pub enable_stdout: bool,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            service: "app".to_string(),
            min_level: Level::INFO,
            enable_stdout: true,
        }
    }
}

/// Install a global subscriber that forwards `tracing` events into
/// `client` according to `config`.
///
/// **Returns**
/// - `Err(TryInitError)` if a global subscriber is already installed.
pub fn init_tracing_with_config(
    client: Arc<LogTideClient>,
    config: LayerConfig,
) -> Result<(), TryInitError> {
    let layer = LogTideLayer::new(client, config.service, config.min_level);
    let fmt_layer = config.enable_stdout.then(tracing_subscriber::fmt::layer);

    Registry::default().with(layer).with(fmt_layer).try_init()
}

/// Equivalent to [`init_tracing_with_config`] with
/// [`LayerConfig::default`].
pub fn init_tracing(client: Arc<LogTideClient>) -> Result<(), TryInitError> {
    init_tracing_with_config(client, LayerConfig::default())
}
