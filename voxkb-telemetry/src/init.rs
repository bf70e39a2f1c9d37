use std::sync::Arc;

use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use crate::memory::{InMemoryLogLayer, SharedLogStorage};

/// Errors raised while installing the global subscriber.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// A global subscriber was already installed in this process.
    #[error("telemetry already initialized: {0}")]
    AlreadyInitialized(String),

    /// The log filter directive could not be parsed.
    #[error("invalid log filter '{filter}': {message}")]
    InvalidFilter { filter: String, message: String },
}

/// How logs are filtered, formatted, and captured.
#[derive(Debug, Clone)]
pub struct TelemetryOptions {
    /// Reported once at startup so interleaved logs can be told apart.
    pub service_name: String,
    /// Filter used when `RUST_LOG` is unset.
    pub default_filter: String,
    /// Emit one JSON object per line instead of human-readable text.
    pub json: bool,
    /// Also capture conversation-scoped events in memory.
    pub storage: Option<Arc<SharedLogStorage>>,
}

impl TelemetryOptions {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            default_filter: "info".to_string(),
            json: false,
            storage: None,
        }
    }

    pub fn with_default_filter(mut self, filter: impl Into<String>) -> Self {
        self.default_filter = filter.into();
        self
    }

    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }

    pub fn with_storage(mut self, storage: Arc<SharedLogStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    fn env_filter(&self) -> Result<EnvFilter, TelemetryError> {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return Ok(filter);
        }
        EnvFilter::try_new(&self.default_filter).map_err(|e| TelemetryError::InvalidFilter {
            filter: self.default_filter.clone(),
            message: e.to_string(),
        })
    }
}

/// Install human-readable logging filtered by `RUST_LOG` (default `info`).
pub fn init_telemetry(service_name: &str) -> Result<(), TelemetryError> {
    init_with_options(TelemetryOptions::new(service_name))
}

/// Install logging plus in-memory capture into `storage`.
pub fn init_with_storage(
    service_name: &str,
    storage: Arc<SharedLogStorage>,
) -> Result<(), TelemetryError> {
    init_with_options(TelemetryOptions::new(service_name).with_storage(storage))
}

/// Install the global subscriber described by `options`.
///
/// Only one subscriber can be installed per process; later calls return
/// [`TelemetryError::AlreadyInitialized`].
pub fn init_with_options(options: TelemetryOptions) -> Result<(), TelemetryError> {
    let filter = options.env_filter()?;

    // stdout is reserved for command output
    let text_layer =
        (!options.json).then(|| fmt::layer().with_target(false).with_writer(std::io::stderr));
    let json_layer = options
        .json
        .then(|| fmt::layer().json().with_current_span(true).with_writer(std::io::stderr));
    let capture_layer = options.storage.clone().map(InMemoryLogLayer::new);

    tracing_subscriber::registry()
        .with(filter)
        .with(text_layer)
        .with(json_layer)
        .with(capture_layer)
        .try_init()
        .map_err(|e| TelemetryError::AlreadyInitialized(e.to_string()))?;

    tracing::info!(service = %options.service_name, json = options.json, "telemetry initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_builder() {
        let storage = Arc::new(SharedLogStorage::new());
        let options = TelemetryOptions::new("voxkb")
            .with_default_filter("voxkb_rag=debug")
            .with_json(true)
            .with_storage(storage);
        assert_eq!(options.service_name, "voxkb");
        assert!(options.json);
        assert!(options.storage.is_some());
    }

    #[test]
    fn bad_filter_is_rejected() {
        let options = TelemetryOptions::new("voxkb").with_default_filter("voxkb=notalevel");
        if std::env::var("RUST_LOG").is_err() {
            assert!(matches!(options.env_filter(), Err(TelemetryError::InvalidFilter { .. })));
        }
    }

    #[tokio::test]
    async fn second_init_fails_and_capture_works() {
        let storage = Arc::new(SharedLogStorage::new());
        let first = init_with_storage("voxkb-test", storage.clone());
        let second = init_telemetry("voxkb-test");
        assert!(matches!(second, Err(TelemetryError::AlreadyInitialized(_))));

        if first.is_ok() && std::env::var("RUST_LOG").is_err() {
            tracing::info!(conversation_id = "global", "captured through the global subscriber");
            assert_eq!(storage.records_for("global").len(), 1);
        }
    }
}
