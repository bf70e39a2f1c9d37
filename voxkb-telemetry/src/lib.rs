//! # voxkb-telemetry
//!
//! Logging setup for voxkb binaries and tests.
//!
//! [`init_telemetry`] installs a `tracing` subscriber filtered by `RUST_LOG`;
//! [`init_with_options`] adds JSON output and in-memory capture of
//! conversation-scoped events through [`InMemoryLogLayer`].
//!
//! ```rust,ignore
//! voxkb_telemetry::init_with_options(
//!     TelemetryOptions::new("voxkb").with_json(true),
//! )?;
//! ```

mod init;
pub mod memory;

pub use init::{
    TelemetryError, TelemetryOptions, init_telemetry, init_with_options, init_with_storage,
};
pub use memory::{InMemoryLogLayer, LogRecord, SharedLogStorage};
