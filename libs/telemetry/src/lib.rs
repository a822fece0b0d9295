//! Telemetry plumbing shared by the bot binaries: subscriber installation,
//! optional OTLP export, and label-aware metric helpers on the `metrics` facade.
//! When export is on, facade metrics are bridged to the OTLP meter provider.

use anyhow::Result;

mod config;
mod context;
mod metrics;
mod pipeline;
mod recorder;

pub use config::{TelemetryConfig, TelemetryProtocol};
pub use context::TelemetryLabels;
pub use metrics::{record_counter, record_histogram, with_turn_fields};
pub use pipeline::{init_telemetry, shutdown_telemetry};
pub use recorder::OtelRecorder;

/// Installs the process-wide subscriber configured from `RUST_LOG`,
/// `LOG_FORMAT` and the `OTEL_*` variables.
pub fn install(service_name: &str) -> Result<()> {
    init_telemetry(TelemetryConfig::from_env(
        service_name,
        env!("CARGO_PKG_VERSION"),
    ))
}
