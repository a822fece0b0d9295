use std::sync::OnceLock;
use std::time::Duration;

use anyhow::Result;
use opentelemetry::metrics::MeterProvider as _;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{InstrumentationScope, KeyValue, global};
use opentelemetry_otlp::{MetricExporter, SpanExporter, WithExportConfig};
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::{SdkTracer, SdkTracerProvider};
use tracing::{info, warn};
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{TelemetryConfig, TelemetryProtocol};
use crate::recorder::OtelRecorder;

const METRIC_EXPORT_INTERVAL: Duration = Duration::from_secs(15);

/// Providers owned by the process once OTLP export is on.
struct Exporters {
    tracer: SdkTracerProvider,
    meter: SdkMeterProvider,
}

static INSTALLED: OnceLock<Option<Exporters>> = OnceLock::new();

/// Installs the subscriber once per process; later calls are no-ops.
///
/// With OTLP export enabled, spans go to the collector through the
/// `tracing-opentelemetry` layer and everything recorded on the `metrics`
/// facade is forwarded to the OTLP meter provider.
pub fn init_telemetry(cfg: TelemetryConfig) -> Result<()> {
    if INSTALLED.get().is_some() {
        return Ok(());
    }

    let exporters = if cfg.exporter_enabled() {
        Some(Exporters {
            tracer: tracer_provider(&cfg)?,
            meter: meter_provider(&cfg)?,
        })
    } else {
        None
    };

    let tracer: Option<SdkTracer> = exporters
        .as_ref()
        .map(|exporters| exporters.tracer.tracer(cfg.service_name.clone()));
    let fmt_layer = if cfg.json_logs {
        tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt_layer)
        .with(tracer.map(OpenTelemetryLayer::new))
        .try_init()
        .ok();

    if let Some(exporters) = &exporters {
        global::set_tracer_provider(exporters.tracer.clone());
        global::set_text_map_propagator(TraceContextPropagator::new());
        global::set_meter_provider(exporters.meter.clone());

        let scope = InstrumentationScope::builder(cfg.service_name.clone())
            .with_version(cfg.service_version.clone())
            .build();
        let recorder = OtelRecorder::new(exporters.meter.meter_with_scope(scope));
        if ::metrics::set_global_recorder(recorder).is_err() {
            warn!("a metrics recorder was already installed; facade metrics are not exported");
        }
    }

    let otlp = exporters.is_some();
    INSTALLED.set(exporters).ok();
    info!(
        service = %cfg.service_name,
        version = %cfg.service_version,
        otlp,
        "telemetry initialised"
    );
    Ok(())
}

/// Flushes pending spans and metrics. Call once before the process exits.
pub fn shutdown_telemetry() {
    let Some(Some(exporters)) = INSTALLED.get() else {
        return;
    };
    if let Err(err) = exporters.tracer.shutdown() {
        warn!(error = %err, "span exporter shutdown failed");
    }
    if let Err(err) = exporters.meter.shutdown() {
        warn!(error = %err, "metric exporter shutdown failed");
    }
}

fn tracer_provider(cfg: &TelemetryConfig) -> Result<SdkTracerProvider> {
    let exporter = match cfg.protocol {
        TelemetryProtocol::Grpc => SpanExporter::builder()
            .with_tonic()
            .with_endpoint(cfg.endpoint.clone())
            .build()?,
        TelemetryProtocol::HttpProtobuf => SpanExporter::builder()
            .with_http()
            .with_endpoint(cfg.endpoint.clone())
            .build()?,
    };
    Ok(SdkTracerProvider::builder()
        .with_resource(resource(cfg))
        .with_batch_exporter(exporter)
        .build())
}

fn meter_provider(cfg: &TelemetryConfig) -> Result<SdkMeterProvider> {
    let exporter = match cfg.protocol {
        TelemetryProtocol::Grpc => MetricExporter::builder()
            .with_tonic()
            .with_endpoint(cfg.endpoint.clone())
            .build()?,
        TelemetryProtocol::HttpProtobuf => MetricExporter::builder()
            .with_http()
            .with_endpoint(cfg.endpoint.clone())
            .build()?,
    };
    let reader = PeriodicReader::builder(exporter)
        .with_interval(METRIC_EXPORT_INTERVAL)
        .build();
    Ok(SdkMeterProvider::builder()
        .with_resource(resource(cfg))
        .with_reader(reader)
        .build())
}

fn resource(cfg: &TelemetryConfig) -> Resource {
    Resource::builder_empty()
        .with_service_name(cfg.service_name.clone())
        .with_attributes([
            KeyValue::new("service.version", cfg.service_version.clone()),
            KeyValue::new("deployment.environment", cfg.environment.clone()),
        ])
        .build()
}
