//! Forwards the `metrics` facade (`counter!`, `histogram!`, `gauge!`) to an
//! OpenTelemetry meter so the call sites stay exporter-agnostic.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use ::metrics::{
    Counter, CounterFn, Gauge, GaugeFn, Histogram, HistogramFn, Key, KeyName, Metadata, Recorder,
    SharedString, Unit,
};
use opentelemetry::KeyValue;
use opentelemetry::metrics::Meter;

struct OtelCounter {
    inner: opentelemetry::metrics::Counter<u64>,
    attributes: Vec<KeyValue>,
    total: Mutex<u64>,
}

impl CounterFn for OtelCounter {
    fn increment(&self, value: u64) {
        *self.total.lock().unwrap_or_else(PoisonError::into_inner) += value;
        self.inner.add(value, &self.attributes);
    }

    fn absolute(&self, value: u64) {
        let mut total = self.total.lock().unwrap_or_else(PoisonError::into_inner);
        if value > *total {
            self.inner.add(value - *total, &self.attributes);
            *total = value;
        }
    }
}

struct OtelGauge {
    inner: opentelemetry::metrics::Gauge<f64>,
    attributes: Vec<KeyValue>,
    current: Mutex<f64>,
}

impl OtelGauge {
    fn update(&self, apply: impl FnOnce(f64) -> f64) {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        *current = apply(*current);
        self.inner.record(*current, &self.attributes);
    }
}

impl GaugeFn for OtelGauge {
    fn increment(&self, value: f64) {
        self.update(|current| current + value);
    }

    fn decrement(&self, value: f64) {
        self.update(|current| current - value);
    }

    fn set(&self, value: f64) {
        self.update(|_| value);
    }
}

struct OtelHistogram {
    inner: opentelemetry::metrics::Histogram<f64>,
    attributes: Vec<KeyValue>,
}

impl HistogramFn for OtelHistogram {
    fn record(&self, value: f64) {
        self.inner.record(value, &self.attributes);
    }
}

#[derive(Default)]
struct Handles {
    counters: HashMap<Key, Arc<OtelCounter>>,
    gauges: HashMap<Key, Arc<OtelGauge>>,
    histograms: HashMap<Key, Arc<OtelHistogram>>,
}

/// [`Recorder`] backed by an OpenTelemetry [`Meter`]. One instrument handle is
/// kept per metric key (name plus labels).
pub struct OtelRecorder {
    meter: Meter,
    handles: Mutex<Handles>,
}

impl OtelRecorder {
    pub fn new(meter: Meter) -> Self {
        Self {
            meter,
            handles: Mutex::new(Handles::default()),
        }
    }

    fn handles(&self) -> std::sync::MutexGuard<'_, Handles> {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn attributes(key: &Key) -> Vec<KeyValue> {
    key.labels()
        .map(|label| KeyValue::new(label.key().to_string(), label.value().to_string()))
        .collect()
}

impl Recorder for OtelRecorder {
    // Descriptions are not forwarded; instruments are created on first use.
    fn describe_counter(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

    fn describe_gauge(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

    fn describe_histogram(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

    fn register_counter(&self, key: &Key, _metadata: &Metadata<'_>) -> Counter {
        let handle = self
            .handles()
            .counters
            .entry(key.clone())
            .or_insert_with(|| {
                Arc::new(OtelCounter {
                    inner: self.meter.u64_counter(key.name().to_string()).build(),
                    attributes: attributes(key),
                    total: Mutex::new(0),
                })
            })
            .clone();
        Counter::from_arc(handle)
    }

    fn register_gauge(&self, key: &Key, _metadata: &Metadata<'_>) -> Gauge {
        let handle = self
            .handles()
            .gauges
            .entry(key.clone())
            .or_insert_with(|| {
                Arc::new(OtelGauge {
                    inner: self.meter.f64_gauge(key.name().to_string()).build(),
                    attributes: attributes(key),
                    current: Mutex::new(0.0),
                })
            })
            .clone();
        Gauge::from_arc(handle)
    }

    fn register_histogram(&self, key: &Key, _metadata: &Metadata<'_>) -> Histogram {
        let handle = self
            .handles()
            .histograms
            .entry(key.clone())
            .or_insert_with(|| {
                Arc::new(OtelHistogram {
                    inner: self.meter.f64_histogram(key.name().to_string()).build(),
                    attributes: attributes(key),
                })
            })
            .clone();
        Histogram::from_arc(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{TelemetryLabels, record_counter, record_histogram};
    use opentelemetry::metrics::MeterProvider as _;
    use opentelemetry_sdk::metrics::data::{AggregatedMetrics, MetricData};
    use opentelemetry_sdk::metrics::{InMemoryMetricExporter, PeriodicReader, SdkMeterProvider};

    fn provider() -> (SdkMeterProvider, InMemoryMetricExporter) {
        let exporter = InMemoryMetricExporter::default();
        let provider = SdkMeterProvider::builder()
            .with_reader(PeriodicReader::builder(exporter.clone()).build())
            .build();
        (provider, exporter)
    }

    fn counter_total(exporter: &InMemoryMetricExporter, name: &str) -> u64 {
        let exported = exporter.get_finished_metrics().unwrap();
        exported
            .iter()
            .flat_map(|resource| resource.scope_metrics())
            .flat_map(|scope| scope.metrics())
            .filter(|metric| metric.name() == name)
            .map(|metric| match metric.data() {
                AggregatedMetrics::U64(MetricData::Sum(sum)) => {
                    sum.data_points().map(|point| point.value()).sum::<u64>()
                }
                _ => 0,
            })
            .sum()
    }

    fn exported_names(exporter: &InMemoryMetricExporter) -> Vec<String> {
        exporter
            .get_finished_metrics()
            .unwrap()
            .iter()
            .flat_map(|resource| resource.scope_metrics())
            .flat_map(|scope| scope.metrics())
            .map(|metric| metric.name().to_string())
            .collect()
    }

    #[test]
    fn facade_counters_reach_the_meter() {
        let (provider, exporter) = provider();
        let recorder = OtelRecorder::new(provider.meter("echo-bot-test"));

        ::metrics::with_local_recorder(&recorder, || {
            ::metrics::counter!("bot_auth_rejections_total", "reason" => "invalid").increment(1);
            ::metrics::counter!("bot_auth_rejections_total", "reason" => "invalid").increment(2);
        });
        provider.force_flush().unwrap();

        assert_eq!(counter_total(&exporter, "bot_auth_rejections_total"), 3);
    }

    #[test]
    fn labelled_helpers_record_through_the_recorder() {
        let (provider, exporter) = provider();
        let recorder = OtelRecorder::new(provider.meter("echo-bot-test"));
        let labels = TelemetryLabels::new("http").with("outcome", "ok");

        ::metrics::with_local_recorder(&recorder, || {
            record_counter("bot_turns_total", 1, &labels);
            record_histogram("bot_turn_duration_seconds", 0.25, &labels);
        });
        provider.force_flush().unwrap();

        assert_eq!(counter_total(&exporter, "bot_turns_total"), 1);
        assert!(
            exported_names(&exporter)
                .iter()
                .any(|name| name == "bot_turn_duration_seconds")
        );
    }

    #[test]
    fn absolute_counter_only_moves_forward() {
        let (provider, exporter) = provider();
        let recorder = OtelRecorder::new(provider.meter("echo-bot-test"));

        ::metrics::with_local_recorder(&recorder, || {
            let counter = ::metrics::counter!("bot_frames_total");
            counter.absolute(5);
            counter.absolute(3);
            counter.increment(1);
        });
        provider.force_flush().unwrap();

        assert_eq!(counter_total(&exporter, "bot_frames_total"), 6);
    }
}
