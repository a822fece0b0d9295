use ::metrics::Label;
use tracing::Span;

use crate::context::TelemetryLabels;

/// Records the conversation coordinates on a span declared with those fields.
pub fn with_turn_fields(
    span: &Span,
    channel_id: Option<&str>,
    conversation_id: Option<&str>,
    activity_type: &str,
) {
    span.record("activity_type", tracing::field::display(activity_type));
    if let Some(channel_id) = channel_id {
        span.record("channel_id", tracing::field::display(channel_id));
    }
    if let Some(conversation_id) = conversation_id {
        span.record("conversation_id", tracing::field::display(conversation_id));
    }
}

fn labels(labels: &TelemetryLabels) -> Vec<Label> {
    labels
        .tags()
        .into_iter()
        .map(|(key, value)| Label::new(key, value))
        .collect()
}

pub fn record_counter(name: &'static str, value: u64, tags: &TelemetryLabels) {
    ::metrics::counter!(name, labels(tags)).increment(value);
}

pub fn record_histogram(name: &'static str, value: f64, tags: &TelemetryLabels) {
    ::metrics::histogram!(name, labels(tags)).record(value);
}
