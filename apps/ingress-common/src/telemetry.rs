use std::time::Duration;

use echo_core::{Activity, TurnOutcome};
use echo_telemetry::{TelemetryLabels, record_counter, record_histogram, with_turn_fields};
use tracing::Span;

const TURN_COUNTER: &str = "bot_turns_total";
const TURN_DURATION: &str = "bot_turn_duration_seconds";
const FRAME_REJECTED_COUNTER: &str = "bot_frames_rejected_total";
const TURN_SPAN_NAME: &str = "turn.handle";

/// Transport a turn arrived on, used as a span field and metric label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Http,
    WebSocket,
}

impl Transport {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transport::Http => "http",
            Transport::WebSocket => "websocket",
        }
    }
}

/// Span wrapping one turn. Enter it (or `.instrument` the turn future) so the
/// handler's and the error boundary's events carry the conversation fields.
pub fn start_turn_span(transport: Transport, activity: &Activity) -> Span {
    let span = tracing::info_span!(
        TURN_SPAN_NAME,
        transport = transport.as_str(),
        channel_id = tracing::field::Empty,
        conversation_id = tracing::field::Empty,
        activity_type = tracing::field::Empty,
    );
    with_turn_fields(
        &span,
        activity.channel_id.as_deref(),
        activity.conversation_id(),
        &activity.r#type,
    );
    span
}

/// Turn metrics are labelled by transport and outcome only.
pub fn record_turn(transport: Transport, outcome: TurnOutcome, elapsed: Duration) {
    let labels = TelemetryLabels::new(transport.as_str());
    record_histogram(TURN_DURATION, elapsed.as_secs_f64(), &labels);
    record_counter(TURN_COUNTER, 1, &labels.with("outcome", outcome.as_str()));
}

/// A WebSocket frame that did not decode into an activity.
pub fn record_frame_rejected() {
    record_counter(
        FRAME_REJECTED_COUNTER,
        1,
        &TelemetryLabels::new(Transport::WebSocket.as_str()),
    );
}
