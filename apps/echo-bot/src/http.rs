use std::sync::Arc;

use axum::{
    Extension,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use echo_core::{Activity, BufferedSender, ConnectorSender, SharedSender, TurnContext, run_turn};
use echo_ingress_common::{
    RequestId, Transport, accepted, expected_replies, record_turn, start_turn_span,
};
use metrics::counter;
use security::Identity;
use tokio::time::Instant;
use tracing::{Instrument, debug, warn};

use crate::AppState;

/// One HTTP request, one turn.
///
/// Replies travel back in the response body unless the activity names a
/// `serviceUrl` the connector can reach and the caller did not ask for
/// `expectReplies`; in that case they are posted to the channel and the
/// response is an empty 200.
pub async fn handle_activity(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Extension(request_id): Extension<RequestId>,
    body: Bytes,
) -> Response {
    let activity: Activity = match serde_json::from_slice(&body) {
        Ok(activity) => activity,
        Err(err) => {
            warn!(request_id = %request_id.0, error = %err, "rejected malformed activity");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    if !identity.vouches_for(activity.service_url.as_deref()) {
        warn!(
            request_id = %request_id.0,
            claimed = identity.service_url().unwrap_or_default(),
            service_url = activity.service_url.as_deref().unwrap_or_default(),
            "serviceUrl does not match token claim"
        );
        counter!("bot_auth_rejections_total", "reason" => "service_url_mismatch").increment(1);
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let connector = state
        .connector
        .clone()
        .filter(|_| activity.service_url.is_some() && !activity.expects_replies());
    let buffer = BufferedSender::new();
    let sender: SharedSender = match &connector {
        Some(client) => Arc::new(ConnectorSender::new(client.clone())),
        None => Arc::new(buffer.clone()),
    };

    let span = start_turn_span(Transport::Http, &activity);
    let started = Instant::now();
    let mut ctx = TurnContext::new(activity, sender);
    let outcome = run_turn(&mut ctx, state.handler.as_ref(), state.boundary.as_ref())
        .instrument(span)
        .await;
    record_turn(Transport::Http, outcome, started.elapsed());
    debug!(request_id = %request_id.0, outcome = outcome.as_str(), "http turn finished");

    if connector.is_some() {
        accepted()
    } else {
        expected_replies(buffer.take().await)
    }
}
