use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    Extension,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use echo_core::{Activity, ActivitySender, ResourceResponse, SendError, TurnContext, run_turn};
use echo_ingress_common::{Transport, record_frame_rejected, record_turn, start_turn_span};
use futures_util::{SinkExt, StreamExt, stream::SplitSink};
use metrics::counter;
use security::Identity;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{Instrument, debug, info, warn};
use uuid::Uuid;

use crate::AppState;

/// The identity established at upgrade time governs every frame of the session.
pub async fn handle_upgrade(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| async move {
        let session = Uuid::new_v4();
        info!(%session, "websocket session opened");
        run_socket(socket, state, identity)
            .instrument(tracing::info_span!("ws.session", %session))
            .await;
        info!(%session, "websocket session closed");
    })
}

/// Writes each outbound activity as one JSON text frame on the session socket.
#[derive(Clone)]
pub struct SocketSender {
    sink: Arc<Mutex<SplitSink<WebSocket, Message>>>,
}

impl SocketSender {
    pub fn new(sink: SplitSink<WebSocket, Message>) -> Self {
        Self {
            sink: Arc::new(Mutex::new(sink)),
        }
    }
}

#[async_trait]
impl ActivitySender for SocketSender {
    async fn send(&self, mut activity: Activity) -> Result<ResourceResponse, SendError> {
        let id = activity
            .id
            .get_or_insert_with(|| Uuid::new_v4().to_string())
            .clone();
        let payload = serde_json::to_string(&activity)?;
        self.sink
            .lock()
            .await
            .send(Message::Text(payload.into()))
            .await
            .map_err(|err| {
                debug!(error = %err, "websocket write failed");
                SendError::Closed
            })?;
        Ok(ResourceResponse { id })
    }
}

enum Frame {
    Activity(Box<Activity>),
    Rejected(serde_json::Error),
    Control,
    Close,
}

fn classify(message: Message) -> Frame {
    let decoded = match &message {
        Message::Text(text) => serde_json::from_str::<Activity>(text.as_str()),
        Message::Binary(bytes) => serde_json::from_slice::<Activity>(bytes),
        Message::Ping(_) | Message::Pong(_) => return Frame::Control,
        Message::Close(_) => return Frame::Close,
    };
    match decoded {
        Ok(activity) => Frame::Activity(Box::new(activity)),
        Err(err) => Frame::Rejected(err),
    }
}

/// Reads frames until the peer goes away, running one turn per activity.
///
/// Each turn is awaited before the next frame is read, so replies for a
/// connection go out in the order its activities arrived. Frames naming a
/// `serviceUrl` other than the one the session token vouched for are dropped.
async fn run_socket(socket: WebSocket, state: AppState, identity: Identity) {
    let (sink, mut stream) = socket.split();
    let sender = SocketSender::new(sink);

    while let Some(received) = stream.next().await {
        let message = match received {
            Ok(message) => message,
            Err(err) => {
                warn!(error = %err, "websocket receive failed");
                break;
            }
        };

        let activity = match classify(message) {
            Frame::Activity(activity) => *activity,
            Frame::Rejected(err) => {
                warn!(error = %err, "skipping frame that is not an activity");
                record_frame_rejected();
                continue;
            }
            Frame::Control => continue,
            Frame::Close => break,
        };

        if !identity.vouches_for(activity.service_url.as_deref()) {
            warn!(
                claimed = identity.service_url().unwrap_or_default(),
                service_url = activity.service_url.as_deref().unwrap_or_default(),
                "skipping frame whose serviceUrl does not match token claim"
            );
            counter!("bot_auth_rejections_total", "reason" => "service_url_mismatch").increment(1);
            continue;
        }

        let span = start_turn_span(Transport::WebSocket, &activity);
        let started = Instant::now();
        let mut ctx = TurnContext::new(activity, Arc::new(sender.clone()));
        let outcome = run_turn(&mut ctx, state.handler.as_ref(), state.boundary.as_ref())
            .instrument(span)
            .await;
        record_turn(Transport::WebSocket, outcome, started.elapsed());
    }
}
