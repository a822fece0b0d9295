use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
};
use metrics::counter;
use tracing::warn;

use crate::jwt::ChannelAuthenticator;

/// Rejects requests without a valid channel token; on success the
/// [`Identity`](crate::Identity) is stored in the request extensions.
///
/// Mount with `axum::middleware::from_fn_with_state(authenticator, authenticate)`.
pub async fn authenticate(
    State(auth): State<Arc<ChannelAuthenticator>>,
    mut req: Request,
    next: Next,
) -> Response {
    let authorization = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    match auth.authenticate(authorization).await {
        Ok(identity) => {
            req.extensions_mut().insert(identity);
            next.run(req).await
        }
        Err(err) => {
            warn!(reason = err.reason(), error = %err, path = %req.uri().path(), "rejected inbound request");
            counter!("bot_auth_rejections_total", "reason" => err.reason()).increment(1);
            err.status().into_response()
        }
    }
}
