//! Transport front door for the echo bot.
//!
//! `POST /api/messages` runs one turn per request; a `GET` carrying WebSocket
//! upgrade headers on the same path opens a streaming session. Both paths are
//! guarded by the channel authenticator and funnel into
//! [`echo_core::run_turn`].

pub mod config;
pub mod http;
pub mod ws;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::{
    Router,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
};
use echo_core::{ActivityHandler, ConnectorClient, EchoBot, ReportToUser, SharedBoundary};
use echo_ingress_common::with_request_id;
use security::{ChannelAuthenticator, authenticate};

pub use config::BotConfig;

const OUTBOUND_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct AppState {
    pub handler: Arc<dyn ActivityHandler>,
    pub boundary: SharedBoundary,
    pub auth: Arc<ChannelAuthenticator>,
    /// Outbound path for replies addressed to a `serviceUrl`. Without it every
    /// HTTP turn answers inline.
    pub connector: Option<Arc<ConnectorClient>>,
}

impl AppState {
    pub fn new(
        handler: Arc<dyn ActivityHandler>,
        boundary: SharedBoundary,
        auth: Arc<ChannelAuthenticator>,
    ) -> Self {
        Self {
            handler,
            boundary,
            auth,
            connector: None,
        }
    }

    pub fn with_connector(mut self, connector: Arc<ConnectorClient>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Echo bot with the reporting error boundary, wired to the configured identity.
    pub fn from_config(config: &BotConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(OUTBOUND_TIMEOUT)
            .build()?;
        let auth = ChannelAuthenticator::from_credentials(config.credentials.clone(), http.clone());
        let connector = ConnectorClient::new(http, config.credentials.clone());
        Ok(Self::new(Arc::new(EchoBot), Arc::new(ReportToUser), Arc::new(auth))
            .with_connector(Arc::new(connector)))
    }
}

pub fn router(state: AppState) -> Router {
    let messages = Router::new()
        .route(
            "/api/messages",
            post(http::handle_activity).get(ws::handle_upgrade),
        )
        .route_layer(from_fn_with_state(state.auth.clone(), authenticate));

    Router::new()
        .merge(messages)
        .route("/healthz", get(healthz))
        .layer(from_fn(with_request_id))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}
