#![allow(dead_code)]

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use echo_bot::AppState;
use echo_core::{ActivityHandler, AppCredentials, ReportToUser, TurnContext, TurnResult};
use jsonwebtoken::{EncodingKey, Header, encode};
use security::{ChannelAuthenticator, StaticKeySource};
use serde_json::{Value, json};

pub const SECRET: &[u8] = b"integration-secret";
pub const APP_ID: &str = "echo-app";
pub const SERVICE_URL: &str = "https://smba.example/amer/";

pub fn state(handler: Arc<dyn ActivityHandler>, credentials: AppCredentials) -> AppState {
    let auth = ChannelAuthenticator::new(credentials, Arc::new(StaticKeySource::hs256(SECRET)));
    AppState::new(handler, Arc::new(ReportToUser), Arc::new(auth))
}

pub fn secured() -> AppCredentials {
    AppCredentials::new(APP_ID, "app-password")
}

pub fn channel_token(aud: &str, service_url: &str) -> String {
    let exp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
        + 600;
    encode(
        &Header::default(),
        &json!({
            "iss": "https://api.botframework.com",
            "aud": aud,
            "serviceurl": service_url,
            "exp": exp,
        }),
        &EncodingKey::from_secret(SECRET),
    )
    .unwrap()
}

pub fn message(id: &str, text: &str) -> Value {
    json!({
        "type": "message",
        "id": id,
        "channelId": "emulator",
        "text": text,
        "from": { "id": "user-1", "name": "User" },
        "recipient": { "id": "bot-1", "name": "Bot" },
        "conversation": { "id": "conv-1" },
        "locale": "en-US"
    })
}

/// Fails every message turn.
pub struct Failing;

#[async_trait]
impl ActivityHandler for Failing {
    async fn on_message(&self, _ctx: &mut TurnContext) -> TurnResult {
        Err(anyhow::anyhow!("storage offline").into())
    }
}
