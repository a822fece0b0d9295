//! Outbound delivery through the channel's connector service (`serviceUrl`).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::activity::{Activity, ResourceResponse};
use crate::credentials::AppCredentials;
use crate::error::SendError;
use crate::sender::ActivitySender;

const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);
const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(3_600);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

struct CachedToken {
    value: String,
    refresh_at: Instant,
}

pub struct ConnectorClient {
    http: reqwest::Client,
    credentials: AppCredentials,
    login_endpoint: String,
    scope: String,
    token: Mutex<Option<CachedToken>>,
}

impl ConnectorClient {
    pub fn new(http: reqwest::Client, credentials: AppCredentials) -> Self {
        let cloud = credentials.cloud();
        Self {
            http,
            login_endpoint: cloud.login_endpoint().to_string(),
            scope: cloud.oauth_scope().to_string(),
            credentials,
            token: Mutex::new(None),
        }
    }

    pub fn with_login_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.login_endpoint = endpoint.into();
        self
    }

    /// Bearer token for the app identity, or `None` when running without one.
    async fn token(&self) -> Result<Option<String>, SendError> {
        if self.credentials.app_id.is_empty() {
            return Ok(None);
        }

        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref()
            && Instant::now() < token.refresh_at
        {
            return Ok(Some(token.value.clone()));
        }

        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.credentials.app_id.as_str()),
            ("client_secret", self.credentials.app_password.as_str()),
            ("scope", self.scope.as_str()),
        ];
        let response = self
            .http
            .post(&self.login_endpoint)
            .form(&form)
            .send()
            .await
            .map_err(SendError::Transport)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SendError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        let token: TokenResponse = response
            .json()
            .await
            .map_err(SendError::Transport)?;

        let lifetime = token
            .expires_in
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TOKEN_LIFETIME);
        debug!(expires_in = lifetime.as_secs(), "acquired connector token");
        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            refresh_at: Instant::now() + lifetime.saturating_sub(TOKEN_REFRESH_MARGIN),
        });
        Ok(Some(token.access_token))
    }

    /// Posts `activity` to its conversation, as a reply when `replyToId` is set.
    pub async fn send_to_conversation(
        &self,
        activity: &Activity,
    ) -> Result<ResourceResponse, SendError> {
        let service_url = activity
            .service_url
            .as_deref()
            .ok_or(SendError::Unaddressed("serviceUrl"))?;
        let conversation_id = activity
            .conversation_id()
            .filter(|id| !id.is_empty())
            .ok_or(SendError::Unaddressed("conversation.id"))?;
        let url = activities_url(service_url, conversation_id, activity.reply_to_id.as_deref());

        let mut request = self.http.post(&url).json(activity);
        if let Some(token) = self.token().await? {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .await
            .map_err(SendError::Transport)?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(SendError::Transport)?;
        if !status.is_success() {
            return Err(SendError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(serde_json::from_str(&body).unwrap_or_default())
    }
}

fn activities_url(service_url: &str, conversation_id: &str, reply_to_id: Option<&str>) -> String {
    let base = service_url.trim_end_matches('/');
    let conversation = urlencoding::encode(conversation_id);
    match reply_to_id.filter(|id| !id.is_empty()) {
        Some(reply_to) => format!(
            "{base}/v3/conversations/{conversation}/activities/{}",
            urlencoding::encode(reply_to)
        ),
        None => format!("{base}/v3/conversations/{conversation}/activities"),
    }
}

/// Turn sender that forwards replies to the connector service.
#[derive(Clone)]
pub struct ConnectorSender {
    client: Arc<ConnectorClient>,
}

impl ConnectorSender {
    pub fn new(client: Arc<ConnectorClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ActivitySender for ConnectorSender {
    async fn send(&self, activity: Activity) -> Result<ResourceResponse, SendError> {
        self.client.send_to_conversation(&activity).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        Json, Router,
        extract::{Path, State},
        http::{HeaderMap, StatusCode},
        routing::post,
    };
    use serde_json::{Value, json};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone, Default)]
    struct Stub {
        token_calls: Arc<AtomicUsize>,
        short_lived_tokens: bool,
        posts: Arc<Mutex<Vec<(String, Option<String>, Value)>>>,
    }

    async fn issue_token(State(stub): State<Stub>) -> Json<Value> {
        let issued = stub.token_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let expires_in = if stub.short_lived_tokens { 30 } else { 3600 };
        Json(json!({
            "token_type": "Bearer",
            "expires_in": expires_in,
            "access_token": format!("tok-{issued}"),
        }))
    }

    async fn receive_reply(
        State(stub): State<Stub>,
        Path((conversation, reply_to)): Path<(String, String)>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> (StatusCode, Json<Value>) {
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        stub.posts
            .lock()
            .await
            .push((format!("{conversation}/{reply_to}"), auth, body));
        (StatusCode::OK, Json(json!({ "id": "sent-1" })))
    }

    async fn reject() -> StatusCode {
        StatusCode::FORBIDDEN
    }

    async fn spawn_stub(stub: Stub) -> String {
        let app = Router::new()
            .route("/token", post(issue_token))
            .route(
                "/v3/conversations/{conversation}/activities/{reply_to}",
                post(receive_reply),
            )
            .route("/v3/conversations/{conversation}/activities", post(reject))
            .with_state(stub);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn reply(service_url: &str) -> Activity {
        let mut activity = Activity::message("Echo: hi");
        activity.service_url = Some(service_url.to_string());
        activity.conversation = Some(crate::activity::ConversationAccount {
            id: "conv-1".into(),
            ..Default::default()
        });
        activity.reply_to_id = Some("in-1".into());
        activity
    }

    #[test]
    fn activities_url_encodes_segments() {
        assert_eq!(
            activities_url("https://smba.example/amer/", "a:b;c", Some("id|1")),
            "https://smba.example/amer/v3/conversations/a%3Ab%3Bc/activities/id%7C1"
        );
        assert_eq!(
            activities_url("https://smba.example", "conv", None),
            "https://smba.example/v3/conversations/conv/activities"
        );
    }

    #[tokio::test]
    async fn posts_reply_with_cached_token() {
        let stub = Stub::default();
        let base = spawn_stub(stub.clone()).await;
        let client = ConnectorClient::new(
            reqwest::Client::new(),
            AppCredentials::new("app-1", "secret"),
        )
        .with_login_endpoint(format!("{base}/token"));

        let first = client.send_to_conversation(&reply(&base)).await.unwrap();
        client.send_to_conversation(&reply(&base)).await.unwrap();

        assert_eq!(first.id, "sent-1");
        assert_eq!(stub.token_calls.load(Ordering::SeqCst), 1);
        let posts = stub.posts.lock().await;
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].0, "conv-1/in-1");
        assert_eq!(posts[0].1.as_deref(), Some("Bearer tok-1"));
        assert_eq!(posts[0].2["text"], "Echo: hi");
    }

    #[tokio::test]
    async fn token_inside_refresh_margin_is_fetched_again() {
        let stub = Stub {
            short_lived_tokens: true,
            ..Default::default()
        };
        let base = spawn_stub(stub.clone()).await;
        let client = ConnectorClient::new(
            reqwest::Client::new(),
            AppCredentials::new("app-1", "secret"),
        )
        .with_login_endpoint(format!("{base}/token"));

        client.send_to_conversation(&reply(&base)).await.unwrap();
        client.send_to_conversation(&reply(&base)).await.unwrap();

        assert_eq!(stub.token_calls.load(Ordering::SeqCst), 2);
        let posts = stub.posts.lock().await;
        assert_eq!(posts[0].1.as_deref(), Some("Bearer tok-1"));
        assert_eq!(posts[1].1.as_deref(), Some("Bearer tok-2"));
    }

    #[tokio::test]
    async fn anonymous_client_skips_token() {
        let stub = Stub::default();
        let base = spawn_stub(stub.clone()).await;
        let client = ConnectorClient::new(reqwest::Client::new(), AppCredentials::default());

        client.send_to_conversation(&reply(&base)).await.unwrap();

        assert_eq!(stub.token_calls.load(Ordering::SeqCst), 0);
        assert!(stub.posts.lock().await[0].1.is_none());
    }

    #[tokio::test]
    async fn rejected_post_surfaces_status() {
        let base = spawn_stub(Stub::default()).await;
        let client = ConnectorClient::new(reqwest::Client::new(), AppCredentials::default());
        let mut activity = reply(&base);
        activity.reply_to_id = None;

        let err = client.send_to_conversation(&activity).await.unwrap_err();
        assert!(matches!(err, SendError::Rejected { status: 403, .. }));
    }

    #[tokio::test]
    async fn unaddressed_activity_is_refused() {
        let client = ConnectorClient::new(reqwest::Client::new(), AppCredentials::default());
        let err = client
            .send_to_conversation(&Activity::message("hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, SendError::Unaddressed("serviceUrl")));
    }
}
