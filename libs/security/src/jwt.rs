use std::sync::Arc;

use axum::http::StatusCode;
use echo_core::AppCredentials;
use jsonwebtoken::{Validation, decode, decode_header, errors::ErrorKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::keys::{KeyError, KeySource, OpenIdKeySource};

/// Allowed clock skew between the channel and this host.
pub const CLOCK_SKEW_SECS: u64 = 300;

/// Issuers used by the Bot Framework Emulator (v1 and v2 tokens, public and government).
const EMULATOR_ISSUERS: [&str; 6] = [
    "https://sts.windows.net/d6d49420-f39b-4df7-a1dc-d59a935871db/",
    "https://login.microsoftonline.com/d6d49420-f39b-4df7-a1dc-d59a935871db/v2.0",
    "https://sts.windows.net/f8cdef31-a31e-4b4a-93e4-5f571e91255a/",
    "https://login.microsoftonline.com/f8cdef31-a31e-4b4a-93e4-5f571e91255a/v2.0",
    "https://sts.windows.net/cab8a31a-1906-4287-a0d8-4eef66b95f6e/",
    "https://login.microsoftonline.us/cab8a31a-1906-4287-a0d8-4eef66b95f6e/v2.0",
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelClaims {
    pub iss: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub appid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serviceurl: Option<String>,
    pub exp: i64,
}

impl ChannelClaims {
    fn audience_is(&self, app_id: &str) -> bool {
        match &self.aud {
            Some(Value::String(aud)) => aud == app_id,
            Some(Value::Array(auds)) => auds.iter().any(|aud| aud.as_str() == Some(app_id)),
            _ => false,
        }
    }
}

/// Caller identity established for one request.
#[derive(Debug, Clone, Default)]
pub struct Identity {
    pub anonymous: bool,
    pub claims: Option<ChannelClaims>,
}

impl Identity {
    pub fn anonymous() -> Self {
        Self {
            anonymous: true,
            claims: None,
        }
    }

    /// `serviceurl` claim the channel vouched for, if any.
    pub fn service_url(&self) -> Option<&str> {
        self.claims.as_ref()?.serviceurl.as_deref()
    }

    /// False when the token names a `serviceurl` and the activity claims another one.
    pub fn vouches_for(&self, service_url: Option<&str>) -> bool {
        match self.service_url() {
            None => true,
            Some(claimed) => service_url.is_some_and(|actual| {
                claimed
                    .trim_end_matches('/')
                    .eq_ignore_ascii_case(actual.trim_end_matches('/'))
            }),
        }
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing or malformed authorization header")]
    Missing,
    #[error("invalid token: {0}")]
    Invalid(String),
    #[error("token not issued for this bot")]
    Forbidden,
    #[error("{0}")]
    KeysUnavailable(String),
}

impl AuthError {
    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::Missing | AuthError::Invalid(_) => StatusCode::UNAUTHORIZED,
            AuthError::Forbidden => StatusCode::FORBIDDEN,
            AuthError::KeysUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Short label used on metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            AuthError::Missing => "missing",
            AuthError::Invalid(_) => "invalid",
            AuthError::Forbidden => "forbidden",
            AuthError::KeysUnavailable(_) => "keys_unavailable",
        }
    }
}

impl From<KeyError> for AuthError {
    fn from(err: KeyError) -> Self {
        match err {
            KeyError::Unavailable(msg) => AuthError::KeysUnavailable(msg),
            other => AuthError::Invalid(other.to_string()),
        }
    }
}

/// Validates the bearer token the channel attaches to every inbound request.
pub struct ChannelAuthenticator {
    credentials: AppCredentials,
    keys: Arc<dyn KeySource>,
    channel_issuer: String,
    emulator_issuers: Vec<String>,
}

impl ChannelAuthenticator {
    pub fn new(credentials: AppCredentials, keys: Arc<dyn KeySource>) -> Self {
        Self {
            channel_issuer: credentials.cloud().token_issuer().to_string(),
            emulator_issuers: EMULATOR_ISSUERS.iter().map(|s| s.to_string()).collect(),
            credentials,
            keys,
        }
    }

    /// Authenticator backed by the channel and emulator OpenID metadata.
    pub fn from_credentials(credentials: AppCredentials, http: reqwest::Client) -> Self {
        let metadata = vec![
            credentials.openid_metadata_url(),
            credentials.cloud().emulator_metadata_url().to_string(),
        ];
        let keys = Arc::new(OpenIdKeySource::new(http, metadata));
        Self::new(credentials, keys)
    }

    pub fn auth_disabled(&self) -> bool {
        self.credentials.auth_disabled()
    }

    pub async fn authenticate(&self, authorization: Option<&str>) -> Result<Identity, AuthError> {
        let authorization = authorization.map(str::trim).filter(|value| !value.is_empty());
        // Without an identity only header-less requests pass; a presented token is always checked.
        if authorization.is_none() && self.credentials.auth_disabled() {
            return Ok(Identity::anonymous());
        }

        let token = authorization
            .and_then(|value| {
                let (scheme, token) = value.split_once(' ')?;
                scheme.eq_ignore_ascii_case("bearer").then(|| token.trim())
            })
            .filter(|token| !token.is_empty())
            .ok_or(AuthError::Missing)?;

        let header = decode_header(token).map_err(|err| AuthError::Invalid(err.to_string()))?;
        if !self.keys.algorithms().contains(&header.alg) {
            return Err(AuthError::Invalid(format!(
                "algorithm {:?} not accepted",
                header.alg
            )));
        }
        let key = self.keys.key_for(header.kid.as_deref()).await?;

        let mut validation = Validation::new(header.alg);
        validation.leeway = CLOCK_SKEW_SECS;
        validation.validate_aud = false;
        let mut issuers = self.emulator_issuers.clone();
        issuers.push(self.channel_issuer.clone());
        validation.set_issuer(&issuers);
        validation.set_required_spec_claims(&["exp", "iss"]);

        let claims = decode::<ChannelClaims>(token, &key, &validation)
            .map_err(|err| match err.kind() {
                ErrorKind::ExpiredSignature => AuthError::Invalid("token expired".into()),
                ErrorKind::InvalidIssuer => AuthError::Invalid("untrusted issuer".into()),
                _ => AuthError::Invalid(err.to_string()),
            })?
            .claims;

        let app_id = self.credentials.app_id.as_str();
        if !claims.audience_is(app_id) {
            return Err(AuthError::Forbidden);
        }
        if self.emulator_issuers.contains(&claims.iss) {
            let caller = claims.appid.as_deref().or(claims.azp.as_deref());
            if caller != Some(app_id) {
                return Err(AuthError::Forbidden);
            }
        }

        Ok(Identity {
            anonymous: false,
            claims: Some(claims),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::StaticKeySource;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use serde_json::json;

    const SECRET: &[u8] = b"channel-signing-secret";
    const APP_ID: &str = "app-123";

    fn now() -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64
    }

    fn token(claims: Value) -> String {
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET),
        )
        .unwrap()
    }

    fn channel_claims() -> Value {
        json!({
            "iss": "https://api.botframework.com",
            "aud": APP_ID,
            "serviceurl": "https://smba.example/amer/",
            "exp": now() + 600,
        })
    }

    fn authenticator() -> ChannelAuthenticator {
        ChannelAuthenticator::new(
            AppCredentials::new(APP_ID, "secret"),
            Arc::new(StaticKeySource::hs256(SECRET)),
        )
    }

    async fn check(claims: Value) -> Result<Identity, AuthError> {
        let header = format!("Bearer {}", token(claims));
        authenticator().authenticate(Some(&header)).await
    }

    #[tokio::test]
    async fn accepts_channel_token() {
        let identity = check(channel_claims()).await.unwrap();
        assert!(!identity.anonymous);
        assert_eq!(identity.service_url(), Some("https://smba.example/amer/"));
    }

    #[tokio::test]
    async fn disabled_auth_is_anonymous() {
        let auth = ChannelAuthenticator::new(
            AppCredentials::default(),
            Arc::new(StaticKeySource::hs256(SECRET)),
        );
        let identity = auth.authenticate(None).await.unwrap();
        assert!(identity.anonymous);
        assert!(identity.service_url().is_none());
        assert!(auth.authenticate(Some("  ")).await.unwrap().anonymous);
    }

    #[tokio::test]
    async fn disabled_auth_still_checks_presented_tokens() {
        let auth = ChannelAuthenticator::new(
            AppCredentials::default(),
            Arc::new(StaticKeySource::hs256(SECRET)),
        );

        let err = auth
            .authenticate(Some("Bearer forged.garbage.token"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Invalid(_)));

        let header = format!("Bearer {}", token(channel_claims()));
        let err = auth.authenticate(Some(&header)).await.unwrap_err();
        assert!(matches!(err, AuthError::Forbidden));

        let err = auth.authenticate(Some("Basic abc")).await.unwrap_err();
        assert!(matches!(err, AuthError::Missing));
    }

    #[test]
    fn service_url_claim_must_match_activity() {
        let identity = Identity {
            anonymous: false,
            claims: Some(ChannelClaims {
                serviceurl: Some("https://smba.example/amer/".into()),
                ..Default::default()
            }),
        };
        assert!(identity.vouches_for(Some("https://SMBA.example/amer")));
        assert!(!identity.vouches_for(Some("https://attacker.example/")));
        assert!(!identity.vouches_for(None));
        assert!(Identity::anonymous().vouches_for(Some("https://anything.example/")));
    }

    #[tokio::test]
    async fn missing_or_malformed_header() {
        let auth = authenticator();
        for header in [None, Some(""), Some("Basic abc"), Some("Bearer ")] {
            let err = auth.authenticate(header).await.unwrap_err();
            assert!(matches!(err, AuthError::Missing), "{header:?}");
            assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
        }
    }

    #[tokio::test]
    async fn garbage_token_is_invalid() {
        let err = authenticator()
            .authenticate(Some("Bearer not.a.jwt"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Invalid(_)));
    }

    #[tokio::test]
    async fn wrong_signature_is_invalid() {
        let forged = encode(
            &Header::default(),
            &channel_claims(),
            &EncodingKey::from_secret(b"someone-else"),
        )
        .unwrap();
        let err = authenticator()
            .authenticate(Some(&format!("Bearer {forged}")))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Invalid(_)));
    }

    #[tokio::test]
    async fn expired_token_is_invalid() {
        let mut claims = channel_claims();
        claims["exp"] = json!(now() - CLOCK_SKEW_SECS as i64 - 60);
        let err = check(claims).await.unwrap_err();
        assert!(matches!(err, AuthError::Invalid(msg) if msg == "token expired"));
    }

    #[tokio::test]
    async fn skew_within_leeway_is_accepted() {
        let mut claims = channel_claims();
        claims["exp"] = json!(now() - 60);
        check(claims).await.unwrap();
    }

    #[tokio::test]
    async fn unknown_issuer_is_invalid() {
        let mut claims = channel_claims();
        claims["iss"] = json!("https://evil.example");
        let err = check(claims).await.unwrap_err();
        assert!(matches!(err, AuthError::Invalid(_)));
    }

    #[tokio::test]
    async fn other_audience_is_forbidden() {
        let mut claims = channel_claims();
        claims["aud"] = json!("another-bot");
        let err = check(claims).await.unwrap_err();
        assert!(matches!(err, AuthError::Forbidden));
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn emulator_token_checks_caller_app() {
        let issuer = "https://login.microsoftonline.com/d6d49420-f39b-4df7-a1dc-d59a935871db/v2.0";
        let ok = json!({ "iss": issuer, "aud": [APP_ID], "azp": APP_ID, "exp": now() + 600 });
        check(ok).await.unwrap();

        let other = json!({ "iss": issuer, "aud": APP_ID, "appid": "intruder", "exp": now() + 600 });
        assert!(matches!(check(other).await.unwrap_err(), AuthError::Forbidden));
    }
}
