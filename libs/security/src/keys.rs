//! Signing keys used to verify channel tokens.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey, jwk::JwkSet};
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, warn};

const KEY_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);
const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("token header carries no key id")]
    MissingKid,
    #[error("no signing key with id {0}")]
    UnknownKid(String),
    #[error("signing keys unavailable: {0}")]
    Unavailable(String),
}

/// Resolves the verification key for a token header.
#[async_trait]
pub trait KeySource: Send + Sync {
    /// Algorithms a token may be signed with to be considered at all.
    fn algorithms(&self) -> &[Algorithm];

    async fn key_for(&self, kid: Option<&str>) -> Result<DecodingKey, KeyError>;
}

/// One fixed key, independent of `kid`.
pub struct StaticKeySource {
    algorithms: Vec<Algorithm>,
    key: DecodingKey,
}

impl StaticKeySource {
    pub fn new(algorithm: Algorithm, key: DecodingKey) -> Self {
        Self {
            algorithms: vec![algorithm],
            key,
        }
    }

    pub fn hs256(secret: &[u8]) -> Self {
        Self::new(Algorithm::HS256, DecodingKey::from_secret(secret))
    }
}

#[async_trait]
impl KeySource for StaticKeySource {
    fn algorithms(&self) -> &[Algorithm] {
        &self.algorithms
    }

    async fn key_for(&self, _kid: Option<&str>) -> Result<DecodingKey, KeyError> {
        Ok(self.key.clone())
    }
}

#[derive(Debug, Deserialize)]
struct OpenIdMetadata {
    jwks_uri: String,
}

struct KeyCache {
    keys: HashMap<String, DecodingKey>,
    fetched_at: Instant,
}

impl KeyCache {
    fn needs_refresh(&self, kid: &str, min_interval: Duration) -> bool {
        let age = self.fetched_at.elapsed();
        age >= KEY_CACHE_TTL || (!self.keys.contains_key(kid) && age >= min_interval)
    }
}

/// Keys published through OpenID metadata documents (`jwks_uri`).
///
/// The merged JWK set of every configured document is cached for a day. A
/// token naming an unknown `kid` triggers one refresh, at most once a minute,
/// so key rollover is picked up without letting bad tokens hammer the issuer.
///
/// Lookups only take the read side of the cache; a refresh runs outside it and
/// concurrent refreshes are collapsed into one.
pub struct OpenIdKeySource {
    http: reqwest::Client,
    metadata_urls: Vec<String>,
    algorithms: Vec<Algorithm>,
    min_refresh_interval: Duration,
    cache: RwLock<Option<KeyCache>>,
    refresh: Mutex<()>,
}

impl OpenIdKeySource {
    pub fn new(http: reqwest::Client, metadata_urls: Vec<String>) -> Self {
        Self {
            http,
            metadata_urls,
            algorithms: vec![Algorithm::RS256],
            min_refresh_interval: MIN_REFRESH_INTERVAL,
            cache: RwLock::new(None),
            refresh: Mutex::new(()),
        }
    }

    pub fn with_algorithms(mut self, algorithms: Vec<Algorithm>) -> Self {
        self.algorithms = algorithms;
        self
    }

    /// Minimum spacing between refreshes triggered by unknown key ids.
    pub fn with_min_refresh_interval(mut self, interval: Duration) -> Self {
        self.min_refresh_interval = interval;
        self
    }

    /// `Some` when the cache can answer for `kid` without a refresh.
    async fn cached(&self, kid: &str) -> Option<Result<DecodingKey, KeyError>> {
        let cache = self.cache.read().await;
        let cache = cache.as_ref()?;
        if cache.needs_refresh(kid, self.min_refresh_interval) {
            return None;
        }
        Some(
            cache
                .keys
                .get(kid)
                .cloned()
                .ok_or_else(|| KeyError::UnknownKid(kid.to_string())),
        )
    }

    async fn fetch_document(&self, metadata_url: &str) -> anyhow::Result<Vec<(String, DecodingKey)>> {
        let metadata: OpenIdMetadata = self
            .http
            .get(metadata_url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        let set: JwkSet = self
            .http
            .get(&metadata.jwks_uri)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let mut keys = Vec::with_capacity(set.keys.len());
        for jwk in &set.keys {
            let Some(kid) = jwk.common.key_id.clone() else {
                continue;
            };
            match DecodingKey::from_jwk(jwk) {
                Ok(key) => keys.push((kid, key)),
                Err(err) => debug!(%kid, error = %err, "skipping unusable jwk"),
            }
        }
        Ok(keys)
    }

    async fn fetch_all(&self) -> Result<HashMap<String, DecodingKey>, KeyError> {
        let mut keys = HashMap::new();
        let mut failures = Vec::new();
        for url in &self.metadata_urls {
            match self.fetch_document(url).await {
                Ok(found) => keys.extend(found),
                Err(err) => {
                    warn!(metadata_url = %url, error = %err, "failed to load signing keys");
                    failures.push(format!("{url}: {err}"));
                }
            }
        }
        if keys.is_empty() && !failures.is_empty() {
            return Err(KeyError::Unavailable(failures.join("; ")));
        }
        debug!(count = keys.len(), "refreshed signing keys");
        Ok(keys)
    }
}

#[async_trait]
impl KeySource for OpenIdKeySource {
    fn algorithms(&self) -> &[Algorithm] {
        &self.algorithms
    }

    async fn key_for(&self, kid: Option<&str>) -> Result<DecodingKey, KeyError> {
        let kid = kid.ok_or(KeyError::MissingKid)?;
        if let Some(found) = self.cached(kid).await {
            return found;
        }

        let _refreshing = self.refresh.lock().await;
        // Another task may have refreshed while this one waited.
        if let Some(found) = self.cached(kid).await {
            return found;
        }

        match self.fetch_all().await {
            Ok(keys) => {
                *self.cache.write().await = Some(KeyCache {
                    keys,
                    fetched_at: Instant::now(),
                });
            }
            Err(err) => {
                // Keep serving stale keys rather than failing every request.
                if self.cache.read().await.is_none() {
                    return Err(err);
                }
            }
        }

        self.cache
            .read()
            .await
            .as_ref()
            .and_then(|c| c.keys.get(kid).cloned())
            .ok_or_else(|| KeyError::UnknownKid(kid.to_string()))
    }
}
