use std::net::SocketAddr;

use anyhow::{Context, Result};
use echo_core::AppCredentials;

pub const DEFAULT_PORT: u16 = 3978;

/// Process configuration: where to listen and which bot identity to use.
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub bind: SocketAddr,
    pub credentials: AppCredentials,
}

impl BotConfig {
    /// Loads `.env` (if present) and then reads the process environment.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// `BIND` wins when set; otherwise `port`, then `PORT`, then 3978 on all interfaces.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let bind = match read("BIND") {
            Some(bind) => bind
                .parse()
                .with_context(|| format!("invalid BIND address {bind:?}"))?,
            None => {
                let port = match read("port").or_else(|| read("PORT")) {
                    Some(port) => port
                        .parse()
                        .with_context(|| format!("invalid port {port:?}"))?,
                    None => DEFAULT_PORT,
                };
                SocketAddr::from(([0, 0, 0, 0], port))
            }
        };

        Ok(Self {
            bind,
            credentials: AppCredentials::from_lookup(&lookup),
        })
    }
}
