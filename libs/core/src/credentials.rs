//! Bot identity loaded once at startup and shared read-only by every turn.

pub const ENV_APP_ID: &str = "MicrosoftAppId";
pub const ENV_APP_PASSWORD: &str = "MicrosoftAppPassword";
pub const ENV_CHANNEL_SERVICE: &str = "ChannelService";
pub const ENV_OPEN_ID_METADATA: &str = "BotOpenIdMetadata";

pub const GOVERNMENT_CHANNEL_SERVICE: &str = "https://botframework.azure.us";

/// Azure cloud the bot is registered in, selected by `ChannelService`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelCloud {
    Public,
    Government,
}

impl ChannelCloud {
    pub fn from_channel_service(channel_service: Option<&str>) -> Self {
        match channel_service.map(|s| s.trim().trim_end_matches('/')) {
            Some(s) if s.eq_ignore_ascii_case(GOVERNMENT_CHANNEL_SERVICE) => Self::Government,
            _ => Self::Public,
        }
    }

    pub fn openid_metadata_url(&self) -> &'static str {
        match self {
            Self::Public => "https://login.botframework.com/v1/.well-known/openidconfiguration",
            Self::Government => {
                "https://login.botframework.azure.us/v1/.well-known/openidconfiguration"
            }
        }
    }

    pub fn emulator_metadata_url(&self) -> &'static str {
        match self {
            Self::Public => {
                "https://login.microsoftonline.com/botframework.com/v2.0/.well-known/openid-configuration"
            }
            Self::Government => {
                "https://login.microsoftonline.us/cab8a31a-1906-4287-a0d8-4eef66b95f6e/v2.0/.well-known/openid-configuration"
            }
        }
    }

    /// Issuer of tokens minted by the channel service itself.
    pub fn token_issuer(&self) -> &'static str {
        match self {
            Self::Public => "https://api.botframework.com",
            Self::Government => "https://api.botframework.us",
        }
    }

    pub fn login_endpoint(&self) -> &'static str {
        match self {
            Self::Public => "https://login.microsoftonline.com/botframework.com/oauth2/v2.0/token",
            Self::Government => {
                "https://login.microsoftonline.us/cab8a31a-1906-4287-a0d8-4eef66b95f6e/oauth2/v2.0/token"
            }
        }
    }

    pub fn oauth_scope(&self) -> &'static str {
        match self {
            Self::Public => "https://api.botframework.com/.default",
            Self::Government => "https://api.botframework.us/.default",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppCredentials {
    pub app_id: String,
    pub app_password: String,
    pub channel_service: Option<String>,
    pub open_id_metadata: Option<String>,
}

impl AppCredentials {
    pub fn new(app_id: impl Into<String>, app_password: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            app_password: app_password.into(),
            ..Default::default()
        }
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the identity through `lookup`; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        Self {
            app_id: read(ENV_APP_ID).unwrap_or_default(),
            app_password: read(ENV_APP_PASSWORD).unwrap_or_default(),
            channel_service: read(ENV_CHANNEL_SERVICE),
            open_id_metadata: read(ENV_OPEN_ID_METADATA),
        }
    }

    /// No identity configured: inbound requests without a token are accepted
    /// anonymously and outbound calls carry no token. Only meant for local
    /// emulator sessions.
    pub fn auth_disabled(&self) -> bool {
        self.app_id.is_empty() && self.app_password.is_empty()
    }

    pub fn cloud(&self) -> ChannelCloud {
        ChannelCloud::from_channel_service(self.channel_service.as_deref())
    }

    /// Metadata document for channel tokens, honouring `BotOpenIdMetadata`.
    pub fn openid_metadata_url(&self) -> String {
        self.open_id_metadata
            .clone()
            .unwrap_or_else(|| self.cloud().openid_metadata_url().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_disables_auth() {
        let creds = AppCredentials::from_lookup(lookup(&[]));
        assert!(creds.auth_disabled());
        assert_eq!(creds.cloud(), ChannelCloud::Public);
        assert_eq!(
            creds.openid_metadata_url(),
            "https://login.botframework.com/v1/.well-known/openidconfiguration"
        );
    }

    #[test]
    fn blank_values_count_as_unset() {
        let creds = AppCredentials::from_lookup(lookup(&[
            (ENV_APP_ID, "  "),
            (ENV_APP_PASSWORD, ""),
            (ENV_CHANNEL_SERVICE, " "),
        ]));
        assert!(creds.auth_disabled());
        assert!(creds.channel_service.is_none());
    }

    #[test]
    fn reads_full_identity() {
        let creds = AppCredentials::from_lookup(lookup(&[
            (ENV_APP_ID, "app-123"),
            (ENV_APP_PASSWORD, "s3cret"),
            (ENV_CHANNEL_SERVICE, "https://botframework.azure.us/"),
            (ENV_OPEN_ID_METADATA, "https://metadata.example/openid"),
        ]));
        assert!(!creds.auth_disabled());
        assert_eq!(creds.app_id, "app-123");
        assert_eq!(creds.cloud(), ChannelCloud::Government);
        assert_eq!(creds.openid_metadata_url(), "https://metadata.example/openid");
        assert_eq!(creds.cloud().token_issuer(), "https://api.botframework.us");
    }
}
