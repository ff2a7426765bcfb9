//! Bungie authentication configuration.

use crate::constants::{
    AUTHORIZATION_ENDPOINT, DEFAULT_AUTHENTICATION_TYPE, DEFAULT_BACKCHANNEL_TIMEOUT,
    DEFAULT_CALLBACK_PATH, DEFAULT_STATE_LIFETIME, TOKEN_ENDPOINT, USER_INFO_ENDPOINT,
};
use crate::error::{BungieError, BungieResult};
use base64::{Engine, engine::general_purpose::STANDARD};
use config::{Config, Environment};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Minimum length of a state protection key in bytes
pub const MIN_STATE_KEY_LEN: usize = 32;

/// Options for the Bungie.net sign-in middleware
#[derive(Clone)]
pub struct BungieAuthenticationOptions {
    pub authentication_type: String,
    /// Text shown on login buttons
    pub caption: String,
    pub client_id: String,
    pub client_secret: String,
    pub api_key: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub user_info_endpoint: String,
    /// Path the provider redirects back to, relative to the path base
    pub callback_path: String,
    pub backchannel_timeout: Duration,
    /// Replaces the client built from the options below
    pub backchannel_client: Option<reqwest::Client>,
    /// When non-empty, only these roots are trusted for backchannel TLS
    pub backchannel_root_certificates: Vec<reqwest::Certificate>,
    /// Authentication type handed to the sign-in handler. Falls back to the
    /// handler's own type.
    pub sign_in_as_authentication_type: Option<String>,
    pub state_lifetime: Duration,
    /// HMAC key for the `state` parameter; a random key is generated when unset
    pub state_key: Option<Vec<u8>>,
}

impl fmt::Debug for BungieAuthenticationOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BungieAuthenticationOptions")
            .field("authentication_type", &self.authentication_type)
            .field("client_id", &self.client_id)
            .field("authorization_endpoint", &self.authorization_endpoint)
            .field("token_endpoint", &self.token_endpoint)
            .field("user_info_endpoint", &self.user_info_endpoint)
            .field("callback_path", &self.callback_path)
            .field("backchannel_timeout", &self.backchannel_timeout)
            .field(
                "sign_in_as_authentication_type",
                &self.sign_in_as_authentication_type,
            )
            .finish_non_exhaustive()
    }
}

impl BungieAuthenticationOptions {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            authentication_type: DEFAULT_AUTHENTICATION_TYPE.to_string(),
            caption: DEFAULT_AUTHENTICATION_TYPE.to_string(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            api_key: api_key.into(),
            authorization_endpoint: AUTHORIZATION_ENDPOINT.to_string(),
            token_endpoint: TOKEN_ENDPOINT.to_string(),
            user_info_endpoint: USER_INFO_ENDPOINT.to_string(),
            callback_path: DEFAULT_CALLBACK_PATH.to_string(),
            backchannel_timeout: DEFAULT_BACKCHANNEL_TIMEOUT,
            backchannel_client: None,
            backchannel_root_certificates: Vec::new(),
            sign_in_as_authentication_type: None,
            state_lifetime: DEFAULT_STATE_LIFETIME,
            state_key: None,
        }
    }

    /// Load options from `BUNGIE_*` environment variables
    pub fn from_env() -> BungieResult<Self> {
        let config = Config::builder()
            .add_source(Environment::with_prefix("BUNGIE").try_parsing(true))
            .build()?;
        Self::from_config(config)
    }

    pub fn from_config(config: Config) -> BungieResult<Self> {
        let settings: BungieSettings = config.try_deserialize()?;
        settings.try_into()
    }

    pub fn with_authentication_type(mut self, authentication_type: impl Into<String>) -> Self {
        self.authentication_type = authentication_type.into();
        self
    }

    pub fn with_caption(mut self, caption: impl Into<String>) -> Self {
        self.caption = caption.into();
        self
    }

    pub fn with_endpoints(
        mut self,
        authorization_endpoint: impl Into<String>,
        token_endpoint: impl Into<String>,
        user_info_endpoint: impl Into<String>,
    ) -> Self {
        self.authorization_endpoint = authorization_endpoint.into();
        self.token_endpoint = token_endpoint.into();
        self.user_info_endpoint = user_info_endpoint.into();
        self
    }

    pub fn with_callback_path(mut self, callback_path: impl Into<String>) -> Self {
        self.callback_path = callback_path.into();
        self
    }

    pub fn with_backchannel_timeout(mut self, timeout: Duration) -> Self {
        self.backchannel_timeout = timeout;
        self
    }

    pub fn with_backchannel_client(mut self, client: reqwest::Client) -> Self {
        self.backchannel_client = Some(client);
        self
    }

    pub fn with_root_certificate(mut self, certificate: reqwest::Certificate) -> Self {
        self.backchannel_root_certificates.push(certificate);
        self
    }

    pub fn with_sign_in_as_authentication_type(
        mut self,
        authentication_type: impl Into<String>,
    ) -> Self {
        self.sign_in_as_authentication_type = Some(authentication_type.into());
        self
    }

    pub fn with_state_lifetime(mut self, lifetime: Duration) -> Self {
        self.state_lifetime = lifetime;
        self
    }

    pub fn with_state_key(mut self, key: impl Into<Vec<u8>>) -> Self {
        self.state_key = Some(key.into());
        self
    }

    /// Reject option sets the middleware cannot run with
    pub fn validate(&self) -> BungieResult<()> {
        if self.client_id.trim().is_empty() {
            return Err(BungieError::MissingOption("client_id"));
        }
        if self.client_secret.trim().is_empty() {
            return Err(BungieError::MissingOption("client_secret"));
        }
        if self.api_key.trim().is_empty() {
            return Err(BungieError::MissingOption("api_key"));
        }
        if self.authentication_type.trim().is_empty() {
            return Err(BungieError::MissingOption("authentication_type"));
        }
        if !self.callback_path.starts_with('/') {
            return Err(BungieError::ConfigError(format!(
                "callback path '{}' must start with '/'",
                self.callback_path
            )));
        }
        if self.backchannel_client.is_some() && !self.backchannel_root_certificates.is_empty() {
            return Err(BungieError::ConfigError(
                "pinned root certificates cannot be applied to a custom backchannel client"
                    .to_string(),
            ));
        }
        if let Some(key) = &self.state_key {
            if key.len() < MIN_STATE_KEY_LEN {
                return Err(BungieError::ConfigError(format!(
                    "state key requires at least {} bytes",
                    MIN_STATE_KEY_LEN
                )));
            }
        }
        Ok(())
    }
}

/// Serializable subset of the options, as read from configuration sources
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BungieSettings {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_callback_path")]
    pub callback_path: String,
    #[serde(default = "default_backchannel_timeout_seconds")]
    pub backchannel_timeout_seconds: u64,
    #[serde(default)]
    pub sign_in_as_authentication_type: Option<String>,
    #[serde(default = "default_state_lifetime_seconds")]
    pub state_lifetime_seconds: u64,
    /// Standard base64
    #[serde(default)]
    pub state_key: Option<String>,
}

fn default_callback_path() -> String {
    DEFAULT_CALLBACK_PATH.to_string()
}

fn default_backchannel_timeout_seconds() -> u64 {
    DEFAULT_BACKCHANNEL_TIMEOUT.as_secs()
}

fn default_state_lifetime_seconds() -> u64 {
    DEFAULT_STATE_LIFETIME.as_secs()
}

impl TryFrom<BungieSettings> for BungieAuthenticationOptions {
    type Error = BungieError;

    fn try_from(settings: BungieSettings) -> BungieResult<Self> {
        let mut options =
            Self::new(settings.client_id, settings.client_secret, settings.api_key)
                .with_callback_path(settings.callback_path)
                .with_backchannel_timeout(Duration::from_secs(settings.backchannel_timeout_seconds))
                .with_state_lifetime(Duration::from_secs(settings.state_lifetime_seconds));

        options.sign_in_as_authentication_type = settings.sign_in_as_authentication_type;

        if let Some(encoded) = settings.state_key {
            let key = STANDARD
                .decode(encoded.trim())
                .map_err(|e| BungieError::ConfigError(format!("state key is not base64: {}", e)))?;
            options.state_key = Some(key);
        }

        Ok(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_options() -> BungieAuthenticationOptions {
        BungieAuthenticationOptions::new("client", "secret", "api-key")
    }

    #[test]
    fn test_defaults() {
        let options = valid_options();

        assert_eq!(options.authentication_type, "Bungie");
        assert_eq!(options.callback_path, "/signin-bungie");
        assert_eq!(options.backchannel_timeout, Duration::from_secs(60));
        assert_eq!(options.authorization_endpoint, AUTHORIZATION_ENDPOINT);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_missing_required_options() {
        let missing_id = BungieAuthenticationOptions::new(" ", "secret", "key");
        assert!(matches!(
            missing_id.validate(),
            Err(BungieError::MissingOption("client_id"))
        ));

        let missing_secret = BungieAuthenticationOptions::new("client", "", "key");
        assert!(matches!(
            missing_secret.validate(),
            Err(BungieError::MissingOption("client_secret"))
        ));

        let missing_key = BungieAuthenticationOptions::new("client", "secret", "");
        assert!(matches!(
            missing_key.validate(),
            Err(BungieError::MissingOption("api_key"))
        ));
    }

    #[test]
    fn test_invalid_callback_path_and_short_key() {
        let relative = valid_options().with_callback_path("signin-bungie");
        assert!(matches!(
            relative.validate(),
            Err(BungieError::ConfigError(_))
        ));

        let short_key = valid_options().with_state_key(vec![1u8; 8]);
        assert!(matches!(
            short_key.validate(),
            Err(BungieError::ConfigError(_))
        ));
    }

    #[test]
    fn test_debug_hides_secrets() {
        let rendered = format!("{:?}", valid_options().with_state_key(vec![7u8; 32]));

        assert!(rendered.contains("client"));
        assert!(!rendered.contains("secret"));
        assert!(!rendered.contains("api-key"));
    }

    #[test]
    fn test_from_config_source() {
        let config = Config::builder()
            .set_override("client_id", "from-config")
            .unwrap()
            .set_override("client_secret", "shh")
            .unwrap()
            .set_override("api_key", "key")
            .unwrap()
            .set_override("backchannel_timeout_seconds", 5i64)
            .unwrap()
            .set_override("state_key", STANDARD.encode([9u8; 32]))
            .unwrap()
            .build()
            .unwrap();

        let options = BungieAuthenticationOptions::from_config(config).unwrap();

        assert_eq!(options.client_id, "from-config");
        assert_eq!(options.callback_path, DEFAULT_CALLBACK_PATH);
        assert_eq!(options.backchannel_timeout, Duration::from_secs(5));
        assert_eq!(options.state_key, Some(vec![9u8; 32]));
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_from_config_rejects_bad_state_key() {
        let config = Config::builder()
            .set_override("client_id", "id")
            .unwrap()
            .set_override("state_key", "not base64!")
            .unwrap()
            .build()
            .unwrap();

        let result = BungieAuthenticationOptions::from_config(config);
        assert!(matches!(result, Err(BungieError::ConfigError(_))));
    }
}
