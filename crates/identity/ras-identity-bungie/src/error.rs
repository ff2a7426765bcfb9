//! Bungie authentication error types.

use thiserror::Error;

pub type BungieResult<T> = Result<T, BungieError>;

#[derive(Debug, Error)]
pub enum BungieError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("The '{0}' option must be provided")]
    MissingOption(&'static str),

    #[error("Configuration source error: {0}")]
    ConfigSource(#[from] config::ConfigError),

    #[error("Invalid state parameter: {0}")]
    InvalidState(String),

    #[error("Correlation failed: {0}")]
    CorrelationFailed(String),

    #[error("Missing authorization code")]
    MissingAuthorizationCode,

    #[error("Token exchange failed with status {0}")]
    TokenExchangeFailed(u16),

    #[error("{0} was not found in the token response")]
    MissingTokenField(&'static str),

    #[error("User info request failed with status {0}")]
    UserInfoFailed(u16),

    #[error("User profile did not contain a membership id")]
    MissingSubject,

    #[error("Authenticated hook removed the identity")]
    IdentityRejected,

    #[error("Response body exceeded {0} bytes")]
    ResponseTooLarge(usize),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("URL parsing error: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("Identity error: {0}")]
    IdentityError(#[from] ras_identity_core::IdentityError),

    #[error("Hook error: {0}")]
    HookError(String),
}
