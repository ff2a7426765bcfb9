//! Core identity types shared by the external identity providers.
//!
//! Providers turn a remote login into a [`ClaimsIdentity`] wrapped in an
//! [`AuthenticationTicket`]. The host plugs in how opaque state is protected
//! ([`SecureDataFormat`]) and how a verified identity becomes a session
//! ([`SignInHandler`]).

mod claims;
mod properties;

pub use claims::{Claim, ClaimsIdentity, claim_types};
pub use properties::{AuthProperties, AuthenticationTicket};

use async_trait::async_trait;
use http::HeaderMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Protected data could not be read: {0}")]
    DataProtection(String),

    #[error("Provider error: {0}")]
    ProviderError(String),

    #[error("Sign-in failed: {0}")]
    SignInError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

pub type IdentityResult<T> = Result<T, IdentityError>;

/// Turns a value into an opaque, tamper-evident string and back.
///
/// `unprotect` must fail for anything it did not produce itself (other key,
/// modified bytes, expired payload).
pub trait SecureDataFormat<T>: Send + Sync {
    fn protect(&self, data: &T) -> IdentityResult<String>;

    fn unprotect(&self, protected: &str) -> IdentityResult<T>;
}

/// The host's session mechanism.
///
/// Called once per successful external login with the identity re-tagged to
/// [`SignInHandler::authentication_type`]. The returned headers (typically
/// `Set-Cookie`) are attached to the callback response.
#[async_trait]
pub trait SignInHandler: Send + Sync {
    fn authentication_type(&self) -> &str;

    async fn sign_in(
        &self,
        properties: &AuthProperties,
        identity: &ClaimsIdentity,
    ) -> IdentityResult<HeaderMap>;
}

/// A sign-in handler that accepts every identity and sets nothing
pub struct NoopSignIn {
    authentication_type: String,
}

impl NoopSignIn {
    pub fn new(authentication_type: impl Into<String>) -> Self {
        Self {
            authentication_type: authentication_type.into(),
        }
    }
}

#[async_trait]
impl SignInHandler for NoopSignIn {
    fn authentication_type(&self) -> &str {
        &self.authentication_type
    }

    async fn sign_in(
        &self,
        _properties: &AuthProperties,
        _identity: &ClaimsIdentity,
    ) -> IdentityResult<HeaderMap> {
        Ok(HeaderMap::new())
    }
}
