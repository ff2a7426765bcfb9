//! axum integration.

use crate::constants::DEFAULT_AUTHENTICATION_TYPE;
use crate::handler::BungieAuthentication;
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Extension,
};
use ras_identity_core::AuthProperties;

/// Asks the authentication middleware to start a login.
///
/// Returned from a handler, this produces a 401 which the middleware for the
/// matching authentication type turns into a redirect to the provider.
#[derive(Debug, Clone)]
pub struct Challenge {
    pub authentication_type: String,
    pub properties: AuthProperties,
}

impl Challenge {
    pub fn new(authentication_type: impl Into<String>) -> Self {
        Self {
            authentication_type: authentication_type.into(),
            properties: AuthProperties::default(),
        }
    }

    /// Challenge for the default `Bungie` authentication type
    pub fn bungie() -> Self {
        Self::new(DEFAULT_AUTHENTICATION_TYPE)
    }

    pub fn with_properties(mut self, properties: AuthProperties) -> Self {
        self.properties = properties;
        self
    }

    pub fn with_redirect_uri(mut self, redirect_uri: impl Into<String>) -> Self {
        self.properties.redirect_uri = Some(redirect_uri.into());
        self
    }
}

impl IntoResponse for Challenge {
    fn into_response(self) -> Response {
        (StatusCode::UNAUTHORIZED, Extension(self)).into_response()
    }
}

/// Bungie.net sign-in middleware.
///
/// Answers the callback path itself and rewrites challenged 401 responses
/// into redirects to Bungie.net.
///
/// ```ignore
/// let app = Router::new()
///     .route("/profile", get(profile))
///     .layer(axum::middleware::from_fn_with_state(auth, bungie_authentication));
/// ```
pub async fn bungie_authentication(
    State(auth): State<BungieAuthentication>,
    request: Request,
    next: Next,
) -> Response {
    let context = auth.request_context(request.uri(), request.headers());

    if auth.is_callback(&context) {
        return auth.invoke_return_path(&context).await;
    }

    let mut response = next.run(request).await;
    auth.apply_challenge(&context, &mut response);
    response
}
