//! The authorization code flow against Bungie.net.

use crate::backchannel::{build_client, read_bounded};
use crate::config::BungieAuthenticationOptions;
use crate::constants::{API_KEY_HEADER, MAX_RESPONSE_CONTENT_BUFFER_SIZE};
use crate::context::{BungieAuthenticatedContext, TokenResponse};
use crate::correlation::CorrelationGuard;
use crate::error::{BungieError, BungieResult};
use crate::events::{BungieAuthenticationEvents, DefaultEvents};
use crate::middleware::Challenge;
use crate::request::RequestContext;
use crate::return_endpoint::{ReturnDecision, ReturnEndpointContext};
use crate::state::PropertiesDataFormat;
use axum::http::{HeaderMap, HeaderValue, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use axum_extra::extract::cookie::Cookie;
use ras_identity_core::{AuthProperties, AuthenticationTicket, SecureDataFormat, SignInHandler};
use reqwest::Client;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use url::Url;

const STATE_PURPOSE: &str = "ras-identity-bungie.state.v1";

/// Result of processing a callback.
///
/// `NoTicket` means the protected state could not be recovered, so there is
/// nowhere to send the user-agent. `Rejected` keeps the recovered properties
/// so the user can still be redirected back with an error.
#[derive(Debug)]
pub enum AuthenticateOutcome {
    NoTicket {
        reason: BungieError,
    },
    Rejected {
        properties: AuthProperties,
        reason: BungieError,
    },
    Authenticated(AuthenticationTicket),
}

impl AuthenticateOutcome {
    /// The ticket handed to the return endpoint, if any
    pub fn into_ticket(self) -> Option<AuthenticationTicket> {
        match self {
            Self::NoTicket { .. } => None,
            Self::Rejected { properties, .. } => Some(AuthenticationTicket::new(None, properties)),
            Self::Authenticated(ticket) => Some(ticket),
        }
    }
}

/// Bungie.net sign-in, shared by every request of an application.
#[derive(Clone)]
pub struct BungieAuthentication {
    options: Arc<BungieAuthenticationOptions>,
    client: Client,
    state_format: Arc<dyn SecureDataFormat<AuthProperties>>,
    correlation: CorrelationGuard,
    events: Arc<dyn BungieAuthenticationEvents>,
    sign_in: Option<Arc<dyn SignInHandler>>,
    path_base: String,
}

impl fmt::Debug for BungieAuthentication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BungieAuthentication")
            .field("options", &self.options)
            .field("path_base", &self.path_base)
            .finish_non_exhaustive()
    }
}

impl BungieAuthentication {
    /// Validate the options and set up the backchannel client and state protection
    pub fn new(options: BungieAuthenticationOptions) -> BungieResult<Self> {
        options.validate()?;

        let client = build_client(&options)?;
        let purpose = format!("{}:{}", STATE_PURPOSE, options.authentication_type);
        let state_format = match &options.state_key {
            Some(key) => PropertiesDataFormat::new(key, purpose, options.state_lifetime),
            None => {
                warn!("No state key configured; logins in flight will not survive a restart");
                PropertiesDataFormat::with_random_key(purpose, options.state_lifetime)
            }
        };

        Ok(Self {
            correlation: CorrelationGuard::new(&options.authentication_type),
            options: Arc::new(options),
            client,
            state_format: Arc::new(state_format),
            events: Arc::new(DefaultEvents),
            sign_in: None,
            path_base: String::new(),
        })
    }

    pub fn with_events(mut self, events: impl BungieAuthenticationEvents + 'static) -> Self {
        self.events = Arc::new(events);
        self
    }

    pub fn with_sign_in(mut self, sign_in: impl SignInHandler + 'static) -> Self {
        self.sign_in = Some(Arc::new(sign_in));
        self
    }

    pub fn with_state_format(
        mut self,
        state_format: impl SecureDataFormat<AuthProperties> + 'static,
    ) -> Self {
        self.state_format = Arc::new(state_format);
        self
    }

    /// Prefix the application is mounted under, e.g. `/portal`
    pub fn with_path_base(mut self, path_base: impl Into<String>) -> Self {
        self.path_base = path_base.into();
        self
    }

    pub fn options(&self) -> &BungieAuthenticationOptions {
        &self.options
    }

    /// Authentication type identities are signed in as.
    ///
    /// Falls back to the sign-in handler's own type.
    pub fn sign_in_authentication_type(&self) -> Option<String> {
        self.options
            .sign_in_as_authentication_type
            .clone()
            .or_else(|| {
                self.sign_in
                    .as_ref()
                    .map(|handler| handler.authentication_type().to_string())
            })
    }

    pub fn request_context(&self, uri: &Uri, headers: &HeaderMap) -> RequestContext {
        RequestContext::from_parts(uri, headers).with_path_base(self.path_base.clone())
    }

    pub fn is_callback(&self, request: &RequestContext) -> bool {
        request.within_path_base && request.path == self.options.callback_path
    }

    /// Absolute URL the provider redirects back to
    pub fn callback_uri(&self, request: &RequestContext) -> String {
        format!("{}{}", request.base_uri(), self.options.callback_path)
    }

    /// Location of the provider's authorization page plus the correlation cookie.
    ///
    /// Properties without a redirect target return to the current request URL.
    pub fn challenge(
        &self,
        request: &RequestContext,
        mut properties: AuthProperties,
    ) -> BungieResult<(String, Cookie<'static>)> {
        if properties.redirect_uri.as_deref().is_none_or(str::is_empty) {
            properties.redirect_uri = Some(request.current_uri());
        }

        let cookie = self.correlation.generate(request, &mut properties);
        let state = self.state_format.protect(&properties)?;

        let mut url = Url::parse(&self.options.authorization_endpoint)?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.options.client_id)
            .append_pair("redirect_uri", &self.callback_uri(request))
            .append_pair("state", &state);

        Ok((url.to_string(), cookie))
    }

    /// Turn a 401 carrying a [`Challenge`] for this provider into a redirect to Bungie.net
    pub fn apply_challenge(&self, request: &RequestContext, response: &mut Response) {
        if response.status() != StatusCode::UNAUTHORIZED {
            return;
        }

        let Some(challenge) = response
            .extensions()
            .get::<Challenge>()
            .filter(|c| c.authentication_type == self.options.authentication_type)
            .cloned()
        else {
            return;
        };

        let (location, cookie) = match self.challenge(request, challenge.properties) {
            Ok(parts) => parts,
            Err(e) => {
                error!("Failed to build the Bungie.net challenge: {}", e);
                return;
            }
        };

        let (Ok(location), Ok(cookie)) = (
            HeaderValue::from_str(&location),
            HeaderValue::from_str(&cookie.to_string()),
        ) else {
            error!("Challenge produced an invalid header value");
            return;
        };

        debug!("Redirecting to Bungie.net for authentication");
        *response.status_mut() = StatusCode::FOUND;
        response.headers_mut().insert(header::LOCATION, location);
        response.headers_mut().append(header::SET_COOKIE, cookie);
    }

    /// Validate the callback and run the backchannel exchange
    pub async fn authenticate(&self, request: &RequestContext) -> AuthenticateOutcome {
        let code = request.query_value("code");

        let Some(state) = request.query_value("state") else {
            return AuthenticateOutcome::NoTicket {
                reason: BungieError::InvalidState("state parameter missing".to_string()),
            };
        };

        let mut properties = match self.state_format.unprotect(&state) {
            Ok(properties) => properties,
            Err(e) => {
                return AuthenticateOutcome::NoTicket {
                    reason: BungieError::InvalidState(e.to_string()),
                };
            }
        };

        if let Err(reason) = self.correlation.validate(request, &mut properties) {
            return AuthenticateOutcome::Rejected { properties, reason };
        }

        match self.complete_login(request, code, properties.clone()).await {
            Ok(ticket) => AuthenticateOutcome::Authenticated(ticket),
            Err(reason) => {
                error!("Bungie.net login failed: {}", reason);
                AuthenticateOutcome::Rejected { properties, reason }
            }
        }
    }

    async fn complete_login(
        &self,
        request: &RequestContext,
        code: Option<String>,
        properties: AuthProperties,
    ) -> BungieResult<AuthenticationTicket> {
        let code = code.ok_or(BungieError::MissingAuthorizationCode)?;
        let redirect_uri = self.callback_uri(request);

        let token = self.exchange_code(&code, &redirect_uri).await?;
        let Some(access_token) = token.access_token.clone() else {
            warn!("Access token was not found");
            return Err(BungieError::MissingTokenField("access_token"));
        };
        let Some(membership_id) = token.membership_id.clone() else {
            warn!("Membership id was not found");
            return Err(BungieError::MissingTokenField("membership_id"));
        };

        let user = self.get_user(&access_token, &membership_id).await?;

        let mut context = BungieAuthenticatedContext::from_token_response(user, token.raw);
        let identity = context.build_identity(&self.options.authentication_type);
        if identity.name_identifier().is_none() {
            return Err(BungieError::MissingSubject);
        }
        context.identity = Some(identity);
        context.properties = properties;

        self.events.authenticated(&mut context).await?;

        let identity = context.identity.ok_or(BungieError::IdentityRejected)?;
        info!(
            "Bungie.net user {} authenticated",
            identity.name_identifier().unwrap_or_default()
        );
        Ok(AuthenticationTicket::new(Some(identity), context.properties))
    }

    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> BungieResult<TokenResponse> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("client_id", self.options.client_id.as_str()),
            ("client_secret", self.options.client_secret.as_str()),
        ];

        let response = self
            .client
            .post(&self.options.token_endpoint)
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            error!("Token exchange failed with status {}", status);
            return Err(BungieError::TokenExchangeFailed(status.as_u16()));
        }

        let body = read_bounded(response, MAX_RESPONSE_CONTENT_BUFFER_SIZE).await?;
        let raw: Value = serde_json::from_slice(&body)?;

        debug!("Exchanged authorization code for tokens");
        Ok(TokenResponse::from_json(raw))
    }

    fn user_info_uri(&self, membership_id: &str) -> String {
        format!("{}{}", self.options.user_info_endpoint, membership_id)
    }

    async fn get_user(&self, access_token: &str, membership_id: &str) -> BungieResult<Value> {
        let endpoint = self.user_info_uri(membership_id);

        let response = self
            .client
            .get(&endpoint)
            .header(header::ACCEPT, "application/json")
            .bearer_auth(access_token)
            .header(API_KEY_HEADER, &self.options.api_key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            error!("User info request failed with status {}", status);
            return Err(BungieError::UserInfoFailed(status.as_u16()));
        }

        let body = read_bounded(response, MAX_RESPONSE_CONTENT_BUFFER_SIZE).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Answer a request to the callback path.
    ///
    /// The correlation cookie is expired on every response.
    pub async fn invoke_return_path(&self, request: &RequestContext) -> Response {
        let mut response = self.return_endpoint(request).await;

        let removal = self.correlation.removal_cookie(request);
        match HeaderValue::from_str(&removal.to_string()) {
            Ok(value) => {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
            Err(e) => error!("Invalid correlation removal cookie: {}", e),
        }

        response
    }

    async fn return_endpoint(&self, request: &RequestContext) -> Response {
        let ticket = match self.authenticate(request).await {
            AuthenticateOutcome::NoTicket { reason } => {
                warn!("Invalid return state, unable to redirect: {}", reason);
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
            AuthenticateOutcome::Rejected { properties, reason } => {
                debug!("Returning without an identity: {}", reason);
                AuthenticationTicket::new(None, properties)
            }
            AuthenticateOutcome::Authenticated(ticket) => ticket,
        };

        let mut context = ReturnEndpointContext::new(ticket, self.sign_in_authentication_type());
        if let Err(e) = self.events.return_endpoint(&mut context).await {
            error!("Return endpoint hook failed: {}", e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }

        let sign_in_headers = self.sign_in_identity(&mut context).await;

        let decision = ReturnDecision::resolve(&context);
        let mut response = if let Some(response) = context.take_response() {
            response
        } else if let Some(redirect_uri) = &decision.redirect_uri {
            match HeaderValue::from_str(redirect_uri) {
                Ok(location) => (StatusCode::FOUND, [(header::LOCATION, location)]).into_response(),
                Err(e) => {
                    error!("Redirect target is not a valid header value: {}", e);
                    return StatusCode::INTERNAL_SERVER_ERROR.into_response();
                }
            }
        } else {
            StatusCode::OK.into_response()
        };

        for (name, value) in sign_in_headers.iter() {
            response.headers_mut().append(name.clone(), value.clone());
        }
        response
    }

    /// Hand the identity to the host's session mechanism.
    ///
    /// A failed sign-in drops the identity so the user is sent back with an error.
    async fn sign_in_identity(&self, context: &mut ReturnEndpointContext) -> HeaderMap {
        let (Some(sign_in_type), Some(identity)) = (
            context.sign_in_as_authentication_type.as_deref(),
            context.identity.as_ref(),
        ) else {
            return HeaderMap::new();
        };

        let Some(handler) = &self.sign_in else {
            warn!(
                "No sign-in handler registered for authentication type {}",
                sign_in_type
            );
            return HeaderMap::new();
        };

        let grant = if identity.authentication_type != sign_in_type {
            identity.with_authentication_type(sign_in_type)
        } else {
            identity.clone()
        };

        match handler.sign_in(&context.properties, &grant).await {
            Ok(headers) => headers,
            Err(e) => {
                error!("Sign-in as {} failed: {}", sign_in_type, e);
                context.identity = None;
                HeaderMap::new()
            }
        }
    }
}
