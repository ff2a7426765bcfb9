//! Where the user-agent goes once the callback has been processed.

use axum::response::Response;
use ras_identity_core::{AuthProperties, AuthenticationTicket, ClaimsIdentity};
use url::form_urlencoded;

/// State handed to [`crate::BungieAuthenticationEvents::return_endpoint`].
///
/// The hook may replace the identity, change the redirect target or the
/// sign-in authentication type, or answer the request itself with
/// [`ReturnEndpointContext::complete_with`].
#[derive(Debug)]
pub struct ReturnEndpointContext {
    pub identity: Option<ClaimsIdentity>,
    pub properties: AuthProperties,
    pub sign_in_as_authentication_type: Option<String>,
    pub redirect_uri: Option<String>,
    request_completed: bool,
    response: Option<Response>,
}

impl ReturnEndpointContext {
    pub fn new(ticket: AuthenticationTicket, sign_in_as_authentication_type: Option<String>) -> Self {
        let redirect_uri = ticket.properties.redirect_uri.clone();
        Self {
            identity: ticket.identity,
            properties: ticket.properties,
            sign_in_as_authentication_type,
            redirect_uri,
            request_completed: false,
            response: None,
        }
    }

    pub fn is_request_completed(&self) -> bool {
        self.request_completed
    }

    /// Mark the request as handled; no redirect will be issued
    pub fn request_completed(&mut self) {
        self.request_completed = true;
    }

    /// Mark the request as handled and answer it with `response`
    pub fn complete_with(&mut self, response: Response) {
        self.request_completed = true;
        self.response = Some(response);
    }

    pub(crate) fn take_response(&mut self) -> Option<Response> {
        self.response.take()
    }
}

/// Outcome of the return endpoint once the hook has run
#[derive(Debug, Clone, PartialEq)]
pub struct ReturnDecision {
    pub identity: Option<ClaimsIdentity>,
    /// Target of the final 302, if any
    pub redirect_uri: Option<String>,
    /// Whether the request is answered after this decision
    pub completed: bool,
}

impl ReturnDecision {
    pub fn resolve(context: &ReturnEndpointContext) -> Self {
        if context.request_completed {
            return Self {
                identity: context.identity.clone(),
                redirect_uri: None,
                completed: true,
            };
        }

        let redirect_uri = context.redirect_uri.as_deref().map(|uri| {
            if context.identity.is_none() {
                add_query_string(uri, "error", "access_denied")
            } else {
                uri.to_string()
            }
        });

        Self {
            identity: context.identity.clone(),
            completed: redirect_uri.is_some(),
            redirect_uri,
        }
    }
}

/// Append `name=value` to `uri`, keeping any fragment at the end
pub fn add_query_string(uri: &str, name: &str, value: &str) -> String {
    let (base, fragment) = match uri.find('#') {
        Some(index) => uri.split_at(index),
        None => (uri, ""),
    };

    let separator = if base.contains('?') { '&' } else { '?' };
    let name: String = form_urlencoded::byte_serialize(name.as_bytes()).collect();
    let value: String = form_urlencoded::byte_serialize(value.as_bytes()).collect();

    format!("{base}{separator}{name}={value}{fragment}")
}
