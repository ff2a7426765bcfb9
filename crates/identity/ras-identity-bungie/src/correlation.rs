//! Anti-forgery correlation between the challenge and the callback (RFC 6749 §10.12).

use crate::error::{BungieError, BungieResult};
use crate::request::RequestContext;
use axum_extra::extract::cookie::{Cookie, SameSite};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{Rng, thread_rng};
use ras_identity_core::AuthProperties;
use tracing::warn;

/// Properties item holding the correlation value
pub const CORRELATION_KEY: &str = ".xsrf";

const CORRELATION_COOKIE_PREFIX: &str = ".ras.correlation.";

/// Binds a `state` value to the browser that started the login.
///
/// The same random value goes into the protected properties and into a
/// short-lived cookie; the callback is accepted only if both match.
#[derive(Debug, Clone)]
pub struct CorrelationGuard {
    cookie_name: String,
}

impl CorrelationGuard {
    pub fn new(authentication_type: &str) -> Self {
        Self {
            cookie_name: format!("{CORRELATION_COOKIE_PREFIX}{authentication_type}"),
        }
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// Stamp a fresh value into `properties` and return the matching cookie
    pub fn generate(
        &self,
        request: &RequestContext,
        properties: &mut AuthProperties,
    ) -> Cookie<'static> {
        let bytes: [u8; 32] = thread_rng().r#gen();
        let value = URL_SAFE_NO_PAD.encode(bytes);

        properties.insert(CORRELATION_KEY, value.clone());

        Cookie::build((self.cookie_name.clone(), value))
            .path(cookie_path(request))
            .http_only(true)
            .secure(request.is_https())
            .same_site(SameSite::Lax)
            .build()
    }

    /// Check the callback against the cookie. Fails closed.
    ///
    /// The correlation item is removed from `properties` whatever the result.
    pub fn validate(
        &self,
        request: &RequestContext,
        properties: &mut AuthProperties,
    ) -> BungieResult<()> {
        let expected = properties.remove(CORRELATION_KEY);

        let Some(cookie) = request.cookie(&self.cookie_name).filter(|v| !v.is_empty()) else {
            warn!("{} cookie not found", self.cookie_name);
            return Err(BungieError::CorrelationFailed("cookie missing".to_string()));
        };

        let Some(expected) = expected.filter(|v| !v.is_empty()) else {
            warn!("Correlation value missing from state");
            return Err(BungieError::CorrelationFailed(
                "state carries no correlation value".to_string(),
            ));
        };

        if !constant_time_eq(expected.as_bytes(), cookie.as_bytes()) {
            warn!("{} cookie does not match the state", self.cookie_name);
            return Err(BungieError::CorrelationFailed("value mismatch".to_string()));
        }

        Ok(())
    }

    /// Cookie that expires the correlation cookie on the user-agent
    pub fn removal_cookie(&self, request: &RequestContext) -> Cookie<'static> {
        let mut cookie = Cookie::build((self.cookie_name.clone(), ""))
            .path(cookie_path(request))
            .http_only(true)
            .secure(request.is_https())
            .same_site(SameSite::Lax)
            .build();
        cookie.make_removal();
        cookie
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn cookie_path(request: &RequestContext) -> String {
    if request.path_base.is_empty() {
        "/".to_string()
    } else {
        request.path_base.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, HeaderValue, header};

    fn request_with_cookie(cookie: Option<&str>) -> RequestContext {
        request_at("/signin-bungie", cookie)
    }

    fn request_at(path: &str, cookie: Option<&str>) -> RequestContext {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("app.example"));
        if let Some(cookie) = cookie {
            headers.insert(header::COOKIE, HeaderValue::from_str(cookie).unwrap());
        }
        RequestContext::from_parts(&path.parse().unwrap(), &headers)
    }

    #[test]
    fn test_generate_then_validate() {
        let guard = CorrelationGuard::new("Bungie");
        let mut properties = AuthProperties::new();

        let cookie = guard.generate(&request_with_cookie(None), &mut properties);
        assert_eq!(cookie.name(), ".ras.correlation.Bungie");
        assert_eq!(properties.get(CORRELATION_KEY), Some(cookie.value()));
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.path(), Some("/"));

        let callback = request_with_cookie(Some(&format!("{}={}", cookie.name(), cookie.value())));
        assert!(guard.validate(&callback, &mut properties).is_ok());
        assert_eq!(properties.get(CORRELATION_KEY), None);
    }

    #[test]
    fn test_values_are_unique() {
        let guard = CorrelationGuard::new("Bungie");
        let request = request_with_cookie(None);

        let a = guard.generate(&request, &mut AuthProperties::new());
        let b = guard.generate(&request, &mut AuthProperties::new());
        assert_ne!(a.value(), b.value());
    }

    #[test]
    fn test_missing_cookie_fails() {
        let guard = CorrelationGuard::new("Bungie");
        let mut properties = AuthProperties::new().with_item(CORRELATION_KEY, "abc");

        let result = guard.validate(&request_with_cookie(None), &mut properties);
        assert!(matches!(result, Err(BungieError::CorrelationFailed(_))));
        assert_eq!(properties.get(CORRELATION_KEY), None);
    }

    #[test]
    fn test_missing_or_empty_state_value_fails() {
        let guard = CorrelationGuard::new("Bungie");
        let request = request_with_cookie(Some(".ras.correlation.Bungie=abc"));

        let mut absent = AuthProperties::new();
        assert!(guard.validate(&request, &mut absent).is_err());

        let mut empty = AuthProperties::new().with_item(CORRELATION_KEY, "");
        assert!(guard.validate(&request, &mut empty).is_err());
    }

    #[test]
    fn test_empty_cookie_and_mismatch_fail() {
        let guard = CorrelationGuard::new("Bungie");

        let empty_cookie = request_with_cookie(Some(".ras.correlation.Bungie="));
        let mut properties = AuthProperties::new().with_item(CORRELATION_KEY, "abc");
        assert!(guard.validate(&empty_cookie, &mut properties).is_err());

        let other = request_with_cookie(Some(".ras.correlation.Bungie=xyz"));
        let mut properties = AuthProperties::new().with_item(CORRELATION_KEY, "abc");
        assert!(guard.validate(&other, &mut properties).is_err());
    }

    #[test]
    fn test_cookie_is_scoped_per_authentication_type() {
        let guard = CorrelationGuard::new("Bungie");
        let request = request_with_cookie(Some(".ras.correlation.Other=abc"));
        let mut properties = AuthProperties::new().with_item(CORRELATION_KEY, "abc");

        assert!(guard.validate(&request, &mut properties).is_err());
    }

    #[test]
    fn test_removal_cookie_expires() {
        let guard = CorrelationGuard::new("Bungie");
        let request = request_at("/portal/signin-bungie", None).with_path_base("/portal");

        let removal = guard.removal_cookie(&request);
        assert_eq!(removal.value(), "");
        assert_eq!(removal.path(), Some("/portal"));
        assert!(removal.to_string().contains("Max-Age=0"));
    }
}
