//! Mapping of Bungie.net token and profile responses into a claims identity.

use ras_identity_core::{AuthProperties, Claim, ClaimsIdentity, claim_types};
use serde_json::Value;
use std::time::Duration;

/// Envelope key Bungie.net platform responses wrap their payload in
const RESPONSE_ENVELOPE: &str = "Response";

/// Fields of the token endpoint response the flow relies on
#[derive(Debug, Clone, PartialEq)]
pub struct TokenResponse {
    pub access_token: Option<String>,
    pub membership_id: Option<String>,
    pub raw: Value,
}

impl TokenResponse {
    /// Blank values are treated as absent
    pub fn from_json(raw: Value) -> Self {
        let non_blank = |key: &str| try_get_value(&raw, key).filter(|v| !v.trim().is_empty());
        Self {
            access_token: non_blank("access_token"),
            membership_id: non_blank("membership_id"),
            raw,
        }
    }
}

/// Everything known about a user right after a successful exchange.
///
/// Handed to [`crate::BungieAuthenticationEvents::authenticated`], which may add
/// claims, replace the properties or drop the identity altogether.
#[derive(Debug, Clone)]
pub struct BungieAuthenticatedContext {
    /// Raw profile JSON
    pub user: Value,
    pub token_response: Option<Value>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_in: Option<Duration>,
    pub refresh_expires_in: Option<Duration>,
    /// Bungie.net membership id
    pub id: Option<String>,
    /// Bungie.net display name
    pub name: Option<String>,
    pub identity: Option<ClaimsIdentity>,
    pub properties: AuthProperties,
}

impl BungieAuthenticatedContext {
    /// Profile with `membershipId` and `displayName` at the top level.
    ///
    /// Token metadata is supplied by the caller; expiry values that are not
    /// integer seconds are ignored.
    pub fn from_profile(
        user: Value,
        access_token: impl Into<String>,
        expires_in: Option<&str>,
        refresh_token: Option<String>,
        refresh_expires_in: Option<&str>,
    ) -> Self {
        let id = try_get_value(&user, "membershipId");
        let name = try_get_value(&user, "displayName");

        Self {
            user,
            token_response: None,
            access_token: Some(access_token.into()),
            refresh_token,
            expires_in: expires_in.and_then(parse_seconds),
            refresh_expires_in: refresh_expires_in.and_then(parse_seconds),
            id,
            name,
            identity: None,
            properties: AuthProperties::default(),
        }
    }

    /// Profile enveloped under `Response`, token metadata read from the raw
    /// token endpoint JSON.
    pub fn from_token_response(user: Value, token_response: Value) -> Self {
        let id = try_get_nested(&user, RESPONSE_ENVELOPE, "membershipId");
        let name = try_get_nested(&user, RESPONSE_ENVELOPE, "displayName");

        let seconds = |key: &str| {
            try_get_value(&token_response, key)
                .as_deref()
                .and_then(parse_seconds)
        };

        Self {
            access_token: try_get_value(&token_response, "access_token"),
            refresh_token: try_get_value(&token_response, "refresh_token"),
            expires_in: seconds("expires_in"),
            refresh_expires_in: seconds("refresh_expires_in"),
            token_response: Some(token_response),
            user,
            id,
            name,
            identity: None,
            properties: AuthProperties::default(),
        }
    }

    /// Claims identity for this user, issued by `authentication_type`
    pub fn build_identity(&self, authentication_type: &str) -> ClaimsIdentity {
        let mut identity = ClaimsIdentity::new(authentication_type);

        if let Some(id) = self.id.as_deref().filter(|v| !v.is_empty()) {
            identity.add_claim(Claim::new(
                claim_types::NAME_IDENTIFIER,
                id,
                authentication_type,
            ));
        }
        if let Some(name) = self.name.as_deref().filter(|v| !v.is_empty()) {
            identity.add_claim(Claim::new(claim_types::NAME, name, authentication_type));
        }

        identity
    }

    pub fn with_identity(mut self, identity: ClaimsIdentity) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn with_properties(mut self, properties: AuthProperties) -> Self {
        self.properties = properties;
        self
    }
}

/// Integer seconds, as Bungie.net sends them (string or number)
fn parse_seconds(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

/// JSON strings verbatim, other non-null values as their JSON text
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn try_get_value(object: &Value, key: &str) -> Option<String> {
    object.get(key).and_then(scalar_text)
}

fn try_get_nested(object: &Value, parent: &str, key: &str) -> Option<String> {
    object.get(parent).and_then(|inner| try_get_value(inner, key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_profile_shape_builds_claims() {
        let token = TokenResponse::from_json(json!({
            "access_token": "tok",
            "membership_id": "42"
        }));
        let context = BungieAuthenticatedContext::from_profile(
            json!({ "membershipId": "42", "displayName": "Guardian" }),
            token.access_token.clone().unwrap(),
            None,
            None,
            None,
        );

        assert_eq!(token.membership_id.as_deref(), Some("42"));
        assert_eq!(context.id.as_deref(), Some("42"));
        assert_eq!(context.name.as_deref(), Some("Guardian"));

        let identity = context.build_identity("Bungie");
        assert_eq!(identity.name_identifier(), Some("42"));
        assert_eq!(identity.name(), Some("Guardian"));
        assert_eq!(identity.claims.len(), 2);
        assert!(identity.claims.iter().all(|c| c.issuer == "Bungie"));
    }

    #[test]
    fn test_enveloped_shape_reads_token_metadata() {
        let context = BungieAuthenticatedContext::from_token_response(
            json!({ "Response": { "membershipId": 4611686018_i64, "displayName": "Cayde" } }),
            json!({
                "access_token": "tok",
                "refresh_token": "ref",
                "expires_in": 3600,
                "refresh_expires_in": "7776000",
                "membership_id": "4611686018"
            }),
        );

        assert_eq!(context.id.as_deref(), Some("4611686018"));
        assert_eq!(context.name.as_deref(), Some("Cayde"));
        assert_eq!(context.access_token.as_deref(), Some("tok"));
        assert_eq!(context.refresh_token.as_deref(), Some("ref"));
        assert_eq!(context.expires_in, Some(Duration::from_secs(3600)));
        assert_eq!(context.refresh_expires_in, Some(Duration::from_secs(7_776_000)));
        assert!(context.token_response.is_some());
    }

    #[test]
    fn test_shapes_do_not_cross() {
        let flat = json!({ "membershipId": "42", "displayName": "Guardian" });

        let context = BungieAuthenticatedContext::from_token_response(flat, json!({}));
        assert_eq!(context.id, None);
        assert_eq!(context.name, None);
        assert!(context.build_identity("Bungie").claims.is_empty());
    }

    #[test]
    fn test_missing_fields_are_tolerated() {
        let context = BungieAuthenticatedContext::from_profile(
            json!({ "displayName": "Guardian", "membershipId": null }),
            "tok",
            Some("soon"),
            None,
            None,
        );

        assert_eq!(context.id, None);
        assert_eq!(context.expires_in, None);

        let identity = context.build_identity("Bungie");
        assert_eq!(identity.name_identifier(), None);
        assert_eq!(identity.name(), Some("Guardian"));
    }

    #[test]
    fn test_empty_values_add_no_claims() {
        let context = BungieAuthenticatedContext::from_profile(
            json!({ "membershipId": "", "displayName": "" }),
            "tok",
            None,
            None,
            None,
        );

        assert!(context.build_identity("Bungie").claims.is_empty());
    }

    #[test]
    fn test_token_response_blank_fields_are_absent() {
        let token = TokenResponse::from_json(json!({
            "access_token": "  ",
            "membership_id": 42
        }));

        assert_eq!(token.access_token, None);
        assert_eq!(token.membership_id.as_deref(), Some("42"));
    }
}
