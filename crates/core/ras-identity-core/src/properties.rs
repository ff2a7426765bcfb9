//! Authentication properties and tickets.

use crate::claims::ClaimsIdentity;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// State carried across an external login round-trip.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthProperties {
    /// Where the user-agent goes once the login completes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,
    #[serde(default)]
    pub items: BTreeMap<String, String>,
}

impl AuthProperties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_redirect_uri(mut self, redirect_uri: impl Into<String>) -> Self {
        self.redirect_uri = Some(redirect_uri.into());
        self
    }

    pub fn with_item(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.items.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.items.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.items.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.items.remove(key)
    }
}

/// Result of an external authentication attempt.
///
/// `identity` is `None` when the attempt failed after the properties were
/// recovered.
#[derive(Debug, Clone)]
pub struct AuthenticationTicket {
    pub identity: Option<ClaimsIdentity>,
    pub properties: AuthProperties,
}

impl AuthenticationTicket {
    pub fn new(identity: Option<ClaimsIdentity>, properties: AuthProperties) -> Self {
        Self {
            identity,
            properties,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_properties_serialization_skips_missing_redirect() {
        let properties = AuthProperties::new().with_item("returnTo", "/home");

        let json = serde_json::to_value(&properties).unwrap();
        assert!(json.get("redirect_uri").is_none());
        assert_eq!(json["items"]["returnTo"], "/home");

        let back: AuthProperties = serde_json::from_value(json).unwrap();
        assert_eq!(back, properties);
    }

    #[test]
    fn test_item_access() {
        let mut properties = AuthProperties::new().with_redirect_uri("https://app.example/home");
        properties.insert(".xsrf", "abc");

        assert_eq!(properties.get(".xsrf"), Some("abc"));
        assert_eq!(properties.remove(".xsrf"), Some("abc".to_string()));
        assert_eq!(properties.get(".xsrf"), None);
        assert_eq!(
            properties.redirect_uri.as_deref(),
            Some("https://app.example/home")
        );
    }
}
