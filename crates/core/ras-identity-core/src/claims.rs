//! Claims-based identity.

use serde::{Deserialize, Serialize};

/// Well-known claim type identifiers
pub mod claim_types {
    pub const NAME_IDENTIFIER: &str = "nameidentifier";
    pub const NAME: &str = "name";
    pub const ROLE: &str = "role";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    pub claim_type: String,
    pub value: String,
    /// Authentication type that vouched for the claim
    pub issuer: String,
}

impl Claim {
    pub fn new(
        claim_type: impl Into<String>,
        value: impl Into<String>,
        issuer: impl Into<String>,
    ) -> Self {
        Self {
            claim_type: claim_type.into(),
            value: value.into(),
            issuer: issuer.into(),
        }
    }
}

/// A set of claims tagged with the authentication type that produced them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimsIdentity {
    pub authentication_type: String,
    pub name_claim_type: String,
    pub role_claim_type: String,
    pub claims: Vec<Claim>,
}

impl ClaimsIdentity {
    /// Empty identity using the default name and role claim types
    pub fn new(authentication_type: impl Into<String>) -> Self {
        Self {
            authentication_type: authentication_type.into(),
            name_claim_type: claim_types::NAME.to_string(),
            role_claim_type: claim_types::ROLE.to_string(),
            claims: Vec::new(),
        }
    }

    pub fn add_claim(&mut self, claim: Claim) {
        self.claims.push(claim);
    }

    pub fn find_first(&self, claim_type: &str) -> Option<&Claim> {
        self.claims.iter().find(|c| c.claim_type == claim_type)
    }

    pub fn has_claim(&self, claim_type: &str, value: &str) -> bool {
        self.claims
            .iter()
            .any(|c| c.claim_type == claim_type && c.value == value)
    }

    /// Value of the first name claim
    pub fn name(&self) -> Option<&str> {
        self.find_first(&self.name_claim_type)
            .map(|c| c.value.as_str())
    }

    /// Value of the first name identifier claim
    pub fn name_identifier(&self) -> Option<&str> {
        self.find_first(claim_types::NAME_IDENTIFIER)
            .map(|c| c.value.as_str())
    }

    /// Copy of this identity under another authentication type.
    ///
    /// Claims and the name/role claim types are carried over unchanged.
    pub fn with_authentication_type(&self, authentication_type: impl Into<String>) -> Self {
        Self {
            authentication_type: authentication_type.into(),
            name_claim_type: self.name_claim_type.clone(),
            role_claim_type: self.role_claim_type.clone(),
            claims: self.claims.clone(),
        }
    }
}
