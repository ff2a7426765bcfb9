//! Tamper-evident encoding of [`AuthProperties`] for the OAuth2 `state` parameter.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::Utc;
use hmac::{Hmac, Mac};
use rand::{RngCore, rngs::OsRng};
use ras_identity_core::{AuthProperties, IdentityError, IdentityResult, SecureDataFormat};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;
use std::time::Duration;

type HmacSha256 = Hmac<Sha256>;

/// Allowed clock difference for payloads issued "in the future"
const CLOCK_SKEW_SECONDS: i64 = 60;

#[derive(Serialize, Deserialize)]
struct ProtectedPayload {
    iat: i64,
    properties: AuthProperties,
}

/// HMAC-SHA256 sealed properties: `base64url(json).base64url(mac)`.
///
/// The MAC covers a purpose string so a token sealed for one authentication
/// type is not accepted by another that happens to share the key.
#[derive(Clone)]
pub struct PropertiesDataFormat {
    key: Vec<u8>,
    purpose: String,
    lifetime: Duration,
}

impl fmt::Debug for PropertiesDataFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertiesDataFormat")
            .field("purpose", &self.purpose)
            .field("lifetime", &self.lifetime)
            .finish_non_exhaustive()
    }
}

impl PropertiesDataFormat {
    pub fn new(key: &[u8], purpose: impl Into<String>, lifetime: Duration) -> Self {
        Self {
            key: key.to_vec(),
            purpose: purpose.into(),
            lifetime,
        }
    }

    /// Same as [`PropertiesDataFormat::new`] with a fresh random 256-bit key
    pub fn with_random_key(purpose: impl Into<String>, lifetime: Duration) -> Self {
        let mut key = [0u8; 32];
        OsRng.fill_bytes(&mut key);
        Self::new(&key, purpose, lifetime)
    }

    fn mac(&self, encoded: &str) -> IdentityResult<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .map_err(|_| IdentityError::DataProtection("invalid key length".to_string()))?;
        mac.update(self.purpose.as_bytes());
        mac.update(b".");
        mac.update(encoded.as_bytes());
        Ok(mac)
    }
}

impl SecureDataFormat<AuthProperties> for PropertiesDataFormat {
    fn protect(&self, data: &AuthProperties) -> IdentityResult<String> {
        let payload = ProtectedPayload {
            iat: Utc::now().timestamp(),
            properties: data.clone(),
        };
        let encoded = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&payload)?);
        let signature = URL_SAFE_NO_PAD.encode(self.mac(&encoded)?.finalize().into_bytes());
        Ok(format!("{encoded}.{signature}"))
    }

    fn unprotect(&self, protected: &str) -> IdentityResult<AuthProperties> {
        let (encoded, signature) = protected
            .split_once('.')
            .ok_or_else(|| IdentityError::DataProtection("malformed state".to_string()))?;

        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| IdentityError::DataProtection("signature is not base64".to_string()))?;
        self.mac(encoded)?
            .verify_slice(&signature)
            .map_err(|_| IdentityError::DataProtection("signature mismatch".to_string()))?;

        let json = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|_| IdentityError::DataProtection("payload is not base64".to_string()))?;
        let payload: ProtectedPayload = serde_json::from_slice(&json)?;

        let age = Utc::now().timestamp() - payload.iat;
        if age < -CLOCK_SKEW_SECONDS || (age > 0 && age as u64 > self.lifetime.as_secs()) {
            return Err(IdentityError::DataProtection("state has expired".to_string()));
        }

        Ok(payload.properties)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIFETIME: Duration = Duration::from_secs(900);

    fn format() -> PropertiesDataFormat {
        PropertiesDataFormat::new(&[3u8; 32], "bungie.state.v1", LIFETIME)
    }

    fn sample_properties() -> AuthProperties {
        AuthProperties::new()
            .with_redirect_uri("https://app.example/home?tab=1")
            .with_item(".xsrf", "correlation-value")
            .with_item("custom", "value")
    }

    #[test]
    fn test_roundtrip_preserves_every_field() {
        let format = format();
        let token = format.protect(&sample_properties()).unwrap();

        assert_eq!(format.unprotect(&token).unwrap(), sample_properties());
    }

    #[test]
    fn test_other_key_or_purpose_fails() {
        let token = format().protect(&sample_properties()).unwrap();

        let other_key = PropertiesDataFormat::new(&[4u8; 32], "bungie.state.v1", LIFETIME);
        assert!(other_key.unprotect(&token).is_err());

        let other_purpose = PropertiesDataFormat::new(&[3u8; 32], "other.state.v1", LIFETIME);
        assert!(other_purpose.unprotect(&token).is_err());
    }

    #[test]
    fn test_any_flipped_byte_fails() {
        let format = format();
        let token = format.protect(&sample_properties()).unwrap();
        let bytes = token.as_bytes();

        for index in 0..bytes.len() {
            let mut tampered = bytes.to_vec();
            // Swap between two characters of the base64url alphabet ('.' becomes 'A')
            tampered[index] = if tampered[index] == b'A' { b'B' } else { b'A' };
            let tampered = String::from_utf8(tampered).unwrap();
            assert!(
                format.unprotect(&tampered).is_err(),
                "flipping byte {} was accepted",
                index
            );
        }
    }

    #[test]
    fn test_expired_state_fails() {
        let format = PropertiesDataFormat::new(&[3u8; 32], "bungie.state.v1", Duration::ZERO);
        let payload = ProtectedPayload {
            iat: Utc::now().timestamp() - 120,
            properties: sample_properties(),
        };
        let encoded = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&payload).unwrap());
        let signature = URL_SAFE_NO_PAD.encode(format.mac(&encoded).unwrap().finalize().into_bytes());

        let result = format.unprotect(&format!("{encoded}.{signature}"));
        assert!(matches!(result, Err(IdentityError::DataProtection(_))));
    }

    #[test]
    fn test_garbage_fails() {
        let format = format();

        assert!(format.unprotect("").is_err());
        assert!(format.unprotect("not-a-state").is_err());
        assert!(format.unprotect("a.b.c").is_err());
    }

    #[test]
    fn test_random_keys_differ() {
        let a = PropertiesDataFormat::with_random_key("p", LIFETIME);
        let b = PropertiesDataFormat::with_random_key("p", LIFETIME);

        let token = a.protect(&sample_properties()).unwrap();
        assert!(a.unprotect(&token).is_ok());
        assert!(b.unprotect(&token).is_err());
    }
}
