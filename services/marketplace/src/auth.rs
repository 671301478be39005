//! Bearer token verification against the identity provider's keys
//!
//! The identity provider issues the tokens; this service only verifies them.
//! Verification yields a [`VerifiedIdentity`] or nothing at all, never a
//! partially trusted identity.

use std::collections::HashMap;

use anyhow::{Context, Result};
use jsonwebtoken::{
    Algorithm, DecodingKey, Validation, decode, decode_header,
    jwk::{AlgorithmParameters, JwkSet},
};
use serde::Deserialize;
use tracing::{info, warn};

use crate::{
    error::{ApiError, ApiResult},
    models::User,
};

/// Where verification keys come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySource {
    /// HS256 shared secret
    SharedSecret(String),
    /// RS256 public key in PEM format
    PublicKeyPem(String),
    /// URL of the provider's JWKS document
    JwksUrl(String),
}

/// Claims the service relies on
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifierSettings {
    /// Expected `iss`; not checked when unset
    pub issuer: Option<String>,
    /// Expected `aud`; not checked when unset
    pub audience: Option<String>,
}

/// Identity extracted from a verified token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    pub subject_id: String,
    pub email: Option<String>,
    pub role: Option<String>,
}

/// Caller of a protected operation: the verified identity plus the stored profile
#[derive(Debug, Clone)]
pub struct Principal {
    pub identity: VerifiedIdentity,
    pub profile: User,
}

impl Principal {
    pub fn user_id(&self) -> &str {
        &self.profile.id
    }

    pub fn is_admin(&self) -> bool {
        self.profile.is_admin()
    }

    pub fn require_admin(&self) -> ApiResult<()> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(ApiError::Forbidden(
                "Administrator privileges required".to_string(),
            ))
        }
    }
}

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    role: Option<String>,
}

#[derive(Clone)]
enum DecodingKeys {
    Single(DecodingKey),
    ByKeyId(HashMap<String, DecodingKey>),
}

/// Verifies bearer tokens
#[derive(Clone)]
pub struct TokenVerifier {
    keys: DecodingKeys,
    validation: Validation,
}

fn build_validation(algorithm: Algorithm, settings: &VerifierSettings) -> Validation {
    let mut validation = Validation::new(algorithm);
    validation.validate_exp = true;

    if let Some(issuer) = &settings.issuer {
        validation.set_issuer(&[issuer]);
    }

    match &settings.audience {
        Some(audience) => validation.set_audience(&[audience]),
        None => validation.validate_aud = false,
    }

    validation
}

impl TokenVerifier {
    /// Verifier for HS256 tokens signed with a shared secret
    pub fn from_secret(secret: &str, settings: &VerifierSettings) -> Self {
        Self {
            keys: DecodingKeys::Single(DecodingKey::from_secret(secret.as_bytes())),
            validation: build_validation(Algorithm::HS256, settings),
        }
    }

    /// Verifier for RS256 tokens checked against one public key
    pub fn from_rsa_pem(pem: &str, settings: &VerifierSettings) -> Result<Self> {
        let key = DecodingKey::from_rsa_pem(pem.as_bytes()).context("Invalid RSA public key")?;

        Ok(Self {
            keys: DecodingKeys::Single(key),
            validation: build_validation(Algorithm::RS256, settings),
        })
    }

    /// Verifier for RS256 tokens checked against a JWKS, selected by `kid`
    pub fn from_jwks(jwks: &JwkSet, settings: &VerifierSettings) -> Result<Self> {
        let mut keys = HashMap::new();

        for jwk in &jwks.keys {
            let Some(kid) = jwk.common.key_id.clone() else {
                continue;
            };
            if !matches!(jwk.algorithm, AlgorithmParameters::RSA(_)) {
                continue;
            }
            keys.insert(kid, DecodingKey::from_jwk(jwk)?);
        }

        if keys.is_empty() {
            anyhow::bail!("JWKS contains no usable RSA signing keys");
        }

        Ok(Self {
            keys: DecodingKeys::ByKeyId(keys),
            validation: build_validation(Algorithm::RS256, settings),
        })
    }

    /// Build a verifier from configuration, fetching the JWKS when configured
    pub async fn from_source(source: &KeySource, settings: &VerifierSettings) -> Result<Self> {
        match source {
            KeySource::SharedSecret(secret) => Ok(Self::from_secret(secret, settings)),
            KeySource::PublicKeyPem(pem) => Self::from_rsa_pem(pem, settings),
            KeySource::JwksUrl(url) => {
                info!("Fetching JWKS from {}", url);
                let jwks = reqwest::get(url)
                    .await
                    .with_context(|| format!("Failed to fetch JWKS from {}", url))?
                    .error_for_status()?
                    .json::<JwkSet>()
                    .await
                    .context("Failed to parse JWKS document")?;
                Self::from_jwks(&jwks, settings)
            }
        }
    }

    /// Verify a bearer token.
    ///
    /// Returns `None` for a malformed, expired or wrongly signed token, or one
    /// that fails the issuer/audience checks.
    pub fn verify(&self, token: &str) -> Option<VerifiedIdentity> {
        let key = match &self.keys {
            DecodingKeys::Single(key) => key,
            DecodingKeys::ByKeyId(keys) => {
                let header = decode_header(token).ok()?;
                keys.get(header.kid.as_deref()?)?
            }
        };

        let claims = match decode::<Claims>(token, key, &self.validation) {
            Ok(data) => data.claims,
            Err(e) => {
                warn!("Rejected bearer token: {}", e);
                return None;
            }
        };

        if claims.sub.trim().is_empty() {
            warn!("Rejected bearer token without a subject");
            return None;
        }

        Some(VerifiedIdentity {
            subject_id: claims.sub,
            email: claims.email.filter(|e| !e.trim().is_empty()),
            role: claims.role,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use serde::Serialize;

    const SECRET: &str = "test-secret-with-enough-entropy";

    #[derive(Serialize)]
    struct TestClaims<'a> {
        sub: &'a str,
        exp: i64,
        #[serde(skip_serializing_if = "Option::is_none")]
        email: Option<&'a str>,
        #[serde(skip_serializing_if = "Option::is_none")]
        role: Option<&'a str>,
        #[serde(skip_serializing_if = "Option::is_none")]
        iss: Option<&'a str>,
        #[serde(skip_serializing_if = "Option::is_none")]
        aud: Option<&'a str>,
    }

    fn sign(secret: &str, claims: &TestClaims<'_>) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn claims(sub: &str) -> TestClaims<'_> {
        TestClaims {
            sub,
            exp: Utc::now().timestamp() + 3600,
            email: Some("naledi@example.com"),
            role: Some("provider"),
            iss: None,
            aud: None,
        }
    }

    #[test]
    fn accepts_valid_token() {
        let verifier = TokenVerifier::from_secret(SECRET, &VerifierSettings::default());
        let identity = verifier.verify(&sign(SECRET, &claims("user-1"))).unwrap();

        assert_eq!(identity.subject_id, "user-1");
        assert_eq!(identity.email.as_deref(), Some("naledi@example.com"));
        assert_eq!(identity.role.as_deref(), Some("provider"));
    }

    #[test]
    fn rejects_wrong_signature_expired_and_garbage() {
        let verifier = TokenVerifier::from_secret(SECRET, &VerifierSettings::default());

        assert!(verifier.verify(&sign("another-secret", &claims("user-1"))).is_none());

        let mut expired = claims("user-1");
        expired.exp = Utc::now().timestamp() - 3600;
        assert!(verifier.verify(&sign(SECRET, &expired)).is_none());

        assert!(verifier.verify("not.a.token").is_none());
        assert!(verifier.verify("").is_none());
    }

    #[test]
    fn rejects_blank_subject() {
        let verifier = TokenVerifier::from_secret(SECRET, &VerifierSettings::default());
        assert!(verifier.verify(&sign(SECRET, &claims(""))).is_none());
    }

    #[test]
    fn enforces_issuer_and_audience_when_configured() {
        let settings = VerifierSettings {
            issuer: Some("https://id.mphakathi.test/".to_string()),
            audience: Some("marketplace".to_string()),
        };
        let verifier = TokenVerifier::from_secret(SECRET, &settings);

        let mut good = claims("user-1");
        good.iss = Some("https://id.mphakathi.test/");
        good.aud = Some("marketplace");
        assert!(verifier.verify(&sign(SECRET, &good)).is_some());

        let mut wrong_issuer = claims("user-1");
        wrong_issuer.iss = Some("https://evil.test/");
        wrong_issuer.aud = Some("marketplace");
        assert!(verifier.verify(&sign(SECRET, &wrong_issuer)).is_none());

        let mut wrong_audience = claims("user-1");
        wrong_audience.iss = Some("https://id.mphakathi.test/");
        wrong_audience.aud = Some("someone-else");
        assert!(verifier.verify(&sign(SECRET, &wrong_audience)).is_none());
    }

    #[test]
    fn audience_in_token_is_ignored_when_not_configured() {
        let verifier = TokenVerifier::from_secret(SECRET, &VerifierSettings::default());
        let mut with_aud = claims("user-1");
        with_aud.aud = Some("authenticated");
        assert!(verifier.verify(&sign(SECRET, &with_aud)).is_some());
    }

    #[test]
    fn jwks_without_rsa_keys_is_rejected() {
        let jwks: JwkSet = serde_json::from_value(serde_json::json!({ "keys": [] })).unwrap();
        assert!(TokenVerifier::from_jwks(&jwks, &VerifierSettings::default()).is_err());
    }

    #[test]
    fn invalid_pem_is_rejected() {
        assert!(TokenVerifier::from_rsa_pem("not a pem", &VerifierSettings::default()).is_err());
    }
}
