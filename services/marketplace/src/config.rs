//! Service configuration loaded from the environment

use std::path::Path;

use anyhow::{Context, Result};
use config::{Config, Environment};
use serde::Deserialize;

use crate::auth::{KeySource, VerifierSettings};

pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:3001";

/// Application configuration. Database settings live in
/// [`common::database::DatabaseConfig`].
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub bind_address: String,
    #[serde(default)]
    pub jwt_secret: Option<String>,
    /// Inline PEM or a path to a PEM file
    #[serde(default)]
    pub jwt_public_key: Option<String>,
    #[serde(default)]
    pub jwt_jwks_url: Option<String>,
    #[serde(default)]
    pub jwt_issuer: Option<String>,
    #[serde(default)]
    pub jwt_audience: Option<String>,
    #[serde(default)]
    pub payment_webhook_secret: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Config::builder()
            .set_default("bind_address", DEFAULT_BIND_ADDRESS)?
            .add_source(Environment::default())
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")
    }

    /// Pick the token key source. Exactly one of the JWT key settings must be set.
    pub fn key_source(&self) -> Result<KeySource> {
        let configured = [
            non_empty(&self.jwt_secret).map(|s| KeySource::SharedSecret(s.to_string())),
            non_empty(&self.jwt_public_key).map(|k| KeySource::PublicKeyPem(k.to_string())),
            non_empty(&self.jwt_jwks_url).map(|u| KeySource::JwksUrl(u.to_string())),
        ];
        let mut sources = configured.into_iter().flatten();

        let source = sources.next().context(
            "No token verification key configured; set JWT_SECRET, JWT_PUBLIC_KEY or JWT_JWKS_URL",
        )?;
        if sources.next().is_some() {
            anyhow::bail!("Set only one of JWT_SECRET, JWT_PUBLIC_KEY and JWT_JWKS_URL");
        }

        match source {
            KeySource::PublicKeyPem(value) if !value.contains("-----BEGIN") => {
                let pem = std::fs::read_to_string(Path::new(&value))
                    .with_context(|| format!("Failed to read public key file {}", value))?;
                Ok(KeySource::PublicKeyPem(pem))
            }
            other => Ok(other),
        }
    }

    pub fn verifier_settings(&self) -> VerifierSettings {
        VerifierSettings {
            issuer: non_empty(&self.jwt_issuer).map(str::to_string),
            audience: non_empty(&self.jwt_audience).map(str::to_string),
        }
    }

    pub fn webhook_secret(&self) -> Option<String> {
        non_empty(&self.payment_webhook_secret).map(str::to_string)
    }
}
