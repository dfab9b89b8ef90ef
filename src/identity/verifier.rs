use std::path::Path;

use async_trait::async_trait;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::principal::Principal;
use crate::config::AuthConfig;

/// Reasons a credential was refused. Never sent to clients; the gate answers
/// every variant with the same generic denial.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("no credential supplied")]
    MissingCredential,
    #[error("credential is not a bearer token")]
    MalformedCredential,
    #[error("token expired")]
    Expired,
    #[error("invalid token: {0}")]
    InvalidToken(String),
    #[error("no verification key configured")]
    NotConfigured,
}

#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<Principal, AuthError>;
}

/// Claims understood by `JwtVerifier`. `exp` and `sub` are mandatory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,
}

impl From<Claims> for Principal {
    fn from(c: Claims) -> Self {
        Principal { user_id: c.sub, email: c.email, name: c.name, roles: c.roles }
    }
}

pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    /// HS256 verifier over a shared secret.
    pub fn hs256(secret: &[u8]) -> Self {
        Self::with_key(DecodingKey::from_secret(secret), Algorithm::HS256)
    }

    /// RS256 verifier over a PEM encoded public key.
    pub fn rs256_pem(pem: &[u8]) -> anyhow::Result<Self> {
        let key = DecodingKey::from_rsa_pem(pem)?;
        Ok(Self::with_key(key, Algorithm::RS256))
    }

    fn with_key(key: DecodingKey, alg: Algorithm) -> Self {
        let mut validation = Validation::new(alg);
        validation.set_required_spec_claims(&["exp", "sub"]);
        validation.validate_aud = false;
        Self { key, validation }
    }

    pub fn issuer(mut self, iss: &str) -> Self {
        self.validation.set_issuer(&[iss]);
        self
    }

    pub fn audience(mut self, aud: &str) -> Self {
        self.validation.set_audience(&[aud]);
        self.validation.validate_aud = true;
        self
    }

    /// Build from configuration. Returns `None` when no key is configured.
    pub fn from_config(cfg: &AuthConfig) -> anyhow::Result<Option<Self>> {
        let verifier = if let Some(secret) = &cfg.jwt_secret {
            Self::hs256(secret.as_bytes())
        } else if let Some(path) = &cfg.jwt_public_key_path {
            Self::rs256_pem(&read_pem(path)?)?
        } else {
            return Ok(None);
        };
        let verifier = match &cfg.issuer { Some(iss) => verifier.issuer(iss), None => verifier };
        let verifier = match &cfg.audience { Some(aud) => verifier.audience(aud), None => verifier };
        Ok(Some(verifier))
    }
}

fn read_pem(path: &Path) -> anyhow::Result<Vec<u8>> {
    use anyhow::Context;
    std::fs::read(path).with_context(|| format!("reading JWT public key {}", path.display()))
}

#[async_trait]
impl TokenVerifier for JwtVerifier {
    async fn verify(&self, token: &str) -> Result<Principal, AuthError> {
        match decode::<Claims>(token, &self.key, &self.validation) {
            Ok(data) => Ok(data.claims.into()),
            Err(e) => match e.kind() {
                ErrorKind::ExpiredSignature => Err(AuthError::Expired),
                _ => Err(AuthError::InvalidToken(e.to_string())),
            },
        }
    }
}

/// Rejects every credential. Installed when no verification key is configured.
pub struct DenyAllVerifier;

#[async_trait]
impl TokenVerifier for DenyAllVerifier {
    async fn verify(&self, _token: &str) -> Result<Principal, AuthError> {
        Err(AuthError::NotConfigured)
    }
}
