/// ID Token Verification
///
/// Checks the signature, issuer, audience and expiry of an OIDC ID token
/// against the provider's published signing keys.
use async_trait::async_trait;
use jsonwebtoken::{
    Algorithm, DecodingKey, Validation, decode, decode_header,
    jwk::{Jwk, JwkSet},
};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::time::Instant;
use thiserror::Error;
use tokio::sync::RwLock;

use super::config::VerifierConfig;
use super::error::AuthError;

#[derive(Debug, Error)]
pub enum VerificationError {
    #[error("malformed ID token: {0}")]
    Malformed(String),

    #[error("signing algorithm {0:?} is not accepted")]
    DisallowedAlgorithm(Algorithm),

    #[error("no provider signing key matches kid {0:?}")]
    UnknownKey(Option<String>),

    #[error("failed to fetch provider signing keys: {0}")]
    KeyFetch(String),

    #[error("ID token rejected: {0}")]
    Rejected(#[from] jsonwebtoken::errors::Error),
}

/// Claims of an ID token whose signature and registered claims were checked
#[derive(Debug, Clone)]
pub struct VerifiedIdToken {
    subject: String,
    claims: Map<String, Value>,
}

impl VerifiedIdToken {
    pub fn new(subject: impl Into<String>, claims: Map<String, Value>) -> Self {
        Self {
            subject: subject.into(),
            claims,
        }
    }

    /// The `sub` claim
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Deserialize the claim set into `T`
    pub fn claims<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(Value::Object(self.claims.clone()))
    }

    pub fn raw_claims(&self) -> &Map<String, Value> {
        &self.claims
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdTokenVerifier: Send + Sync {
    async fn verify(&self, raw_id_token: &str) -> Result<VerifiedIdToken, VerificationError>;
}

struct CachedKeySet {
    keys: JwkSet,
    fetched_at: Instant,
}

/// Verifier backed by the provider's JWKS endpoint
pub struct JwksVerifier {
    config: VerifierConfig,
    http_client: reqwest::Client,
    cache: RwLock<Option<CachedKeySet>>,
}

impl JwksVerifier {
    pub fn new(config: VerifierConfig) -> Result<Self, AuthError> {
        config.validate()?;

        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| {
                AuthError::invalid_config("oidc", format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            config,
            http_client,
            cache: RwLock::new(None),
        })
    }

    /// Key for `kid`, from cache when fresh. An unknown `kid` triggers one
    /// refetch to pick up provider key rotation.
    async fn signing_key(&self, kid: Option<&str>) -> Result<Jwk, VerificationError> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.fetched_at.elapsed() < self.config.jwks_cache_ttl() {
                    if let Some(jwk) = select_key(&cached.keys, kid) {
                        return Ok(jwk.clone());
                    }
                }
            }
        }

        let keys = self.fetch_keys().await?;
        let jwk = select_key(&keys, kid).cloned();

        *self.cache.write().await = Some(CachedKeySet {
            keys,
            fetched_at: Instant::now(),
        });

        jwk.ok_or_else(|| VerificationError::UnknownKey(kid.map(str::to_string)))
    }

    async fn fetch_keys(&self) -> Result<JwkSet, VerificationError> {
        tracing::debug!(jwks_uri = %self.config.jwks_uri, "fetching provider signing keys");

        let response = self
            .http_client
            .get(&self.config.jwks_uri)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| VerificationError::KeyFetch(e.to_string()))?;

        response
            .json::<JwkSet>()
            .await
            .map_err(|e| VerificationError::KeyFetch(e.to_string()))
    }
}

#[async_trait]
impl IdTokenVerifier for JwksVerifier {
    async fn verify(&self, raw_id_token: &str) -> Result<VerifiedIdToken, VerificationError> {
        let header = decode_header(raw_id_token)
            .map_err(|e| VerificationError::Malformed(e.to_string()))?;

        if !self.config.algorithms.contains(&header.alg) {
            return Err(VerificationError::DisallowedAlgorithm(header.alg));
        }

        let jwk = self.signing_key(header.kid.as_deref()).await?;
        let decoding_key = DecodingKey::from_jwk(&jwk)?;

        let mut validation = Validation::new(header.alg);
        validation.set_issuer(&[&self.config.issuer]);
        validation.set_audience(&[&self.config.client_id]);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);
        validation.leeway = self.config.leeway_secs;

        let token = decode::<Map<String, Value>>(raw_id_token, &decoding_key, &validation)?;

        let subject = token
            .claims
            .get("sub")
            .and_then(Value::as_str)
            .filter(|sub| !sub.is_empty())
            .ok_or_else(|| VerificationError::Malformed("empty sub claim".to_string()))?
            .to_string();

        Ok(VerifiedIdToken::new(subject, token.claims))
    }
}

// With a kid, only that key. Without one, only an unambiguous single key.
fn select_key<'a>(keys: &'a JwkSet, kid: Option<&str>) -> Option<&'a Jwk> {
    match kid {
        Some(kid) => keys.find(kid),
        None if keys.keys.len() == 1 => keys.keys.first(),
        None => None,
    }
}
