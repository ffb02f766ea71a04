/// OAuth2 Client
///
/// The two provider operations the authorization-code flow needs: building
/// the authorization redirect and exchanging the returned code for tokens.
use async_trait::async_trait;
use axum::http::header;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use url::Url;

use super::config::OAuth2ClientConfig;
use super::error::AuthError;

// Provider error bodies are kept for logs only; cap what we hold on to.
const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("invalid provider URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("HTTP request to provider failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider responded with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed provider response: {0}")]
    Decode(String),
}

/// OAuth2 token endpoint response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    /// Access token for API requests
    pub access_token: String,

    /// Token type (usually "Bearer")
    pub token_type: String,

    /// Token expiration time in seconds
    #[serde(default)]
    pub expires_in: Option<u64>,

    #[serde(default)]
    pub refresh_token: Option<String>,

    #[serde(default)]
    pub scope: Option<String>,

    /// Every field not covered above, e.g. the OIDC `id_token`
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl TokenResponse {
    /// Provider-specific field of the token response
    pub fn extra(&self, key: &str) -> Option<&serde_json::Value> {
        self.extra.get(key)
    }

    /// Raw `id_token`, if present and a string
    pub fn id_token(&self) -> Option<&str> {
        self.extra("id_token").and_then(serde_json::Value::as_str)
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuthorizationClient: Send + Sync {
    /// Provider authorization URL carrying `state` as the correlation parameter
    fn authorization_url(&self, state: &str) -> Result<Url, ProviderError>;

    /// Exchange an authorization code at the token endpoint
    async fn exchange_code(&self, code: &str) -> Result<TokenResponse, ProviderError>;
}

/// Token request body (client_secret_post)
#[derive(Debug, Serialize)]
struct TokenRequest<'a> {
    grant_type: &'static str,
    code: &'a str,
    redirect_uri: &'a str,
    client_id: &'a str,
    client_secret: &'a str,
}

/// Confidential OAuth2 client talking to one provider over HTTP
pub struct OAuth2Client {
    config: OAuth2ClientConfig,
    auth_url: Url,
    token_url: Url,
    http_client: reqwest::Client,
}

impl OAuth2Client {
    pub fn new(config: OAuth2ClientConfig) -> Result<Self, AuthError> {
        config.validate()?;

        let auth_url = Url::parse(&config.auth_url)
            .map_err(|e| AuthError::invalid_config("oidc.auth_url", e.to_string()))?;
        let token_url = Url::parse(&config.token_url)
            .map_err(|e| AuthError::invalid_config("oidc.token_url", e.to_string()))?;

        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| {
                AuthError::invalid_config("oidc", format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            config,
            auth_url,
            token_url,
            http_client,
        })
    }

    pub fn config(&self) -> &OAuth2ClientConfig {
        &self.config
    }
}

#[async_trait]
impl AuthorizationClient for OAuth2Client {
    fn authorization_url(&self, state: &str) -> Result<Url, ProviderError> {
        let mut url = self.auth_url.clone();

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("client_id", &self.config.client_id);
            query.append_pair("redirect_uri", &self.config.redirect_uri);
            query.append_pair("response_type", "code");
            query.append_pair("scope", &self.config.effective_scopes().join(" "));
            query.append_pair("state", state);

            for (key, value) in &self.config.extra_params {
                query.append_pair(key, value);
            }
        }

        Ok(url)
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenResponse, ProviderError> {
        let request = TokenRequest {
            grant_type: "authorization_code",
            code,
            redirect_uri: &self.config.redirect_uri,
            client_id: &self.config.client_id,
            client_secret: &self.config.client_secret,
        };

        let response = self
            .http_client
            .post(self.token_url.clone())
            .header(header::ACCEPT, "application/json")
            .form(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let mut body = response.text().await.unwrap_or_default();
            truncate_on_char_boundary(&mut body, MAX_ERROR_BODY);
            return Err(ProviderError::Status { status, body });
        }

        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| ProviderError::Decode(e.to_string()))
    }
}

fn truncate_on_char_boundary(text: &mut String, max: usize) {
    if text.len() > max {
        let mut end = max;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text.truncate(end);
    }
}
