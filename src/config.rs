// Application Configuration
// Server, OIDC provider, state cookie and logging settings loaded from a TOML
// file and OIDCGATE_* environment variables

use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use jsonwebtoken::Algorithm;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::auth::{AuthError, OAuth2ClientConfig, ProviderMetadata, StateCookieConfig, VerifierConfig};

const ENV_PREFIX: &str = "OIDCGATE_";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error(transparent)]
    Invalid(#[from] AuthError),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    pub oidc: OidcConfig,

    #[serde(default)]
    pub state_cookie: StateCookieConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from an optional TOML file, then environment
    /// variables (`OIDCGATE_OIDC__CLIENT_ID` sets `oidc.client_id`).
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(ConfigError::NotFound(p.to_path_buf()));
            }
            figment = figment.merge(Toml::file(p));
        }

        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config: Self = figment.extract().map_err(Box::new)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AuthError> {
        self.state_cookie.validate()?;

        if self.oidc.issuer.is_empty() {
            return Err(AuthError::invalid_config("oidc.issuer", "cannot be empty"));
        }

        if self.oidc.client_id.is_empty() {
            return Err(AuthError::invalid_config("oidc.client_id", "cannot be empty"));
        }

        url::Url::parse(&self.oidc.redirect_uri)
            .map_err(|e| AuthError::invalid_config("oidc.redirect_uri", e.to_string()))?;

        // Discovery uses this timeout before the client configs are validated
        if self.oidc.request_timeout_secs == 0 {
            return Err(AuthError::invalid_config(
                "oidc.request_timeout_secs",
                "must be at least 1 second",
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl ServerConfig {
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Identity provider settings. Endpoints left unset are discovered from the issuer.
#[derive(Clone, Deserialize)]
pub struct OidcConfig {
    pub issuer: String,
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    pub redirect_uri: String,

    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,

    #[serde(default)]
    pub auth_url: Option<String>,
    #[serde(default)]
    pub token_url: Option<String>,
    #[serde(default)]
    pub jwks_uri: Option<String>,

    #[serde(default = "default_algorithms")]
    pub algorithms: Vec<Algorithm>,

    #[serde(default)]
    pub extra_params: HashMap<String, String>,

    /// Clock skew tolerance for ID token `exp`, in seconds
    #[serde(default = "default_leeway")]
    pub leeway_secs: u64,

    #[serde(default = "default_jwks_cache_ttl")]
    pub jwks_cache_ttl_secs: u64,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl OidcConfig {
    /// True when every endpoint is configured and discovery can be skipped
    pub fn has_explicit_endpoints(&self) -> bool {
        self.auth_url.is_some() && self.token_url.is_some() && self.jwks_uri.is_some()
    }

    /// Client and verifier settings, filling unset endpoints from `metadata`
    pub fn resolve(
        &self,
        metadata: Option<&ProviderMetadata>,
    ) -> Result<(OAuth2ClientConfig, VerifierConfig), AuthError> {
        let endpoint = |configured: &Option<String>,
                        discovered: Option<&String>,
                        key: &str|
         -> Result<String, AuthError> {
            configured
                .clone()
                .or_else(|| discovered.cloned())
                .ok_or_else(|| AuthError::invalid_config(key, "not configured and not discovered"))
        };

        let client = OAuth2ClientConfig {
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            auth_url: endpoint(
                &self.auth_url,
                metadata.map(|m| &m.authorization_endpoint),
                "oidc.auth_url",
            )?,
            token_url: endpoint(
                &self.token_url,
                metadata.map(|m| &m.token_endpoint),
                "oidc.token_url",
            )?,
            redirect_uri: self.redirect_uri.clone(),
            scopes: self.scopes.clone(),
            extra_params: self.extra_params.clone(),
            request_timeout_secs: self.request_timeout_secs,
        };

        let mut verifier = VerifierConfig::new(
            self.issuer.clone(),
            self.client_id.clone(),
            endpoint(&self.jwks_uri, metadata.map(|m| &m.jwks_uri), "oidc.jwks_uri")?,
        );
        verifier.algorithms = self.algorithms.clone();
        verifier.leeway_secs = self.leeway_secs;
        verifier.jwks_cache_ttl_secs = self.jwks_cache_ttl_secs;
        verifier.request_timeout_secs = self.request_timeout_secs;

        Ok((client, verifier))
    }
}

impl fmt::Debug for OidcConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OidcConfig")
            .field("issuer", &self.issuer)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("redirect_uri", &self.redirect_uri)
            .field("scopes", &self.scopes)
            .field("auth_url", &self.auth_url)
            .field("token_url", &self.token_url)
            .field("jwks_uri", &self.jwks_uri)
            .field("algorithms", &self.algorithms)
            .field("leeway_secs", &self.leeway_secs)
            .field("jwks_cache_ttl_secs", &self.jwks_cache_ttl_secs)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// "json" for structured output, anything else for human-readable
    #[serde(default)]
    pub format: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: None,
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    4000
}

fn default_scopes() -> Vec<String> {
    vec![
        "openid".to_string(),
        "email".to_string(),
        "profile".to_string(),
    ]
}

fn default_algorithms() -> Vec<Algorithm> {
    vec![Algorithm::RS256]
}

fn default_leeway() -> u64 {
    60
}

fn default_jwks_cache_ttl() -> u64 {
    3600
}

fn default_request_timeout() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}
