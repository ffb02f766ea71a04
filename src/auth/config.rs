// Authentication Configuration
// State cookie attributes, OAuth2 client credentials and ID token verification settings

use jsonwebtoken::Algorithm;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use url::Url;

use super::error::AuthError;

/// Attributes of the anti-CSRF state cookie
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateCookieConfig {
    /// Cookie name
    #[serde(default = "default_state_cookie_name")]
    pub name: String,

    /// Secure flag (HTTPS only) - should be true in production
    #[serde(default)]
    pub secure: bool,

    /// SameSite policy. Must allow the top-level redirect back from the provider.
    #[serde(default = "default_same_site")]
    pub same_site: SameSitePolicy,

    /// Lifetime of one authorization round-trip, in seconds
    #[serde(default = "default_state_max_age")]
    pub max_age_secs: u64,

    /// Expire the cookie on the response after a successful completion
    #[serde(default = "default_true")]
    pub clear_after_use: bool,
}

impl StateCookieConfig {
    pub fn validate(&self) -> Result<(), AuthError> {
        if self.name.is_empty() {
            return Err(AuthError::invalid_config(
                "state_cookie.name",
                "cannot be empty",
            ));
        }

        if !self.name.bytes().all(is_cookie_token_byte) {
            return Err(AuthError::invalid_config(
                "state_cookie.name",
                "must be an RFC 6265 token",
            ));
        }

        if self.same_site == SameSitePolicy::None && !self.secure {
            return Err(AuthError::invalid_config(
                "state_cookie.same_site",
                "none requires secure = true",
            ));
        }

        if self.max_age_secs == 0 {
            return Err(AuthError::invalid_config(
                "state_cookie.max_age_secs",
                "must be at least 1 second",
            ));
        }

        Ok(())
    }
}

impl Default for StateCookieConfig {
    fn default() -> Self {
        Self {
            name: default_state_cookie_name(),
            secure: false, // Development default
            same_site: default_same_site(),
            max_age_secs: default_state_max_age(),
            clear_after_use: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SameSitePolicy {
    Strict,
    Lax,
    None,
}

impl SameSitePolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            SameSitePolicy::Strict => "Strict",
            SameSitePolicy::Lax => "Lax",
            SameSitePolicy::None => "None",
        }
    }
}

/// Authorization request parameters owned by the client
const RESERVED_AUTH_PARAMS: &[&str] = &[
    "client_id",
    "redirect_uri",
    "response_type",
    "scope",
    "state",
];

/// OAuth2 client registration with the identity provider
#[derive(Clone, Serialize, Deserialize)]
pub struct OAuth2ClientConfig {
    /// Client ID from the provider
    pub client_id: String,

    /// Client secret from the provider
    pub client_secret: String,

    /// Authorization endpoint
    pub auth_url: String,

    /// Token endpoint
    pub token_url: String,

    /// Redirect URI (callback URL). Must hit the path protected by the middleware.
    pub redirect_uri: String,

    /// OAuth2 scopes to request; `openid` is always added
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,

    /// Additional authorization request parameters
    #[serde(default)]
    pub extra_params: HashMap<String, String>,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl OAuth2ClientConfig {
    pub fn validate(&self) -> Result<(), AuthError> {
        if self.client_id.is_empty() {
            return Err(AuthError::invalid_config("oidc.client_id", "cannot be empty"));
        }

        parse_url("oidc.auth_url", &self.auth_url)?;
        parse_url("oidc.token_url", &self.token_url)?;
        parse_url("oidc.redirect_uri", &self.redirect_uri)?;

        if self.request_timeout_secs == 0 {
            return Err(AuthError::invalid_config(
                "oidc.request_timeout_secs",
                "must be at least 1 second",
            ));
        }

        if let Some(key) = self
            .extra_params
            .keys()
            .find(|key| RESERVED_AUTH_PARAMS.contains(&key.as_str()))
        {
            return Err(AuthError::invalid_config(
                "oidc.extra_params",
                format!("`{}` is set by the client and cannot be overridden", key),
            ));
        }

        Ok(())
    }

    /// Scopes with `openid` guaranteed present
    pub fn effective_scopes(&self) -> Vec<String> {
        let mut scopes = self.scopes.clone();
        if !scopes.iter().any(|s| s == "openid") {
            scopes.insert(0, "openid".to_string());
        }
        scopes
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl fmt::Debug for OAuth2ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuth2ClientConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("auth_url", &self.auth_url)
            .field("token_url", &self.token_url)
            .field("redirect_uri", &self.redirect_uri)
            .field("scopes", &self.scopes)
            .field("extra_params", &self.extra_params)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

/// ID token verification settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifierConfig {
    /// Expected `iss` claim
    pub issuer: String,

    /// Expected `aud` claim
    pub client_id: String,

    /// Provider JSON Web Key Set endpoint
    pub jwks_uri: String,

    /// Accepted signing algorithms
    #[serde(default = "default_algorithms")]
    pub algorithms: Vec<Algorithm>,

    /// Clock skew tolerance for `exp`, in seconds
    #[serde(default = "default_leeway")]
    pub leeway_secs: u64,

    /// How long a fetched key set is trusted before it is refetched
    #[serde(default = "default_jwks_cache_ttl")]
    pub jwks_cache_ttl_secs: u64,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl VerifierConfig {
    pub fn new(
        issuer: impl Into<String>,
        client_id: impl Into<String>,
        jwks_uri: impl Into<String>,
    ) -> Self {
        Self {
            issuer: issuer.into(),
            client_id: client_id.into(),
            jwks_uri: jwks_uri.into(),
            algorithms: default_algorithms(),
            leeway_secs: default_leeway(),
            jwks_cache_ttl_secs: default_jwks_cache_ttl(),
            request_timeout_secs: default_request_timeout(),
        }
    }

    pub fn validate(&self) -> Result<(), AuthError> {
        if self.issuer.is_empty() {
            return Err(AuthError::invalid_config("oidc.issuer", "cannot be empty"));
        }

        if self.client_id.is_empty() {
            return Err(AuthError::invalid_config("oidc.client_id", "cannot be empty"));
        }

        parse_url("oidc.jwks_uri", &self.jwks_uri)?;

        if self.algorithms.is_empty() {
            return Err(AuthError::invalid_config(
                "oidc.algorithms",
                "at least one signing algorithm is required",
            ));
        }

        Ok(())
    }

    pub fn jwks_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.jwks_cache_ttl_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn parse_url(key: &str, value: &str) -> Result<Url, AuthError> {
    Url::parse(value).map_err(|e| AuthError::invalid_config(key, e.to_string()))
}

// RFC 6265 cookie-name: any CHAR except CTLs and separators
fn is_cookie_token_byte(b: u8) -> bool {
    b.is_ascii_graphic() && !b"()<>@,;:\\\"/[]?={}".contains(&b)
}

fn default_state_cookie_name() -> String {
    "_state".to_string()
}

fn default_same_site() -> SameSitePolicy {
    SameSitePolicy::Lax
}

fn default_state_max_age() -> u64 {
    600 // 10 minutes
}

fn default_true() -> bool {
    true
}

fn default_scopes() -> Vec<String> {
    vec![
        "openid".to_string(),
        "email".to_string(),
        "profile".to_string(),
    ]
}

fn default_request_timeout() -> u64 {
    30
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
