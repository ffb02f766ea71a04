// Authentication Error Types
// Classified failures of the OIDC flow, their HTTP status and client-facing text

use axum::{
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use thiserror::Error;

use super::client::ProviderError;
use super::verifier::VerificationError;

#[derive(Debug, Error)]
pub enum AuthError {
    // Start phase
    #[error("failed to generate state token: {0}")]
    StateGeneration(String),

    #[error("failed to build authorization URL: {0}")]
    AuthorizationUrl(#[source] ProviderError),

    // State validation
    #[error("state cookie not present on callback request")]
    StateMissing,

    #[error("state parameter does not match state cookie")]
    StateMismatch,

    // Provider callback
    #[error("identity provider returned error `{error}`: {}", description.as_deref().unwrap_or("no description"))]
    ProviderRejected {
        error: String,
        description: Option<String>,
    },

    #[error("authorization code missing from callback")]
    MissingCode,

    #[error("OAuth2 code exchange failed: {0}")]
    TokenExchangeFailed(#[source] ProviderError),

    // ID token
    #[error("ID token verifier is not configured")]
    VerifierUnconfigured,

    #[error("token response does not carry a usable id_token")]
    InvalidIdToken,

    #[error("ID token verification failed: {0}")]
    TokenVerificationFailed(#[source] VerificationError),

    // Configuration errors
    #[error("Invalid configuration value for {key}: {reason}")]
    InvalidConfig { key: String, reason: String },
}

impl AuthError {
    pub fn invalid_config(key: impl Into<String>, reason: impl Into<String>) -> Self {
        AuthError::InvalidConfig {
            key: key.into(),
            reason: reason.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::StateMissing | AuthError::StateMismatch | AuthError::MissingCode => {
                StatusCode::BAD_REQUEST
            }

            AuthError::ProviderRejected { .. }
            | AuthError::TokenExchangeFailed(_)
            | AuthError::InvalidIdToken
            | AuthError::TokenVerificationFailed(_) => StatusCode::FORBIDDEN,

            AuthError::StateGeneration(_)
            | AuthError::AuthorizationUrl(_)
            | AuthError::VerifierUnconfigured
            | AuthError::InvalidConfig { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show to an untrusted client. Never includes the
    /// underlying cause.
    pub fn user_message(&self) -> &'static str {
        match self {
            AuthError::StateGeneration(_) | AuthError::AuthorizationUrl(_) => {
                "Unable to start authentication."
            }
            AuthError::StateMissing => "State not found. Unable to complete authentication.",
            AuthError::StateMismatch => "State mismatch. Unable to complete authentication.",
            AuthError::ProviderRejected { .. } => {
                "The identity provider rejected the sign-in. Unable to complete authentication."
            }
            AuthError::MissingCode => {
                "Authorization code missing. Unable to complete authentication."
            }
            AuthError::TokenExchangeFailed(_) => {
                "OAuth token exchange failed. Unable to complete authentication."
            }
            AuthError::VerifierUnconfigured => {
                "Verifier not configured. Unable to verify OIDC token."
            }
            AuthError::InvalidIdToken => "Invalid OIDC token. Unable to complete authentication.",
            AuthError::TokenVerificationFailed(_) => {
                "OIDC token verification failed. Unable to complete authentication."
            }
            AuthError::InvalidConfig { .. } => "Authentication is misconfigured.",
        }
    }

    /// Operator-side failures; everything else is caused by the client or the provider.
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }
}

/// `error` followed by every cause in its `source()` chain. Causes whose text
/// is already part of the message are skipped.
pub fn error_chain(error: &(dyn std::error::Error + 'static)) -> String {
    let mut message = error.to_string();
    let mut source = error.source();

    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }

    message
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        (
            self.status_code(),
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            self.user_message(),
        )
            .into_response()
    }
}
