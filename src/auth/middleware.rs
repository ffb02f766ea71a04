/// OIDC Authentication Middleware
///
/// Drives the relying-party side of the authorization-code flow. Each request
/// is classified on its own: without a provider callback it starts the flow
/// (state cookie + redirect), with one it completes the flow (state check,
/// code exchange, ID token verification) and forwards the request with the
/// authenticated identity attached.
use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, Uri, header},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use serde_json::Value;
use std::sync::Arc;

use super::client::AuthorizationClient;
use super::config::StateCookieConfig;
use super::error::{AuthError, error_chain};
use super::identity::{Identity, attach_identity};
use super::state::{FlowStateToken, expired_state_cookie, read_cookie, state_cookie, state_matches};
use super::verifier::{IdTokenVerifier, VerifiedIdToken};

/// Query parameters of a provider callback
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackParams {
    /// Authorization code from provider
    pub code: Option<String>,

    /// CSRF state token
    pub state: Option<String>,

    /// Error from provider
    pub error: Option<String>,

    /// Error description from provider
    pub error_description: Option<String>,
}

/// Which half of the flow a request belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthPhase {
    Start,
    Complete(CallbackParams),
}

impl AuthPhase {
    /// A request is a callback when it carries `code` or `error`, even empty.
    pub fn classify(uri: &Uri) -> Self {
        let mut params = CallbackParams::default();

        if let Some(query) = uri.query() {
            for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
                let slot = match key.as_ref() {
                    "code" => &mut params.code,
                    "state" => &mut params.state,
                    "error" => &mut params.error,
                    "error_description" => &mut params.error_description,
                    _ => continue,
                };
                // First occurrence wins
                if slot.is_none() {
                    *slot = Some(value.into_owned());
                }
            }
        }

        if params.code.is_none() && params.error.is_none() {
            AuthPhase::Start
        } else {
            AuthPhase::Complete(params)
        }
    }
}

/// The OIDC relying-party controller.
///
/// Immutable once built and shared across requests behind an `Arc`; all
/// per-flow state travels through the browser.
pub struct AuthFlowController {
    client: Arc<dyn AuthorizationClient>,
    verifier: Option<Arc<dyn IdTokenVerifier>>,
    cookie: StateCookieConfig,
}

impl AuthFlowController {
    pub fn new(client: Arc<dyn AuthorizationClient>, cookie: StateCookieConfig) -> Self {
        Self {
            client,
            verifier: None,
            cookie,
        }
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn IdTokenVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    pub fn cookie_config(&self) -> &StateCookieConfig {
        &self.cookie
    }

    /// Issue a state cookie scoped to `path` and redirect to the provider.
    pub fn start_auth(&self, path: &str) -> Result<Response, AuthError> {
        let state = FlowStateToken::generate()?;

        let auth_url = self
            .client
            .authorization_url(state.as_str())
            .map_err(AuthError::AuthorizationUrl)?;

        let cookie = HeaderValue::from_str(&state_cookie(&self.cookie, &state, path))
            .map_err(|e| AuthError::invalid_config("state_cookie", e.to_string()))?;

        let mut response = Redirect::temporary(auth_url.as_str()).into_response();
        response.headers_mut().append(header::SET_COOKIE, cookie);

        tracing::debug!(path, "Redirecting to identity provider");
        Ok(response)
    }

    /// Validate a provider callback and produce the authenticated identity.
    ///
    /// Steps run in order and the first failure aborts the rest; no token
    /// exchange happens before the state has been validated.
    pub async fn complete_auth(
        &self,
        headers: &HeaderMap,
        params: &CallbackParams,
    ) -> Result<Identity, AuthError> {
        let expected = read_cookie(headers, &self.cookie.name)
            .filter(|value| !value.is_empty())
            .ok_or(AuthError::StateMissing)?;

        let submitted = params.state.as_deref().unwrap_or_default();
        if !state_matches(expected, submitted) {
            return Err(AuthError::StateMismatch);
        }

        if let Some(error) = &params.error {
            return Err(AuthError::ProviderRejected {
                error: error.clone(),
                description: params.error_description.clone(),
            });
        }

        let code = params
            .code
            .as_deref()
            .filter(|code| !code.is_empty())
            .ok_or(AuthError::MissingCode)?;

        let token = self
            .client
            .exchange_code(code)
            .await
            .map_err(AuthError::TokenExchangeFailed)?;

        let verifier = self
            .verifier
            .as_ref()
            .ok_or(AuthError::VerifierUnconfigured)?;

        let raw_id_token = token
            .id_token()
            .filter(|raw| !raw.is_empty())
            .ok_or(AuthError::InvalidIdToken)?;

        let id_token = verifier
            .verify(raw_id_token)
            .await
            .map_err(AuthError::TokenVerificationFailed)?;

        // The subject alone authenticates; profile claims only enrich.
        Ok(Identity::new(
            id_token.subject(),
            profile_claim(&id_token, "name"),
            profile_claim(&id_token, "email"),
        ))
    }

    /// Run the flow for one request, forwarding to `next` on completion.
    pub async fn handle(&self, req: Request, next: Next) -> Response {
        match AuthPhase::classify(req.uri()) {
            AuthPhase::Start => self
                .start_auth(req.uri().path())
                .unwrap_or_else(|e| reject(e, &req)),

            AuthPhase::Complete(params) => {
                // Body is not Sync; only the parts are borrowed across the exchange.
                let (parts, body) = req.into_parts();
                let result = self.complete_auth(&parts.headers, &params).await;
                let req = Request::from_parts(parts, body);

                match result {
                    Ok(identity) => self.forward(req, identity, next).await,
                    Err(e) => reject(e, &req),
                }
            }
        }
    }

    async fn forward(&self, req: Request, identity: Identity, next: Next) -> Response {
        tracing::info!(subject = %identity.id, "OIDC authentication completed");

        let path = req.uri().path().to_string();
        let mut response = next.run(attach_identity(req, identity)).await;

        if self.cookie.clear_after_use {
            if let Ok(cookie) = HeaderValue::from_str(&expired_state_cookie(&self.cookie, &path)) {
                response.headers_mut().append(header::SET_COOKIE, cookie);
            }
        }

        response
    }
}

/// String claim read on its own, so one mistyped claim does not hide the others.
/// Absent or non-string values become an empty string.
fn profile_claim(id_token: &VerifiedIdToken, name: &str) -> String {
    match id_token.raw_claims().get(name) {
        Some(Value::String(value)) => value.clone(),
        Some(other) => {
            tracing::debug!(claim = name, "Ignoring non-string profile claim: {}", other);
            String::new()
        }
        None => String::new(),
    }
}

fn reject(error: AuthError, req: &Request) -> Response {
    let detail = error_chain(&error);
    if error.is_server_error() {
        tracing::error!(path = %req.uri().path(), "OIDC authentication failed: {}", detail);
    } else {
        tracing::warn!(path = %req.uri().path(), "OIDC authentication rejected: {}", detail);
    }
    error.into_response()
}

/// Middleware entry point for `axum::middleware::from_fn_with_state`
pub async fn oidc_auth_middleware(
    State(controller): State<Arc<AuthFlowController>>,
    req: Request,
    next: Next,
) -> Response {
    controller.handle(req, next).await
}
