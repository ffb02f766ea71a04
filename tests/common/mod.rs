// Shared fixtures for the integration tests: fake provider collaborators and
// a router with a recording downstream handler.
#![allow(dead_code)]

pub mod mock_provider;

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    extract::Request,
    http::{Response, header},
    middleware::from_fn_with_state,
    routing::get,
};
use oidcgate::auth::{
    AuthFlowController, AuthorizationClient, Identity, IdTokenVerifier, ProviderError,
    StateCookieConfig, TokenResponse, VerificationError, VerifiedIdToken, oidc_auth_middleware,
    retrieve_identity,
};
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use url::Url;

/// Detail only the server log may see
pub const SECRET_DETAIL: &str = "internal-detail-7f3a";

pub enum ExchangeOutcome {
    Token(TokenResponse),
    Fail(u16),
}

pub struct FakeClient {
    outcome: ExchangeOutcome,
    exchanges: AtomicUsize,
    codes: Mutex<Vec<String>>,
}

impl FakeClient {
    pub fn issuing(id_token: Option<&str>) -> Arc<Self> {
        let mut extra = HashMap::new();
        if let Some(id_token) = id_token {
            extra.insert("id_token".to_string(), Value::from(id_token));
        }

        Arc::new(Self::new(ExchangeOutcome::Token(TokenResponse {
            access_token: "access-token".to_string(),
            token_type: "Bearer".to_string(),
            expires_in: Some(3600),
            refresh_token: None,
            scope: Some("openid email profile".to_string()),
            extra,
        })))
    }

    pub fn failing(status: u16) -> Arc<Self> {
        Arc::new(Self::new(ExchangeOutcome::Fail(status)))
    }

    fn new(outcome: ExchangeOutcome) -> Self {
        Self {
            outcome,
            exchanges: AtomicUsize::new(0),
            codes: Mutex::new(Vec::new()),
        }
    }

    pub fn exchange_count(&self) -> usize {
        self.exchanges.load(Ordering::SeqCst)
    }

    pub fn exchanged_codes(&self) -> Vec<String> {
        self.codes.lock().unwrap().clone()
    }
}

#[async_trait]
impl AuthorizationClient for FakeClient {
    fn authorization_url(&self, state: &str) -> Result<Url, ProviderError> {
        Ok(Url::parse_with_params(
            "https://idp.example.com/authorize",
            &[
                ("client_id", "test-client"),
                ("redirect_uri", "https://app.example.com/auth"),
                ("response_type", "code"),
                ("scope", "openid email profile"),
                ("state", state),
            ],
        )?)
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenResponse, ProviderError> {
        self.exchanges.fetch_add(1, Ordering::SeqCst);
        self.codes.lock().unwrap().push(code.to_string());

        match &self.outcome {
            ExchangeOutcome::Token(token) => Ok(token.clone()),
            ExchangeOutcome::Fail(status) => Err(ProviderError::Status {
                status: *status,
                body: format!("invalid_grant: {}", SECRET_DETAIL),
            }),
        }
    }
}

pub struct FakeVerifier {
    result: Result<Map<String, Value>, String>,
    verified: Mutex<Vec<String>>,
}

impl FakeVerifier {
    pub fn accepting(claims: Value) -> Arc<Self> {
        let claims = match claims {
            Value::Object(map) => map,
            other => panic!("claims must be an object, got {}", other),
        };
        Arc::new(Self {
            result: Ok(claims),
            verified: Mutex::new(Vec::new()),
        })
    }

    pub fn rejecting() -> Arc<Self> {
        Arc::new(Self {
            result: Err(format!("signature invalid: {}", SECRET_DETAIL)),
            verified: Mutex::new(Vec::new()),
        })
    }

    pub fn verified_tokens(&self) -> Vec<String> {
        self.verified.lock().unwrap().clone()
    }
}

#[async_trait]
impl IdTokenVerifier for FakeVerifier {
    async fn verify(&self, raw_id_token: &str) -> Result<VerifiedIdToken, VerificationError> {
        self.verified.lock().unwrap().push(raw_id_token.to_string());

        match &self.result {
            Ok(claims) => {
                let subject = claims
                    .get("sub")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                Ok(VerifiedIdToken::new(subject, claims.clone()))
            }
            Err(message) => Err(VerificationError::Malformed(message.clone())),
        }
    }
}

pub fn standard_claims() -> Value {
    json!({"sub": "an-id", "name": "A Name", "email": "a@x.com"})
}

/// Router protecting `/auth` with the controller; the handler records the
/// identity it observes for every invocation.
pub struct Harness {
    pub app: Router,
    seen: Arc<Mutex<Vec<Option<Identity>>>>,
}

impl Harness {
    pub fn new(client: Arc<FakeClient>, verifier: Option<Arc<FakeVerifier>>) -> Self {
        let mut controller = AuthFlowController::new(client, StateCookieConfig::default());
        if let Some(verifier) = verifier {
            controller = controller.with_verifier(verifier);
        }

        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::clone(&seen);

        let app = Router::new()
            .route(
                "/auth",
                get(move |req: Request| async move {
                    let identity = retrieve_identity(req.extensions()).map(|i| (*i).clone());
                    recorder.lock().unwrap().push(identity);
                    "protected content"
                }),
            )
            .route_layer(from_fn_with_state(
                Arc::new(controller),
                oidc_auth_middleware,
            ));

        Self { app, seen }
    }

    /// Identities observed by the downstream handler, one per invocation
    pub fn seen(&self) -> Vec<Option<Identity>> {
        self.seen.lock().unwrap().clone()
    }
}

pub fn get_request(uri: &str, cookie: Option<&str>) -> Request {
    let mut builder = axum::http::Request::builder().uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Every `Set-Cookie` header of a response
pub fn set_cookies(response: &Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|value| value.to_str().unwrap().to_string())
        .collect()
}

/// Value of the `name` cookie in a `Set-Cookie` header
pub fn cookie_value<'a>(set_cookie: &'a str, name: &str) -> Option<&'a str> {
    set_cookie
        .split(';')
        .next()?
        .trim()
        .strip_prefix(name)?
        .strip_prefix('=')
}

/// `state` query parameter of the redirect `Location`
pub fn redirect_state(response: &Response<Body>) -> String {
    let location = response.headers()[header::LOCATION].to_str().unwrap();
    Url::parse(location)
        .unwrap()
        .query_pairs()
        .find(|(key, _)| key == "state")
        .map(|(_, value)| value.into_owned())
        .expect("redirect carries state")
}
