// In-process OpenID provider for exercising the HTTP client, discovery and
// JWKS verification against a real socket.
use axum::{
    Form, Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::oneshot;

pub const CLIENT_ID: &str = "test-client";
pub const CLIENT_SECRET: &str = "test-secret";
pub const KEY_ID: &str = "test-key";
const SIGNING_SECRET: &[u8] = b"mock-provider-signing-secret-0123456789";

struct ProviderState {
    issuer: String,
    token_requests: Mutex<Vec<HashMap<String, String>>>,
    jwks_fetches: AtomicUsize,
}

pub struct MockProvider {
    pub port: u16,
    state: Arc<ProviderState>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockProvider {
    /// Start a provider on a random available port
    pub async fn start() -> anyhow::Result<Self> {
        let addr = SocketAddr::from(([127, 0, 0, 1], 0));
        let listener = tokio::net::TcpListener::bind(addr).await?;
        let port = listener.local_addr()?.port();

        let state = Arc::new(ProviderState {
            issuer: format!("http://127.0.0.1:{}", port),
            token_requests: Mutex::new(Vec::new()),
            jwks_fetches: AtomicUsize::new(0),
        });

        let app = Router::new()
            .route("/.well-known/openid-configuration", get(handle_discovery))
            .route("/token", post(handle_token))
            .route("/jwks", get(handle_jwks))
            .with_state(Arc::clone(&state));

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .expect("mock provider failed");
        });

        Ok(Self {
            port,
            state,
            shutdown_tx: Some(shutdown_tx),
        })
    }

    pub fn issuer(&self) -> &str {
        &self.state.issuer
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.state.issuer, path)
    }

    pub fn token_requests(&self) -> Vec<HashMap<String, String>> {
        self.state.token_requests.lock().unwrap().clone()
    }

    pub fn jwks_fetches(&self) -> usize {
        self.state.jwks_fetches.load(Ordering::SeqCst)
    }

    /// Standard claims for `sub`, valid for five minutes
    pub fn claims(&self, sub: &str) -> Value {
        let now = unix_now();
        json!({
            "iss": self.state.issuer,
            "aud": CLIENT_ID,
            "sub": sub,
            "name": "A Name",
            "email": "a@x.com",
            "iat": now,
            "exp": now + 300,
        })
    }

    /// Sign `claims` with the provider key
    pub fn sign(&self, claims: &Value) -> String {
        sign_with(Algorithm::HS256, Some(KEY_ID), claims)
    }
}

impl Drop for MockProvider {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

pub fn sign_with(algorithm: Algorithm, kid: Option<&str>, claims: &Value) -> String {
    let mut header = Header::new(algorithm);
    header.kid = kid.map(str::to_string);
    encode(&header, claims, &EncodingKey::from_secret(SIGNING_SECRET)).unwrap()
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

// Handler functions

async fn handle_discovery(State(state): State<Arc<ProviderState>>) -> Json<Value> {
    Json(json!({
        "issuer": state.issuer,
        "authorization_endpoint": format!("{}/authorize", state.issuer),
        "token_endpoint": format!("{}/token", state.issuer),
        "jwks_uri": format!("{}/jwks", state.issuer),
        "response_types_supported": ["code"],
        "subject_types_supported": ["public"],
        "id_token_signing_alg_values_supported": ["HS256"],
    }))
}

/// Codes: `good-code` issues a valid ID token, `no-id-token` omits it,
/// `expired-code` issues an expired one; anything else is `invalid_grant`.
async fn handle_token(
    State(state): State<Arc<ProviderState>>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    state.token_requests.lock().unwrap().push(form.clone());

    let now = unix_now();
    let claims = json!({
        "iss": state.issuer,
        "aud": CLIENT_ID,
        "sub": "an-id",
        "name": "A Name",
        "email": "a@x.com",
        "iat": now,
        "exp": now + 300,
    });

    let id_token = match form.get("code").map(String::as_str) {
        Some("good-code") => Some(sign_with(Algorithm::HS256, Some(KEY_ID), &claims)),
        Some("no-id-token") => None,
        Some("expired-code") => {
            let mut expired = claims.clone();
            expired["iat"] = json!(now - 7200);
            expired["exp"] = json!(now - 3600);
            Some(sign_with(Algorithm::HS256, Some(KEY_ID), &expired))
        }
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "invalid_grant"})),
            )
                .into_response();
        }
    };

    let mut body = json!({
        "access_token": "mock-access-token",
        "token_type": "Bearer",
        "expires_in": 3600,
    });
    if let Some(id_token) = id_token {
        body["id_token"] = json!(id_token);
    }

    Json(body).into_response()
}

async fn handle_jwks(State(state): State<Arc<ProviderState>>) -> Json<Value> {
    state.jwks_fetches.fetch_add(1, Ordering::SeqCst);

    Json(json!({
        "keys": [{
            "kty": "oct",
            "kid": KEY_ID,
            "alg": "HS256",
            "k": URL_SAFE_NO_PAD.encode(SIGNING_SECRET),
        }]
    }))
}
