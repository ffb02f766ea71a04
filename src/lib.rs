use axum::{Router, middleware, response::IntoResponse, routing::get};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub mod auth;
pub mod config;

use auth::{
    AuthFlowController, AuthenticatedIdentity, JwksVerifier, OAuth2Client, ProviderMetadata,
    oidc_auth_middleware,
};

/// Install the global tracing subscriber. `RUST_LOG` takes precedence over `level`.
pub fn setup_tracing(level: &str, format: Option<&str>) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => {
            subscriber.with(fmt::layer().json()).init();
        }
        _ => {
            subscriber.with(fmt::layer()).init();
        }
    }
}

/// Build the OIDC controller, running provider discovery when endpoints are
/// not configured explicitly.
pub async fn build_controller(config: &config::Config) -> anyhow::Result<AuthFlowController> {
    config.validate()?;

    let metadata = if config.oidc.has_explicit_endpoints() {
        None
    } else {
        let http_client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.oidc.request_timeout_secs))
            .build()?;
        Some(ProviderMetadata::discover(&config.oidc.issuer, &http_client).await?)
    };

    let (client_config, verifier_config) = config.oidc.resolve(metadata.as_ref())?;

    let client = OAuth2Client::new(client_config)?;
    let verifier = JwksVerifier::new(verifier_config)?;

    Ok(
        AuthFlowController::new(Arc::new(client), config.state_cookie.clone())
            .with_verifier(Arc::new(verifier)),
    )
}

/// Demo application: `/whoami` behind the OIDC middleware, `/health` open.
///
/// The configured redirect URI must point at `/whoami` so the callback lands
/// on the path that started the flow.
pub fn app(controller: Arc<AuthFlowController>) -> Router {
    let protected = Router::new()
        .route("/whoami", get(whoami))
        .route_layer(middleware::from_fn_with_state(
            controller,
            oidc_auth_middleware,
        ));

    Router::new()
        .route("/health", get(health))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
}

async fn whoami(AuthenticatedIdentity(identity): AuthenticatedIdentity) -> impl IntoResponse {
    axum::Json(identity.as_ref().clone())
}

async fn health() -> &'static str {
    "ok"
}

/// Serve the demo application until `shutdown_rx` fires.
pub async fn start_server_with_config(
    config: config::Config,
    shutdown_rx: tokio::sync::oneshot::Receiver<()>,
) -> anyhow::Result<()> {
    let controller = Arc::new(build_controller(&config).await?);

    let addr = config.server.server_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("oidcgate listening on {}", listener.local_addr()?);

    axum::serve(listener, app(controller))
        .with_graceful_shutdown(async {
            shutdown_rx.await.ok();
        })
        .await?;

    info!("server stopped");
    Ok(())
}
