// Authentication Module
// OpenID Connect relying-party flow for axum: state handshake, code exchange,
// ID token verification and the request-scoped authenticated identity

pub mod client;
pub mod config;
pub mod discovery;
pub mod error;
pub mod identity;
pub mod middleware;
pub mod state;
pub mod verifier;

pub use client::{AuthorizationClient, OAuth2Client, ProviderError, TokenResponse};
pub use config::{OAuth2ClientConfig, SameSitePolicy, StateCookieConfig, VerifierConfig};
pub use discovery::ProviderMetadata;
pub use error::{AuthError, error_chain};
pub use identity::{AuthenticatedIdentity, Identity, attach_identity, retrieve_identity};
pub use middleware::{AuthFlowController, AuthPhase, CallbackParams, oidc_auth_middleware};
pub use state::FlowStateToken;
pub use verifier::{IdTokenVerifier, JwksVerifier, VerificationError, VerifiedIdToken};
