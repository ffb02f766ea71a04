/// Authenticated Identity
///
/// The end user produced by a completed OIDC flow, and the request-scoped
/// slot that carries it from the middleware to downstream handlers.
use axum::{
    extract::{FromRequestParts, OptionalFromRequestParts},
    http::{Extensions, Request, StatusCode, header, request::Parts},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::ops::Deref;
use std::sync::Arc;

/// Authenticated end user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Provider-issued subject identifier (`sub` claim), never empty
    pub id: String,

    /// Display name, empty when the provider did not supply one
    pub name: String,

    /// Email address, empty when the provider did not supply one
    pub email: String,
}

impl Identity {
    pub fn new(id: impl Into<String>, name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            email: email.into(),
        }
    }
}

// Private key type: only this module can write the slot, and values of any
// other type stored in the extensions are never mistaken for it.
#[derive(Clone)]
struct CurrentIdentity(Arc<Identity>);

/// Attach `identity` to the request. Other extensions are left untouched.
pub fn attach_identity<B>(mut request: Request<B>, identity: Identity) -> Request<B> {
    request
        .extensions_mut()
        .insert(CurrentIdentity(Arc::new(identity)));
    request
}

/// Identity attached by [`attach_identity`], or `None` if the request never
/// went through a successful authentication.
pub fn retrieve_identity(extensions: &Extensions) -> Option<Arc<Identity>> {
    extensions
        .get::<CurrentIdentity>()
        .map(|current| Arc::clone(&current.0))
}

/// Extractor for the authenticated identity.
///
/// Rejects with 401 when the route is reachable without the OIDC middleware.
/// Use `Option<AuthenticatedIdentity>` for routes where authentication is optional.
#[derive(Debug, Clone)]
pub struct AuthenticatedIdentity(pub Arc<Identity>);

impl Deref for AuthenticatedIdentity {
    type Target = Identity;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Rejection for a missing identity
#[derive(Debug)]
pub struct MissingIdentity;

impl IntoResponse for MissingIdentity {
    fn into_response(self) -> Response {
        (
            StatusCode::UNAUTHORIZED,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            "Authentication required.",
        )
            .into_response()
    }
}

impl<S> FromRequestParts<S> for AuthenticatedIdentity
where
    S: Send + Sync,
{
    type Rejection = MissingIdentity;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        retrieve_identity(&parts.extensions)
            .map(AuthenticatedIdentity)
            .ok_or(MissingIdentity)
    }
}

impl<S> OptionalFromRequestParts<S> for AuthenticatedIdentity
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        Ok(retrieve_identity(&parts.extensions).map(AuthenticatedIdentity))
    }
}
