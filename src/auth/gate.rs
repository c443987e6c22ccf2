//! Authorization middleware for the protected API prefix.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode, header::AUTHORIZATION},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::debug;

use super::{AuthError, TokenVerifier};

/// Verified `sub` claim of the caller, inserted into request extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject(pub String);

impl Subject {
    /// The subject identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Read the ID token from the `Authorization` header.
///
/// Accepts `Bearer <token>` (scheme matched case-insensitively) as well as
/// the bare token, which is what the browser client sends.
fn bearer_token(request: &Request<Body>) -> Option<&str> {
    let value = request.headers().get(AUTHORIZATION)?.to_str().ok()?.trim();
    let token = match value.split_once(' ') {
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case("bearer") => rest.trim(),
        _ => value,
    };
    (!token.is_empty()).then_some(token)
}

/// Authorization gate.
///
/// Verifies the caller's ID token and either runs the wrapped handler with a
/// [`Subject`] extension, or answers `401` with an empty body. The failure
/// reason is logged, never returned.
pub async fn authorize(
    State(verifier): State<Arc<TokenVerifier>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let decision = bearer_token(&request)
        .ok_or(AuthError::MissingToken)
        .and_then(|token| verifier.verify(token));

    match decision {
        Ok(subject) => {
            debug!(sub = %subject, path = %request.uri().path(), "Authorized request");
            request.extensions_mut().insert(Subject(subject));
            next.run(request).await
        }
        Err(e) => {
            debug!(error = %e, path = %request.uri().path(), "Rejected request");
            unauthorized_response()
        }
    }
}

/// Create a 401 Unauthorized response
fn unauthorized_response() -> Response {
    (StatusCode::UNAUTHORIZED, [("WWW-Authenticate", "Bearer")]).into_response()
}
