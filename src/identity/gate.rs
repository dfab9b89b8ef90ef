use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::debug;

use super::principal::Principal;
use super::verifier::{AuthError, TokenVerifier};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthDecision {
    Admit(Principal),
    Reject(AuthError),
}

/// Admission check shared by the REST middleware and the GraphQL endpoint.
#[derive(Clone)]
pub struct AuthGate {
    verifier: Arc<dyn TokenVerifier>,
}

impl AuthGate {
    pub fn new(verifier: Arc<dyn TokenVerifier>) -> Self { Self { verifier } }

    pub async fn admit(&self, headers: &HeaderMap) -> AuthDecision {
        let token = match bearer_token(headers) {
            Ok(t) => t,
            Err(e) => return AuthDecision::Reject(e),
        };
        match self.verifier.verify(token).await {
            Ok(p) => AuthDecision::Admit(p),
            Err(e) => AuthDecision::Reject(e),
        }
    }

    /// Principal for requests that carry a valid credential; `None` otherwise.
    pub async fn identify(&self, headers: &HeaderMap) -> Option<Principal> {
        match self.admit(headers).await {
            AuthDecision::Admit(p) => Some(p),
            AuthDecision::Reject(_) => None,
        }
    }
}

/// Extract the token from `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let raw = headers.get(header::AUTHORIZATION).ok_or(AuthError::MissingCredential)?;
    let s = raw.to_str().map_err(|_| AuthError::MalformedCredential)?;
    let (scheme, token) = s.trim().split_once(' ').ok_or(AuthError::MalformedCredential)?;
    let token = token.trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() || token.contains(char::is_whitespace) {
        return Err(AuthError::MalformedCredential);
    }
    Ok(token)
}

/// Middleware placed in front of protected routes. Admitted requests carry the
/// `Principal` in their extensions; everything else gets the same 401.
pub async fn auth_gate(State(gate): State<AuthGate>, mut request: Request, next: Next) -> Response {
    match gate.admit(request.headers()).await {
        AuthDecision::Admit(principal) => {
            debug!(target: "auth", user = %principal.user_id, path = %request.uri().path(), "admitted");
            request.extensions_mut().insert(principal);
            next.run(request).await
        }
        AuthDecision::Reject(reason) => {
            debug!(target: "auth", path = %request.uri().path(), %reason, "rejected");
            unauthorized()
        }
    }
}

pub fn unauthorized() -> Response {
    let mut resp = (StatusCode::UNAUTHORIZED, Json(serde_json::json!({"status":"unauthorized"}))).into_response();
    resp.headers_mut().insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
    resp
}
