use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use base64::Engine as _;

use crate::error::RegistryError;
use crate::state::RegistryState;

/// HTTP Basic auth middleware. A no-op when `auth_mode=none`. On failure
/// the response is always the generic `UNAUTHORIZED` body — it never
/// discloses whether the user exists (spec.md §4.4).
pub async fn require_basic_auth(
    State(state): State<RegistryState>,
    request: Request,
    next: Next,
) -> Response {
    if !state.auth.requires_auth() {
        return next.run(request).await;
    }

    let Some((user, password)) = extract_basic(&request) else {
        return RegistryError::Unauthorized.into_response();
    };

    if state.auth.verify(&user, &password) {
        next.run(request).await
    } else {
        RegistryError::Unauthorized.into_response()
    }
}

fn extract_basic(request: &Request) -> Option<(String, String)> {
    let header = request.headers().get(axum::http::header::AUTHORIZATION)?.to_str().ok()?;
    let encoded = header.strip_prefix("Basic ")?;
    let decoded = base64::engine::general_purpose::STANDARD.decode(encoded).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, password) = decoded.split_once(':')?;
    Some((user.to_string(), password.to_string()))
}
