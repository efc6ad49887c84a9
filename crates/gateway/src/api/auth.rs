//! API authentication middleware.
//!
//! The API token comes from configuration (`api_token`, overridable via
//! `HTMLSERVD_API_TOKEN`) and is hashed **once at startup**; requests are
//! checked by hashing the presented token and comparing digests in constant
//! time.
//! - With a token configured, every `/api/*` request must carry
//!   `Authorization: Bearer <token>`.
//! - Without one, the server logs a warning once at startup and allows
//!   unauthenticated access (dev mode).
//!
//! The middleware also resolves the request **actor**: the `X-Actor` header
//! is trusted only on authenticated requests; everything else is `"local"`.

use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::state::AppState;

/// Identity credited to a mutating request. Inserted by the auth middleware.
#[derive(Debug, Clone)]
pub struct Actor(pub String);

pub const LOCAL_ACTOR: &str = "local";

/// Axum middleware that enforces bearer-token authentication on protected
/// routes. Attach via `axum::middleware::from_fn_with_state`.
pub async fn require_api_token(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    // `api_token_hash` is `None` in dev mode (no token configured).
    let Some(expected_hash) = &state.api_token_hash else {
        req.extensions_mut().insert(Actor(LOCAL_ACTOR.to_owned()));
        return next.run(req).await;
    };

    let provided = req
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or("");

    // Hash the provided token to a fixed-length digest, then compare in
    // constant time. This avoids leaking the token length.
    let provided_hash = Sha256::digest(provided.as_bytes());

    if !bool::from(provided_hash.ct_eq(expected_hash.as_slice())) {
        return (
            axum::http::StatusCode::UNAUTHORIZED,
            axum::Json(serde_json::json!({ "error": "invalid or missing API token" })),
        )
            .into_response();
    }

    // Authenticated: the caller may assert an actor identity.
    let actor = req
        .headers()
        .get("x-actor")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(LOCAL_ACTOR)
        .to_owned();
    req.extensions_mut().insert(Actor(actor));

    next.run(req).await
}
