//! `POST /api/v1/websites/:website/environments/:environment/apply`
//!
//! Body: `application/x-tar` (optionally gzip-compressed), capped by
//! `limits.max_bundle_bytes` (413 above the cap). `?dry_run=true` validates
//! and projects without committing anything.

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::Extension;
use axum::Json;
use serde::Deserialize;

use crate::engine::apply::ApplyOutcome;
use crate::state::AppState;

use super::auth::Actor;
use super::error::ApiError;
use super::check_segment;

#[derive(Debug, Deserialize)]
pub struct ApplyQuery {
    #[serde(default)]
    pub dry_run: bool,
}

pub async fn apply(
    State(state): State<AppState>,
    Path((website, environment)): Path<(String, String)>,
    Query(query): Query<ApplyQuery>,
    Extension(actor): Extension<Actor>,
    body: Bytes,
) -> Result<Json<ApplyOutcome>, ApiError> {
    check_segment("website", &website)?;
    check_segment("environment", &environment)?;

    // Decoding hashes every file; keep it off the async workers.
    let bundle = tokio::task::spawn_blocking(move || hsd_bundle::decode(&body))
        .await
        .map_err(ApiError::internal)??;

    let outcome = state
        .deployer
        .apply(&website, &environment, &bundle, query.dry_run, &actor.0)
        .await?;
    Ok(Json(outcome))
}
