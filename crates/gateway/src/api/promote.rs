//! `POST /api/v1/websites/:website/promote` — body `{from, to}`.

use axum::extract::{Path, State};
use axum::{Extension, Json};
use serde::Deserialize;

use crate::engine::promote::PromoteOutcome;
use crate::state::AppState;

use super::auth::Actor;
use super::check_segment;
use super::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct PromoteRequest {
    pub from: String,
    pub to: String,
}

pub async fn promote(
    State(state): State<AppState>,
    Path(website): Path<String>,
    Extension(actor): Extension<Actor>,
    Json(body): Json<PromoteRequest>,
) -> Result<Json<PromoteOutcome>, ApiError> {
    check_segment("website", &website)?;
    check_segment("environment", &body.from)?;
    check_segment("environment", &body.to)?;

    let outcome = state
        .deployer
        .promote(&website, &body.from, &body.to, &actor.0)
        .await?;
    Ok(Json(outcome))
}
