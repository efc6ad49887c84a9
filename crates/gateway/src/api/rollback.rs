//! `POST /api/v1/websites/:website/environments/:environment/rollback`

use axum::extract::{Path, State};
use axum::{Extension, Json};

use crate::engine::rollback::RollbackOutcome;
use crate::state::AppState;

use super::auth::Actor;
use super::check_segment;
use super::error::ApiError;

pub async fn rollback(
    State(state): State<AppState>,
    Path((website, environment)): Path<(String, String)>,
    Extension(actor): Extension<Actor>,
) -> Result<Json<RollbackOutcome>, ApiError> {
    check_segment("website", &website)?;
    check_segment("environment", &environment)?;

    let outcome = state
        .deployer
        .rollback(&website, &environment, &actor.0)
        .await?;
    Ok(Json(outcome))
}
