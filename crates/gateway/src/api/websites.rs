//! Read-only catalog listings used by the CLI.
//!
//! - `GET /api/v1/websites`
//! - `GET /api/v1/websites/:website/environments`

use axum::extract::{Path, State};
use axum::Json;
use serde_json::json;

use crate::state::AppState;

use super::check_segment;
use super::error::ApiError;

pub async fn list_websites(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let websites: Vec<serde_json::Value> = state
        .deployer
        .catalog
        .list_websites()
        .await?
        .into_iter()
        .map(|row| {
            json!({
                "name": row.name,
                "createdAt": row.created_at,
                "updatedAt": row.updated_at,
            })
        })
        .collect();
    Ok(Json(json!({ "websites": websites })))
}

pub async fn list_environments(
    State(state): State<AppState>,
    Path(website): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    check_segment("website", &website)?;

    let catalog = &state.deployer.catalog;
    let website_row = catalog
        .get_website(&website)
        .await?
        .ok_or_else(|| ApiError::not_found("website not found"))?;

    let environments: Vec<serde_json::Value> = catalog
        .list_environments(website_row.id)
        .await?
        .into_iter()
        .map(|row| {
            json!({
                "name": row.name,
                "activeReleaseId": row.active_release_id,
                "createdAt": row.created_at,
            })
        })
        .collect();
    Ok(Json(json!({ "environments": environments })))
}
