//! Release endpoints.
//!
//! - `POST /api/v1/websites/:w/environments/:e/releases` — build + activate
//! - `GET  /api/v1/websites/:w/environments/:e/releases` — history with
//!   actor resolution from the audit trail

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::state::AppState;

use super::auth::Actor;
use super::check_segment;
use super::error::ApiError;

pub async fn create_release(
    State(state): State<AppState>,
    Path((website, environment)): Path<(String, String)>,
    Extension(actor): Extension<Actor>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    check_segment("website", &website)?;
    check_segment("environment", &environment)?;

    let outcome = state
        .deployer
        .build_release(&website, &environment, &actor.0)
        .await?;

    let mut body = json!({
        "releaseId": outcome.release_id,
        "status": "active",
    });
    if let Some(previous) = outcome.previous_release_id {
        body["previousReleaseId"] = json!(previous);
    }
    Ok((StatusCode::CREATED, Json(body)))
}

#[derive(Debug, Deserialize)]
pub struct ListReleasesQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseListEntry {
    pub id: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
}

pub async fn list_releases(
    State(state): State<AppState>,
    Path((website, environment)): Path<(String, String)>,
    Query(query): Query<ListReleasesQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    check_segment("website", &website)?;
    check_segment("environment", &environment)?;
    if query.limit < 0 || query.limit > 200 || query.offset < 0 {
        return Err(ApiError::bad_request("limit must be 0..200 and offset >= 0"));
    }

    let catalog = &state.deployer.catalog;
    let website_row = catalog
        .get_website(&website)
        .await?
        .ok_or_else(|| ApiError::not_found("website not found"))?;
    let env_row = catalog
        .get_environment(website_row.id, &environment)
        .await?
        .ok_or_else(|| ApiError::not_found("environment not found"))?;

    let rows = catalog
        .list_releases(env_row.id, query.limit, query.offset)
        .await?;
    let ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
    let mut actors = catalog.latest_release_actors(env_row.id, &ids).await?;

    let releases: Vec<ReleaseListEntry> = rows
        .into_iter()
        .map(|row| ReleaseListEntry {
            active: env_row.active_release_id.as_deref() == Some(row.id.as_str()),
            actor: actors.remove(&row.id),
            status: row.status.clone(),
            created_at: row.created_at,
            id: row.id,
        })
        .collect();

    Ok(Json(json!({ "releases": releases })))
}
