//! Backend entry CRUD — path-prefix → upstream mappings per environment.
//!
//! - `GET    /api/v1/websites/:w/environments/:e/backends`
//! - `POST   /api/v1/websites/:w/environments/:e/backends`
//!   body `{pathPrefix, upstreamUrl}`
//! - `DELETE /api/v1/websites/:w/environments/:e/backends?path=<prefix>`

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::json;

use hsd_catalog::{CatalogError, EnvironmentRow};

use crate::state::AppState;

use super::auth::Actor;
use super::check_segment;
use super::error::ApiError;

async fn resolve_environment(
    state: &AppState,
    website: &str,
    environment: &str,
) -> Result<EnvironmentRow, ApiError> {
    check_segment("website", website)?;
    check_segment("environment", environment)?;

    let catalog = &state.deployer.catalog;
    let website_row = catalog
        .get_website(website)
        .await?
        .ok_or_else(|| ApiError::not_found("website not found"))?;
    catalog
        .get_environment(website_row.id, environment)
        .await?
        .ok_or_else(|| ApiError::not_found("environment not found"))
}

pub async fn list_backends(
    State(state): State<AppState>,
    Path((website, environment)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let env = resolve_environment(&state, &website, &environment).await?;
    let backends: Vec<serde_json::Value> = state
        .deployer
        .catalog
        .list_backends(env.id)
        .await?
        .into_iter()
        .map(|row| {
            json!({
                "pathPrefix": row.path_prefix,
                "upstreamUrl": row.upstream_url,
                "createdAt": row.created_at,
                "updatedAt": row.updated_at,
            })
        })
        .collect();
    Ok(Json(json!({ "backends": backends })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertBackendRequest {
    pub path_prefix: String,
    pub upstream_url: String,
}

pub async fn upsert_backend(
    State(state): State<AppState>,
    Path((website, environment)): Path<(String, String)>,
    Extension(actor): Extension<Actor>,
    Json(body): Json<UpsertBackendRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let env = resolve_environment(&state, &website, &environment).await?;

    if !body.path_prefix.starts_with('/') {
        return Err(ApiError::bad_request("pathPrefix must start with '/'"));
    }
    if !body.upstream_url.starts_with("http://") && !body.upstream_url.starts_with("https://") {
        return Err(ApiError::bad_request("upstreamUrl must be an http(s) URL"));
    }

    let deployer = &state.deployer;
    let mut tx = deployer.catalog.begin().await?;
    let row = deployer
        .catalog
        .upsert_backend(&mut *tx, env.id, &body.path_prefix, &body.upstream_url)
        .await?;
    tx.commit().await.map_err(CatalogError::from)?;

    deployer.record_audit(
        &actor.0,
        env.id,
        "backend.upsert",
        format!("{website}/{environment}{}", row.path_prefix),
        None,
        json!({ "upstreamUrl": row.upstream_url }),
    );
    deployer.flush_audit().await;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "pathPrefix": row.path_prefix,
            "upstreamUrl": row.upstream_url,
        })),
    ))
}

#[derive(Debug, Deserialize)]
pub struct DeleteBackendQuery {
    pub path: String,
}

pub async fn delete_backend(
    State(state): State<AppState>,
    Path((website, environment)): Path<(String, String)>,
    Query(query): Query<DeleteBackendQuery>,
    Extension(actor): Extension<Actor>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let env = resolve_environment(&state, &website, &environment).await?;

    let deployer = &state.deployer;
    let mut tx = deployer.catalog.begin().await?;
    let deleted = deployer
        .catalog
        .delete_backend(&mut *tx, env.id, &query.path)
        .await?;
    tx.commit().await.map_err(CatalogError::from)?;

    if !deleted {
        return Err(ApiError::not_found("backend not found"));
    }

    deployer.record_audit(
        &actor.0,
        env.id,
        "backend.delete",
        format!("{website}/{environment}{}", query.path),
        None,
        json!({}),
    );
    deployer.flush_audit().await;

    Ok(Json(json!({ "status": "deleted" })))
}
