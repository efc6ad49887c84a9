//! Domain binding CRUD.
//!
//! - `GET    /api/v1/domains` — list all bindings
//! - `POST   /api/v1/domains` — body `{domain, website, environment}`
//! - `GET    /api/v1/domains/:domain`
//! - `DELETE /api/v1/domains/:domain`

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use hsd_catalog::DomainBindingRow;
use hsd_domain::name::normalize_domain;

use crate::state::AppState;

use super::auth::Actor;
use super::check_segment;
use super::error::ApiError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainView {
    pub domain: String,
    pub website: String,
    pub environment: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AppState {
    async fn domain_view(&self, row: DomainBindingRow) -> Result<DomainView, ApiError> {
        let catalog = &self.deployer.catalog;
        let env = catalog
            .get_environment_by_id(row.environment_id)
            .await?
            .ok_or_else(|| ApiError::internal("binding references missing environment"))?;
        let website = catalog
            .get_website_by_id(env.website_id)
            .await?
            .ok_or_else(|| ApiError::internal("environment references missing website"))?;
        Ok(DomainView {
            domain: row.domain,
            website: website.name,
            environment: env.name,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

pub async fn list_domains(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let rows = state.deployer.catalog.list_domain_bindings().await?;
    let mut domains = Vec::with_capacity(rows.len());
    for row in rows {
        domains.push(state.domain_view(row).await?);
    }
    Ok(Json(json!({ "domains": domains })))
}

pub async fn get_domain(
    State(state): State<AppState>,
    Path(domain): Path<String>,
) -> Result<Json<DomainView>, ApiError> {
    let normalized = normalize_domain(&domain)
        .map_err(|_| ApiError::bad_request("invalid domain"))?;
    let row = state
        .deployer
        .catalog
        .get_domain_binding(&normalized)
        .await?
        .ok_or_else(|| ApiError::not_found("domain binding not found"))?;
    Ok(Json(state.domain_view(row).await?))
}

#[derive(Debug, Deserialize)]
pub struct AddDomainRequest {
    pub domain: String,
    pub website: String,
    pub environment: String,
}

pub async fn add_domain(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(body): Json<AddDomainRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    check_segment("website", &body.website)?;
    check_segment("environment", &body.environment)?;

    let view = state
        .deployer
        .add_domain(&body.domain, &body.website, &body.environment, &actor.0)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "domain": view.domain,
            "website": view.website,
            "environment": view.environment,
            "createdAt": view.created_at,
        })),
    ))
}

pub async fn remove_domain(
    State(state): State<AppState>,
    Path(domain): Path<String>,
    Extension(actor): Extension<Actor>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.deployer.remove_domain(&domain, &actor.0).await?;
    Ok(Json(json!({ "status": "deleted" })))
}
