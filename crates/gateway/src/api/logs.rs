//! Audit log listing.
//!
//! - `GET /api/v1/logs` — all environments
//! - `GET /api/v1/websites/:w/environments/:e/logs` — one environment
//!
//! Filters: `limit` (0..200, default 50), `offset`, `operation`, `since`,
//! `until` (RFC 3339 timestamps).

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use hsd_catalog::audit::AuditFilter;
use hsd_catalog::AuditEntryRow;

use crate::state::AppState;

use super::check_segment;
use super::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
    #[serde(default)]
    pub operation: Option<String>,
    #[serde(default)]
    pub since: Option<DateTime<Utc>>,
    #[serde(default)]
    pub until: Option<DateTime<Utc>>,
}

fn default_limit() -> i64 {
    50
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntryView {
    pub id: i64,
    pub actor: String,
    pub ts: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment_id: Option<i64>,
    pub operation: String,
    pub resource_summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release_id: Option<String>,
    pub metadata: serde_json::Value,
}

impl From<AuditEntryRow> for AuditEntryView {
    fn from(row: AuditEntryRow) -> Self {
        let metadata =
            serde_json::from_str(&row.metadata_json).unwrap_or(serde_json::Value::Null);
        Self {
            id: row.id,
            actor: row.actor,
            ts: row.ts,
            environment_id: row.environment_id,
            operation: row.operation,
            resource_summary: row.resource_summary,
            release_id: row.release_id,
            metadata,
        }
    }
}

pub async fn list_logs(
    State(state): State<AppState>,
    Query(query): Query<LogsQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    list(state, query, None).await
}

pub async fn list_environment_logs(
    State(state): State<AppState>,
    Path((website, environment)): Path<(String, String)>,
    Query(query): Query<LogsQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    check_segment("website", &website)?;
    check_segment("environment", &environment)?;

    let catalog = &state.deployer.catalog;
    let website_row = catalog
        .get_website(&website)
        .await?
        .ok_or_else(|| ApiError::not_found("website not found"))?;
    let env_row = catalog
        .get_environment(website_row.id, &environment)
        .await?
        .ok_or_else(|| ApiError::not_found("environment not found"))?;

    list(state, query, Some(env_row.id)).await
}

async fn list(
    state: AppState,
    query: LogsQuery,
    environment_id: Option<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if query.limit < 0 || query.limit > 200 || query.offset < 0 {
        return Err(ApiError::bad_request("limit must be 0..200 and offset >= 0"));
    }

    let filter = AuditFilter {
        environment_id,
        operation: query.operation,
        since: query.since,
        until: query.until,
        limit: query.limit,
        offset: query.offset,
    };
    let entries: Vec<AuditEntryView> = state
        .deployer
        .catalog
        .list_audit_entries(&filter)
        .await?
        .into_iter()
        .map(Into::into)
        .collect();

    Ok(Json(json!({ "entries": entries })))
}
