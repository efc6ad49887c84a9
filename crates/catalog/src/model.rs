//! Catalog row types.
//!
//! Rows mirror the SQLite schema one-to-one. Hash and release-id columns
//! stay `String` at this layer; the engines convert to the domain newtypes
//! at their edges.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Websites & environments
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, FromRow)]
pub struct WebsiteRow {
    pub id: i64,
    pub name: String,
    pub default_style_bundle: Option<String>,
    pub base_template: Option<String>,
    pub head_json: Option<String>,
    pub content_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct EnvironmentRow {
    pub id: i64,
    pub website_id: i64,
    pub name: String,
    pub active_release_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Content resources
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, FromRow)]
pub struct PageRow {
    pub id: i64,
    pub website_id: i64,
    pub name: String,
    pub route: String,
    pub head_json: Option<String>,
    pub content_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct ComponentRow {
    pub id: i64,
    pub website_id: i64,
    pub name: String,
    pub content_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct StyleBundleRow {
    pub id: i64,
    pub website_id: i64,
    pub name: String,
    /// JSON array of `{file, hash}` in canonical hash form.
    pub files_json: String,
    pub content_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct AssetRow {
    pub id: i64,
    pub website_id: i64,
    pub filename: String,
    pub content_type: Option<String>,
    pub content_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Whether an upsert created a row or replaced an existing one. Feeds the
/// apply change summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Releases
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseStatus {
    Building,
    Active,
    Failed,
    Superseded,
}

impl ReleaseStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ReleaseStatus::Building => "building",
            ReleaseStatus::Active => "active",
            ReleaseStatus::Failed => "failed",
            ReleaseStatus::Superseded => "superseded",
        }
    }

    pub fn parse(input: &str) -> Option<Self> {
        match input {
            "building" => Some(ReleaseStatus::Building),
            "active" => Some(ReleaseStatus::Active),
            "failed" => Some(ReleaseStatus::Failed),
            "superseded" => Some(ReleaseStatus::Superseded),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct ReleaseRow {
    pub id: String,
    pub environment_id: i64,
    pub manifest_json: String,
    pub output_hashes_json: String,
    pub build_log: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl ReleaseRow {
    pub fn status(&self) -> Option<ReleaseStatus> {
        ReleaseStatus::parse(&self.status)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Domain bindings & backends
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, FromRow)]
pub struct DomainBindingRow {
    pub id: i64,
    pub domain: String,
    pub environment_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct BackendRow {
    pub id: i64,
    pub environment_id: i64,
    pub path_prefix: String,
    pub upstream_url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Audit log
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// An entry queued for the audit pipeline.
#[derive(Debug, Clone)]
pub struct NewAuditEntry {
    pub actor: String,
    pub ts: DateTime<Utc>,
    pub environment_id: i64,
    pub operation: String,
    pub resource_summary: String,
    pub release_id: Option<String>,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, FromRow)]
pub struct AuditEntryRow {
    pub id: i64,
    pub actor: String,
    pub ts: DateTime<Utc>,
    pub environment_id: Option<i64>,
    pub operation: String,
    pub resource_summary: String,
    pub release_id: Option<String>,
    pub metadata_json: String,
}
