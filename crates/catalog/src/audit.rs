//! Audit log rows. Append-only; the single writer is the audit pipeline in
//! the gateway.

use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::model::{AuditEntryRow, NewAuditEntry};
use crate::{Catalog, Result};

/// Filters for audit log listing. `None` fields are unconstrained.
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub environment_id: Option<i64>,
    pub operation: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: i64,
    pub offset: i64,
}

impl Catalog {
    /// Append one audit entry. Called only by the audit pipeline worker.
    pub async fn insert_audit_entry(&self, entry: &NewAuditEntry) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO audit_log (actor, ts, environment_id, operation,
                                    resource_summary, release_id, metadata_json)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&entry.actor)
        .bind(entry.ts)
        .bind(entry.environment_id)
        .bind(&entry.operation)
        .bind(&entry.resource_summary)
        .bind(&entry.release_id)
        .bind(serde_json::to_string(&entry.metadata)?)
        .execute(self.pool())
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// List audit entries, newest first.
    pub async fn list_audit_entries(&self, filter: &AuditFilter) -> Result<Vec<AuditEntryRow>> {
        let mut sql = String::from("SELECT * FROM audit_log WHERE 1 = 1");
        if filter.environment_id.is_some() {
            sql.push_str(" AND environment_id = ?");
        }
        if filter.operation.is_some() {
            sql.push_str(" AND operation = ?");
        }
        if filter.since.is_some() {
            sql.push_str(" AND ts >= ?");
        }
        if filter.until.is_some() {
            sql.push_str(" AND ts <= ?");
        }
        sql.push_str(" ORDER BY ts DESC, id DESC LIMIT ? OFFSET ?");

        let mut query = sqlx::query_as::<_, AuditEntryRow>(&sql);
        if let Some(env_id) = filter.environment_id {
            query = query.bind(env_id);
        }
        if let Some(operation) = &filter.operation {
            query = query.bind(operation);
        }
        if let Some(since) = filter.since {
            query = query.bind(since);
        }
        if let Some(until) = filter.until {
            query = query.bind(until);
        }
        query = query.bind(filter.limit).bind(filter.offset);

        Ok(query.fetch_all(self.pool()).await?)
    }

    /// For each given release, the actor of its most recent audit entry.
    /// Releases with no audit trail are absent from the map.
    pub async fn latest_release_actors(
        &self,
        environment_id: i64,
        release_ids: &[String],
    ) -> Result<HashMap<String, String>> {
        if release_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let placeholders = vec!["?"; release_ids.len()].join(", ");
        let sql = format!(
            "SELECT * FROM audit_log
             WHERE environment_id = ? AND release_id IN ({placeholders})
             ORDER BY ts DESC, id DESC"
        );

        let mut query = sqlx::query_as::<_, AuditEntryRow>(&sql).bind(environment_id);
        for id in release_ids {
            query = query.bind(id);
        }
        let rows = query.fetch_all(self.pool()).await?;

        // Rows arrive newest-first; first sighting per release wins.
        let mut actors = HashMap::new();
        for row in rows {
            if let Some(release_id) = row.release_id {
                actors.entry(release_id).or_insert(row.actor);
            }
        }
        Ok(actors)
    }
}
