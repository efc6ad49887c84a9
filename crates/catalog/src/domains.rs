//! Domain binding rows.
//!
//! Bindings are keyed by normalized domain. The restore path re-inserts a
//! deleted row with its original id and timestamps so external references
//! stay stable across a failed reload.

use chrono::Utc;
use sqlx::SqliteConnection;

use crate::model::DomainBindingRow;
use crate::{Catalog, Result};

impl Catalog {
    pub async fn get_domain_binding(&self, domain: &str) -> Result<Option<DomainBindingRow>> {
        Ok(sqlx::query_as::<_, DomainBindingRow>(
            "SELECT * FROM domain_bindings WHERE domain = ?",
        )
        .bind(domain)
        .fetch_optional(self.pool())
        .await?)
    }

    pub async fn list_domain_bindings(&self) -> Result<Vec<DomainBindingRow>> {
        Ok(sqlx::query_as::<_, DomainBindingRow>(
            "SELECT * FROM domain_bindings ORDER BY domain",
        )
        .fetch_all(self.pool())
        .await?)
    }

    pub async fn list_domain_bindings_for_environment(
        &self,
        environment_id: i64,
    ) -> Result<Vec<DomainBindingRow>> {
        Ok(sqlx::query_as::<_, DomainBindingRow>(
            "SELECT * FROM domain_bindings WHERE environment_id = ? ORDER BY domain",
        )
        .bind(environment_id)
        .fetch_all(self.pool())
        .await?)
    }

    /// Insert a new binding. A duplicate domain surfaces as
    /// `CatalogError::UniqueViolation`.
    pub async fn insert_domain_binding(
        &self,
        conn: &mut SqliteConnection,
        domain: &str,
        environment_id: i64,
    ) -> Result<DomainBindingRow> {
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO domain_bindings (domain, environment_id, created_at, updated_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(domain)
        .bind(environment_id)
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        Ok(sqlx::query_as::<_, DomainBindingRow>(
            "SELECT * FROM domain_bindings WHERE domain = ?",
        )
        .bind(domain)
        .fetch_one(conn)
        .await?)
    }

    pub async fn delete_domain_binding(
        &self,
        conn: &mut SqliteConnection,
        domain: &str,
    ) -> Result<bool> {
        let deleted = sqlx::query("DELETE FROM domain_bindings WHERE domain = ?")
            .bind(domain)
            .execute(conn)
            .await?
            .rows_affected();
        Ok(deleted > 0)
    }

    /// Re-insert a binding exactly as it was (id and timestamps included).
    pub async fn restore_domain_binding(
        &self,
        conn: &mut SqliteConnection,
        row: &DomainBindingRow,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO domain_bindings (id, domain, environment_id, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(row.id)
        .bind(&row.domain)
        .bind(row.environment_id)
        .bind(row.created_at)
        .bind(row.updated_at)
        .execute(conn)
        .await?;
        Ok(())
    }
}
