//! Domain binding reconciliation.
//!
//! Each binding mutation commits to the catalog first and then asks the
//! external proxy to reload. A failed reload rolls the catalog change back
//! (add) or restores the original row with its id and timestamps (remove),
//! falling back to a single reconcile reload attempt when even that fails:
//!
//! ```text
//! absent --insert--> present --delete--> absent
//! present --delete + reload failure + restore success--> present
//! present --delete + reload failure + restore failure + reconcile success--> absent (reconciled)
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;

use hsd_catalog::{CatalogError, DomainBindingRow};
use hsd_domain::name::normalize_domain;

use super::Deployer;

#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    #[error("invalid domain: {0}")]
    InvalidDomain(String),

    #[error("website not found")]
    WebsiteNotFound,

    #[error("environment not found")]
    EnvironmentNotFound,

    #[error("domain is already bound")]
    AlreadyBound,

    #[error("domain binding not found")]
    BindingNotFound,

    #[error("proxy reload failed: {detail}")]
    ReloadFailed { detail: String },

    #[error("proxy reload failed and binding rollback failed: {detail}")]
    ReloadAndRollbackFailed { detail: String },

    #[error("catalog: {0}")]
    Catalog(#[from] CatalogError),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainBindingView {
    pub domain: String,
    pub website: String,
    pub environment: String,
    pub created_at: DateTime<Utc>,
}

impl Deployer {
    /// Bind `domain` to `(website, environment)` and reload the proxy.
    pub async fn add_domain(
        &self,
        domain: &str,
        website: &str,
        environment: &str,
        actor: &str,
    ) -> Result<DomainBindingView, DomainError> {
        let normalized =
            normalize_domain(domain).map_err(|e| DomainError::InvalidDomain(e.to_string()))?;

        let _guard = self.locks.lock_domain(&normalized).await;

        let website_row = self
            .catalog
            .get_website(website)
            .await?
            .ok_or(DomainError::WebsiteNotFound)?;
        let env_row = self
            .catalog
            .get_environment(website_row.id, environment)
            .await?
            .ok_or(DomainError::EnvironmentNotFound)?;

        let mut tx = self.catalog.begin().await?;
        let row = match self
            .catalog
            .insert_domain_binding(&mut *tx, &normalized, env_row.id)
            .await
        {
            Ok(row) => row,
            Err(CatalogError::UniqueViolation) => return Err(DomainError::AlreadyBound),
            Err(e) => return Err(e.into()),
        };
        tx.commit().await.map_err(CatalogError::from)?;

        if let Err(reload_err) = self
            .reloader
            .reload(&format!("domain.add {normalized}"))
            .await
        {
            tracing::warn!(domain = %normalized, error = %reload_err, "reload failed, rolling back binding");
            let rollback = async {
                let mut tx = self.catalog.begin().await?;
                self.catalog
                    .delete_domain_binding(&mut *tx, &normalized)
                    .await?;
                tx.commit().await.map_err(CatalogError::from)
            }
            .await;

            return match rollback {
                Ok(_) => Err(DomainError::ReloadFailed {
                    detail: reload_err.to_string(),
                }),
                Err(rollback_err) => {
                    // The binding row is still present but the proxy was
                    // never told; one reconcile attempt brings them back in
                    // line.
                    let reconcile = self
                        .reloader
                        .reload(&format!(
                            "domain.reconcile add rollback failure {normalized}"
                        ))
                        .await;
                    match reconcile {
                        Ok(()) => Err(DomainError::ReloadFailed {
                            detail: reload_err.to_string(),
                        }),
                        Err(reconcile_err) => Err(DomainError::ReloadAndRollbackFailed {
                            detail: format!(
                                "reload: {reload_err}; rollback: {rollback_err}; reconcile: {reconcile_err}"
                            ),
                        }),
                    }
                }
            };
        }

        self.record_audit(
            actor,
            env_row.id,
            "domain.add",
            normalized.clone(),
            None,
            json!({ "website": website, "environment": environment }),
        );
        self.flush_audit().await;

        Ok(DomainBindingView {
            domain: row.domain,
            website: website.to_owned(),
            environment: environment.to_owned(),
            created_at: row.created_at,
        })
    }

    /// Remove a binding and reload the proxy. On reload failure the original
    /// row is restored (same id, same timestamps) so external references
    /// stay stable.
    pub async fn remove_domain(&self, domain: &str, actor: &str) -> Result<(), DomainError> {
        let normalized =
            normalize_domain(domain).map_err(|e| DomainError::InvalidDomain(e.to_string()))?;

        let _guard = self.locks.lock_domain(&normalized).await;

        let existing: DomainBindingRow = self
            .catalog
            .get_domain_binding(&normalized)
            .await?
            .ok_or(DomainError::BindingNotFound)?;

        let mut tx = self.catalog.begin().await?;
        self.catalog
            .delete_domain_binding(&mut *tx, &normalized)
            .await?;
        tx.commit().await.map_err(CatalogError::from)?;

        if let Err(reload_err) = self
            .reloader
            .reload(&format!("domain.remove {normalized}"))
            .await
        {
            tracing::warn!(domain = %normalized, error = %reload_err, "reload failed, restoring binding");
            let restore = async {
                let mut tx = self.catalog.begin().await?;
                self.catalog
                    .restore_domain_binding(&mut *tx, &existing)
                    .await?;
                tx.commit().await.map_err(CatalogError::from)
            }
            .await;

            return match restore {
                Ok(()) => Err(DomainError::ReloadFailed {
                    detail: reload_err.to_string(),
                }),
                Err(restore_err) => {
                    let reconcile = self
                        .reloader
                        .reload(&format!(
                            "domain.reconcile remove restore failure {normalized}"
                        ))
                        .await;
                    match reconcile {
                        // Proxy and catalog agree the binding is gone.
                        Ok(()) => {
                            self.record_audit(
                                actor,
                                existing.environment_id,
                                "domain.remove",
                                normalized.clone(),
                                None,
                                json!({ "reconciled": true }),
                            );
                            self.flush_audit().await;
                            Ok(())
                        }
                        Err(reconcile_err) => Err(DomainError::ReloadAndRollbackFailed {
                            detail: format!(
                                "reload: {reload_err}; restore: {restore_err}; reconcile: {reconcile_err}"
                            ),
                        }),
                    }
                }
            };
        }

        self.record_audit(
            actor,
            existing.environment_id,
            "domain.remove",
            normalized.clone(),
            None,
            json!({}),
        );
        self.flush_audit().await;

        Ok(())
    }
}
