//! HTTP error mapping.
//!
//! Engines surface typed errors; this module is the single switch that turns
//! them into statuses and stable, sanitized client bodies. Anything internal
//! (paths, hashes, SQL text) is logged here and never serialized into the
//! response.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use hsd_bundle::BundleError;
use hsd_catalog::CatalogError;

use crate::engine::apply::ApplyError;
use crate::engine::domains::DomainError;
use crate::engine::promote::PromoteError;
use crate::engine::release::ReleaseError;
use crate::engine::rollback::RollbackError;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            details: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    /// Log the detailed cause, return a stable opaque body.
    pub fn internal(cause: impl std::fmt::Display) -> Self {
        tracing::error!(error = %cause, "internal error");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut body = json!({ "error": self.message });
        if let Some(details) = self.details {
            body["details"] = details;
        }
        (self.status, Json(body)).into_response()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Engine error conversions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

impl From<BundleError> for ApiError {
    fn from(err: BundleError) -> Self {
        match err {
            BundleError::Validation(validation) => {
                ApiError::bad_request("bundle failed validation").with_details(
                    serde_json::to_value(&validation).unwrap_or(serde_json::Value::Null),
                )
            }
            BundleError::Manifest(reason) => ApiError::bad_request("bundle manifest invalid")
                .with_details(json!({ "reason": reason })),
            BundleError::Archive(reason) => ApiError::bad_request("bundle archive invalid")
                .with_details(json!({ "reason": reason })),
        }
    }
}

impl From<ApplyError> for ApiError {
    fn from(err: ApplyError) -> Self {
        match err {
            ApplyError::WebsiteMismatch { .. } => {
                ApiError::bad_request("bundle website does not match request path")
            }
            ApplyError::InvalidRoute { .. } => {
                ApiError::bad_request("invalid page route")
            }
            ApplyError::InvalidResourceName { .. } => {
                ApiError::bad_request("invalid resource name")
            }
            other => ApiError::internal(other),
        }
    }
}

impl From<ReleaseError> for ApiError {
    fn from(err: ReleaseError) -> Self {
        match err {
            ReleaseError::WebsiteNotFound => ApiError::not_found("website not found"),
            ReleaseError::EnvironmentNotFound => ApiError::not_found("environment not found"),
            other => {
                tracing::error!(error = %other, "release build failed");
                ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "release build failed")
            }
        }
    }
}

impl From<RollbackError> for ApiError {
    fn from(err: RollbackError) -> Self {
        match err {
            RollbackError::WebsiteNotFound => ApiError::not_found("website not found"),
            RollbackError::EnvironmentNotFound => ApiError::not_found("environment not found"),
            RollbackError::NoPreviousRelease => {
                ApiError::conflict("no previous release to roll back to")
            }
            // Fixed string; the path and release id stay in the log.
            RollbackError::MissingReleaseDir => {
                ApiError::conflict("rollback target release directory is missing")
            }
            other => ApiError::internal(other),
        }
    }
}

impl From<PromoteError> for ApiError {
    fn from(err: PromoteError) -> Self {
        match err {
            PromoteError::SameEnvironment => {
                ApiError::bad_request("source and target environment are the same")
            }
            PromoteError::WebsiteNotFound => ApiError::not_found("website not found"),
            PromoteError::SourceEnvironmentNotFound => {
                ApiError::not_found("source environment not found")
            }
            PromoteError::TargetEnvironmentNotFound => {
                ApiError::not_found("target environment not found")
            }
            PromoteError::SourceNoActiveRelease => {
                ApiError::conflict("source environment has no active release")
            }
            // Deliberately detail-free.
            PromoteError::HashVerificationFailed => ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "promotion hash verification failed",
            ),
            other => ApiError::internal(other),
        }
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::InvalidDomain(reason) => {
                ApiError::bad_request("invalid domain").with_details(json!({ "reason": reason }))
            }
            DomainError::WebsiteNotFound => ApiError::not_found("website not found"),
            DomainError::EnvironmentNotFound => ApiError::not_found("environment not found"),
            DomainError::AlreadyBound => ApiError::conflict("domain is already bound"),
            DomainError::BindingNotFound => ApiError::not_found("domain binding not found"),
            DomainError::ReloadFailed { detail } => {
                tracing::error!(detail = %detail, "proxy reload failed");
                ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "proxy reload failed")
            }
            DomainError::ReloadAndRollbackFailed { detail } => ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "proxy reload failed and binding state could not be restored",
            )
            .with_details(json!({ "detail": detail })),
            other => ApiError::internal(other),
        }
    }
}

impl From<CatalogError> for ApiError {
    fn from(err: CatalogError) -> Self {
        ApiError::internal(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitized_bodies_carry_no_internal_detail() {
        let rollback: ApiError = RollbackError::MissingReleaseDir.into();
        assert_eq!(rollback.status, StatusCode::CONFLICT);
        assert_eq!(rollback.message, "rollback target release directory is missing");
        assert!(rollback.details.is_none());

        let promote: ApiError = PromoteError::HashVerificationFailed.into();
        assert_eq!(promote.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(promote.message, "promotion hash verification failed");
        assert!(promote.details.is_none());
    }

    #[test]
    fn validation_errors_keep_their_details() {
        let err: ApiError = BundleError::Validation(hsd_bundle::ValidationError {
            missing_files: vec!["pages/index.html".into()],
            hash_mismatches: vec![],
        })
        .into();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.message, "bundle failed validation");
        let details = err.details.unwrap();
        assert_eq!(details["missingFiles"][0], "pages/index.html");
    }
}
