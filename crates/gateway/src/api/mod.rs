//! HTTP API surface.
//!
//! Routes are split into **public** (health probes, version, telemetry
//! ingest) and **protected** (everything under `/api/v1`, gated behind the
//! bearer-token middleware). Handlers validate path segments against the
//! resource-name grammar before touching the catalog or the filesystem.

pub mod apply;
pub mod auth;
pub mod backends;
pub mod domains;
pub mod error;
pub mod logs;
pub mod promote;
pub mod releases;
pub mod rollback;
pub mod system;
pub mod websites;

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;
use error::ApiError;

/// Build the full router.
///
/// `state` is needed to wire up the auth middleware and body limits at build
/// time.
pub fn router(state: AppState) -> Router<AppState> {
    let public = Router::new()
        .route("/healthz", get(system::healthz))
        .route("/readyz", get(system::readyz))
        .route("/version", get(system::version))
        // Telemetry ingest bypasses API auth (end-user beacons carry no token).
        .route(
            "/api/v1/telemetry",
            post(system::ingest_telemetry)
                .layer(DefaultBodyLimit::max(state.config.limits.max_telemetry_bytes)),
        );

    let protected = Router::new()
        // Apply (tar bundle upload)
        .route(
            "/api/v1/websites/:website/environments/:environment/apply",
            post(apply::apply)
                .layer(DefaultBodyLimit::max(state.config.limits.max_bundle_bytes)),
        )
        // Releases
        .route(
            "/api/v1/websites/:website/environments/:environment/releases",
            post(releases::create_release).get(releases::list_releases),
        )
        // Rollback / promote
        .route(
            "/api/v1/websites/:website/environments/:environment/rollback",
            post(rollback::rollback),
        )
        .route("/api/v1/websites/:website/promote", post(promote::promote))
        // Audit logs (global and environment-scoped)
        .route("/api/v1/logs", get(logs::list_logs))
        .route(
            "/api/v1/websites/:website/environments/:environment/logs",
            get(logs::list_environment_logs),
        )
        // Domain bindings
        .route(
            "/api/v1/domains",
            get(domains::list_domains).post(domains::add_domain),
        )
        .route(
            "/api/v1/domains/:domain",
            get(domains::get_domain).delete(domains::remove_domain),
        )
        // Backends
        .route(
            "/api/v1/websites/:website/environments/:environment/backends",
            get(backends::list_backends)
                .post(backends::upsert_backend)
                .delete(backends::delete_backend),
        )
        // Catalog listings
        .route("/api/v1/websites", get(websites::list_websites))
        .route(
            "/api/v1/websites/:website/environments",
            get(websites::list_environments),
        )
        // Apply API auth middleware to all protected routes.
        .route_layer(middleware::from_fn_with_state(
            state,
            auth::require_api_token,
        ));

    public
        .merge(protected)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Validate a website / environment path segment.
pub(crate) fn check_segment(kind: &str, value: &str) -> Result<(), ApiError> {
    hsd_domain::name::validate_resource_name(value)
        .map_err(|_| ApiError::bad_request(format!("invalid {kind} name")))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use sha2::{Digest, Sha256};
    use tower::ServiceExt;

    use hsd_bundle::testutil::BundleBuilder;
    use hsd_bundle::ApplyMode;
    use hsd_domain::config::Config;

    use crate::state::AppState;
    use crate::testsupport;

    const TOKEN: &str = "test-token";

    async fn test_app() -> (tempfile::TempDir, axum::Router, AppState) {
        let (dir, deployer, _reloader) = testsupport::deployer().await;
        let state = AppState {
            config: Arc::new(Config::default()),
            deployer: Arc::new(deployer),
            api_token_hash: Some(Sha256::digest(TOKEN.as_bytes()).to_vec()),
        };
        let app = super::router(state.clone()).with_state(state.clone());
        (dir, app, state)
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024 * 1024)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn tar_request(path: &str, actor: Option<&str>, bytes: Vec<u8>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(path)
            .header("authorization", format!("Bearer {TOKEN}"))
            .header("content-type", "application/x-tar");
        if let Some(actor) = actor {
            builder = builder.header("x-actor", actor);
        }
        builder.body(Body::from(bytes)).unwrap()
    }

    fn authed(method: &str, path: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(path)
            .header("authorization", format!("Bearer {TOKEN}"))
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn protected_routes_require_the_bearer_token() {
        let (_dir, app, _state) = test_app().await;

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/api/v1/websites")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        // Probes bypass auth.
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/healthz")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn wrong_token_is_rejected() {
        let (_dir, app, _state) = test_app().await;
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/websites")
                    .header("authorization", "Bearer nope")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(response).await;
        assert_eq!(body["error"], "invalid or missing API token");
    }

    #[tokio::test]
    async fn apply_then_release_over_http() {
        let (_dir, app, state) = test_app().await;

        let tar = BundleBuilder::new("blog", ApplyMode::Partial)
            .page("index", "/", b"<html>home</html>")
            .component("header", b"<header/>")
            .style_file("default", "styles/tokens.css", b":root{}")
            .style_file("default", "styles/default.css", b"body{}")
            .asset("assets/logo.svg", "image/svg+xml", b"<svg/>")
            .build_tar();

        let response = app
            .clone()
            .oneshot(tar_request(
                "/api/v1/websites/blog/environments/prod/apply",
                Some("alice"),
                tar,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["website"], "blog");
        assert_eq!(body["acceptedResources"].as_array().unwrap().len(), 4);

        let response = app
            .clone()
            .oneshot(authed(
                "POST",
                "/api/v1/websites/blog/environments/prod/releases",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = body_json(response).await;
        assert_eq!(body["status"], "active");
        let release_id = body["releaseId"].as_str().unwrap().to_owned();
        assert_eq!(release_id.len(), 26);

        // The release directory holds the materialized site + sidecars and
        // `current` resolves to it.
        let paths = state.deployer.env_paths("blog", "prod");
        for file in [
            "index.html",
            "styles/tokens.css",
            "styles/default.css",
            "assets/logo.svg",
            ".manifest.json",
            ".build-log.txt",
            ".output-hashes.json",
        ] {
            assert!(paths.release_dir(&release_id).join(file).exists(), "{file}");
        }
        assert_eq!(
            paths.current_target().await.unwrap().unwrap(),
            format!("releases/{release_id}")
        );

        // Release listing resolves the actor from the audit trail.
        let response = app
            .oneshot(authed(
                "GET",
                "/api/v1/websites/blog/environments/prod/releases",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        let releases = body["releases"].as_array().unwrap();
        assert_eq!(releases.len(), 1);
        assert_eq!(releases[0]["active"], true);
        assert_eq!(releases[0]["actor"], "alice");
    }

    #[tokio::test]
    async fn hash_mismatch_bundle_returns_400_with_details() {
        let (_dir, app, state) = test_app().await;

        let tar = BundleBuilder::new("blog", ApplyMode::Partial)
            .component_with_hash("header", b"<header/>", &"a".repeat(64))
            .build_tar();

        let response = app
            .oneshot(tar_request(
                "/api/v1/websites/blog/environments/prod/apply",
                None,
                tar,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"], "bundle failed validation");
        assert_eq!(
            body["details"]["hashMismatches"][0]["file"],
            "components/header.html"
        );

        // Catalog untouched.
        assert!(state
            .deployer
            .catalog
            .get_website("blog")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn rollback_with_one_release_is_a_sanitized_conflict() {
        let (_dir, app, _state) = test_app().await;

        let tar = BundleBuilder::new("blog", ApplyMode::Partial)
            .page("index", "/", b"<html/>")
            .build_tar();
        app.clone()
            .oneshot(tar_request(
                "/api/v1/websites/blog/environments/prod/apply",
                None,
                tar,
            ))
            .await
            .unwrap();
        app.clone()
            .oneshot(authed(
                "POST",
                "/api/v1/websites/blog/environments/prod/releases",
            ))
            .await
            .unwrap();

        let response = app
            .oneshot(authed(
                "POST",
                "/api/v1/websites/blog/environments/prod/rollback",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let body = body_json(response).await;
        assert_eq!(body["error"], "no previous release to roll back to");
        // No release id or filesystem path leaks.
        assert!(body.get("details").is_none());
    }

    #[tokio::test]
    async fn traversal_path_segments_are_rejected() {
        let (_dir, app, _state) = test_app().await;
        let response = app
            .oneshot(authed(
                "GET",
                "/api/v1/websites/..%2F..%2Fetc/environments",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn dry_run_apply_commits_nothing() {
        let (_dir, app, state) = test_app().await;
        let tar = BundleBuilder::new("blog", ApplyMode::Partial)
            .page("index", "/", b"<html/>")
            .build_tar();

        let response = app
            .oneshot(tar_request(
                "/api/v1/websites/blog/environments/prod/apply?dry_run=true",
                None,
                tar,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["dryRun"], true);

        assert!(state
            .deployer
            .catalog
            .get_website("blog")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn rollback_missing_directory_body_is_sanitized() {
        let (_dir, app, state) = test_app().await;

        // Two releases, then delete the first one's directory.
        for content in [&b"v1"[..], &b"v2"[..]] {
            let tar = BundleBuilder::new("blog", ApplyMode::Partial)
                .page("index", "/", content)
                .build_tar();
            app.clone()
                .oneshot(tar_request(
                    "/api/v1/websites/blog/environments/prod/apply",
                    None,
                    tar,
                ))
                .await
                .unwrap();
            app.clone()
                .oneshot(authed(
                    "POST",
                    "/api/v1/websites/blog/environments/prod/releases",
                ))
                .await
                .unwrap();
        }

        let website = state
            .deployer
            .catalog
            .get_website("blog")
            .await
            .unwrap()
            .unwrap();
        let env = state
            .deployer
            .catalog
            .get_environment(website.id, "prod")
            .await
            .unwrap()
            .unwrap();
        let releases = state
            .deployer
            .catalog
            .list_releases(env.id, 10, 0)
            .await
            .unwrap();
        let oldest = &releases.last().unwrap().id;
        let paths = state.deployer.env_paths("blog", "prod");
        tokio::fs::remove_dir_all(paths.release_dir(oldest))
            .await
            .unwrap();

        let response = app
            .oneshot(authed(
                "POST",
                "/api/v1/websites/blog/environments/prod/rollback",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let body = body_json(response).await;
        assert_eq!(
            body,
            serde_json::json!({ "error": "rollback target release directory is missing" })
        );

        // `current` still points at the newest release.
        assert_eq!(
            paths.current_target().await.unwrap().unwrap(),
            format!("releases/{}", releases[0].id)
        );
    }

    #[tokio::test]
    async fn promotion_hash_failure_body_is_exact() {
        let (_dir, app, state) = test_app().await;

        for env in ["staging", "prod"] {
            let tar = BundleBuilder::new("blog", ApplyMode::Partial)
                .page("index", "/", b"<html/>")
                .build_tar();
            app.clone()
                .oneshot(tar_request(
                    &format!("/api/v1/websites/blog/environments/{env}/apply"),
                    None,
                    tar,
                ))
                .await
                .unwrap();
        }
        app.clone()
            .oneshot(authed(
                "POST",
                "/api/v1/websites/blog/environments/staging/releases",
            ))
            .await
            .unwrap();

        // Corrupt the recorded output hash for the staging release.
        let website = state
            .deployer
            .catalog
            .get_website("blog")
            .await
            .unwrap()
            .unwrap();
        let env = state
            .deployer
            .catalog
            .get_environment(website.id, "staging")
            .await
            .unwrap()
            .unwrap();
        let release_id = env.active_release_id.unwrap();
        let mut tx = state.deployer.catalog.begin().await.unwrap();
        state
            .deployer
            .catalog
            .set_release_outputs(
                &mut *tx,
                &release_id,
                &format!(r#"{{"index.html":"sha256:{}"}}"#, "a".repeat(64)),
                "",
            )
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/websites/blog/promote")
                    .header("authorization", format!("Bearer {TOKEN}"))
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"from":"staging","to":"prod"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(
            body,
            serde_json::json!({ "error": "promotion hash verification failed" })
        );

        // Target `current` untouched.
        let paths = state.deployer.env_paths("blog", "prod");
        assert_eq!(paths.current_target().await.unwrap(), None);
    }

    #[tokio::test]
    async fn logs_filter_by_operation_over_http() {
        let (_dir, app, _state) = test_app().await;

        let tar = BundleBuilder::new("blog", ApplyMode::Partial)
            .page("index", "/", b"<html/>")
            .build_tar();
        app.clone()
            .oneshot(tar_request(
                "/api/v1/websites/blog/environments/prod/apply",
                Some("alice"),
                tar,
            ))
            .await
            .unwrap();
        app.clone()
            .oneshot(authed(
                "POST",
                "/api/v1/websites/blog/environments/prod/releases",
            ))
            .await
            .unwrap();

        let response = app
            .clone()
            .oneshot(authed(
                "GET",
                "/api/v1/websites/blog/environments/prod/logs?operation=apply",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        let entries = body["entries"].as_array().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["operation"], "apply");
        assert_eq!(entries[0]["actor"], "alice");

        // Unscoped listing sees all operations.
        let response = app
            .oneshot(authed("GET", "/api/v1/logs?limit=200"))
            .await
            .unwrap();
        let body = body_json(response).await;
        assert!(body["entries"].as_array().unwrap().len() >= 3);
    }

    #[tokio::test]
    async fn domain_crud_over_http() {
        let (_dir, app, _state) = test_app().await;

        let tar = BundleBuilder::new("blog", ApplyMode::Partial)
            .page("index", "/", b"<html/>")
            .build_tar();
        app.clone()
            .oneshot(tar_request(
                "/api/v1/websites/blog/environments/prod/apply",
                None,
                tar,
            ))
            .await
            .unwrap();

        let add = |domain: &str| {
            Request::builder()
                .method("POST")
                .uri("/api/v1/domains")
                .header("authorization", format!("Bearer {TOKEN}"))
                .header("content-type", "application/json")
                .body(Body::from(format!(
                    r#"{{"domain":"{domain}","website":"blog","environment":"prod"}}"#
                )))
                .unwrap()
        };

        let response = app.clone().oneshot(add("Example.COM.")).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = body_json(response).await;
        assert_eq!(body["domain"], "example.com");

        // Duplicate (post-normalization) conflicts.
        let response = app.clone().oneshot(add("example.com")).await.unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = app
            .clone()
            .oneshot(authed("GET", "/api/v1/domains/example.com"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["website"], "blog");
        assert_eq!(body["environment"], "prod");

        let response = app
            .clone()
            .oneshot(authed("DELETE", "/api/v1/domains/example.com"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(authed("GET", "/api/v1/domains/example.com"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn telemetry_bypasses_auth_and_accepts_json() {
        let (_dir, app, _state) = test_app().await;
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/telemetry")
                    .header("content-type", "application/json")
                    .body(Body::from("[{\"event\":\"pageview\"}]"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body = body_json(response).await;
        assert_eq!(body["events"], 1);
    }
}
