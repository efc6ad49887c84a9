use std::sync::Arc;

use hsd_domain::config::Config;

use crate::engine::Deployer;

/// Shared application state passed to all API handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// The mutating engines plus their shared capabilities (catalog, blob
    /// store, stripe locks, audit pipeline, proxy reloader).
    pub deployer: Arc<Deployer>,
    /// SHA-256 hash of the API bearer token (computed once at startup).
    /// `None` = dev mode (no auth enforced).
    pub api_token_hash: Option<Vec<u8>>,
}
