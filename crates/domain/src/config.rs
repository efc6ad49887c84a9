//! htmlservd configuration.
//!
//! Loaded from a YAML file (`--config <path>`); every field has a default so
//! a missing file yields a runnable dev configuration. `HTMLSERVD_*`
//! environment variables take precedence over file values.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    /// Root of all persisted state: `db.sqlite`, `blobs/`, `websites/`.
    #[serde(default = "d_data_dir")]
    pub data_dir: PathBuf,
    /// Default tracing filter when `RUST_LOG` is unset.
    #[serde(default = "d_log_level")]
    pub log_level: String,
    /// Bearer token protecting `/api/*`. Empty = auth disabled (dev mode).
    #[serde(default)]
    pub api_token: String,
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub audit: AuditConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            data_dir: d_data_dir(),
            log_level: d_log_level(),
            api_token: String::new(),
            proxy: ProxyConfig::default(),
            limits: LimitsConfig::default(),
            audit: AuditConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "d_host")]
    pub host: String,
    #[serde(default = "d_8550")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8550,
        }
    }
}

/// External reverse-proxy integration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// When false, domain CRUD still updates the catalog but reloads are
    /// no-ops.
    #[serde(default)]
    pub enabled: bool,
    /// Command executed to reload the proxy, argv form
    /// (e.g. `["nginx", "-s", "reload"]`).
    #[serde(default)]
    pub reload_command: Vec<String>,
    /// Seconds allowed for one reload command run.
    #[serde(default = "d_10")]
    pub reload_timeout_secs: u64,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            reload_command: Vec::new(),
            reload_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum accepted apply bundle size (bytes). Default 50 MiB.
    #[serde(default = "d_bundle_cap")]
    pub max_bundle_bytes: usize,
    /// Maximum accepted telemetry body size (bytes). Default 1 MiB.
    #[serde(default = "d_telemetry_cap")]
    pub max_telemetry_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_bundle_bytes: d_bundle_cap(),
            max_telemetry_bytes: d_telemetry_cap(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Bounded audit queue depth; `log` fails fast once full.
    #[serde(default = "d_512")]
    pub queue_size: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self { queue_size: 512 }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_data_dir() -> PathBuf {
    PathBuf::from("./data")
}
fn d_log_level() -> String {
    "info".into()
}
fn d_host() -> String {
    "127.0.0.1".into()
}
fn d_8550() -> u16 {
    8550
}
fn d_10() -> u64 {
    10
}
fn d_512() -> usize {
    512
}
fn d_bundle_cap() -> usize {
    50 * 1024 * 1024
}
fn d_telemetry_cap() -> usize {
    1024 * 1024
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Loading & env overrides
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

impl Config {
    /// Load configuration from a YAML file, then apply `HTMLSERVD_*`
    /// environment overrides. `path = None` starts from defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => {
                let raw = std::fs::read_to_string(p).map_err(|e| {
                    Error::Config(format!("reading {}: {e}", p.display()))
                })?;
                serde_yaml::from_str(&raw)
                    .map_err(|e| Error::Config(format!("parsing {}: {e}", p.display())))?
            }
            None => Self::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply `HTMLSERVD_*` overrides. Called by `load`; public so tests can
    /// exercise it against a fixed environment.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("HTMLSERVD_HOST") {
            if !host.is_empty() {
                self.server.host = host;
            }
        }
        if let Ok(port) = std::env::var("HTMLSERVD_PORT") {
            match port.parse() {
                Ok(p) => self.server.port = p,
                Err(_) => tracing::warn!(value = %port, "ignoring unparsable HTMLSERVD_PORT"),
            }
        }
        if let Ok(dir) = std::env::var("HTMLSERVD_DATA_DIR") {
            if !dir.is_empty() {
                self.data_dir = PathBuf::from(dir);
            }
        }
        if let Ok(level) = std::env::var("HTMLSERVD_LOG_LEVEL") {
            if !level.is_empty() {
                self.log_level = level;
            }
        }
        if let Ok(token) = std::env::var("HTMLSERVD_API_TOKEN") {
            self.api_token = token;
        }
        if let Ok(enabled) = std::env::var("HTMLSERVD_PROXY_ENABLED") {
            match enabled.parse() {
                Ok(b) => self.proxy.enabled = b,
                Err(_) => {
                    tracing::warn!(value = %enabled, "ignoring unparsable HTMLSERVD_PROXY_ENABLED")
                }
            }
        }
        if let Ok(cmd) = std::env::var("HTMLSERVD_PROXY_RELOAD_COMMAND") {
            if !cmd.is_empty() {
                self.proxy.reload_command =
                    cmd.split_whitespace().map(str::to_owned).collect();
            }
        }
        if let Ok(cap) = std::env::var("HTMLSERVD_MAX_BUNDLE_BYTES") {
            match cap.parse() {
                Ok(n) => self.limits.max_bundle_bytes = n,
                Err(_) => {
                    tracing::warn!(value = %cap, "ignoring unparsable HTMLSERVD_MAX_BUNDLE_BYTES")
                }
            }
        }
    }

    /// Validate the loaded configuration. Errors abort startup; warnings are
    /// logged and tolerated.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        if self.api_token.is_empty() {
            issues.push(ConfigIssue::warning(
                "api_token is empty — API auth is disabled",
            ));
        }
        if self.proxy.enabled && self.proxy.reload_command.is_empty() {
            issues.push(ConfigIssue::error(
                "proxy.enabled is true but proxy.reload_command is empty",
            ));
        }
        if self.limits.max_bundle_bytes == 0 {
            issues.push(ConfigIssue::error("limits.max_bundle_bytes must be > 0"));
        }
        if self.audit.queue_size == 0 {
            issues.push(ConfigIssue::error("audit.queue_size must be > 0"));
        }
        if self.data_dir.as_os_str().is_empty() {
            issues.push(ConfigIssue::error("data_dir must not be empty"));
        }

        issues
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Validation issues
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Warning,
    Error,
}

#[derive(Debug, Clone)]
pub struct ConfigIssue {
    pub severity: ConfigSeverity,
    pub message: String,
}

impl ConfigIssue {
    fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: ConfigSeverity::Warning,
            message: message.into(),
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            severity: ConfigSeverity::Error,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}
