//! External reverse-proxy integration.
//!
//! The core only ever calls `reload(reason)`; config generation and the
//! proxy process itself are owned elsewhere. The production implementation
//! runs a configured command; with integration disabled a no-op stands in.

use std::time::Duration;

use async_trait::async_trait;

use hsd_domain::config::ProxyConfig;

#[derive(Debug, thiserror::Error)]
#[error("proxy reload failed: {0}")]
pub struct ReloadError(pub String);

#[async_trait]
pub trait Reloader: Send + Sync {
    async fn reload(&self, reason: &str) -> Result<(), ReloadError>;
}

/// Pick the reloader implementation for the given config.
pub fn from_config(config: &ProxyConfig) -> std::sync::Arc<dyn Reloader> {
    if config.enabled {
        std::sync::Arc::new(CommandReloader {
            command: config.reload_command.clone(),
            timeout: Duration::from_secs(config.reload_timeout_secs),
        })
    } else {
        std::sync::Arc::new(NoopReloader)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Command reloader
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Runs the configured reload command (argv form, no shell).
pub struct CommandReloader {
    command: Vec<String>,
    timeout: Duration,
}

#[async_trait]
impl Reloader for CommandReloader {
    async fn reload(&self, reason: &str) -> Result<(), ReloadError> {
        let Some((program, args)) = self.command.split_first() else {
            return Err(ReloadError("reload command is empty".into()));
        };

        tracing::info!(reason = %reason, program = %program, "reloading proxy");
        let output = tokio::time::timeout(
            self.timeout,
            tokio::process::Command::new(program)
                .args(args)
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| ReloadError(format!("{program}: timed out")))?
        .map_err(|e| ReloadError(format!("{program}: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ReloadError(format!(
                "{program} exited {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Noop reloader
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Used when proxy integration is disabled.
pub struct NoopReloader;

#[async_trait]
impl Reloader for NoopReloader {
    async fn reload(&self, reason: &str) -> Result<(), ReloadError> {
        tracing::debug!(reason = %reason, "proxy integration disabled, reload skipped");
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Recording fake (tests)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Test double that records reload reasons and fails on demand.
#[cfg(test)]
pub struct RecordingReloader {
    pub reasons: parking_lot::Mutex<Vec<String>>,
    /// Outcomes consumed front-to-back; `true` = success. Empty = succeed.
    pub outcomes: parking_lot::Mutex<std::collections::VecDeque<bool>>,
}

#[cfg(test)]
impl RecordingReloader {
    pub fn new() -> Self {
        Self {
            reasons: parking_lot::Mutex::new(Vec::new()),
            outcomes: parking_lot::Mutex::new(std::collections::VecDeque::new()),
        }
    }

    pub fn fail_next(&self, failures: usize) {
        let mut outcomes = self.outcomes.lock();
        for _ in 0..failures {
            outcomes.push_back(false);
        }
    }

    pub fn reasons(&self) -> Vec<String> {
        self.reasons.lock().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl Reloader for RecordingReloader {
    async fn reload(&self, reason: &str) -> Result<(), ReloadError> {
        self.reasons.lock().push(reason.to_owned());
        let ok = self.outcomes.lock().pop_front().unwrap_or(true);
        if ok {
            Ok(())
        } else {
            Err(ReloadError("injected failure".into()))
        }
    }
}
