//! Command-line interface.
//!
//! One binary: `htmlservd [--config <path>] [serve|config …|version]`.
//! `serve` is the default when no subcommand is given. Exit codes: 0 on a
//! clean shutdown, 1 on any startup or validation error.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use hsd_domain::config::{Config, ConfigSeverity};

#[derive(Debug, Parser)]
#[command(name = "htmlservd", version, about = "Static-site deployment control plane")]
pub struct Cli {
    /// Path to the YAML configuration file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP server (default).
    Serve,
    /// Configuration helpers.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print the version and exit.
    Version,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Validate the configuration file and exit non-zero on errors.
    Validate,
    /// Print the effective configuration (file + env overrides) as YAML.
    Show,
}

/// Load configuration from `--config` (or defaults) with `HTMLSERVD_*`
/// overrides applied.
pub fn load_config(path: Option<&std::path::Path>) -> anyhow::Result<Config> {
    Config::load(path).context("loading configuration")
}

/// Print validation issues; returns whether the config is usable.
pub fn validate(config: &Config) -> bool {
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => eprintln!("warning: {issue}"),
            ConfigSeverity::Error => eprintln!("error: {issue}"),
        }
    }
    let ok = !issues
        .iter()
        .any(|i| i.severity == ConfigSeverity::Error);
    if ok {
        println!("configuration OK");
    }
    ok
}

/// Dump the effective configuration. The API token is redacted.
pub fn show(config: &Config) {
    let mut redacted = config.clone();
    if !redacted.api_token.is_empty() {
        redacted.api_token = "<redacted>".into();
    }
    match serde_yaml::to_string(&redacted) {
        Ok(yaml) => println!("{yaml}"),
        Err(e) => eprintln!("error: serializing config: {e}"),
    }
}
