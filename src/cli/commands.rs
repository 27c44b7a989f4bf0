//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{PoolManifest, StorageDriver};
use crate::error::ConfigError;

/// lxd-pools - Declarative LXD storage pool manager.
#[derive(Parser, Debug)]
#[command(name = "lxd-pools")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the manifest file.
    #[arg(short, long, global = true, env = "LXD_POOLS_FILE")]
    pub file: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Connection settings.
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Flags describing how to reach LXD.
#[derive(Args, Debug, Default)]
pub struct ConnectionArgs {
    /// Unix socket (`unix:/path`) or HTTPS URL of the LXD server.
    #[arg(long, global = true)]
    pub url: Option<String>,

    /// Client key file.
    #[arg(long, global = true)]
    pub key_file: Option<PathBuf>,

    /// Client certificate file.
    #[arg(long, global = true)]
    pub cert_file: Option<PathBuf>,

    /// Trust password registered on the LXD server.
    #[arg(long, global = true)]
    pub trust_password: Option<String>,

    /// Request timeout in seconds.
    #[arg(long, global = true)]
    pub timeout: Option<u64>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create or delete a storage pool so that it matches the declared state.
    Apply(ApplyArgs),

    /// Report whether a storage pool exists without changing anything.
    Exists {
        /// Storage pool name (defaults to the manifest's name).
        #[arg(long)]
        name: Option<String>,
    },
}

/// Arguments of `apply`.
#[derive(Args, Debug, Default)]
pub struct ApplyArgs {
    /// Storage pool name.
    #[arg(long)]
    pub name: Option<String>,

    /// Storage driver used when the pool is created.
    #[arg(long, value_enum)]
    pub driver: Option<StorageDriver>,

    /// Driver configuration entry, repeatable (e.g. `--config size=20GB`).
    #[arg(long = "config", value_name = "KEY=VALUE", value_parser = parse_config_entry)]
    pub config: Vec<(String, String)>,

    /// Desired state: present or absent.
    #[arg(long)]
    pub state: Option<String>,
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

impl ConnectionArgs {
    /// Overrides manifest connection settings with any flags given.
    pub fn apply_to(&self, manifest: &mut PoolManifest) {
        let connection = &mut manifest.connection;
        if let Some(url) = &self.url {
            connection.url = Some(url.clone());
        }
        if let Some(key_file) = &self.key_file {
            connection.key_file = Some(key_file.clone());
        }
        if let Some(cert_file) = &self.cert_file {
            connection.cert_file = Some(cert_file.clone());
        }
        if let Some(password) = &self.trust_password {
            connection.trust_password = Some(password.clone());
        }
        if let Some(timeout) = self.timeout {
            connection.timeout = Some(timeout);
        }
    }
}

impl ApplyArgs {
    /// Overrides manifest pool settings with any flags given.
    ///
    /// Config entries from flags are merged over the manifest's entries.
    pub fn apply_to(&self, manifest: &mut PoolManifest) {
        if let Some(name) = &self.name {
            manifest.name = Some(name.clone());
        }
        if let Some(driver) = self.driver {
            manifest.driver = Some(driver);
        }
        for (key, value) in &self.config {
            manifest.config.insert(key.clone(), value.clone());
        }
        if let Some(state) = &self.state {
            manifest.state = Some(state.clone());
        }
    }
}

/// Splits a `KEY=VALUE` flag.
fn parse_config_entry(entry: &str) -> Result<(String, String), ConfigError> {
    entry
        .split_once('=')
        .filter(|(key, _)| !key.is_empty())
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .ok_or_else(|| ConfigError::InvalidConfigEntry {
            entry: entry.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_apply_flags() {
        let cli = Cli::try_parse_from([
            "lxd-pools",
            "apply",
            "--name",
            "pool1",
            "--driver",
            "zfs",
            "--config",
            "size=20GB",
            "--config",
            "zfs.pool_name=tank",
            "--url",
            "https://lxd:8443",
        ])
        .unwrap();

        let Commands::Apply(args) = cli.command else {
            panic!("expected apply");
        };
        assert_eq!(args.driver, Some(StorageDriver::Zfs));
        assert_eq!(args.config.len(), 2);
        assert_eq!(cli.connection.url.as_deref(), Some("https://lxd:8443"));
    }

    #[test]
    fn test_config_entry_parsing() {
        assert_eq!(
            parse_config_entry("size=20GB").unwrap(),
            (String::from("size"), String::from("20GB"))
        );
        assert_eq!(
            parse_config_entry("source=a=b").unwrap(),
            (String::from("source"), String::from("a=b"))
        );
        assert!(parse_config_entry("size").is_err());
        assert!(parse_config_entry("=x").is_err());
    }

    #[test]
    fn test_flags_override_manifest() {
        let mut manifest = PoolManifest {
            name: Some(String::from("from-file")),
            driver: Some(StorageDriver::Dir),
            state: Some(String::from("present")),
            ..PoolManifest::default()
        };
        manifest
            .config
            .insert(String::from("size"), String::from("10GB"));
        manifest.connection.timeout = Some(30);

        let args = ApplyArgs {
            name: Some(String::from("from-flag")),
            config: vec![(String::from("size"), String::from("20GB"))],
            state: Some(String::from("absent")),
            ..ApplyArgs::default()
        };
        args.apply_to(&mut manifest);

        let connection = ConnectionArgs {
            timeout: Some(5),
            ..ConnectionArgs::default()
        };
        connection.apply_to(&mut manifest);

        assert_eq!(manifest.name.as_deref(), Some("from-flag"));
        assert_eq!(manifest.driver, Some(StorageDriver::Dir));
        assert_eq!(manifest.config.get("size").map(String::as_str), Some("20GB"));
        assert_eq!(manifest.state.as_deref(), Some("absent"));
        assert_eq!(manifest.connection.timeout, Some(5));
    }
}
