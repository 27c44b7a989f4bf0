//! Manifest parser for loading and layering pool declarations.
//!
//! This module handles loading the manifest from a YAML file, a `.env` file
//! and environment variables, with proper precedence and error handling.

use crate::error::{ConfigError, PoolError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::manifest::PoolManifest;

/// Manifest parser.
#[derive(Debug, Default)]
pub struct ManifestParser {
    /// Base path for locating the `.env` file.
    base_path: Option<PathBuf>,
}

impl ManifestParser {
    /// Creates a new manifest parser.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_path: None }
    }

    /// Sets the base path for locating the `.env` file.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Loads a manifest from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<PoolManifest> {
        let path = path.as_ref();
        info!("Loading manifest from: {}", path.display());

        if !path.exists() {
            return Err(PoolError::Config(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            PoolError::Config(ConfigError::ParseError {
                message: format!("Failed to read file: {e}"),
                location: Some(path.display().to_string()),
            })
        })?;

        self.parse_yaml(&content, Some(path))
    }

    /// Parses a manifest from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn parse_yaml(&self, content: &str, source: Option<&Path>) -> Result<PoolManifest> {
        debug!("Parsing YAML manifest");

        let manifest: PoolManifest = serde_yaml::from_str(content).map_err(|e| {
            let location = source.map(|p| p.display().to_string());
            PoolError::Config(ConfigError::ParseError {
                message: format!("YAML parse error: {e}"),
                location,
            })
        })?;

        Ok(manifest)
    }

    /// Loads a manifest and applies environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_with_env(&self, path: impl AsRef<Path>) -> Result<PoolManifest> {
        let mut manifest = self.load_file(path)?;
        Self::apply_env_overrides(&mut manifest)?;
        Ok(manifest)
    }

    /// Applies `LXD_POOLS_*` environment variables to the connection settings.
    ///
    /// # Errors
    ///
    /// Returns an error if `LXD_POOLS_TIMEOUT` is not a number.
    pub fn apply_env_overrides(manifest: &mut PoolManifest) -> Result<()> {
        let connection = &mut manifest.connection;

        if let Ok(url) = std::env::var("LXD_POOLS_URL") {
            debug!("Overriding connection.url from environment");
            connection.url = Some(url);
        }

        if let Ok(key_file) = std::env::var("LXD_POOLS_KEY_FILE") {
            debug!("Overriding connection.key_file from environment");
            connection.key_file = Some(PathBuf::from(key_file));
        }

        if let Ok(cert_file) = std::env::var("LXD_POOLS_CERT_FILE") {
            debug!("Overriding connection.cert_file from environment");
            connection.cert_file = Some(PathBuf::from(cert_file));
        }

        if let Ok(password) = std::env::var("LXD_POOLS_TRUST_PASSWORD") {
            debug!("Overriding connection.trust_password from environment");
            connection.trust_password = Some(password);
        }

        if let Ok(timeout) = std::env::var("LXD_POOLS_TIMEOUT") {
            debug!("Overriding connection.timeout from environment");
            let secs = timeout.trim().parse().map_err(|_| {
                ConfigError::validation(
                    format!("LXD_POOLS_TIMEOUT must be a whole number of seconds, got '{timeout}'"),
                    "connection.timeout",
                )
            })?;
            connection.timeout = Some(secs);
        }

        Ok(())
    }

    /// Loads the .env file if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the .env file exists but cannot be loaded.
    pub fn load_dotenv(&self) -> Result<()> {
        let env_path = self
            .base_path
            .as_ref()
            .map_or_else(|| PathBuf::from(".env"), |p| p.join(".env"));

        if env_path.exists() {
            info!("Loading environment from: {}", env_path.display());
            dotenvy::from_path(&env_path).map_err(|e| {
                PoolError::Config(ConfigError::ParseError {
                    message: format!("Failed to load .env file: {e}"),
                    location: Some(env_path.display().to_string()),
                })
            })?;
        } else {
            debug!(".env file not found at: {}", env_path.display());
        }

        Ok(())
    }
}

/// Default manifest file names to search for.
pub const DEFAULT_MANIFEST_FILES: &[&str] = &["lxd-pool.yaml", "lxd-pool.yml"];

/// Finds a manifest in `start_dir` or one of its parents.
///
/// A missing manifest is not an error: every setting can come from flags.
#[must_use]
pub fn find_manifest_file(start_dir: impl AsRef<Path>) -> Option<PathBuf> {
    let mut current = start_dir.as_ref().to_path_buf();

    loop {
        for filename in DEFAULT_MANIFEST_FILES {
            let candidate = current.join(filename);
            if candidate.exists() {
                info!("Found manifest file: {}", candidate.display());
                return Some(candidate);
            }
        }

        if !current.pop() {
            return None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DesiredState, StorageDriver};
    use tempfile::TempDir;

    #[test]
    fn test_parse_minimal_manifest() {
        let yaml = "name: pool1\n";
        let parser = ManifestParser::new();
        let manifest = parser.parse_yaml(yaml, None).unwrap();

        assert_eq!(manifest.name.as_deref(), Some("pool1"));
        assert!(manifest.driver.is_none());
        assert!(manifest.config.is_empty());
        assert!(manifest.state.is_none());
        assert!(manifest.connection.url.is_none());
    }

    #[test]
    fn test_parse_full_manifest() {
        let yaml = r#"
name: pool1
driver: zfs
config:
  size: "20GB"
state: absent
connection:
  url: https://lxd.example.com:8443
  key_file: /etc/lxd-pools/client.key
  cert_file: /etc/lxd-pools/client.crt
  trust_password: s3cret
  timeout: 10
"#;
        let parser = ManifestParser::new();
        let manifest = parser.parse_yaml(yaml, None).unwrap();

        assert_eq!(manifest.driver, Some(StorageDriver::Zfs));
        assert_eq!(manifest.config.get("size").map(String::as_str), Some("20GB"));
        assert_eq!(
            manifest.state.as_deref().unwrap().parse::<DesiredState>().unwrap(),
            DesiredState::Absent
        );
        assert_eq!(manifest.connection.timeout, Some(10));
        assert_eq!(manifest.connection.trust_password.as_deref(), Some("s3cret"));
    }

    #[test]
    fn test_unknown_driver_is_parse_error() {
        let parser = ManifestParser::new();
        let result = parser.parse_yaml("name: pool1\ndriver: xfs\n", None);
        assert!(matches!(
            result,
            Err(PoolError::Config(ConfigError::ParseError { .. }))
        ));
    }

    #[test]
    fn test_load_file_and_discovery() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let nested = dir.path().join("a/b");
        std::fs::create_dir_all(&nested).unwrap();
        let manifest_path = dir.path().join("lxd-pool.yaml");
        std::fs::write(&manifest_path, "name: default\ndriver: dir\n").unwrap();

        let found = find_manifest_file(&nested).expect("manifest should be found");
        assert_eq!(found, manifest_path);

        let manifest = ManifestParser::new().load_file(&found).unwrap();
        assert_eq!(manifest.name.as_deref(), Some("default"));
        assert_eq!(manifest.driver, Some(StorageDriver::Dir));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let result = ManifestParser::new().load_file(dir.path().join("nope.yaml"));
        assert!(matches!(
            result,
            Err(PoolError::Config(ConfigError::FileNotFound { .. }))
        ));
    }
}
