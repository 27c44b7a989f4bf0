//! Declaration types for a storage pool and the connection used to reach LXD.
//!
//! These map to `lxd-pool.yaml`. Every field is optional in the file so that
//! command-line flags and environment variables can fill the gaps.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{ConfigError, Result};

/// Default LXD endpoint: the local daemon socket.
pub const DEFAULT_URL: &str = "unix:/var/lib/lxd/unix.socket";

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Client key location relative to the home directory.
const DEFAULT_KEY_FILE: &str = ".config/lxc/client.key";

/// Client certificate location relative to the home directory.
const DEFAULT_CERT_FILE: &str = ".config/lxc/client.crt";

/// The root manifest structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PoolManifest {
    /// Storage pool name.
    #[serde(default)]
    pub name: Option<String>,
    /// Storage driver used when the pool is created.
    #[serde(default)]
    pub driver: Option<StorageDriver>,
    /// Driver configuration used when the pool is created.
    #[serde(default)]
    pub config: BTreeMap<String, String>,
    /// Desired state, kept as written so that an unknown value is reported
    /// by the reconciler instead of the YAML parser.
    #[serde(default)]
    pub state: Option<String>,
    /// How to reach the LXD API.
    #[serde(default)]
    pub connection: ConnectionConfig,
}

/// Connection settings as declared, before defaults are applied.
#[derive(Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// `unix:<socket path>` or `https://host:port`.
    #[serde(default)]
    pub url: Option<String>,
    /// Client key path.
    #[serde(default)]
    pub key_file: Option<PathBuf>,
    /// Client certificate path.
    #[serde(default)]
    pub cert_file: Option<PathBuf>,
    /// Trust password registered on the LXD server.
    #[serde(default)]
    pub trust_password: Option<String>,
    /// Request timeout in seconds.
    #[serde(default)]
    pub timeout: Option<u64>,
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("url", &self.url)
            .field("key_file", &self.key_file)
            .field("cert_file", &self.cert_file)
            .field("trust_password", &self.trust_password.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Desired state of a storage pool.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DesiredState {
    /// The pool must exist.
    #[default]
    Present,
    /// The pool must not exist.
    Absent,
}

impl FromStr for DesiredState {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "present" => Ok(Self::Present),
            "absent" => Ok(Self::Absent),
            other => Err(ConfigError::InvalidState {
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for DesiredState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Present => write!(f, "present"),
            Self::Absent => write!(f, "absent"),
        }
    }
}

/// Storage drivers supported by LXD.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StorageDriver {
    /// Plain directory.
    Dir,
    /// LVM volume group.
    Lvm,
    /// Btrfs subvolumes.
    Btrfs,
    /// ZFS pool.
    Zfs,
    /// Ceph RBD.
    Ceph,
}

impl StorageDriver {
    /// Returns the name LXD uses for this driver.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Dir => "dir",
            Self::Lvm => "lvm",
            Self::Btrfs => "btrfs",
            Self::Zfs => "zfs",
            Self::Ceph => "ceph",
        }
    }
}

impl FromStr for StorageDriver {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "dir" => Ok(Self::Dir),
            "lvm" => Ok(Self::Lvm),
            "btrfs" => Ok(Self::Btrfs),
            "zfs" => Ok(Self::Zfs),
            "ceph" => Ok(Self::Ceph),
            other => Err(ConfigError::InvalidDriver {
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for StorageDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The pool a run is about: its identity plus creation parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSpec {
    /// Pool name, unique on the LXD server.
    pub name: String,
    /// Driver, required only when the pool has to be created.
    pub driver: Option<StorageDriver>,
    /// Driver configuration, sent only on creation.
    pub config: BTreeMap<String, String>,
}

impl PoolSpec {
    /// Creates a spec with no creation parameters.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            driver: None,
            config: BTreeMap::new(),
        }
    }

    /// Sets the driver.
    #[must_use]
    pub const fn with_driver(mut self, driver: StorageDriver) -> Self {
        self.driver = Some(driver);
        self
    }

    /// Adds a configuration entry.
    #[must_use]
    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }
}

/// Where the LXD API lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// Local Unix domain socket.
    Unix(PathBuf),
    /// Remote HTTPS base URL, without a trailing slash.
    Https(String),
}

impl FromStr for Endpoint {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if let Some(path) = s.strip_prefix("unix:") {
            if path.is_empty() {
                return Err(ConfigError::InvalidEndpoint { url: s.to_string() });
            }
            Ok(Self::Unix(PathBuf::from(path)))
        } else if s.starts_with("https:") {
            Ok(Self::Https(s.trim_end_matches('/').to_string()))
        } else {
            Err(ConfigError::InvalidEndpoint { url: s.to_string() })
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unix(path) => write!(f, "unix:{}", path.display()),
            Self::Https(url) => f.write_str(url),
        }
    }
}

/// Trust password that never shows up in `Debug` output or logs.
#[derive(Clone, PartialEq, Eq)]
pub struct TrustPassword(String);

impl TrustPassword {
    /// Wraps a password.
    #[must_use]
    pub fn new(password: impl Into<String>) -> Self {
        Self(password.into())
    }

    /// Returns the password for sending to the server.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for TrustPassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TrustPassword(<redacted>)")
    }
}

/// Everything needed to open an authenticated session with LXD.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    /// API endpoint.
    pub endpoint: Endpoint,
    /// Client key path.
    pub key_file: PathBuf,
    /// Client certificate path.
    pub cert_file: PathBuf,
    /// Optional trust password; an empty one counts as absent.
    pub trust_password: Option<TrustPassword>,
}

impl Credentials {
    /// Builds credentials for the local socket with no trust password.
    #[must_use]
    pub fn local(key_file: impl Into<PathBuf>, cert_file: impl Into<PathBuf>) -> Self {
        Self {
            endpoint: Endpoint::Unix(PathBuf::from(&DEFAULT_URL["unix:".len()..])),
            key_file: key_file.into(),
            cert_file: cert_file.into(),
            trust_password: None,
        }
    }

    /// Sets the trust password.
    #[must_use]
    pub fn with_trust_password(mut self, password: impl Into<String>) -> Self {
        self.trust_password = Some(TrustPassword::new(password));
        self
    }
}

impl ConnectionConfig {
    /// Applies defaults and returns the credential bundle and request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL scheme is unsupported or a default path
    /// cannot be computed.
    pub fn resolve(&self) -> Result<(Credentials, Duration)> {
        let endpoint: Endpoint = self.url.as_deref().unwrap_or(DEFAULT_URL).parse()?;

        let key_file = match &self.key_file {
            Some(path) => path.clone(),
            None => home_relative(DEFAULT_KEY_FILE, "client key")?,
        };
        let cert_file = match &self.cert_file {
            Some(path) => path.clone(),
            None => home_relative(DEFAULT_CERT_FILE, "client certificate")?,
        };

        let trust_password = self
            .trust_password
            .as_deref()
            .filter(|p| !p.is_empty())
            .map(TrustPassword::new);

        let timeout = Duration::from_secs(self.timeout.unwrap_or(DEFAULT_TIMEOUT_SECS));

        Ok((
            Credentials {
                endpoint,
                key_file,
                cert_file,
                trust_password,
            },
            timeout,
        ))
    }
}

/// Joins `relative` onto the user's home directory.
fn home_relative(relative: &str, kind: &'static str) -> Result<PathBuf> {
    dirs::home_dir()
        .map(|home| home.join(relative))
        .ok_or_else(|| ConfigError::MissingHomeDir { kind }.into())
}
