//! Error types for the LXD storage pool reconciler.
//!
//! Errors are split by the layer that raises them: configuration loading and
//! validation happen before any network activity, while [`LxdError`] covers
//! everything the transport client can report about a remote request.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for the crate.
#[derive(Debug, Error)]
pub enum PoolError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Errors reported by the LXD API or the transport underneath it.
    ///
    /// Displayed verbatim so the remote message reaches the operator unchanged.
    #[error(transparent)]
    Lxd(#[from] LxdError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An explicitly requested manifest file was not found.
    #[error("Manifest file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The manifest could not be parsed.
    #[error("Failed to parse manifest: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Manifest validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// The desired state is neither `present` nor `absent`.
    #[error("Unexpected state name: '{value}' (expected 'present' or 'absent')")]
    InvalidState {
        /// The rejected value.
        value: String,
    },

    /// The storage driver is not one LXD supports.
    #[error("Unknown storage driver: '{value}' (expected one of dir, lvm, btrfs, zfs, ceph)")]
    InvalidDriver {
        /// The rejected value.
        value: String,
    },

    /// The endpoint URL uses an unsupported scheme.
    #[error("URL scheme must be unix: or https: (got '{url}')")]
    InvalidEndpoint {
        /// The rejected URL.
        url: String,
    },

    /// A `key=value` pair could not be split.
    #[error("Invalid config entry '{entry}': expected KEY=VALUE")]
    InvalidConfigEntry {
        /// The malformed entry.
        entry: String,
    },

    /// A client key or certificate could not be read.
    #[error("Failed to read {kind} file {path}: {message}")]
    CredentialFile {
        /// What the file holds ("client key" or "client certificate").
        kind: &'static str,
        /// Path to the file.
        path: PathBuf,
        /// Underlying error.
        message: String,
    },

    /// The user's home directory is unknown, so default paths cannot be built.
    #[error("Cannot determine home directory for default {kind} path")]
    MissingHomeDir {
        /// Which default could not be built.
        kind: &'static str,
    },
}

/// Errors reported by the LXD transport client.
///
/// Every variant displays as a plain message with no prefix.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LxdError {
    /// The LXD API answered with an error response.
    #[error("{message}")]
    Api {
        /// Structured `error_code` from the response, if any.
        code: Option<u16>,
        /// Message from the response.
        message: String,
    },

    /// The request never produced a response.
    #[error("{message}")]
    Network {
        /// Description of the network error.
        message: String,
    },

    /// The response could not be decoded.
    #[error("{message}")]
    InvalidResponse {
        /// Description of the response issue.
        message: String,
    },

    /// The request exceeded the configured deadline.
    #[error("Request to {path} timed out after {secs}s")]
    Timeout {
        /// API path of the request.
        path: String,
        /// Deadline in seconds.
        secs: u64,
    },
}

/// Result type alias for crate operations.
pub type Result<T> = std::result::Result<T, PoolError>;

/// Result type alias for transport operations.
pub type LxdResult<T> = std::result::Result<T, LxdError>;

impl PoolError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }
}

impl LxdError {
    /// Creates an API error.
    #[must_use]
    pub fn api(code: Option<u16>, message: impl Into<String>) -> Self {
        Self::Api {
            code,
            message: message.into(),
        }
    }

    /// Creates a network error.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Creates an invalid response error.
    #[must_use]
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            message: message.into(),
        }
    }

    /// Returns the structured error code, if the remote supplied one.
    #[must_use]
    pub const fn code(&self) -> Option<u16> {
        match self {
            Self::Api { code, .. } => *code,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lxd_error_displays_message_verbatim() {
        let err = LxdError::api(Some(500), "disk on fire");
        assert_eq!(err.to_string(), "disk on fire");

        let wrapped = PoolError::from(err);
        assert_eq!(wrapped.to_string(), "disk on fire");
    }

    #[test]
    fn test_code_only_for_api_errors() {
        assert_eq!(LxdError::api(Some(404), "No such object").code(), Some(404));
        assert_eq!(LxdError::network("connection refused").code(), None);
    }
}
