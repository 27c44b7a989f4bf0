//! Manifest validation.
//!
//! Runs before any request is sent so that a malformed declaration never
//! reaches the LXD API.

use crate::error::{ConfigError, PoolError, Result};
use tracing::debug;

use super::manifest::{ConnectionConfig, Endpoint, PoolManifest};

/// Validator for pool manifests.
#[derive(Debug, Default)]
pub struct ManifestValidator;

/// Validation result containing all errors found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ValidationError>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// The error message.
    pub message: String,
}

impl ManifestValidator {
    /// Creates a new validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validates a fully layered manifest.
    ///
    /// The desired state is not checked here; the reconciler rejects an
    /// unknown state itself.
    ///
    /// # Errors
    ///
    /// Returns the first validation error if any were found.
    pub fn validate(&self, manifest: &PoolManifest) -> Result<ValidationResult> {
        let mut result = ValidationResult::default();

        Self::validate_name(manifest.name.as_deref(), &mut result);
        Self::validate_config(manifest, &mut result);
        Self::validate_connection(&manifest.connection, &mut result);

        if result.errors.is_empty() {
            debug!("Manifest validation passed");
            Ok(result)
        } else {
            let first_error = &result.errors[0];
            Err(PoolError::Config(ConfigError::ValidationError {
                message: first_error.message.clone(),
                field: Some(first_error.field.clone()),
            }))
        }
    }

    /// Validates the pool name.
    fn validate_name(name: Option<&str>, result: &mut ValidationResult) {
        let Some(name) = name else {
            result.errors.push(ValidationError {
                field: String::from("name"),
                message: String::from("Storage pool name is required"),
            });
            return;
        };

        if name.is_empty() {
            result.errors.push(ValidationError {
                field: String::from("name"),
                message: String::from("Storage pool name cannot be empty"),
            });
        } else if !is_valid_pool_name(name) {
            result.errors.push(ValidationError {
                field: String::from("name"),
                message: format!(
                    "Storage pool name '{name}' is invalid. It cannot contain '/', '?', '#', '%' or whitespace, or be '.' or '..'."
                ),
            });
        }
    }

    /// Validates creation parameters.
    fn validate_config(manifest: &PoolManifest, result: &mut ValidationResult) {
        for key in manifest.config.keys() {
            if key.trim().is_empty() {
                result.errors.push(ValidationError {
                    field: String::from("config"),
                    message: String::from("Config keys cannot be empty"),
                });
            }
        }

        if manifest.state.as_deref() == Some("absent") {
            if manifest.driver.is_some() {
                result
                    .warnings
                    .push(String::from("driver: ignored when state is absent"));
            }
            if !manifest.config.is_empty() {
                result
                    .warnings
                    .push(String::from("config: ignored when state is absent"));
            }
        }
    }

    /// Validates connection settings.
    fn validate_connection(connection: &ConnectionConfig, result: &mut ValidationResult) {
        if let Some(url) = &connection.url
            && let Err(e) = url.parse::<Endpoint>()
        {
            result.errors.push(ValidationError {
                field: String::from("connection.url"),
                message: e.to_string(),
            });
        }

        if connection.timeout == Some(0) {
            result.errors.push(ValidationError {
                field: String::from("connection.timeout"),
                message: String::from("Timeout must be at least 1 second"),
            });
        }
    }
}

/// Pool names become a path segment of the API URL.
fn is_valid_pool_name(name: &str) -> bool {
    !name.contains(['/', '?', '#', '%'])
        && !name.chars().any(char::is_whitespace)
        && name != "."
        && name != ".."
}

impl ValidationResult {
    /// Returns true if validation passed (no errors).
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}
