//! Configuration module.
//!
//! This module handles everything that happens before the first request:
//! - Parsing and deserializing `lxd-pool.yaml`
//! - Layering `.env`, environment variables and defaults
//! - Validation of the resulting declaration

mod manifest;
mod parser;
mod validator;

pub use manifest::{
    ConnectionConfig, Credentials, DEFAULT_TIMEOUT_SECS, DEFAULT_URL, DesiredState, Endpoint,
    PoolManifest, PoolSpec, StorageDriver, TrustPassword,
};
pub use parser::{DEFAULT_MANIFEST_FILES, ManifestParser, find_manifest_file};
pub use validator::{ManifestValidator, ValidationError, ValidationResult};
