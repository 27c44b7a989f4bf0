//! Reconciler for storage pool presence.
//!
//! A run never asks whether the pool exists before acting. It sends the one
//! mutation implied by the desired state and classifies the answer: success
//! means something changed, a known "already exists" / "no such object"
//! rejection means nothing had to change, and anything else is a failure
//! reported with the remote message untouched.

use percent_encoding::{AsciiSet, CONTROLS, percent_decode_str, utf8_percent_encode};
use serde_json::Value;
use std::fmt;
use tracing::{debug, error, info};

use crate::config::{Credentials, DesiredState, PoolSpec};
use crate::error::{LxdError, LxdResult};
use crate::lxd::{CreateStoragePool, Method, Transport};

/// Collection path for storage pools.
pub const STORAGE_POOLS_PATH: &str = "/1.0/storage-pools";

/// Bytes escaped when a pool name becomes one path segment.
const POOL_NAME_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Path of a single storage pool. The name always stays one segment.
#[must_use]
pub fn pool_path(name: &str) -> String {
    format!(
        "{STORAGE_POOLS_PATH}/{}",
        utf8_percent_encode(name, POOL_NAME_SEGMENT)
    )
}

/// Result of a reconciliation run. Exactly one is produced per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The remote state was modified.
    Changed,
    /// The remote state already matched.
    Unchanged,
    /// The run failed.
    Failed {
        /// Message from the failing layer, unmodified.
        message: String,
    },
}

impl Outcome {
    /// Creates a failed outcome.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }

    /// Returns true if the remote state was modified.
    #[must_use]
    pub const fn is_changed(&self) -> bool {
        matches!(self, Self::Changed)
    }

    /// Returns true if the run failed.
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// Returns the failure message, if any.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Failed { message } => Some(message),
            _ => None,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Changed => write!(f, "changed"),
            Self::Unchanged => write!(f, "unchanged"),
            Self::Failed { message } => write!(f, "failed: {message}"),
        }
    }
}

/// Remote rejections that mean the desired state already holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KnownRemoteError {
    /// Creating a pool whose name is taken.
    PoolAlreadyExists,
    /// Deleting a pool that is not there.
    NoSuchObject,
}

impl KnownRemoteError {
    /// Exact message LXD sends for this rejection.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::PoolAlreadyExists => "The storage pool already exists",
            Self::NoSuchObject => "No such object",
        }
    }

    /// Structured `error_code` LXD sends for this rejection.
    #[must_use]
    pub const fn error_code(self) -> u16 {
        match self {
            Self::PoolAlreadyExists => 409,
            Self::NoSuchObject => 404,
        }
    }

    /// Returns true if `err` is this rejection.
    ///
    /// Either the structured error code or the exact message is enough.
    /// Only API errors qualify, never transport failures.
    #[must_use]
    pub fn matches(self, err: &LxdError) -> bool {
        let LxdError::Api { code, message } = err else {
            return false;
        };

        *code == Some(self.error_code()) || message.as_str() == self.message()
    }
}

/// The single mutating request a run will send.
#[derive(Debug, Clone, PartialEq)]
enum Mutation {
    Create { body: Value },
    Delete { name: String },
}

impl Mutation {
    /// Chooses the request for `state`. Fails without touching the network
    /// when the name cannot address a pool, or when a pool must be created
    /// but no driver was declared.
    fn plan(state: DesiredState, pool: &PoolSpec) -> Result<Self, String> {
        if matches!(pool.name.as_str(), "" | "." | "..") {
            return Err(format!("Invalid storage pool name '{}'", pool.name));
        }

        match state {
            DesiredState::Present => {
                let driver = pool.driver.ok_or_else(|| {
                    format!("A driver is required to create storage pool '{}'", pool.name)
                })?;

                let request = CreateStoragePool {
                    name: pool.name.clone(),
                    driver: driver.as_str().to_string(),
                    config: pool.config.clone(),
                };
                let body = serde_json::to_value(&request)
                    .map_err(|e| format!("Failed to encode storage pool request: {e}"))?;

                Ok(Self::Create { body })
            }
            DesiredState::Absent => Ok(Self::Delete {
                name: pool.name.clone(),
            }),
        }
    }

    const fn method(&self) -> Method {
        match self {
            Self::Create { .. } => Method::Post,
            Self::Delete { .. } => Method::Delete,
        }
    }

    fn path(&self) -> String {
        match self {
            Self::Create { .. } => STORAGE_POOLS_PATH.to_string(),
            Self::Delete { name } => pool_path(name),
        }
    }

    fn body(&self) -> Option<Value> {
        match self {
            Self::Create { body } => Some(body.clone()),
            Self::Delete { .. } => None,
        }
    }

    /// The rejection that means this mutation was not needed.
    const fn already_converged(&self) -> KnownRemoteError {
        match self {
            Self::Create { .. } => KnownRemoteError::PoolAlreadyExists,
            Self::Delete { .. } => KnownRemoteError::NoSuchObject,
        }
    }
}

/// Drives one storage pool towards its desired state.
pub struct Reconciler<'a, T: Transport + ?Sized> {
    /// Channel to the LXD API.
    transport: &'a T,
    /// Credential bundle; only the trust password is used here.
    credentials: &'a Credentials,
}

impl<'a, T: Transport + ?Sized> Reconciler<'a, T> {
    /// Creates a new reconciler.
    #[must_use]
    pub const fn new(transport: &'a T, credentials: &'a Credentials) -> Self {
        Self {
            transport,
            credentials,
        }
    }

    /// Reconciles using a desired state given as text.
    ///
    /// An unknown state fails the run before any request is sent.
    pub async fn reconcile_declared(&self, state: &str, pool: &PoolSpec) -> Outcome {
        match state.parse::<DesiredState>() {
            Ok(state) => self.reconcile(state, pool).await,
            Err(e) => {
                error!(state, "Rejecting unknown desired state");
                Outcome::failed(e.to_string())
            }
        }
    }

    /// Performs a reconciliation run.
    ///
    /// Authenticates first when a trust password is configured, then sends
    /// exactly one create or delete request.
    pub async fn reconcile(&self, state: DesiredState, pool: &PoolSpec) -> Outcome {
        info!(pool = %pool.name, %state, "Reconciling storage pool");

        let mutation = match Mutation::plan(state, pool) {
            Ok(mutation) => mutation,
            Err(e) => {
                error!("Cannot plan storage pool request: {}", e);
                return Outcome::failed(e);
            }
        };

        if let Err(e) = self.authenticate().await {
            error!("Authentication failed: {}", e);
            return Outcome::failed(e.to_string());
        }

        self.apply(&mutation).await
    }

    /// Checks whether a pool exists by listing all pools.
    ///
    /// This is a read-only query; reconciliation never calls it.
    ///
    /// # Errors
    ///
    /// Returns an error if authentication or the listing fails, or the
    /// listing is not an array.
    pub async fn pool_exists(&self, name: &str) -> LxdResult<bool> {
        self.authenticate().await?;

        let listing = self
            .transport
            .request(Method::Get, STORAGE_POOLS_PATH, None)
            .await?;

        let entries = listing.as_array().ok_or_else(|| {
            LxdError::invalid_response("Expected a list of storage pool URLs")
        })?;

        let exists = entries
            .iter()
            .filter_map(Value::as_str)
            .filter_map(|url| url.rsplit('/').next())
            .any(|segment| percent_decode_str(segment).decode_utf8_lossy() == name);

        debug!(pool = name, exists, "Checked storage pool existence");
        Ok(exists)
    }

    async fn authenticate(&self) -> LxdResult<()> {
        match self
            .credentials
            .trust_password
            .as_ref()
            .filter(|p| !p.expose().is_empty())
        {
            Some(password) => self.transport.authenticate(password.expose()).await,
            None => {
                debug!("No trust password configured, skipping authentication");
                Ok(())
            }
        }
    }

    async fn apply(&self, mutation: &Mutation) -> Outcome {
        let method = mutation.method();
        let path = mutation.path();

        match self.transport.request(method, &path, mutation.body()).await {
            Ok(_) => {
                info!(%method, path = %path, "Storage pool changed");
                Outcome::Changed
            }
            Err(err) if mutation.already_converged().matches(&err) => {
                info!(%method, path = %path, reason = %err, "Storage pool already converged");
                Outcome::Unchanged
            }
            Err(err) => {
                error!(%method, path = %path, "Storage pool request failed: {}", err);
                Outcome::failed(err.to_string())
            }
        }
    }
}
