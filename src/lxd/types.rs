//! LXD REST API types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{LxdError, LxdResult};

/// HTTP verbs used against the LXD API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Read.
    Get,
    /// Create.
    Post,
    /// Delete.
    Delete,
}

impl Method {
    /// Converts to the `http` crate's method type shared by hyper and reqwest.
    #[must_use]
    pub const fn to_http(self) -> hyper::Method {
        match self {
            Self::Get => hyper::Method::GET,
            Self::Post => hyper::Method::POST,
            Self::Delete => hyper::Method::DELETE,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Get => write!(f, "GET"),
            Self::Post => write!(f, "POST"),
            Self::Delete => write!(f, "DELETE"),
        }
    }
}

/// Kind of response envelope.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    /// Completed synchronously.
    Sync,
    /// Background operation started; `operation` points at it.
    Async,
    /// Request failed.
    Error,
}

/// Envelope wrapping every LXD API response.
#[derive(Debug, Clone, Deserialize)]
pub struct LxdResponse {
    /// Envelope kind.
    #[serde(rename = "type")]
    pub kind: ResponseType,
    /// Human readable status for sync/async responses.
    #[serde(default)]
    pub status: Option<String>,
    /// Numeric status for sync/async responses.
    #[serde(default)]
    pub status_code: Option<u16>,
    /// Operation URL for async responses.
    #[serde(default)]
    pub operation: Option<String>,
    /// HTTP-like error code for error responses.
    #[serde(default)]
    pub error_code: Option<u16>,
    /// Error message for error responses.
    #[serde(default)]
    pub error: Option<String>,
    /// Response payload.
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl LxdResponse {
    /// Extracts the error message, preferring `metadata.err` over `error`.
    #[must_use]
    pub fn error_message(&self) -> String {
        self.metadata
            .get("err")
            .and_then(serde_json::Value::as_str)
            .filter(|err| !err.is_empty())
            .or(self.error.as_deref())
            .unwrap_or("Unknown LXD error")
            .to_string()
    }

    /// Converts an error envelope into an [`LxdError`], passing others through.
    ///
    /// # Errors
    ///
    /// Returns [`LxdError::Api`] when the envelope type is `error`.
    pub fn into_result(self) -> LxdResult<Self> {
        if self.kind == ResponseType::Error {
            return Err(LxdError::api(self.error_code, self.error_message()));
        }
        Ok(self)
    }
}

/// Background operation as returned by `GET {operation}/wait`.
#[derive(Debug, Clone, Deserialize)]
pub struct Operation {
    /// Final status, `Success` on completion.
    #[serde(default)]
    pub status: String,
    /// Numeric status.
    #[serde(default)]
    pub status_code: Option<u16>,
    /// Failure message.
    #[serde(default)]
    pub err: String,
}

impl Operation {
    /// Status string LXD uses for a successful operation.
    pub const SUCCESS: &'static str = "Success";

    /// Returns true if the operation succeeded.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.status == Self::SUCCESS
    }
}

/// Body of `POST /1.0/storage-pools`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CreateStoragePool {
    /// Pool name.
    pub name: String,
    /// Driver name.
    pub driver: String,
    /// Driver configuration.
    pub config: BTreeMap<String, String>,
}
