//! Transport trait definition.
//!
//! The reconciler only ever talks to LXD through this trait, which keeps it
//! independent of sockets, TLS and JSON decoding.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::LxdResult;

use super::types::Method;

/// An authenticated channel to the LXD API.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends a request to `path` under the API root.
    ///
    /// Returns the response `metadata` (or `Null` when there is none). Error
    /// envelopes, transport failures and failed background operations all
    /// surface as an [`LxdError`](crate::error::LxdError).
    async fn request(&self, method: Method, path: &str, body: Option<Value>) -> LxdResult<Value>;

    /// Registers the client certificate using the server's trust password.
    async fn authenticate(&self, password: &str) -> LxdResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Credentials, DesiredState, PoolSpec};
    use crate::error::LxdError;
    use crate::reconciler::{Outcome, Reconciler};

    struct Refusing;

    #[async_trait]
    impl Transport for Refusing {
        async fn request(&self, _method: Method, _path: &str, _body: Option<Value>) -> LxdResult<Value> {
            Err(LxdError::network("connection refused"))
        }

        async fn authenticate(&self, _password: &str) -> LxdResult<()> {
            Err(LxdError::network("connection refused"))
        }
    }

    #[test]
    fn test_unreachable_transport_fails_run() {
        let creds = Credentials::local("/tmp/client.key", "/tmp/client.crt");
        let reconciler = Reconciler::new(&Refusing, &creds);

        let outcome = tokio_test::block_on(
            reconciler.reconcile(DesiredState::Absent, &PoolSpec::named("pool1")),
        );
        assert_eq!(outcome, Outcome::failed("connection refused"));

        let creds = creds.with_trust_password("s3cret");
        let reconciler = Reconciler::new(&Refusing, &creds);
        let err = tokio_test::block_on(reconciler.pool_exists("pool1")).unwrap_err();
        assert_eq!(err, LxdError::network("connection refused"));
    }
}
