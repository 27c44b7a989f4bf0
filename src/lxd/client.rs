//! LXD API client implementation.
//!
//! Speaks the LXD REST protocol over either the local Unix socket (hyper +
//! hyperlocal) or a remote HTTPS endpoint (reqwest + rustls) authenticated
//! with a client certificate.

use async_trait::async_trait;
use http_body_util::{BodyExt, Full};
use hyper::Request;
use hyper::body::Bytes;
use hyper::header;
use hyper_util::client::legacy::Client as HyperClient;
use hyper_util::rt::TokioExecutor;
use hyperlocal::UnixConnector;
use serde_json::{Value, json};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, trace};

use crate::config::{Credentials, Endpoint};
use crate::error::{ConfigError, LxdError, LxdResult, Result};

use super::transport::Transport;
use super::types::{LxdResponse, Method, Operation, ResponseType};

/// Path used to register a client certificate.
const CERTIFICATES_PATH: &str = "/1.0/certificates";

/// Message LXD returns when the certificate is already trusted.
const ALREADY_TRUSTED: &str = "Certificate already in trust store";

/// Extra time granted to an operation wait on top of its server-side timeout.
const WAIT_GRACE: Duration = Duration::from_secs(5);

/// Connection to a single LXD server.
pub struct LxdClient {
    /// How requests reach the server.
    backend: Backend,
    /// Per-request deadline, also used as the operation wait bound.
    timeout: Duration,
}

enum Backend {
    Unix {
        socket: PathBuf,
        client: HyperClient<UnixConnector, Full<Bytes>>,
    },
    Https {
        base_url: String,
        client: reqwest::Client,
    },
}

impl fmt::Debug for LxdClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let endpoint = match &self.backend {
            Backend::Unix { socket, .. } => format!("unix:{}", socket.display()),
            Backend::Https { base_url, .. } => base_url.clone(),
        };
        f.debug_struct("LxdClient")
            .field("endpoint", &endpoint)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl LxdClient {
    /// Creates a client for the endpoint named in `credentials`.
    ///
    /// The client key and certificate are only read for HTTPS endpoints; the
    /// local socket is trusted by file permissions.
    ///
    /// # Errors
    ///
    /// Returns an error if the key or certificate cannot be loaded, or the
    /// HTTP client cannot be created.
    pub fn connect(credentials: &Credentials, timeout: Duration) -> Result<Self> {
        let backend = match &credentials.endpoint {
            Endpoint::Unix(socket) => {
                info!("Using LXD unix socket: {}", socket.display());
                let client: HyperClient<UnixConnector, Full<Bytes>> =
                    HyperClient::builder(TokioExecutor::new()).build(UnixConnector);
                Backend::Unix {
                    socket: socket.clone(),
                    client,
                }
            }
            Endpoint::Https(base_url) => {
                info!("Using LXD endpoint: {base_url}");
                let identity = load_identity(&credentials.key_file, &credentials.cert_file)?;
                // LXD servers present self-signed certificates.
                let client = reqwest::Client::builder()
                    .use_rustls_tls()
                    .identity(identity)
                    .danger_accept_invalid_certs(true)
                    .build()
                    .map_err(|e| LxdError::network(format!("Failed to create HTTP client: {e}")))?;
                Backend::Https {
                    base_url: base_url.clone(),
                    client,
                }
            }
        };

        Ok(Self { backend, timeout })
    }

    /// Creates a client that talks plain HTTP to `base_url`.
    #[cfg(test)]
    pub(crate) fn over_http(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            backend: Backend::Https {
                base_url: base_url.into(),
                client: reqwest::Client::new(),
            },
            timeout,
        }
    }

    /// Sends one request and unwraps error envelopes.
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        deadline: Duration,
    ) -> LxdResult<LxdResponse> {
        debug!(%method, path, "Sending LXD request");

        let exchange = async {
            match &self.backend {
                Backend::Unix { socket, client } => {
                    send_unix(client, socket, method, path, body).await
                }
                Backend::Https { base_url, client } => {
                    send_https(client, base_url, method, path, body).await
                }
            }
        };

        let response = tokio::time::timeout(deadline, exchange)
            .await
            .map_err(|_| LxdError::Timeout {
                path: path.to_string(),
                secs: deadline.as_secs(),
            })??;

        trace!(kind = ?response.kind, status_code = ?response.status_code, "Received LXD response");
        response.into_result()
    }

    /// Blocks until a background operation finishes.
    async fn wait_operation(&self, operation: &str) -> LxdResult<Value> {
        let secs = self.timeout.as_secs().max(1);
        debug!(operation, secs, "Waiting for LXD operation");

        let path = format!("{operation}/wait?timeout={secs}");
        let response = self
            .send(Method::Get, &path, None, self.timeout + WAIT_GRACE)
            .await?;

        let op: Operation = serde_json::from_value(response.metadata.clone()).map_err(|e| {
            LxdError::invalid_response(format!("Failed to parse operation {operation}: {e}"))
        })?;

        if !op.succeeded() {
            let message = if op.err.is_empty() {
                format!("Operation {operation} ended with status {}", op.status)
            } else {
                op.err
            };
            return Err(LxdError::api(op.status_code, message));
        }

        Ok(response.metadata)
    }
}

#[async_trait]
impl Transport for LxdClient {
    async fn request(&self, method: Method, path: &str, body: Option<Value>) -> LxdResult<Value> {
        let response = self.send(method, path, body.as_ref(), self.timeout).await?;

        if response.kind == ResponseType::Async {
            let operation = response.operation.ok_or_else(|| {
                LxdError::invalid_response(format!(
                    "Async response to {method} {path} has no operation"
                ))
            })?;
            return self.wait_operation(&operation).await;
        }

        Ok(response.metadata)
    }

    async fn authenticate(&self, password: &str) -> LxdResult<()> {
        info!("Authenticating client certificate with trust password");
        let body = json!({ "type": "client", "password": password });

        match self
            .send(Method::Post, CERTIFICATES_PATH, Some(&body), self.timeout)
            .await
        {
            Ok(_) => Ok(()),
            Err(LxdError::Api { message, .. }) if message == ALREADY_TRUSTED => {
                debug!("Client certificate already trusted");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

async fn send_unix(
    client: &HyperClient<UnixConnector, Full<Bytes>>,
    socket: &Path,
    method: Method,
    path: &str,
    body: Option<&Value>,
) -> LxdResult<LxdResponse> {
    let payload = body.map(Value::to_string).unwrap_or_default();
    let uri: hyper::Uri = hyperlocal::Uri::new(socket, path).into();

    let request = Request::builder()
        .method(method.to_http())
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(payload)))
        .map_err(|e| LxdError::network(format!("Failed to build request: {e}")))?;

    let response = client.request(request).await.map_err(|e| {
        LxdError::network(format!("Failed to connect to {}: {e}", socket.display()))
    })?;

    let status = response.status().as_u16();
    let bytes = response
        .into_body()
        .collect()
        .await
        .map_err(|e| LxdError::network(format!("Failed to read response: {e}")))?
        .to_bytes();

    decode(status, &bytes)
}

async fn send_https(
    client: &reqwest::Client,
    base_url: &str,
    method: Method,
    path: &str,
    body: Option<&Value>,
) -> LxdResult<LxdResponse> {
    let url = format!("{base_url}{path}");

    let mut builder = client.request(method.to_http(), &url);
    if let Some(body) = body {
        builder = builder.json(body);
    }

    let response = builder
        .send()
        .await
        .map_err(|e| LxdError::network(format!("Request to {url} failed: {e}")))?;

    let status = response.status().as_u16();
    let bytes = response
        .bytes()
        .await
        .map_err(|e| LxdError::network(format!("Failed to read response: {e}")))?;

    decode(status, &bytes)
}

/// Decodes a response body into an envelope.
///
/// Error statuses without a JSON envelope become API errors carrying the raw
/// body, so the operator still sees what the server said.
fn decode(status: u16, bytes: &[u8]) -> LxdResult<LxdResponse> {
    match serde_json::from_slice::<LxdResponse>(bytes) {
        Ok(response) => Ok(response),
        Err(_) if status >= 400 => {
            let text = String::from_utf8_lossy(bytes).trim().to_string();
            let message = if text.is_empty() {
                format!("LXD returned HTTP {status}")
            } else {
                text
            };
            Err(LxdError::api(Some(status), message))
        }
        Err(e) => Err(LxdError::invalid_response(format!(
            "Failed to parse response: {e}"
        ))),
    }
}

/// Reads a PEM file for the TLS identity.
fn read_credential(path: &Path, kind: &'static str) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| {
        ConfigError::CredentialFile {
            kind,
            path: path.to_path_buf(),
            message: e.to_string(),
        }
        .into()
    })
}

/// Builds the client identity from a certificate and key PEM pair.
fn load_identity(key_file: &Path, cert_file: &Path) -> Result<reqwest::Identity> {
    let mut pem = read_credential(cert_file, "client certificate")?;
    pem.push(b'\n');
    pem.extend(read_credential(key_file, "client key")?);

    reqwest::Identity::from_pem(&pem).map_err(|e| {
        ConfigError::CredentialFile {
            kind: "client certificate",
            path: cert_file.to_path_buf(),
            message: e.to_string(),
        }
        .into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PoolError;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::UnixListener;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sync_ok(metadata: Value) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "type": "sync",
            "status": "Success",
            "status_code": 200,
            "metadata": metadata
        }))
    }

    fn lxd_error(code: u16, message: &str) -> ResponseTemplate {
        ResponseTemplate::new(code).set_body_json(json!({
            "type": "error",
            "error": message,
            "error_code": code,
            "metadata": null
        }))
    }

    #[tokio::test]
    async fn test_sync_request_returns_metadata() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/1.0/storage-pools"))
            .respond_with(sync_ok(json!(["/1.0/storage-pools/default"])))
            .expect(1)
            .mount(&server)
            .await;

        let client = LxdClient::over_http(server.uri(), Duration::from_secs(5));
        let metadata = client
            .request(Method::Get, "/1.0/storage-pools", None)
            .await
            .expect("request should succeed");

        assert_eq!(metadata, json!(["/1.0/storage-pools/default"]));
    }

    #[tokio::test]
    async fn test_post_sends_json_body() {
        let server = MockServer::start().await;
        let body = json!({"name": "pool1", "driver": "zfs", "config": {"size": "20GB"}});
        Mock::given(method("POST"))
            .and(path("/1.0/storage-pools"))
            .and(body_json(&body))
            .respond_with(sync_ok(Value::Null))
            .expect(1)
            .mount(&server)
            .await;

        let client = LxdClient::over_http(server.uri(), Duration::from_secs(5));
        client
            .request(Method::Post, "/1.0/storage-pools", Some(body))
            .await
            .expect("request should succeed");
    }

    #[tokio::test]
    async fn test_error_envelope_becomes_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/1.0/storage-pools/pool1"))
            .respond_with(lxd_error(404, "No such object"))
            .mount(&server)
            .await;

        let client = LxdClient::over_http(server.uri(), Duration::from_secs(5));
        let err = client
            .request(Method::Delete, "/1.0/storage-pools/pool1", None)
            .await
            .unwrap_err();

        assert_eq!(err, LxdError::api(Some(404), "No such object"));
    }

    #[tokio::test]
    async fn test_non_json_error_body_is_kept() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/1.0/storage-pools"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway\n"))
            .mount(&server)
            .await;

        let client = LxdClient::over_http(server.uri(), Duration::from_secs(5));
        let err = client
            .request(Method::Get, "/1.0/storage-pools", None)
            .await
            .unwrap_err();

        assert_eq!(err, LxdError::api(Some(502), "bad gateway"));
    }

    #[tokio::test]
    async fn test_async_operation_is_awaited() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/1.0/storage-pools/pool1"))
            .respond_with(ResponseTemplate::new(202).set_body_json(json!({
                "type": "async",
                "status": "Operation created",
                "status_code": 100,
                "operation": "/1.0/operations/abc",
                "metadata": {"id": "abc"}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/1.0/operations/abc/wait"))
            .and(query_param("timeout", "7"))
            .respond_with(sync_ok(json!({
                "id": "abc",
                "status": "Failure",
                "status_code": 400,
                "err": "pool is in use"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = LxdClient::over_http(server.uri(), Duration::from_secs(7));
        let err = client
            .request(Method::Delete, "/1.0/storage-pools/pool1", None)
            .await
            .unwrap_err();

        assert_eq!(err, LxdError::api(Some(400), "pool is in use"));
    }

    #[tokio::test]
    async fn test_async_operation_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/1.0/storage-pools"))
            .respond_with(ResponseTemplate::new(202).set_body_json(json!({
                "type": "async",
                "operation": "/1.0/operations/xyz"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/1.0/operations/xyz/wait"))
            .respond_with(sync_ok(json!({"status": "Success", "status_code": 200})))
            .mount(&server)
            .await;

        let client = LxdClient::over_http(server.uri(), Duration::from_secs(5));
        let result = client
            .request(Method::Post, "/1.0/storage-pools", Some(json!({"name": "p"})))
            .await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_request_deadline() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/1.0/storage-pools"))
            .respond_with(sync_ok(json!([])).set_delay(Duration::from_secs(3)))
            .mount(&server)
            .await;

        let client = LxdClient::over_http(server.uri(), Duration::from_millis(200));
        let err = client
            .request(Method::Get, "/1.0/storage-pools", None)
            .await
            .unwrap_err();

        assert!(matches!(err, LxdError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_authenticate_posts_trust_password() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/1.0/certificates"))
            .and(body_json(json!({"type": "client", "password": "s3cret"})))
            .respond_with(sync_ok(Value::Null))
            .expect(1)
            .mount(&server)
            .await;

        let client = LxdClient::over_http(server.uri(), Duration::from_secs(5));
        client.authenticate("s3cret").await.expect("auth should succeed");
    }

    #[tokio::test]
    async fn test_authenticate_already_trusted_is_ok() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/1.0/certificates"))
            .respond_with(lxd_error(400, "Certificate already in trust store"))
            .mount(&server)
            .await;

        let client = LxdClient::over_http(server.uri(), Duration::from_secs(5));
        assert!(client.authenticate("s3cret").await.is_ok());
    }

    #[tokio::test]
    async fn test_authenticate_failure_keeps_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/1.0/certificates"))
            .respond_with(lxd_error(403, "bad password"))
            .mount(&server)
            .await;

        let client = LxdClient::over_http(server.uri(), Duration::from_secs(5));
        let err = client.authenticate("wrong").await.unwrap_err();
        assert_eq!(err.to_string(), "bad password");
    }

    #[test]
    fn test_connect_unix_skips_credential_files() {
        let credentials = Credentials::local("/nonexistent/client.key", "/nonexistent/client.crt");
        let client = LxdClient::connect(&credentials, Duration::from_secs(30)).unwrap();
        assert!(format!("{client:?}").contains("unix:/var/lib/lxd/unix.socket"));
    }

    #[test]
    fn test_connect_https_requires_credential_files() {
        let credentials = Credentials {
            endpoint: Endpoint::Https(String::from("https://lxd.example.com:8443")),
            ..Credentials::local("/nonexistent/client.key", "/nonexistent/client.crt")
        };

        let err = LxdClient::connect(&credentials, Duration::from_secs(30)).unwrap_err();
        assert!(matches!(
            err,
            PoolError::Config(ConfigError::CredentialFile { kind: "client certificate", .. })
        ));
    }

    /// Answers one connection per reply and returns the request lines seen.
    async fn serve_unix(listener: UnixListener, replies: Vec<(u16, Value)>) -> Vec<String> {
        let mut seen = Vec::new();

        for (status, body) in replies {
            let (mut stream, _) = listener.accept().await.unwrap();

            let mut head = Vec::new();
            let mut chunk = [0u8; 1024];
            while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = stream.read(&mut chunk).await.unwrap();
                assert!(n > 0, "client closed before sending a request");
                head.extend_from_slice(&chunk[..n]);
            }
            let head = String::from_utf8_lossy(&head).into_owned();
            seen.push(head.lines().next().unwrap_or_default().to_string());

            let body = body.to_string();
            let reply = format!(
                "HTTP/1.1 {status} LXD\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(reply.as_bytes()).await.unwrap();
            stream.shutdown().await.unwrap();
        }

        seen
    }

    #[tokio::test]
    async fn test_unix_socket_requests() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("unix.socket");
        let listener = UnixListener::bind(&socket).unwrap();
        let server = tokio::spawn(serve_unix(
            listener,
            vec![
                (
                    200,
                    json!({
                        "type": "sync",
                        "status": "Success",
                        "status_code": 200,
                        "metadata": ["/1.0/storage-pools/default"]
                    }),
                ),
                (
                    404,
                    json!({
                        "type": "error",
                        "error": "No such object",
                        "error_code": 404,
                        "metadata": null
                    }),
                ),
            ],
        ));

        let credentials = Credentials {
            endpoint: Endpoint::Unix(socket.clone()),
            ..Credentials::local("/nonexistent/client.key", "/nonexistent/client.crt")
        };
        let client = LxdClient::connect(&credentials, Duration::from_secs(5)).unwrap();

        let pools = client
            .request(Method::Get, "/1.0/storage-pools", None)
            .await
            .unwrap();
        assert_eq!(pools, json!(["/1.0/storage-pools/default"]));

        let err = client
            .request(Method::Delete, "/1.0/storage-pools/default%3Fx", None)
            .await
            .unwrap_err();
        assert_eq!(err, LxdError::api(Some(404), "No such object"));

        let seen = server.await.unwrap();
        assert_eq!(
            seen,
            vec![
                "GET /1.0/storage-pools HTTP/1.1",
                "DELETE /1.0/storage-pools/default%3Fx HTTP/1.1"
            ]
        );
    }
}
