//! HTTP Client
//!
//! Uses hyper with tokio for async HTTP/1.1 against the control daemon
//! and the discovery service.
//! Features:
//! - Automatic HTTPS with rustls (memory-safe TLS)
//! - JSON request bodies for PUT/DELETE
//! - Per-request connect and exchange timeouts
//! - Response body size limit

use http_body_util::{BodyExt, Full, Limited};
use hyper::body::{Bytes, Incoming};
use hyper::header::{HeaderMap, ACCEPT, CONTENT_TYPE, HOST, USER_AGENT};
use hyper::{Method, Request, StatusCode, Uri};
use rustls::ClientConfig;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, info, warn};

/// HTTP client errors
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Request timeout")]
    Timeout,

    #[error("HTTP error: {0}")]
    HttpError(String),

    #[error("TLS error: {0}")]
    TlsError(String),

    #[error("Body read error: {0}")]
    BodyError(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Whole-exchange timeout (send + receive body)
    pub timeout: Duration,
    /// TCP connect timeout
    pub connect_timeout: Duration,
    /// User-Agent string
    pub user_agent: String,
    /// Maximum response body size
    pub max_body_size: usize,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            user_agent: format!("rotor/{}", env!("CARGO_PKG_VERSION")),
            // The discovery listing is a few MB at most
            max_body_size: 32 * 1024 * 1024,
        }
    }
}

/// HTTP response wrapper
#[derive(Debug)]
pub struct Response {
    /// Status code
    pub status: StatusCode,
    /// Response headers
    pub headers: HeaderMap,
    /// Response body
    pub body: Vec<u8>,
    /// Total request time
    pub total_time: Duration,
}

impl Response {
    /// Check if response was successful (2xx)
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Decode the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, HttpError> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

/// Minimal HTTP/1.1 client
#[derive(Debug, Clone)]
pub struct HttpClient {
    config: HttpClientConfig,
}

impl HttpClient {
    /// Create a new HTTP client
    pub fn new(config: HttpClientConfig) -> Self {
        info!(
            "HTTP client initialized (timeout: {:?}, connect timeout: {:?})",
            config.timeout, config.connect_timeout
        );

        Self { config }
    }

    /// Create with default configuration
    pub fn with_defaults() -> Self {
        Self::new(HttpClientConfig::default())
    }

    /// Client configuration
    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }

    /// Perform a GET request
    pub async fn get(&self, url: &str) -> Result<Response, HttpError> {
        self.request(Method::GET, url, None).await
    }

    /// Perform a PUT request with a JSON body
    pub async fn put_json<B: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<Response, HttpError> {
        let body = serde_json::to_vec(body)?;
        self.request(Method::PUT, url, Some(body)).await
    }

    /// Perform a DELETE request with a JSON body
    pub async fn delete_json<B: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<Response, HttpError> {
        let body = serde_json::to_vec(body)?;
        self.request(Method::DELETE, url, Some(body)).await
    }

    /// Perform an HTTP request. A present body is sent as `application/json`.
    pub async fn request(
        &self,
        method: Method,
        url: &str,
        body: Option<Vec<u8>>,
    ) -> Result<Response, HttpError> {
        let start = Instant::now();

        // 1. Parse URL
        let uri: Uri = url
            .parse()
            .map_err(|e: hyper::http::uri::InvalidUri| HttpError::InvalidUrl(e.to_string()))?;

        let is_https = match uri.scheme_str() {
            Some("https") => true,
            Some("http") => false,
            other => {
                return Err(HttpError::InvalidUrl(format!(
                    "Unsupported scheme: {}",
                    other.unwrap_or("none")
                )));
            }
        };
        let host = uri
            .host()
            .ok_or_else(|| HttpError::InvalidUrl("No host in URL".to_string()))?
            .to_string();
        let port = uri.port_u16().unwrap_or(if is_https { 443 } else { 80 });
        let host_header = match uri.port_u16() {
            Some(p) => format!("{}:{}", host, p),
            None => host.clone(),
        };
        let target = uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");

        // 2. Build request (origin-form target + Host header)
        let mut builder = Request::builder()
            .method(method.clone())
            .uri(target)
            .header(HOST, host_header)
            .header(USER_AGENT, &self.config.user_agent)
            .header(ACCEPT, "application/json");
        if body.is_some() {
            builder = builder.header(CONTENT_TYPE, "application/json");
        }
        let request = builder
            .body(Full::new(Bytes::from(body.unwrap_or_default())))
            .map_err(|e| HttpError::HttpError(e.to_string()))?;

        // 3. Connect
        let addr = format!("{}:{}", host, port);
        let stream = tokio::time::timeout(self.config.connect_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| HttpError::Timeout)?
            .map_err(|e| HttpError::ConnectionFailed(e.to_string()))?;

        // 4. Exchange, bounded by the request timeout
        let exchange = async {
            let response = if is_https {
                let mut root_store = rustls::RootCertStore::empty();
                root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

                let tls_config = ClientConfig::builder()
                    .with_root_certificates(root_store)
                    .with_no_client_auth();

                let connector = TlsConnector::from(Arc::new(tls_config));
                let server_name = rustls::pki_types::ServerName::try_from(host.clone())
                    .map_err(|_| HttpError::TlsError("Invalid server name".to_string()))?;

                let tls_stream = connector
                    .connect(server_name, stream)
                    .await
                    .map_err(|e| HttpError::TlsError(e.to_string()))?;

                Self::send(tls_stream, request).await?
            } else {
                Self::send(stream, request).await?
            };

            let status = response.status();
            let headers = response.headers().clone();

            let collected = Limited::new(response.into_body(), self.config.max_body_size)
                .collect()
                .await
                .map_err(|e| HttpError::BodyError(e.to_string()))?;

            Ok::<_, HttpError>((status, headers, collected.to_bytes().to_vec()))
        };

        let (status, headers, body) = tokio::time::timeout(self.config.timeout, exchange)
            .await
            .map_err(|_| HttpError::Timeout)??;

        let total_time = start.elapsed();

        debug!(
            "HTTP {} {} -> {} ({} bytes, {:?})",
            method,
            url,
            status,
            body.len(),
            total_time
        );

        Ok(Response {
            status,
            headers,
            body,
            total_time,
        })
    }

    /// Run an HTTP/1.1 handshake over `io` and send a single request
    async fn send<T>(
        io: T,
        request: Request<Full<Bytes>>,
    ) -> Result<hyper::Response<Incoming>, HttpError>
    where
        T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let io = hyper_util::rt::TokioIo::new(io);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| HttpError::HttpError(e.to_string()))?;

        tokio::spawn(async move {
            if let Err(e) = conn.await {
                warn!("Connection error: {}", e);
            }
        });

        sender
            .send_request(request)
            .await
            .map_err(|e| HttpError::HttpError(e.to_string()))
    }
}
