//! Control Daemon Client
//!
//! Thin request/response surface over the local VPN daemon's HTTP API.
//! No retries happen here; the negotiation loop owns retry decisions.
//!
//! # Endpoints
//!
//! ```text
//! GET    /connection           -> { consumer_id?, status }
//! PUT    /connection           { consumer_id, proposal_id } -> { status } | { error: { code } }
//! DELETE /connection           { consumer_id } -> 202
//! GET    /connection/proxy/ip  -> { ip }
//! ```

use async_trait::async_trait;
use rotor_network::{HttpClient, HttpError, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use tracing::{debug, info, warn};

/// Consumer identity registered with the daemon
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConsumerId(pub String);

impl ConsumerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConsumerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Connection status as reported by the daemon
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ConnectionStatus {
    NotConnected,
    Connecting,
    Connected,
    Disconnecting,
    Reconnecting,
    OnHold,
    /// Any status string this client does not know
    Other(String),
}

impl ConnectionStatus {
    /// Check if a session is established
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionStatus::Connected)
    }

    pub fn as_str(&self) -> &str {
        match self {
            ConnectionStatus::NotConnected => "NotConnected",
            ConnectionStatus::Connecting => "Connecting",
            ConnectionStatus::Connected => "Connected",
            ConnectionStatus::Disconnecting => "Disconnecting",
            ConnectionStatus::Reconnecting => "Reconnecting",
            ConnectionStatus::OnHold => "OnHold",
            ConnectionStatus::Other(s) => s,
        }
    }
}

impl From<String> for ConnectionStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "NotConnected" => ConnectionStatus::NotConnected,
            "Connecting" => ConnectionStatus::Connecting,
            "Connected" => ConnectionStatus::Connected,
            "Disconnecting" => ConnectionStatus::Disconnecting,
            "Reconnecting" => ConnectionStatus::Reconnecting,
            "OnHold" => ConnectionStatus::OnHold,
            _ => ConnectionStatus::Other(s),
        }
    }
}

impl From<ConnectionStatus> for String {
    fn from(status: ConnectionStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error code returned by the daemon on a rejected connect
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DaemonErrorCode {
    /// `err_connect`: provider unreachable or refusing this consumer
    ConnectFailed,
    /// `err_connection_already_exists`: a session is already up
    ConnectionExists,
    Other(String),
}

impl DaemonErrorCode {
    pub fn as_str(&self) -> &str {
        match self {
            DaemonErrorCode::ConnectFailed => "err_connect",
            DaemonErrorCode::ConnectionExists => "err_connection_already_exists",
            DaemonErrorCode::Other(code) => code,
        }
    }
}

impl From<&str> for DaemonErrorCode {
    fn from(code: &str) -> Self {
        match code {
            "err_connect" => DaemonErrorCode::ConnectFailed,
            "err_connection_already_exists" => DaemonErrorCode::ConnectionExists,
            other => DaemonErrorCode::Other(other.to_string()),
        }
    }
}

impl fmt::Display for DaemonErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of a connect request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// Session established
    Connected,
    /// Daemon refused with an error code
    Rejected(DaemonErrorCode),
    /// Daemon answered with a status other than `Connected`
    Status(ConnectionStatus),
}

/// Control daemon errors
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error("Daemon request failed: {0}")]
    Http(#[from] HttpError),

    #[error("Daemon returned HTTP {0}")]
    Status(u16),

    #[error("Invalid daemon response: {0}")]
    InvalidResponse(String),

    #[error("Consumer id is null, connect and disconnect once manually first")]
    MissingConsumerId,

    #[error("Proxy IP unavailable: {0}")]
    ProxyIpUnavailable(String),
}

/// Control-plane contract of the VPN daemon
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Consumer identity the daemon connects as
    async fn consumer_id(&self) -> Result<ConsumerId, ControlError>;

    /// Current connection status
    async fn connection_status(&self) -> Result<ConnectionStatus, ControlError>;

    /// Ask the daemon to connect to `provider_id`
    async fn connect(
        &self,
        consumer: &ConsumerId,
        provider_id: &str,
    ) -> Result<ConnectOutcome, ControlError>;

    /// Tear down the current session. Best effort: failures are logged
    /// by implementations and never returned.
    async fn disconnect(&self, consumer: &ConsumerId);

    /// Exit IP of the current session
    async fn proxy_ip(&self) -> Result<IpAddr, ControlError>;
}

#[derive(Debug, Deserialize)]
struct ConnectionInfo {
    #[serde(default)]
    consumer_id: Option<String>,
    #[serde(default)]
    status: Option<ConnectionStatus>,
}

#[derive(Debug, Serialize)]
struct ConnectRequest<'a> {
    consumer_id: &'a str,
    proposal_id: &'a str,
}

#[derive(Debug, Serialize)]
struct DisconnectRequest<'a> {
    consumer_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct ConnectResponse {
    #[serde(default)]
    status: Option<ConnectionStatus>,
    #[serde(default)]
    error: Option<DaemonErrorBody>,
}

#[derive(Debug, Deserialize)]
struct DaemonErrorBody {
    code: String,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProxyIp {
    ip: String,
}

/// HTTP implementation of [`ControlPlane`]
#[derive(Debug, Clone)]
pub struct HttpControlPlane {
    http: HttpClient,
    base: String,
}

impl HttpControlPlane {
    /// Create a client for the daemon at `base_uri` (e.g. `http://localhost:44050`)
    pub fn new(http: HttpClient, base_uri: &str) -> Self {
        Self {
            http,
            base: base_uri.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn connection_info(&self) -> Result<ConnectionInfo, ControlError> {
        let response = self.http.get(&self.url("/connection")).await?;
        Self::expect_success(&response)?;
        response
            .json()
            .map_err(|e| ControlError::InvalidResponse(e.to_string()))
    }

    fn expect_success(response: &Response) -> Result<(), ControlError> {
        if response.is_success() {
            Ok(())
        } else {
            Err(ControlError::Status(response.status.as_u16()))
        }
    }
}

#[async_trait]
impl ControlPlane for HttpControlPlane {
    async fn consumer_id(&self) -> Result<ConsumerId, ControlError> {
        let info = self.connection_info().await?;
        match info.consumer_id.filter(|id| !id.is_empty()) {
            Some(id) => {
                info!("Got consumer ID: {}", id);
                Ok(ConsumerId(id))
            }
            None => Err(ControlError::MissingConsumerId),
        }
    }

    async fn connection_status(&self) -> Result<ConnectionStatus, ControlError> {
        self.connection_info()
            .await?
            .status
            .ok_or_else(|| ControlError::InvalidResponse("missing status".to_string()))
    }

    async fn connect(
        &self,
        consumer: &ConsumerId,
        provider_id: &str,
    ) -> Result<ConnectOutcome, ControlError> {
        let request = ConnectRequest {
            consumer_id: consumer.as_str(),
            proposal_id: provider_id,
        };
        // Rejections arrive as 4xx/5xx with an error body, so the body
        // is interpreted whatever the status code
        let response = self.http.put_json(&self.url("/connection"), &request).await?;
        let body: ConnectResponse = response.json().map_err(|e| {
            ControlError::InvalidResponse(format!("HTTP {}: {}", response.status, e))
        })?;

        if let Some(error) = body.error {
            debug!(
                "Connect to {} rejected: {} ({})",
                provider_id,
                error.code,
                error.message.as_deref().unwrap_or("no message")
            );
            return Ok(ConnectOutcome::Rejected(DaemonErrorCode::from(
                error.code.as_str(),
            )));
        }

        match body.status {
            Some(ConnectionStatus::Connected) => Ok(ConnectOutcome::Connected),
            Some(status) => Ok(ConnectOutcome::Status(status)),
            None => Err(ControlError::InvalidResponse(format!(
                "HTTP {} without status or error",
                response.status
            ))),
        }
    }

    async fn disconnect(&self, consumer: &ConsumerId) {
        let request = DisconnectRequest {
            consumer_id: consumer.as_str(),
        };
        match self.http.delete_json(&self.url("/connection"), &request).await {
            Ok(response) if response.status == StatusCode::ACCEPTED => {
                info!("Disconnected consumer {}", consumer);
            }
            Ok(response) => {
                warn!("Failed to disconnect: daemon returned HTTP {}", response.status);
            }
            Err(e) => {
                warn!("Failed to disconnect: {}", e);
            }
        }
    }

    async fn proxy_ip(&self) -> Result<IpAddr, ControlError> {
        let unavailable = |e: &dyn fmt::Display| ControlError::ProxyIpUnavailable(e.to_string());

        let response = self
            .http
            .get(&self.url("/connection/proxy/ip"))
            .await
            .map_err(|e| unavailable(&e))?;
        if !response.is_success() {
            return Err(unavailable(&format!("HTTP {}", response.status)));
        }
        let body: ProxyIp = response.json().map_err(|e| unavailable(&e))?;
        body.ip.trim().parse().map_err(|_| unavailable(&format!("invalid address {:?}", body.ip)))
    }
}
