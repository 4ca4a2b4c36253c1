//! Session Manager
//!
//! Composes catalog refresh, consumer lookup, negotiation and the exit IP
//! check into one call that yields a session with a known-novel (or
//! known-reused) exit IP.
//!
//! # Usage
//!
//! ```rust,ignore
//! let mut manager = SessionManager::from_config(&RotorConfig::default()).await?;
//!
//! let session = manager.acquire_unique_session().await?;
//! if !session.is_novel_ip {
//!     // Reused exit, drop it
//!     manager.release(&session.consumer_id).await;
//! }
//! ```

use crate::catalog::{Proposal, ProposalCatalog};
use crate::config::{ConfigError, RotorConfig};
use crate::control::{ConnectionStatus, ConsumerId, ControlError, ControlPlane, HttpControlPlane};
use crate::controller::ConnectionController;
use crate::discovery::{DiscoveryClient, DiscoveryError, ProposalSource};
use crate::exclusion::{ExclusionSet, ExclusionStore, FileExclusionStore, StoreError};
use crate::guard::SessionUniquenessGuard;
use crate::selector::{ProposalSelector, SelectError};
use rotor_network::HttpClient;
use serde::Serialize;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

/// Session acquisition errors, one variant per failing stage
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("No proposals available")]
    EmptyCatalog,

    #[error("Every proposal in the catalog belongs to an already used provider")]
    ExhaustedProposals,

    #[error("Failed to fetch consumer id: {0}")]
    ConsumerIdUnavailable(ControlError),

    #[error("Max retries reached ({max_retries})")]
    MaxRetriesExceeded { max_retries: u32 },

    #[error("Failed to connect proposal, status: {0}")]
    UnexpectedStatus(String),

    #[error("Control daemon error: {0}")]
    Control(#[from] ControlError),

    #[error("Failed to fetch exit IP: {0}")]
    ExitIpUnavailable(ControlError),

    #[error("Exclusion store error: {0}")]
    Store(#[from] StoreError),
}

impl From<SelectError> for SessionError {
    fn from(err: SelectError) -> Self {
        match err {
            SelectError::EmptyCatalog => SessionError::EmptyCatalog,
            SelectError::ExhaustedProposals(_) => SessionError::ExhaustedProposals,
            SelectError::Store(e) => SessionError::Store(e),
        }
    }
}

/// A connected session and whether its exit IP was never seen before
#[derive(Debug, Clone, Serialize)]
pub struct SessionResult {
    pub consumer_id: ConsumerId,
    pub proposal: Proposal,
    pub exit_ip: IpAddr,
    pub is_novel_ip: bool,
    /// Reselections needed before the daemon connected
    pub retry_count: u32,
}

/// Orchestrates one session acquisition at a time
pub struct SessionManager {
    control: Arc<dyn ControlPlane>,
    source: Arc<dyn ProposalSource>,
    controller: ConnectionController,
    guard: SessionUniquenessGuard,
    catalog: ProposalCatalog,
    snapshot_path: Option<PathBuf>,
}

impl SessionManager {
    /// Create a manager from its collaborators
    pub fn new(
        control: Arc<dyn ControlPlane>,
        source: Arc<dyn ProposalSource>,
        providers: Arc<dyn ExclusionStore>,
        ips: Arc<dyn ExclusionStore>,
        selector: ProposalSelector,
        max_retries: u32,
    ) -> Self {
        let controller = ConnectionController::new(control.clone(), providers, selector, max_retries);
        let guard = SessionUniquenessGuard::new(control.clone(), ips);

        Self {
            control,
            source,
            controller,
            guard,
            catalog: ProposalCatalog::new(),
            snapshot_path: None,
        }
    }

    /// Wire the HTTP daemon client, the discovery client and the
    /// file-backed exclusion stores described by `config`
    pub async fn from_config(config: &RotorConfig) -> Result<Self, SessionError> {
        config.validate()?;

        let http = HttpClient::new(config.http_config());
        let control = Arc::new(HttpControlPlane::new(http.clone(), &config.daemon_uri));
        let source = Arc::new(DiscoveryClient::new(http, config.discovery_url.clone()));
        let providers =
            Arc::new(FileExclusionStore::open(ExclusionSet::Providers, config.provider_path()).await?);
        let ips = Arc::new(FileExclusionStore::open(ExclusionSet::Ips, config.ip_path()).await?);

        info!(
            "Session manager ready (daemon: {}, state: {})",
            config.daemon_uri,
            config.state_dir.display()
        );

        Ok(Self::new(
            control,
            source,
            providers,
            ips,
            ProposalSelector::new(),
            config.max_retries,
        )
        .with_snapshot(config.snapshot_path()))
    }

    /// Write a catalog snapshot to `path` after every refresh
    pub fn with_snapshot(mut self, path: Option<PathBuf>) -> Self {
        self.snapshot_path = path;
        self
    }

    /// Current catalog
    pub fn catalog(&self) -> &ProposalCatalog {
        &self.catalog
    }

    /// Negotiation state machine (for inspection)
    pub fn controller(&self) -> &ConnectionController {
        &self.controller
    }

    /// Replace the catalog with the latest discovery listing and write
    /// the snapshot. Returns the number of proposals.
    pub async fn refresh_catalog(&mut self) -> Result<usize, SessionError> {
        self.catalog.refresh(self.source.as_ref()).await?;
        if let Some(path) = &self.snapshot_path {
            self.catalog.write_snapshot(path).await;
        }
        Ok(self.catalog.len())
    }

    /// Consumer identity the daemon connects as
    pub async fn consumer_id(&self) -> Result<ConsumerId, SessionError> {
        self.control
            .consumer_id()
            .await
            .map_err(SessionError::ConsumerIdUnavailable)
    }

    /// Current daemon connection status
    pub async fn status(&self) -> Result<ConnectionStatus, SessionError> {
        Ok(self.control.connection_status().await?)
    }

    /// Obtain a connected session and report whether its exit IP is new.
    ///
    /// The session is left up either way; keeping or releasing it is the
    /// caller's decision.
    pub async fn acquire_unique_session(&mut self) -> Result<SessionResult, SessionError> {
        self.refresh_catalog().await?;
        if self.catalog.is_empty() {
            error!("Discovery returned no proposals");
            return Err(SessionError::EmptyCatalog);
        }

        let consumer = self.consumer_id().await?;
        let session = self.controller.negotiate(&self.catalog, &consumer).await?;
        let check = self.guard.check(&session).await?;

        Ok(SessionResult {
            consumer_id: session.consumer_id,
            proposal: session.proposal,
            exit_ip: check.exit_ip,
            is_novel_ip: check.is_novel,
            retry_count: session.retry_count,
        })
    }

    /// Tear down the current session (best effort)
    pub async fn release(&self, consumer: &ConsumerId) {
        info!("Releasing session for consumer {}", consumer);
        self.control.disconnect(consumer).await;
    }
}
