//! Connection Controller
//!
//! Turns a selected proposal into a confirmed `Connected` session.
//!
//! # Negotiation
//!
//! ```text
//! Idle ─▶ Selecting ─▶ Attempting(r) ──connected──▶ Connected
//!              ▲            │
//!              │            ├─ err_connect ───────────────┐
//!              │            ├─ err_connection_already_exists ─ disconnect ─┐
//!              └────────────┴──────────────── r + 1 ◀─────┴───────────────┘
//!                           │
//!                           └─ anything else / r > max ─▶ Failed
//! ```
//!
//! The retry counter is shared by both retryable codes. Running out of
//! providers while reselecting is reported separately from running out
//! of retries.

use crate::catalog::{Proposal, ProposalCatalog};
use crate::control::{ConnectOutcome, ConsumerId, ControlPlane, DaemonErrorCode};
use crate::exclusion::ExclusionStore;
use crate::selector::ProposalSelector;
use crate::session::SessionError;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Negotiation state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NegotiationState {
    /// Nothing in progress
    Idle,
    /// Drawing a proposal from the catalog
    Selecting,
    /// Connect request in flight for `provider_id`
    Attempting { provider_id: String, retry_count: u32 },
    /// Daemon confirmed the session
    Connected { provider_id: String, retry_count: u32 },
    /// Negotiation gave up
    Failed,
}

impl NegotiationState {
    /// Check if the negotiation ended
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            NegotiationState::Connected { .. } | NegotiationState::Failed
        )
    }
}

/// A proposal being tried, with the number of reselections so far
#[derive(Debug, Clone)]
pub struct ConnectionAttempt {
    pub proposal: Proposal,
    pub retry_count: u32,
}

/// Proof that the daemon reported `Connected` for `proposal`
#[derive(Debug, Clone)]
pub struct NegotiatedSession {
    pub consumer_id: ConsumerId,
    pub proposal: Proposal,
    pub retry_count: u32,
}

/// Drives selection and connect attempts against the daemon
pub struct ConnectionController {
    control: Arc<dyn ControlPlane>,
    providers: Arc<dyn ExclusionStore>,
    selector: ProposalSelector,
    max_retries: u32,
    state: NegotiationState,
    history: Vec<NegotiationState>,
}

impl ConnectionController {
    pub fn new(
        control: Arc<dyn ControlPlane>,
        providers: Arc<dyn ExclusionStore>,
        selector: ProposalSelector,
        max_retries: u32,
    ) -> Self {
        Self {
            control,
            providers,
            selector,
            max_retries,
            state: NegotiationState::Idle,
            history: vec![NegotiationState::Idle],
        }
    }

    /// Current state
    pub fn state(&self) -> &NegotiationState {
        &self.state
    }

    /// Every state entered since the last negotiation started
    pub fn history(&self) -> &[NegotiationState] {
        &self.history
    }

    fn transition(&mut self, next: NegotiationState) {
        self.history.push(next.clone());
        self.state = next;
    }

    fn fail(&mut self, err: SessionError) -> SessionError {
        error!("Negotiation failed: {}", err);
        self.transition(NegotiationState::Failed);
        err
    }

    /// Select a proposal from `catalog` and negotiate until the daemon
    /// reports `Connected` or a terminal condition is hit.
    pub async fn negotiate(
        &mut self,
        catalog: &ProposalCatalog,
        consumer: &ConsumerId,
    ) -> Result<NegotiatedSession, SessionError> {
        self.history = vec![NegotiationState::Idle];
        self.state = NegotiationState::Idle;

        let proposal = self.select(catalog).await?;
        let mut attempt = ConnectionAttempt {
            proposal,
            retry_count: 0,
        };

        loop {
            let provider_id = attempt.proposal.provider_id.clone();
            self.transition(NegotiationState::Attempting {
                provider_id: provider_id.clone(),
                retry_count: attempt.retry_count,
            });
            info!("[{}] Connecting to proposal: {}", attempt.retry_count, provider_id);

            // Never layer a new connection over an existing one
            let status = match self.control.connection_status().await {
                Ok(status) => status,
                Err(e) => return Err(self.fail(e.into())),
            };
            info!("Current connection status: {}", status);
            if status.is_connected() {
                info!("Already connected, stopping connection");
                self.control.disconnect(consumer).await;
            }

            let outcome = match self.control.connect(consumer, &provider_id).await {
                Ok(outcome) => outcome,
                Err(e) => return Err(self.fail(e.into())),
            };

            match outcome {
                ConnectOutcome::Connected => {
                    info!("Connected to proposal: {}", provider_id);
                    self.transition(NegotiationState::Connected {
                        provider_id,
                        retry_count: attempt.retry_count,
                    });
                    return Ok(NegotiatedSession {
                        consumer_id: consumer.clone(),
                        proposal: attempt.proposal,
                        retry_count: attempt.retry_count,
                    });
                }
                ConnectOutcome::Rejected(DaemonErrorCode::ConnectFailed) => {
                    warn!("Forbidden to connect: {}", provider_id);
                }
                ConnectOutcome::Rejected(DaemonErrorCode::ConnectionExists) => {
                    warn!("Connection already exists: {}", provider_id);
                    self.control.disconnect(consumer).await;
                }
                ConnectOutcome::Rejected(code @ DaemonErrorCode::Other(_)) => {
                    return Err(self.fail(SessionError::UnexpectedStatus(code.to_string())));
                }
                ConnectOutcome::Status(status) => {
                    return Err(self.fail(SessionError::UnexpectedStatus(status.to_string())));
                }
            }

            // Checked before drawing so an over-budget retry burns no provider
            let retry_count = attempt.retry_count + 1;
            if retry_count > self.max_retries {
                return Err(self.fail(SessionError::MaxRetriesExceeded {
                    max_retries: self.max_retries,
                }));
            }
            attempt = ConnectionAttempt {
                proposal: self.select(catalog).await?,
                retry_count,
            };
        }
    }

    async fn select(&mut self, catalog: &ProposalCatalog) -> Result<Proposal, SessionError> {
        self.transition(NegotiationState::Selecting);
        match self.selector.select(catalog, self.providers.as_ref()).await {
            Ok(proposal) => Ok(proposal),
            Err(e) => Err(self.fail(e.into())),
        }
    }
}
