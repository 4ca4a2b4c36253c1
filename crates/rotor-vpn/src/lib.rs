//! Rotor VPN - Rotating, de-duplicated egress sessions
//!
//! Drives a locally running VPN control daemon to connect through a
//! provider that was never used before, and reports whether the
//! resulting exit IP is new.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        SessionManager                        │
//! │                                                              │
//! │  ┌───────────┐   ┌──────────┐   ┌─────────────────────────┐  │
//! │  │ Discovery │──▶│ Catalog  │──▶│  ConnectionController   │  │
//! │  │  (HTTPS)  │   │ (value)  │   │ select ▸ connect ▸ retry │  │
//! │  └───────────┘   └──────────┘   └────────────┬────────────┘  │
//! │                                   providers  │  ▲            │
//! │                              ┌───────────────┘  │            │
//! │                              ▼                  ▼            │
//! │                     ┌────────────────┐  ┌──────────────┐     │
//! │                     │ ExclusionStore │  │ ControlPlane │     │
//! │                     │ provider / ip  │  │   (daemon)   │     │
//! │                     └────────────────┘  └──────────────┘     │
//! │                              ▲                  ▲            │
//! │                              └──── Uniqueness ──┘            │
//! │                                      Guard                   │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Guarantees
//!
//! - A provider is never selected twice for one provider store
//! - Negotiation retries are bounded by `max_retries`
//! - Exit IPs are recorded only after the daemon confirms `Connected`

mod catalog;
mod config;
mod control;
mod controller;
mod discovery;
mod exclusion;
mod guard;
mod selector;
mod session;

#[cfg(test)]
mod mock;

pub use catalog::{Proposal, ProposalCatalog};
pub use config::{ConfigError, RotorConfig, DEFAULT_DAEMON_URI, DEFAULT_DISCOVERY_URL};
pub use control::{
    ConnectOutcome, ConnectionStatus, ConsumerId, ControlError, ControlPlane, DaemonErrorCode,
    HttpControlPlane,
};
pub use controller::{
    ConnectionAttempt, ConnectionController, NegotiatedSession, NegotiationState,
};
pub use discovery::{DiscoveryClient, DiscoveryError, ProposalSource};
pub use exclusion::{
    ExclusionSet, ExclusionStore, FileExclusionStore, MemoryExclusionStore, StoreError,
};
pub use guard::{IpCheck, SessionUniquenessGuard};
pub use selector::{ProposalSelector, SelectError};
pub use session::{SessionError, SessionManager, SessionResult};
