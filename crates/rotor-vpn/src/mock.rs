//! Scripted test doubles for the daemon, the discovery service and
//! the exclusion stores.

use crate::catalog::Proposal;
use crate::control::{
    ConnectOutcome, ConnectionStatus, ConsumerId, ControlError, ControlPlane,
};
use crate::discovery::{DiscoveryError, ProposalSource};
use crate::exclusion::{ExclusionSet, ExclusionStore, MemoryExclusionStore, StoreError};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::io;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Mutex;

/// A daemon request as seen by the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    ConsumerId,
    Status,
    Connect(String),
    Disconnect,
    ProxyIp,
}

struct Inner {
    calls: Vec<Call>,
    consumer: Option<ConsumerId>,
    status: ConnectionStatus,
    per_provider: HashMap<String, ConnectOutcome>,
    queue: VecDeque<ConnectOutcome>,
    default_connect: ConnectOutcome,
    proxy_ip: Option<IpAddr>,
    status_fails: bool,
    connect_fails: bool,
}

/// In-memory daemon. Connect outcomes are resolved per provider first,
/// then from the queue, then from the default (`Connected`).
pub struct MockControlPlane {
    inner: Mutex<Inner>,
}

impl MockControlPlane {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                calls: Vec::new(),
                consumer: Some(ConsumerId::new("0xconsumer")),
                status: ConnectionStatus::NotConnected,
                per_provider: HashMap::new(),
                queue: VecDeque::new(),
                default_connect: ConnectOutcome::Connected,
                proxy_ip: Some(IpAddr::from([10, 8, 0, 1])),
                status_fails: false,
                connect_fails: false,
            }),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut Inner) -> R) -> R {
        f(&mut self.inner.lock().unwrap())
    }

    pub fn set_consumer(&self, consumer: Option<ConsumerId>) {
        self.with(|i| i.consumer = consumer);
    }

    pub fn set_status(&self, status: ConnectionStatus) {
        self.with(|i| i.status = status);
    }

    pub fn push_connect(&self, outcome: ConnectOutcome) {
        self.with(|i| i.queue.push_back(outcome));
    }

    pub fn script_provider(&self, provider_id: &str, outcome: ConnectOutcome) {
        self.with(|i| {
            i.per_provider.insert(provider_id.to_string(), outcome);
        });
    }

    pub fn set_default_connect(&self, outcome: ConnectOutcome) {
        self.with(|i| i.default_connect = outcome);
    }

    pub fn set_proxy_ip(&self, ip: Option<IpAddr>) {
        self.with(|i| i.proxy_ip = ip);
    }

    /// Make `connection_status` fail as if the daemon were unreachable
    pub fn fail_status(&self) {
        self.with(|i| i.status_fails = true);
    }

    /// Make `connect` fail as if the daemon were unreachable
    pub fn fail_connect(&self) {
        self.with(|i| i.connect_fails = true);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.with(|i| i.calls.clone())
    }

    /// Providers passed to `connect`, in order
    pub fn connected_providers(&self) -> Vec<String> {
        self.with(|i| {
            i.calls
                .iter()
                .filter_map(|c| match c {
                    Call::Connect(p) => Some(p.clone()),
                    _ => None,
                })
                .collect()
        })
    }

    pub fn disconnect_count(&self) -> usize {
        self.with(|i| i.calls.iter().filter(|c| **c == Call::Disconnect).count())
    }
}

#[async_trait]
impl ControlPlane for MockControlPlane {
    async fn consumer_id(&self) -> Result<ConsumerId, ControlError> {
        self.with(|i| {
            i.calls.push(Call::ConsumerId);
            i.consumer.clone().ok_or(ControlError::MissingConsumerId)
        })
    }

    async fn connection_status(&self) -> Result<ConnectionStatus, ControlError> {
        self.with(|i| {
            i.calls.push(Call::Status);
            if i.status_fails {
                return Err(ControlError::Status(503));
            }
            Ok(i.status.clone())
        })
    }

    async fn connect(
        &self,
        _consumer: &ConsumerId,
        provider_id: &str,
    ) -> Result<ConnectOutcome, ControlError> {
        self.with(|i| {
            i.calls.push(Call::Connect(provider_id.to_string()));
            if i.connect_fails {
                return Err(ControlError::Status(503));
            }
            let outcome = match i.per_provider.get(provider_id) {
                Some(outcome) => outcome.clone(),
                None => i
                    .queue
                    .pop_front()
                    .unwrap_or_else(|| i.default_connect.clone()),
            };
            if outcome == ConnectOutcome::Connected {
                i.status = ConnectionStatus::Connected;
            }
            Ok(outcome)
        })
    }

    async fn disconnect(&self, _consumer: &ConsumerId) {
        self.with(|i| {
            i.calls.push(Call::Disconnect);
            i.status = ConnectionStatus::NotConnected;
        });
    }

    async fn proxy_ip(&self) -> Result<IpAddr, ControlError> {
        self.with(|i| {
            i.calls.push(Call::ProxyIp);
            i.proxy_ip
                .ok_or_else(|| ControlError::ProxyIpUnavailable("no session".to_string()))
        })
    }
}

/// Store whose appends fail with an I/O error; reads go to the inner store
pub struct ReadOnlyStore {
    inner: MemoryExclusionStore,
}

impl ReadOnlyStore {
    pub fn new(inner: MemoryExclusionStore) -> Self {
        Self { inner }
    }

    pub async fn entries(&self) -> Vec<String> {
        self.inner.entries().await
    }
}

#[async_trait]
impl ExclusionStore for ReadOnlyStore {
    fn set(&self) -> ExclusionSet {
        self.inner.set()
    }

    async fn contains(&self, id: &str) -> Result<bool, StoreError> {
        self.inner.contains(id).await
    }

    async fn add(&self, _id: &str) -> Result<(), StoreError> {
        Err(StoreError::Io {
            set: self.inner.set(),
            path: PathBuf::from("read-only"),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "read-only store"),
        })
    }

    async fn load(&self) -> Result<HashSet<String>, StoreError> {
        self.inner.load().await
    }
}

/// Discovery stand-in returning a fixed listing
pub struct StaticProposalSource {
    proposals: Option<Vec<Proposal>>,
}

impl StaticProposalSource {
    pub fn new(proposals: Vec<Proposal>) -> Self {
        Self {
            proposals: Some(proposals),
        }
    }

    pub fn failing() -> Self {
        Self { proposals: None }
    }
}

#[async_trait]
impl ProposalSource for StaticProposalSource {
    async fn fetch_proposals(&self) -> Result<Vec<Proposal>, DiscoveryError> {
        self.proposals
            .clone()
            .ok_or(DiscoveryError::Status(503))
    }
}
