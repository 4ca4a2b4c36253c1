//! Session Uniqueness Guard
//!
//! Checks the exit IP of a freshly negotiated session against every exit
//! IP seen before. Only a [`NegotiatedSession`] can be checked, so a
//! failed attempt can never register an IP.

use crate::control::ControlPlane;
use crate::controller::NegotiatedSession;
use crate::exclusion::ExclusionStore;
use crate::session::SessionError;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{info, warn};

/// Outcome of an exit IP check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpCheck {
    pub exit_ip: IpAddr,
    /// `false` when the IP was used by an earlier session
    pub is_novel: bool,
}

pub struct SessionUniquenessGuard {
    control: Arc<dyn ControlPlane>,
    ips: Arc<dyn ExclusionStore>,
}

impl SessionUniquenessGuard {
    pub fn new(control: Arc<dyn ControlPlane>, ips: Arc<dyn ExclusionStore>) -> Self {
        Self { control, ips }
    }

    /// Fetch the session's exit IP and record it if it is new.
    ///
    /// A reused IP is only reported; tearing the session down is up to
    /// the caller.
    pub async fn check(&self, session: &NegotiatedSession) -> Result<IpCheck, SessionError> {
        let exit_ip = self
            .control
            .proxy_ip()
            .await
            .map_err(SessionError::ExitIpUnavailable)?;
        info!("Connected IP: {} (provider {})", exit_ip, session.proposal.provider_id);

        let key = exit_ip.to_string();
        if self.ips.contains(&key).await? {
            warn!("IP already exists: {}", exit_ip);
            return Ok(IpCheck {
                exit_ip,
                is_novel: false,
            });
        }

        self.ips.add(&key).await?;
        Ok(IpCheck {
            exit_ip,
            is_novel: true,
        })
    }
}
