//! Point-in-time view of the daemon used to build one menu generation.

use client_core::LocalClient;
use shared::protocol::{LoginProfile, Status};
use tracing::warn;

/// Daemon state captured for a rebuild. Any part may be missing if its fetch failed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateSnapshot {
    pub status: Option<Status>,
    pub current_profile: Option<LoginProfile>,
    pub profiles: Vec<LoginProfile>,
}

impl StateSnapshot {
    pub fn self_title(&self) -> Option<String> {
        let peer = self.status.as_ref()?.self_peer.as_ref()?;
        let ip = peer
            .first_ip()
            .map(|ip| ip.to_string())
            .unwrap_or_default();
        Some(format!("This Device: {} ({ip})", peer.host_name))
    }
}

/// Pulls status and profiles. Failures are logged and leave the matching field empty.
pub async fn fetch_snapshot(client: &dyn LocalClient) -> StateSnapshot {
    let status = match client.status().await {
        Ok(status) => Some(status),
        Err(err) => {
            warn!(error = %format!("{err:#}"), "failed to fetch status");
            None
        }
    };

    let (current_profile, profiles) = match client.profile_status().await {
        Ok((current, all)) => (Some(current), all),
        Err(err) => {
            warn!(error = %format!("{err:#}"), "failed to fetch profiles");
            (None, Vec::new())
        }
    };

    StateSnapshot {
        status,
        current_profile,
        profiles,
    }
}

#[cfg(test)]
#[path = "tests/snapshot_tests.rs"]
mod tests;
