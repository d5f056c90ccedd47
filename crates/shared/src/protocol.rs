use std::{collections::BTreeMap, net::IpAddr};

use serde::{Deserialize, Serialize};

use crate::domain::{ConnectionState, ProfileId, StableNodeId};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Location {
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub country_code: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub city_code: String,
    #[serde(default)]
    pub priority: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PeerStatus {
    #[serde(rename = "ID")]
    pub id: StableNodeId,
    #[serde(default)]
    pub public_key: String,
    #[serde(default)]
    pub host_name: String,
    #[serde(rename = "DNSName", default)]
    pub dns_name: String,
    #[serde(rename = "TailscaleIPs", default)]
    pub tailscale_ips: Vec<IpAddr>,
    #[serde(default)]
    pub online: bool,
    #[serde(default)]
    pub exit_node_option: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub cap_map: BTreeMap<String, serde_json::Value>,
}

impl PeerStatus {
    /// First label of the peer's DNS name, falling back to its host name.
    pub fn short_name(&self) -> &str {
        match self.dns_name.split('.').next() {
            Some(label) if !label.is_empty() => label,
            _ => &self.host_name,
        }
    }

    pub fn first_ip(&self) -> Option<IpAddr> {
        self.tailscale_ips.first().copied()
    }

    pub fn has_capability(&self, capability: &str) -> bool {
        self.cap_map.contains_key(capability)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExitNodeStatus {
    #[serde(rename = "ID")]
    pub id: StableNodeId,
    #[serde(default)]
    pub online: bool,
    #[serde(rename = "TailscaleIPs", default)]
    pub tailscale_ips: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Status {
    #[serde(default)]
    pub backend_state: String,
    #[serde(rename = "Self", default)]
    pub self_peer: Option<PeerStatus>,
    /// Peers ordered by public key, the order the daemon keys them by.
    #[serde(default, with = "peer_map")]
    pub peer: Vec<PeerStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_node_status: Option<ExitNodeStatus>,
}

impl Status {
    pub fn active_exit_node(&self) -> Option<&StableNodeId> {
        self.exit_node_status.as_ref().map(|status| &status.id)
    }

    pub fn self_has_capability(&self, capability: &str) -> bool {
        self.self_peer
            .as_ref()
            .is_some_and(|peer| peer.has_capability(capability))
    }
}

mod peer_map {
    use std::collections::BTreeMap;

    use serde::{ser::SerializeMap, Deserialize, Deserializer, Serializer};

    use super::PeerStatus;

    pub fn serialize<S: Serializer>(
        peers: &[PeerStatus],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(peers.len()))?;
        for peer in peers {
            map.serialize_entry(&peer.public_key, peer)?;
        }
        map.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<PeerStatus>, D::Error> {
        let peers = Option::<BTreeMap<String, PeerStatus>>::deserialize(deserializer)?;
        Ok(peers
            .unwrap_or_default()
            .into_iter()
            .map(|(key, mut peer)| {
                if peer.public_key.is_empty() {
                    peer.public_key = key;
                }
                peer
            })
            .collect())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NetworkProfile {
    #[serde(default)]
    pub domain_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UserProfile {
    #[serde(default)]
    pub login_name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(rename = "ProfilePicURL", default)]
    pub profile_pic_url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LoginProfile {
    #[serde(rename = "ID")]
    pub id: ProfileId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub network_profile: NetworkProfile,
    #[serde(default)]
    pub user_profile: UserProfile,
}

impl LoginProfile {
    /// Menu title: profile name, with the tailnet domain on a second line.
    pub fn title(&self) -> String {
        let mut title = self.name.clone();
        if !self.network_profile.domain_name.is_empty() {
            title.push('\n');
            title.push_str(&self.network_profile.domain_name);
        }
        title
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Prefs {
    #[serde(default)]
    pub want_running: bool,
    #[serde(rename = "ExitNodeID", default)]
    pub exit_node_id: StableNodeId,
}

/// Partial preference update; only fields whose `*_set` flag is true apply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MaskedPrefs {
    #[serde(flatten)]
    pub prefs: Prefs,
    #[serde(default)]
    pub want_running_set: bool,
    #[serde(rename = "ExitNodeIDSet", default)]
    pub exit_node_id_set: bool,
}

impl MaskedPrefs {
    pub fn want_running(want_running: bool) -> Self {
        Self {
            prefs: Prefs {
                want_running,
                ..Prefs::default()
            },
            want_running_set: true,
            ..Self::default()
        }
    }

    pub fn exit_node(id: StableNodeId) -> Self {
        Self {
            prefs: Prefs {
                exit_node_id: id,
                ..Prefs::default()
            },
            exit_node_id_set: true,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExitNodeSuggestion {
    #[serde(rename = "ID")]
    pub id: StableNodeId,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

/// One message on the daemon's notification bus.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Notify {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<ConnectionState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub err_message: Option<String>,
}
