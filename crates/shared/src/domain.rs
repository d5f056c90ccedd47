use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn is_zero(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

id_newtype!(StableNodeId);
id_newtype!(ProfileId);

/// Node capability granting the "Recommended" exit node entry.
pub const CAP_SUGGEST_EXIT_NODE_UI: &str = "suggest-exit-node-ui";
/// Node capability granting access to location-tagged exit nodes.
pub const CAP_LOCATION_EXIT_NODES: &str = "mullvad";

/// Connection lifecycle reported by the daemon.
///
/// The daemon encodes the state as its ordinal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum ConnectionState {
    NoState,
    InUseOtherUser,
    NeedsLogin,
    NeedsMachineAuth,
    Stopped,
    Starting,
    Running,
}

impl TryFrom<u8> for ConnectionState {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => Self::NoState,
            1 => Self::InUseOtherUser,
            2 => Self::NeedsLogin,
            3 => Self::NeedsMachineAuth,
            4 => Self::Stopped,
            5 => Self::Starting,
            6 => Self::Running,
            other => return Err(format!("unknown connection state {other}")),
        })
    }
}

impl From<ConnectionState> for u8 {
    fn from(value: ConnectionState) -> Self {
        match value {
            ConnectionState::NoState => 0,
            ConnectionState::InUseOtherUser => 1,
            ConnectionState::NeedsLogin => 2,
            ConnectionState::NeedsMachineAuth => 3,
            ConnectionState::Stopped => 4,
            ConnectionState::Starting => 5,
            ConnectionState::Running => 6,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::NoState => "NoState",
            Self::InUseOtherUser => "InUseOtherUser",
            Self::NeedsLogin => "NeedsLogin",
            Self::NeedsMachineAuth => "NeedsMachineAuth",
            Self::Stopped => "Stopped",
            Self::Starting => "Starting",
            Self::Running => "Running",
        };
        f.write_str(label)
    }
}

/// Flags sent when subscribing to the daemon's notification bus.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchOptions {
    pub initial_state: bool,
    pub no_private_keys: bool,
}

impl WatchOptions {
    const INITIAL_STATE: u64 = 1 << 1;
    const NO_PRIVATE_KEYS: u64 = 1 << 4;

    pub fn mask(self) -> u64 {
        let mut mask = 0;
        if self.initial_state {
            mask |= Self::INITIAL_STATE;
        }
        if self.no_private_keys {
            mask |= Self::NO_PRIVATE_KEYS;
        }
        mask
    }
}
