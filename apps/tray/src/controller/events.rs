//! Everything the event loop can wake up for.

use shared::domain::{ConnectionState, ProfileId};

use crate::taxonomy::ExitNodeTarget;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrayEvent {
    State(ConnectionState),
    Connect,
    Disconnect,
    CopySelfAddress,
    OpenSettings,
    SwitchProfile(ProfileId),
    SelectExitNode(ExitNodeTarget),
    Quit,
    /// The process lifetime was cancelled.
    Shutdown,
    /// The stream watcher stopped producing states.
    StreamClosed,
}

impl TrayEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::State(_) => "state",
            Self::Connect => "connect",
            Self::Disconnect => "disconnect",
            Self::CopySelfAddress => "copy_self_address",
            Self::OpenSettings => "open_settings",
            Self::SwitchProfile(_) => "switch_profile",
            Self::SelectExitNode(_) => "select_exit_node",
            Self::Quit => "quit",
            Self::Shutdown => "shutdown",
            Self::StreamClosed => "stream_closed",
        }
    }
}

/// Why the event loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    Quit,
    Shutdown,
    StreamClosed,
}
