//! The single loop that owns the menu and talks to the daemon.
//!
//! Each iteration waits for exactly one event and finishes handling it before
//! the next one is taken, so daemon commands and menu changes never overlap.

use std::sync::Arc;

use client_core::LocalClient;
use shared::{
    domain::{ConnectionState, ProfileId},
    protocol::MaskedPrefs,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::{
    cancel::CancelToken,
    controller::events::{ExitReason, TrayEvent},
    desktop::Desktop,
    menu::{BuiltMenu, MenuManager, CONNECTED_TITLE, CONNECT_TITLE},
    taxonomy::ExitNodeTarget,
    toolkit::{AppIcon, RenderedItem},
};

pub struct Tray {
    client: Arc<dyn LocalClient>,
    desktop: Arc<dyn Desktop>,
    menu: MenuManager,
    current: BuiltMenu,
    states: mpsc::Receiver<ConnectionState>,
    lifetime: CancelToken,
    settings_url: String,
    connection: Option<ConnectionState>,
}

impl Tray {
    /// Builds the first menu and returns a loop ready to run.
    pub async fn start(
        mut menu: MenuManager,
        client: Arc<dyn LocalClient>,
        desktop: Arc<dyn Desktop>,
        states: mpsc::Receiver<ConnectionState>,
        lifetime: CancelToken,
        settings_url: String,
    ) -> Self {
        let current = menu.rebuild(None).await;
        menu.toolkit().set_app_icon(AppIcon::Disconnected);
        Self {
            client,
            desktop,
            menu,
            current,
            states,
            lifetime,
            settings_url,
            connection: None,
        }
    }

    pub async fn run(mut self) -> ExitReason {
        loop {
            let event = self.next_event().await;
            debug!(event = event.name(), generation = self.current.generation.id(), "tray event");
            if let Some(reason) = self.handle(event).await {
                self.current.generation.retire().await;
                info!(?reason, "tray event loop finished");
                return reason;
            }
        }
    }

    async fn next_event(&mut self) -> TrayEvent {
        let menu = &mut self.current;
        tokio::select! {
            biased;
            _ = self.lifetime.cancelled() => TrayEvent::Shutdown,
            state = self.states.recv() => state.map_or(TrayEvent::StreamClosed, TrayEvent::State),
            Some(()) = menu.connect.clicks.recv() => TrayEvent::Connect,
            Some(()) = menu.disconnect.clicks.recv() => TrayEvent::Disconnect,
            Some(()) = clicked(&mut menu.self_item) => TrayEvent::CopySelfAddress,
            Some(()) = menu.settings.clicks.recv() => TrayEvent::OpenSettings,
            Some(()) = menu.quit.clicks.recv() => TrayEvent::Quit,
            Some(id) = menu.profiles.recv() => TrayEvent::SwitchProfile(id),
            Some(target) = menu.exit_nodes.recv() => TrayEvent::SelectExitNode(target),
        }
    }

    /// Handles one event. Returns a reason when the loop should stop.
    pub async fn handle(&mut self, event: TrayEvent) -> Option<ExitReason> {
        match event {
            TrayEvent::State(state) => self.apply_state(state).await,
            TrayEvent::Connect => self.set_want_running(true).await,
            TrayEvent::Disconnect => self.set_want_running(false).await,
            TrayEvent::CopySelfAddress => self.copy_self_address().await,
            TrayEvent::OpenSettings => {
                if let Err(err) = self.desktop.open_url(&self.settings_url).await {
                    warn!(
                        url = %self.settings_url,
                        error = %format!("{err:#}"),
                        "failed to open settings"
                    );
                }
            }
            TrayEvent::SwitchProfile(id) => self.switch_profile(&id).await,
            TrayEvent::SelectExitNode(target) => {
                self.select_exit_node(&target).await;
                self.rebuild().await;
                self.show_connection();
            }
            TrayEvent::Quit => {
                self.menu.toolkit().quit();
                return Some(ExitReason::Quit);
            }
            TrayEvent::Shutdown => return Some(ExitReason::Shutdown),
            TrayEvent::StreamClosed => return Some(ExitReason::StreamClosed),
        }
        None
    }

    async fn apply_state(&mut self, state: ConnectionState) {
        self.connection = Some(state);
        match state {
            ConnectionState::Running => {
                self.menu.toolkit().set_app_icon(AppIcon::Loading);
                self.rebuild().await;
                self.menu.toolkit().set_app_icon(AppIcon::Connected);
                self.show_connection();
            }
            ConnectionState::NoState | ConnectionState::Stopped => {
                self.show_connection();
                self.menu.toolkit().set_app_icon(AppIcon::Disconnected);
            }
            ConnectionState::Starting => self.menu.toolkit().set_app_icon(AppIcon::Loading),
            other => debug!(state = %other, "no menu change for state"),
        }
    }

    /// Points connect and disconnect at the last known connection state.
    fn show_connection(&mut self) {
        let (connect, disconnect) = (self.current.connect.id, self.current.disconnect.id);
        let toolkit = self.menu.toolkit();
        match self.connection {
            Some(ConnectionState::Running) => {
                toolkit.set_title(connect, CONNECTED_TITLE);
                toolkit.set_enabled(connect, false);
                toolkit.set_visible(disconnect, true);
                toolkit.set_enabled(disconnect, true);
            }
            Some(ConnectionState::NoState | ConnectionState::Stopped) => {
                toolkit.set_title(connect, CONNECT_TITLE);
                toolkit.set_enabled(connect, true);
                toolkit.set_visible(disconnect, false);
            }
            _ => {}
        }
    }

    async fn rebuild(&mut self) {
        let fresh = self.menu.rebuild(Some(&mut self.current)).await;
        self.current = fresh;
    }

    async fn set_want_running(&self, want_running: bool) {
        if let Err(err) = self.client.edit_prefs(&MaskedPrefs::want_running(want_running)).await {
            warn!(want_running, error = %format!("{err:#}"), "failed to update prefs");
        }
    }

    async fn switch_profile(&self, id: &ProfileId) {
        info!(profile = %id, "switching profile");
        if let Err(err) = self.client.switch_profile(id).await {
            warn!(profile = %id, error = %format!("{err:#}"), "failed switching profile");
        }
    }

    async fn select_exit_node(&self, target: &ExitNodeTarget) {
        let result = match target {
            ExitNodeTarget::Clear => {
                info!("disable exit node");
                self.client.set_use_exit_node(false).await
            }
            ExitNodeTarget::Node(id) => {
                info!(exit_node = %id, "enable exit node");
                self.client
                    .edit_prefs(&MaskedPrefs::exit_node(id.clone()))
                    .await
                    .map(|_| ())
            }
        };
        if let Err(err) = result {
            warn!(?target, error = %format!("{err:#}"), "failed setting exit node");
        }
    }

    async fn copy_self_address(&self) {
        let Some(peer) = self
            .current
            .snapshot
            .status
            .as_ref()
            .and_then(|status| status.self_peer.as_ref())
        else {
            return;
        };
        let Some(ip) = peer.first_ip() else {
            debug!("local node has no address to copy");
            return;
        };
        let ip = ip.to_string();

        if let Err(err) = self.desktop.copy_to_clipboard(&ip).await {
            warn!(error = %format!("{err:#}"), "clipboard error");
        }
        let summary = format!("Copied Address for {}", peer.short_name());
        if let Err(err) = self.desktop.notify(&summary, &ip).await {
            warn!(error = %format!("{err:#}"), "failed to send notification");
        }
    }
}

async fn clicked(item: &mut Option<RenderedItem>) -> Option<()> {
    match item {
        Some(item) => item.clicks.recv().await,
        None => None,
    }
}

#[cfg(test)]
#[path = "../tests/event_loop_tests.rs"]
mod tests;
