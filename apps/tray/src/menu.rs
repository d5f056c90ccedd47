//! Builds the tray menu from a daemon snapshot, one generation per rebuild.

use std::sync::Arc;

use client_core::LocalClient;
use shared::{
    domain::ProfileId,
    protocol::{LoginProfile, Status},
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::{
    generation::Generation,
    icons::RemoteIcons,
    snapshot::{fetch_snapshot, StateSnapshot},
    taxonomy::{build_exit_node_plan, Capabilities, ExitNodeTarget, PlanEntry},
    toolkit::{ItemId, ItemSpec, MenuToolkit, RenderedItem},
};

pub const CONNECT_TITLE: &str = "Connect";
pub const CONNECTED_TITLE: &str = "Connected";
pub const DISCONNECT_TITLE: &str = "Disconnect";
pub const ACCOUNT_TITLE: &str = "Account";
pub const EXIT_NODES_TITLE: &str = "Exit Nodes";
pub const SETTINGS_TITLE: &str = "More settings";
pub const QUIT_TITLE: &str = "Quit";

/// Everything the event loop listens to for the menu currently on screen.
pub struct BuiltMenu {
    pub generation: Generation,
    pub snapshot: StateSnapshot,
    pub connect: RenderedItem,
    pub disconnect: RenderedItem,
    pub self_item: Option<RenderedItem>,
    pub settings: RenderedItem,
    pub quit: RenderedItem,
    pub profiles: mpsc::Receiver<ProfileId>,
    pub exit_nodes: mpsc::Receiver<ExitNodeTarget>,
}

pub struct MenuManager {
    toolkit: Box<dyn MenuToolkit>,
    client: Arc<dyn LocalClient>,
    icons: RemoteIcons,
    next_generation: u64,
}

impl MenuManager {
    pub fn new(
        toolkit: Box<dyn MenuToolkit>,
        client: Arc<dyn LocalClient>,
        icons: RemoteIcons,
    ) -> Self {
        Self {
            toolkit,
            client,
            icons,
            next_generation: 1,
        }
    }

    pub fn toolkit(&mut self) -> &mut dyn MenuToolkit {
        self.toolkit.as_mut()
    }

    /// Fetches a fresh snapshot, retires `previous` and builds the new menu.
    pub async fn rebuild(&mut self, previous: Option<&mut BuiltMenu>) -> BuiltMenu {
        let snapshot = fetch_snapshot(self.client.as_ref()).await;

        let generation = Generation::new(self.next_generation);
        self.next_generation += 1;
        if let Some(previous) = previous {
            previous.generation.retire().await;
        }

        let menu = self.build(generation, snapshot).await;
        info!(
            generation = menu.generation.id(),
            listeners = menu.generation.live_tasks(),
            "menu rebuilt"
        );
        menu
    }

    async fn build(&mut self, mut generation: Generation, snapshot: StateSnapshot) -> BuiltMenu {
        self.toolkit.reset();

        let connect = self.toolkit.add_item(None, ItemSpec::action(CONNECT_TITLE));
        let disconnect = self
            .toolkit
            .add_item(None, ItemSpec::action(DISCONNECT_TITLE).hidden());
        self.toolkit.add_separator(None);

        let (profile_tx, profiles) = mpsc::channel(1);
        self.add_accounts(&mut generation, &snapshot, profile_tx).await;

        let self_item = snapshot
            .self_title()
            .map(|title| self.toolkit.add_item(None, ItemSpec::action(title)));
        self.toolkit.add_separator(None);

        let (exit_node_tx, exit_nodes) = mpsc::channel(1);
        self.add_exit_nodes(&mut generation, snapshot.status.as_ref(), exit_node_tx)
            .await;

        let settings = self.toolkit.add_item(None, ItemSpec::action(SETTINGS_TITLE));
        let quit = self.toolkit.add_item(None, ItemSpec::action(QUIT_TITLE));

        BuiltMenu {
            generation,
            snapshot,
            connect,
            disconnect,
            self_item,
            settings,
            quit,
            profiles,
            exit_nodes,
        }
    }

    async fn add_accounts(
        &mut self,
        generation: &mut Generation,
        snapshot: &StateSnapshot,
        tx: mpsc::Sender<ProfileId>,
    ) {
        let current = snapshot.current_profile.as_ref();
        let title = current
            .map(LoginProfile::title)
            .filter(|title| !title.is_empty())
            .unwrap_or_else(|| ACCOUNT_TITLE.to_string());
        let accounts = self.toolkit.add_item(None, ItemSpec::action(title));
        if let Some(current) = current {
            self.set_remote_icon(accounts.id, &current.user_profile.profile_pic_url)
                .await;
        }

        for profile in &snapshot.profiles {
            let spec = if current.is_some_and(|current| current.id == profile.id) {
                ItemSpec::checkbox(profile.title(), true)
            } else {
                ItemSpec::action(profile.title())
            };
            let item = self.toolkit.add_item(Some(accounts.id), spec);
            self.set_remote_icon(item.id, &profile.user_profile.profile_pic_url)
                .await;
            generation.forward_clicks(item.clicks, tx.clone(), profile.id.clone());
        }
    }

    async fn add_exit_nodes(
        &mut self,
        generation: &mut Generation,
        status: Option<&Status>,
        tx: mpsc::Sender<ExitNodeTarget>,
    ) {
        let fallback = Status::default();
        let status = status.unwrap_or(&fallback);
        let exit_nodes = self.toolkit.add_item(None, ItemSpec::action(EXIT_NODES_TITLE));

        let suggestion = if Capabilities::of(status).suggest_exit_node {
            match self.client.suggest_exit_node().await {
                Ok(suggestion) => Some(suggestion),
                Err(err) => {
                    warn!(error = %format!("{err:#}"), "no exit node suggestion");
                    None
                }
            }
        } else {
            None
        };

        let plan = build_exit_node_plan(status, suggestion.as_ref());
        self.render_plan(generation, exit_nodes.id, &plan, &tx);
    }

    fn render_plan(
        &mut self,
        generation: &mut Generation,
        parent: ItemId,
        entries: &[PlanEntry],
        tx: &mpsc::Sender<ExitNodeTarget>,
    ) {
        for entry in entries {
            match entry {
                PlanEntry::Separator => self.toolkit.add_separator(Some(parent)),
                PlanEntry::Header(title) => {
                    self.toolkit
                        .add_item(Some(parent), ItemSpec::action(title.clone()).enabled(false));
                }
                PlanEntry::Toggle(toggle) => {
                    let item = self.toolkit.add_item(
                        Some(parent),
                        ItemSpec::checkbox(toggle.title.clone(), toggle.checked)
                            .enabled(toggle.enabled),
                    );
                    // Disabled entries cannot be clicked, so they get no listener.
                    if toggle.enabled {
                        generation.forward_clicks(item.clicks, tx.clone(), toggle.target.clone());
                    }
                }
                PlanEntry::Submenu(submenu) => {
                    let item = self.toolkit.add_item(
                        Some(parent),
                        ItemSpec::checkbox(submenu.title.clone(), submenu.checked),
                    );
                    self.render_plan(generation, item.id, &submenu.entries, tx);
                }
            }
        }
    }

    async fn set_remote_icon(&mut self, item: ItemId, url: &str) {
        if let Some(icon) = self.icons.load(url).await {
            self.toolkit.set_icon(item, &icon);
        } else if !url.is_empty() {
            debug!(url, "menu item left without icon");
        }
    }
}

#[cfg(test)]
#[path = "tests/menu_tests.rs"]
mod tests;
