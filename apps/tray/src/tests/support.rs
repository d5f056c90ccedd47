//! In-memory doubles for the daemon client, the desktop and the menu toolkit.

use std::{
    collections::VecDeque,
    net::IpAddr,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex, MutexGuard,
    },
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use client_core::{BusWatcher, LocalClient};
use shared::{
    domain::{ProfileId, StableNodeId, WatchOptions},
    protocol::{
        ExitNodeStatus, ExitNodeSuggestion, Location, LoginProfile, MaskedPrefs, NetworkProfile,
        Notify, PeerStatus, Prefs, Status, UserProfile,
    },
};
use tokio::{sync::mpsc, time::Instant};

use crate::{
    desktop::Desktop,
    icons::IconSource,
    toolkit::{AppIcon, ItemId, ItemSpec, MenuToolkit, RenderedItem},
};

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Status,
    ProfileStatus,
    EditPrefs(MaskedPrefs),
    SwitchProfile(ProfileId),
    SetUseExitNode(bool),
    SuggestExitNode,
    Watch(WatchOptions),
}

#[derive(Debug, Clone)]
pub enum Step {
    Notify(Notify),
    Fail(&'static str),
}

pub fn state_step(state: shared::domain::ConnectionState) -> Step {
    Step::Notify(Notify {
        state: Some(state),
        err_message: None,
    })
}

#[derive(Default)]
pub struct FakeDaemon {
    pub status: Option<Status>,
    pub current_profile: Option<LoginProfile>,
    pub profiles: Vec<LoginProfile>,
    pub suggestion: Option<ExitNodeSuggestion>,
    pub fail_commands: bool,
    pub calls: Vec<Call>,
    pub sessions: VecDeque<Vec<Step>>,
    pub watch_opened_at: Vec<Instant>,
    pub fail_watch: bool,
}

impl FakeDaemon {
    fn set_exit_node(&mut self, id: Option<StableNodeId>) {
        if let Some(status) = self.status.as_mut() {
            status.exit_node_status = id.map(|id| ExitNodeStatus {
                id,
                online: true,
                ..ExitNodeStatus::default()
            });
        }
    }
}

/// Scriptable daemon. Each `watch_ipn_bus` call consumes one scripted session.
#[derive(Default)]
pub struct FakeClient {
    daemon: Mutex<FakeDaemon>,
    pub next_calls: Arc<AtomicUsize>,
    pub closed: Arc<AtomicUsize>,
}

impl FakeClient {
    pub fn with_status(status: Status) -> Self {
        let client = Self::default();
        client.daemon().status = Some(status);
        client
    }

    pub fn daemon(&self) -> MutexGuard<'_, FakeDaemon> {
        guard(&self.daemon)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.daemon().calls.clone()
    }

    /// Calls that change daemon state.
    pub fn commands(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|call| {
                matches!(
                    call,
                    Call::EditPrefs(_) | Call::SwitchProfile(_) | Call::SetUseExitNode(_)
                )
            })
            .collect()
    }

    pub fn push_session(&self, steps: Vec<Step>) {
        self.daemon().sessions.push_back(steps);
    }

    fn record(&self, call: Call) -> bool {
        let mut daemon = self.daemon();
        daemon.calls.push(call);
        daemon.fail_commands
    }
}

#[async_trait]
impl LocalClient for FakeClient {
    async fn status(&self) -> Result<Status> {
        self.record(Call::Status);
        self.daemon()
            .status
            .clone()
            .ok_or_else(|| anyhow!("status unavailable"))
    }

    async fn profile_status(&self) -> Result<(LoginProfile, Vec<LoginProfile>)> {
        self.record(Call::ProfileStatus);
        let daemon = self.daemon();
        let current = daemon
            .current_profile
            .clone()
            .ok_or_else(|| anyhow!("no current profile"))?;
        Ok((current, daemon.profiles.clone()))
    }

    async fn edit_prefs(&self, prefs: &MaskedPrefs) -> Result<Prefs> {
        if self.record(Call::EditPrefs(prefs.clone())) {
            return Err(anyhow!("daemon returned 500: prefs locked"));
        }
        if prefs.exit_node_id_set {
            let id = prefs.prefs.exit_node_id.clone();
            self.daemon().set_exit_node((!id.is_zero()).then_some(id));
        }
        Ok(prefs.prefs.clone())
    }

    async fn switch_profile(&self, profile_id: &ProfileId) -> Result<()> {
        if self.record(Call::SwitchProfile(profile_id.clone())) {
            return Err(anyhow!("profile not found"));
        }
        Ok(())
    }

    async fn set_use_exit_node(&self, enabled: bool) -> Result<()> {
        if self.record(Call::SetUseExitNode(enabled)) {
            return Err(anyhow!("exit node busy"));
        }
        if !enabled {
            self.daemon().set_exit_node(None);
        }
        Ok(())
    }

    async fn suggest_exit_node(&self) -> Result<ExitNodeSuggestion> {
        self.record(Call::SuggestExitNode);
        self.daemon()
            .suggestion
            .clone()
            .ok_or_else(|| anyhow!("no suggestion"))
    }

    async fn watch_ipn_bus(&self, options: WatchOptions) -> Result<Box<dyn BusWatcher>> {
        self.record(Call::Watch(options));
        let mut daemon = self.daemon();
        daemon.watch_opened_at.push(Instant::now());
        if daemon.fail_watch {
            return Err(anyhow!("connection refused"));
        }
        let steps = daemon
            .sessions
            .pop_front()
            .ok_or_else(|| anyhow!("connection refused"))?;
        Ok(Box::new(ScriptedWatcher {
            steps: steps.into(),
            next_calls: self.next_calls.clone(),
            closed: self.closed.clone(),
        }))
    }
}

/// Plays back its steps, then waits forever.
pub struct ScriptedWatcher {
    steps: VecDeque<Step>,
    next_calls: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
}

#[async_trait]
impl BusWatcher for ScriptedWatcher {
    async fn next(&mut self) -> Result<Notify> {
        self.next_calls.fetch_add(1, Ordering::SeqCst);
        match self.steps.pop_front() {
            Some(Step::Notify(notify)) => Ok(notify),
            Some(Step::Fail(message)) => Err(anyhow!(message)),
            None => std::future::pending().await,
        }
    }

    async fn close(self: Box<Self>) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DesktopCall {
    Clipboard(String),
    Notify { summary: String, body: String },
    Open(String),
}

#[derive(Default)]
pub struct FakeDesktop {
    pub calls: Mutex<Vec<DesktopCall>>,
    pub fail_clipboard: bool,
}

impl FakeDesktop {
    pub fn calls(&self) -> Vec<DesktopCall> {
        guard(&self.calls).clone()
    }
}

#[async_trait]
impl Desktop for FakeDesktop {
    async fn copy_to_clipboard(&self, text: &str) -> Result<()> {
        guard(&self.calls).push(DesktopCall::Clipboard(text.to_string()));
        if self.fail_clipboard {
            return Err(anyhow!("no display"));
        }
        Ok(())
    }

    async fn notify(&self, summary: &str, body: &str) -> Result<()> {
        guard(&self.calls).push(DesktopCall::Notify {
            summary: summary.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }

    async fn open_url(&self, url: &str) -> Result<()> {
        guard(&self.calls).push(DesktopCall::Open(url.to_string()));
        Ok(())
    }
}

/// Serves a one-pixel "image" for every URL.
pub struct StaticIcons;

#[async_trait]
impl IconSource for StaticIcons {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        if url.contains("broken") {
            return Err(anyhow!("404"));
        }
        Ok(url.as_bytes().to_vec())
    }
}

#[derive(Debug, Clone)]
pub struct FakeItem {
    pub id: ItemId,
    pub parent: Option<ItemId>,
    pub separator: bool,
    pub spec: ItemSpec,
    pub icon: Option<Vec<u8>>,
    clicks: Option<mpsc::Sender<()>>,
}

#[derive(Default)]
pub struct FakeMenu {
    pub items: Vec<FakeItem>,
    /// Click senders of items removed by `reset`, kept alive so stale clicks can be attempted.
    pub retired: Vec<(String, mpsc::Sender<()>)>,
    pub app_icons: Vec<AppIcon>,
    pub resets: usize,
    pub quit: bool,
}

/// Records the menu in memory; cloned handles share the same menu.
#[derive(Clone, Default)]
pub struct FakeToolkit {
    menu: Arc<Mutex<FakeMenu>>,
}

impl FakeToolkit {
    pub fn menu(&self) -> MutexGuard<'_, FakeMenu> {
        guard(&self.menu)
    }

    pub fn find(&self, title: &str) -> Option<FakeItem> {
        self.menu()
            .items
            .iter()
            .find(|item| !item.separator && item.spec.title == title)
            .cloned()
    }

    pub fn item(&self, title: &str) -> FakeItem {
        self.find(title)
            .unwrap_or_else(|| panic!("no menu item titled {title:?}"))
    }

    pub fn children(&self, parent: &str) -> Vec<FakeItem> {
        let parent = self.item(parent).id;
        self.menu()
            .items
            .iter()
            .filter(|item| item.parent == Some(parent))
            .cloned()
            .collect()
    }

    pub fn top_level_titles(&self) -> Vec<String> {
        self.menu()
            .items
            .iter()
            .filter(|item| item.parent.is_none())
            .map(|item| {
                if item.separator {
                    "---".to_string()
                } else {
                    item.spec.title.clone()
                }
            })
            .collect()
    }

    /// Clicks the current item with `title`.
    pub async fn click(&self, title: &str) {
        let sender = self.item(title).clicks.expect("separators are not clickable");
        sender.send(()).await.expect("item is listened to");
    }

    pub fn retired_sender(&self, title: &str) -> mpsc::Sender<()> {
        self.menu()
            .retired
            .iter()
            .rev()
            .find(|(retired, _)| retired == title)
            .map(|(_, sender)| sender.clone())
            .unwrap_or_else(|| panic!("no retired item titled {title:?}"))
    }

    pub fn app_icons(&self) -> Vec<AppIcon> {
        self.menu().app_icons.clone()
    }

    fn update(&self, id: ItemId, apply: impl FnOnce(&mut ItemSpec)) {
        if let Some(item) = self.menu().items.get_mut(id.0) {
            apply(&mut item.spec);
        }
    }
}

impl MenuToolkit for FakeToolkit {
    fn reset(&mut self) {
        let mut menu = self.menu();
        menu.resets += 1;
        let removed: Vec<FakeItem> = menu.items.drain(..).collect();
        for item in removed {
            if let Some(sender) = item.clicks {
                menu.retired.push((item.spec.title, sender));
            }
        }
    }

    fn add_item(&mut self, parent: Option<ItemId>, spec: ItemSpec) -> RenderedItem {
        let (tx, rx) = mpsc::channel(1);
        let mut menu = self.menu();
        let id = ItemId(menu.items.len());
        menu.items.push(FakeItem {
            id,
            parent,
            separator: false,
            spec,
            icon: None,
            clicks: Some(tx),
        });
        RenderedItem { id, clicks: rx }
    }

    fn add_separator(&mut self, parent: Option<ItemId>) {
        let mut menu = self.menu();
        let id = ItemId(menu.items.len());
        menu.items.push(FakeItem {
            id,
            parent,
            separator: true,
            spec: ItemSpec::action(""),
            icon: None,
            clicks: None,
        });
    }

    fn set_title(&mut self, item: ItemId, title: &str) {
        self.update(item, |spec| spec.title = title.to_string());
    }

    fn set_enabled(&mut self, item: ItemId, enabled: bool) {
        self.update(item, |spec| spec.enabled = enabled);
    }

    fn set_visible(&mut self, item: ItemId, visible: bool) {
        self.update(item, |spec| spec.visible = visible);
    }

    fn set_icon(&mut self, item: ItemId, icon: &[u8]) {
        if let Some(entry) = self.menu().items.get_mut(item.0) {
            entry.icon = Some(icon.to_vec());
        }
    }

    fn set_app_icon(&mut self, icon: AppIcon) {
        self.menu().app_icons.push(icon);
    }

    fn quit(&mut self) {
        self.menu().quit = true;
    }
}

pub fn profile(id: &str, name: &str, domain: &str) -> LoginProfile {
    LoginProfile {
        id: ProfileId::new(id),
        name: name.to_string(),
        network_profile: NetworkProfile {
            domain_name: domain.to_string(),
        },
        user_profile: UserProfile {
            login_name: format!("{id}@{domain}"),
            display_name: name.to_string(),
            profile_pic_url: format!("https://pics.example/{id}.png"),
        },
    }
}

pub fn exit_peer(id: &str, online: bool) -> PeerStatus {
    PeerStatus {
        id: StableNodeId::new(id),
        public_key: format!("nodekey:{id}"),
        dns_name: format!("{id}.example.ts.net."),
        online,
        exit_node_option: true,
        ..PeerStatus::default()
    }
}

pub fn located_peer(
    id: &str,
    country: (&str, &str),
    city: (&str, &str),
    priority: i64,
) -> PeerStatus {
    PeerStatus {
        location: Some(Location {
            country: country.1.to_string(),
            country_code: country.0.to_string(),
            city: city.1.to_string(),
            city_code: city.0.to_string(),
            priority,
        }),
        ..exit_peer(id, true)
    }
}

/// A running node named "laptop" at 100.101.102.103 with the given peers.
pub fn running_status(peers: Vec<PeerStatus>, caps: &[&str], active: Option<&str>) -> Status {
    let ip: IpAddr = [100, 101, 102, 103].into();
    Status {
        backend_state: "Running".into(),
        self_peer: Some(PeerStatus {
            id: StableNodeId::new("self"),
            host_name: "laptop".into(),
            dns_name: "laptop.example.ts.net.".into(),
            tailscale_ips: vec![ip],
            online: true,
            cap_map: caps
                .iter()
                .map(|cap| (cap.to_string(), serde_json::Value::Null))
                .collect(),
            ..PeerStatus::default()
        }),
        peer: peers,
        exit_node_status: active.map(|id| ExitNodeStatus {
            id: StableNodeId::new(id),
            online: true,
            tailscale_ips: Vec::new(),
        }),
    }
}
