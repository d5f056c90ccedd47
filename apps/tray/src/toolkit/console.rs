//! Terminal menu: prints the tree to stdout and reads clicks from stdin.
//!
//! Typing an item number clicks it; an empty line or `m` prints the menu again.

use std::{
    io::BufRead,
    sync::{Arc, Mutex, MutexGuard},
    thread,
};

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

use super::{AppIcon, ItemId, ItemSpec, MenuToolkit, RenderedItem};

const CLICK_BUFFER: usize = 1;

#[derive(Debug)]
enum Entry {
    Separator {
        parent: Option<ItemId>,
    },
    Item {
        parent: Option<ItemId>,
        spec: ItemSpec,
        has_icon: bool,
        clicks: mpsc::Sender<()>,
    },
}

impl Entry {
    fn parent(&self) -> Option<ItemId> {
        match self {
            Self::Separator { parent } | Self::Item { parent, .. } => *parent,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum ClickError {
    NoSuchItem,
    Disabled,
    Busy,
}

#[derive(Debug)]
pub struct ConsoleMenu {
    entries: Vec<Entry>,
    app_icon: AppIcon,
}

impl Default for ConsoleMenu {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            app_icon: AppIcon::Disconnected,
        }
    }
}

impl ConsoleMenu {
    fn item_mut(&mut self, item: ItemId) -> Option<&mut ItemSpec> {
        match self.entries.get_mut(item.0) {
            Some(Entry::Item { spec, .. }) => Some(spec),
            _ => None,
        }
    }

    pub fn add_item(&mut self, parent: Option<ItemId>, spec: ItemSpec) -> RenderedItem {
        let (tx, rx) = mpsc::channel(CLICK_BUFFER);
        let id = ItemId(self.entries.len());
        self.entries.push(Entry::Item {
            parent,
            spec,
            has_icon: false,
            clicks: tx,
        });
        RenderedItem { id, clicks: rx }
    }

    pub fn add_separator(&mut self, parent: Option<ItemId>) {
        self.entries.push(Entry::Separator { parent });
    }

    /// Delivers a click to item `number`, as printed by [`ConsoleMenu::render`].
    pub fn click(&self, number: usize) -> Result<(), ClickError> {
        let Some(Entry::Item { spec, clicks, .. }) = self.entries.get(number) else {
            return Err(ClickError::NoSuchItem);
        };
        if !spec.enabled || !spec.visible {
            return Err(ClickError::Disabled);
        }
        match clicks.try_send(()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(())) => Err(ClickError::Busy),
            // Nobody listens to this item; the click is lost like on a real tray.
            Err(TrySendError::Closed(())) => Ok(()),
        }
    }

    pub fn render(&self) -> String {
        let mut out = format!("[{}]\n", self.app_icon.as_str());
        self.render_level(None, 0, &mut out);
        out
    }

    fn render_level(&self, parent: Option<ItemId>, depth: usize, out: &mut String) {
        let indent = "    ".repeat(depth);
        for (index, entry) in self.entries.iter().enumerate() {
            if entry.parent() != parent {
                continue;
            }
            match entry {
                Entry::Separator { .. } => out.push_str(&format!("{indent}     ----\n")),
                Entry::Item { spec, has_icon, .. } => {
                    if !spec.visible {
                        continue;
                    }
                    let mark = match (spec.checkable, spec.checked) {
                        (true, true) => "[x] ",
                        (true, false) => "[ ] ",
                        _ => "",
                    };
                    let icon = if *has_icon { "* " } else { "" };
                    let title = spec.title.replace('\n', " / ");
                    let state = if spec.enabled { "" } else { " (disabled)" };
                    out.push_str(&format!("{indent}{index:>4} {icon}{mark}{title}{state}\n"));
                    self.render_level(Some(ItemId(index)), depth + 1, out);
                }
            }
        }
    }
}

pub struct ConsoleToolkit {
    menu: Arc<Mutex<ConsoleMenu>>,
}

impl ConsoleToolkit {
    /// Starts reading clicks from stdin on a detached thread.
    pub fn spawn() -> std::io::Result<Self> {
        let menu = Arc::new(Mutex::new(ConsoleMenu::default()));
        let input = menu.clone();
        thread::Builder::new()
            .name("console-input".into())
            .spawn(move || read_clicks(&input))?;
        Ok(Self { menu })
    }

    fn menu(&self) -> MutexGuard<'_, ConsoleMenu> {
        lock(&self.menu)
    }
}

fn lock(menu: &Mutex<ConsoleMenu>) -> MutexGuard<'_, ConsoleMenu> {
    menu.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn read_clicks(menu: &Mutex<ConsoleMenu>) {
    for line in std::io::stdin().lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                warn!(error = %err, "failed reading stdin");
                return;
            }
        };
        let line = line.trim();
        if line.is_empty() || line == "m" {
            print!("{}", lock(menu).render());
            continue;
        }
        match line.parse::<usize>() {
            Ok(number) => {
                if let Err(err) = lock(menu).click(number) {
                    println!("cannot click {number}: {err:?}");
                }
            }
            Err(_) => println!("type an item number, or m to show the menu"),
        }
    }
    debug!("stdin closed, console input stopped");
}

impl MenuToolkit for ConsoleToolkit {
    fn reset(&mut self) {
        self.menu().entries.clear();
    }

    fn add_item(&mut self, parent: Option<ItemId>, spec: ItemSpec) -> RenderedItem {
        self.menu().add_item(parent, spec)
    }

    fn add_separator(&mut self, parent: Option<ItemId>) {
        self.menu().add_separator(parent);
    }

    fn set_title(&mut self, item: ItemId, title: &str) {
        if let Some(spec) = self.menu().item_mut(item) {
            spec.title = title.to_string();
        }
    }

    fn set_enabled(&mut self, item: ItemId, enabled: bool) {
        if let Some(spec) = self.menu().item_mut(item) {
            spec.enabled = enabled;
        }
    }

    fn set_visible(&mut self, item: ItemId, visible: bool) {
        if let Some(spec) = self.menu().item_mut(item) {
            spec.visible = visible;
        }
    }

    fn set_icon(&mut self, item: ItemId, icon: &[u8]) {
        if let Some(Entry::Item { has_icon, .. }) = self.menu().entries.get_mut(item.0) {
            *has_icon = !icon.is_empty();
        }
    }

    fn set_app_icon(&mut self, icon: AppIcon) {
        let mut menu = self.menu();
        if menu.app_icon != icon {
            info!(icon = icon.as_str(), "app icon changed");
        }
        menu.app_icon = icon;
        print!("{}", menu.render());
    }

    fn quit(&mut self) {
        info!("menu closed");
    }
}

#[cfg(test)]
#[path = "../tests/console_tests.rs"]
mod tests;
