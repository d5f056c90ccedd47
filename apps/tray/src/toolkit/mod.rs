//! Menu toolkit seam: the engine pushes menu changes in and reads clicks out.

use tokio::sync::mpsc;

pub mod console;

pub use console::ConsoleToolkit;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppIcon {
    Disconnected,
    Loading,
    Connected,
}

impl AppIcon {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Loading => "loading",
            Self::Connected => "connected",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemSpec {
    pub title: String,
    pub checkable: bool,
    pub checked: bool,
    pub enabled: bool,
    pub visible: bool,
}

impl ItemSpec {
    pub fn action(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            checkable: false,
            checked: false,
            enabled: true,
            visible: true,
        }
    }

    pub fn checkbox(title: impl Into<String>, checked: bool) -> Self {
        Self {
            checkable: true,
            checked,
            ..Self::action(title)
        }
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }
}

/// An item added to the menu and the stream of its clicks.
#[derive(Debug)]
pub struct RenderedItem {
    pub id: ItemId,
    pub clicks: mpsc::Receiver<()>,
}

/// Menu surface driven by the event loop.
///
/// An item becomes a submenu as soon as a child is added under it. `reset`
/// removes every item; click receivers of removed items see no further clicks.
pub trait MenuToolkit: Send {
    fn reset(&mut self);
    fn add_item(&mut self, parent: Option<ItemId>, spec: ItemSpec) -> RenderedItem;
    fn add_separator(&mut self, parent: Option<ItemId>);
    fn set_title(&mut self, item: ItemId, title: &str);
    fn set_enabled(&mut self, item: ItemId, enabled: bool);
    fn set_visible(&mut self, item: ItemId, visible: bool);
    fn set_icon(&mut self, item: ItemId, icon: &[u8]);
    fn set_app_icon(&mut self, icon: AppIcon);
    fn quit(&mut self);
}
