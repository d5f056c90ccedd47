//! Controller layer: tray events and the loop that serializes them.

pub mod event_loop;
pub mod events;

pub use event_loop::Tray;
pub use events::ExitReason;
