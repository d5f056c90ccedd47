//! Data model shared between the daemon client and the tray engine.

pub mod domain;
pub mod error;
pub mod protocol;
