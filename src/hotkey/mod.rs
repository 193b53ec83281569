//! Hotkey module for global key grabs
//!
//! Grabs one key combination on the X root window, blocks until it is
//! pressed and released, and can be cancelled from another thread.

mod keys;
mod listener;
mod registration;

pub use keys::{Combination, Key, Modifiers, ParseCombinationError};
pub use listener::{Connector, HotkeyError, HotkeyListener};
pub use registration::{HotkeyHandler, HotkeyRegistration, Outcome, State};
