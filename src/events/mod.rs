//! Events module for hotkey notifications
//!
//! Provides structured event types emitted by the listener thread and the
//! error interceptor.

use serde::{Deserialize, Serialize};

use crate::interceptor::ErrorEvent;

/// Events emitted while a hotkey is registered
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HotkeyEvent {
    /// Hotkey pressed (repeats while held)
    KeyDown,

    /// Hotkey released
    KeyUp,

    /// The server reported a protocol error
    ProtocolError(ErrorEvent),
}

impl std::fmt::Display for HotkeyEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HotkeyEvent::KeyDown => write!(f, "KEY_DOWN"),
            HotkeyEvent::KeyUp => write!(f, "KEY_UP"),
            HotkeyEvent::ProtocolError(e) if e.is_grab_conflict() => {
                write!(f, "GRAB_FAILED ({})", e)
            }
            HotkeyEvent::ProtocolError(e) => write!(f, "PROTOCOL_ERROR ({})", e),
        }
    }
}
