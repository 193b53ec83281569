//! Display connection module
//!
//! Owns the connection to the X server and the narrow set of native
//! protocol calls the hotkey loop needs. The calls are expressed through
//! the `XConnection` trait so the grab/wait/cancel logic can run against
//! either the x11rb-backed connection or an in-process fake.

mod connection;
#[cfg(test)]
pub(crate) mod fake;
mod x11;

use crate::interceptor::ErrorEvent;

pub use connection::{ConnectOptions, ConnectionError, DisplayHandle, DEFAULT_MAX_ATTEMPTS};
pub use x11::X11Connection;

/// X11 window identifier
pub type Window = u32;

/// X11 atom identifier
pub type Atom = u32;

/// Events read from the connection, reduced to what the hotkey loop cares about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NativeEvent {
    /// A key was pressed (or auto-repeated) while grabbed
    KeyPress { keycode: u8, state: u16 },
    /// A key was released while grabbed
    KeyRelease { keycode: u8, state: u16 },
    /// A client message arrived on one of our windows
    ClientMessage { window: Window, message_type: Atom },
    /// The server reported an error for an unchecked request
    Error(ErrorEvent),
    /// Anything else
    Other,
}

/// Failure of a native protocol call
#[derive(Debug, Clone, thiserror::Error)]
pub enum XError {
    #[error("failed to connect to X server: {0}")]
    Connect(String),

    #[error("X11 connection error: {0}")]
    Connection(String),

    #[error("X11 request failed: {0}")]
    Request(String),
}

/// Native calls consumed by the hotkey listener
///
/// Implementations must be shareable across threads: one thread blocks in
/// `next_event` while another calls `send_client_message` + `flush`.
pub trait XConnection: Send + Sync {
    /// Root window of the default screen
    fn root(&self) -> Window;

    /// Resolve a keysym to the first keycode producing it
    fn keysym_to_keycode(&self, keysym: u32) -> Result<Option<u8>, XError>;

    /// Request an asynchronous grab; failures arrive later as `NativeEvent::Error`
    fn grab_key(&self, modifiers: u16, keycode: u8) -> Result<(), XError>;

    fn ungrab_key(&self, modifiers: u16, keycode: u8) -> Result<(), XError>;

    /// Listen for key presses on the root window
    fn select_key_press(&self) -> Result<(), XError>;

    /// Block until the next event arrives, in arrival order
    fn next_event(&self) -> Result<NativeEvent, XError>;

    /// Create a 1x1 input-only window on the root window
    fn create_input_only_window(&self) -> Result<Window, XError>;

    fn destroy_window(&self, window: Window) -> Result<(), XError>;

    fn intern_atom(&self, name: &str) -> Result<Atom, XError>;

    /// Send a synthetic client message of `message_type` to `window`
    fn send_client_message(&self, window: Window, message_type: Atom) -> Result<(), XError>;

    fn flush(&self) -> Result<(), XError>;
}
