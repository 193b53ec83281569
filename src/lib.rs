//! xhotkey: global hotkey listener for X11
//!
//! Registers one system-wide key combination with the X server, blocks
//! until it is pressed and released, and reports key-down/key-up to a
//! caller-supplied handler. A blocked wait can be cancelled from another
//! thread through a synthetic client message.
//!
//! Typical lifecycle:
//! - open a `DisplayHandle` (bounded retry)
//! - install the process-wide error interceptor once
//! - create a `CancelWindow` and hand its `Canceller` to whoever may cancel
//! - `HotkeyRegistration::grab` then `wait` until released or cancelled
//! - drop the registration, window and display (or call their explicit
//!   release methods)
//!
//! `HotkeyListener` packages that lifecycle on a dedicated thread.

pub mod cancel;
pub mod display;
pub mod events;
pub mod hotkey;
pub mod interceptor;

pub use cancel::{CancelWindow, Canceller};
pub use display::{ConnectOptions, ConnectionError, DisplayHandle, XError};
pub use events::HotkeyEvent;
pub use hotkey::{
    Combination, HotkeyError, HotkeyHandler, HotkeyListener, HotkeyRegistration, Key, Modifiers,
    Outcome, State,
};
pub use interceptor::ErrorEvent;
