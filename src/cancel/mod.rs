//! Cancellation channel for the blocking hotkey wait
//!
//! Waiting for the next X event blocks with no way to interrupt it from
//! the outside. An invisible input-only window gives another thread
//! something to address: sending it a client message of a reserved type
//! wakes the waiting thread, which recognises the message and returns.

use std::sync::Arc;

use tracing::{debug, info};

use crate::display::{Atom, DisplayHandle, NativeEvent, Window, XConnection, XError};

/// Atom name of the cancel message
pub const CANCEL_MESSAGE_TYPE: &str = "XHOTKEY_CANCEL_HOTKEY";

/// Invisible window that receives the cancel message
///
/// Lives for one wait cycle; destroyed explicitly with `destroy()` or on drop.
pub struct CancelWindow {
    conn: Arc<dyn XConnection>,
    window: Window,
    message_type: Atom,
    destroyed: bool,
}

impl CancelWindow {
    /// Create the window and resolve the cancel message type
    pub fn create(display: &DisplayHandle) -> Result<Self, XError> {
        let conn = Arc::clone(display.connection());
        let message_type = conn.intern_atom(CANCEL_MESSAGE_TYPE)?;
        let window = conn.create_input_only_window()?;

        debug!(window, message_type, "cancel window created");

        Ok(Self {
            conn,
            window,
            message_type,
            destroyed: false,
        })
    }

    pub fn window(&self) -> Window {
        self.window
    }

    pub fn message_type(&self) -> Atom {
        self.message_type
    }

    /// Whether `event` is the cancel message addressed to this window
    pub fn is_cancel(&self, event: &NativeEvent) -> bool {
        matches!(
            event,
            NativeEvent::ClientMessage { window, message_type }
                if *window == self.window && *message_type == self.message_type
        )
    }

    /// A sendable handle for cancelling from another thread
    pub fn canceller(&self) -> Canceller {
        Canceller {
            conn: Arc::clone(&self.conn),
            window: self.window,
            message_type: self.message_type,
        }
    }

    /// Send the cancel message to this window
    pub fn send_cancel(&self) -> Result<(), XError> {
        self.canceller().send_cancel()
    }

    /// Destroy the window
    pub fn destroy(mut self) -> Result<(), XError> {
        self.destroy_inner()
    }

    fn destroy_inner(&mut self) -> Result<(), XError> {
        if self.destroyed {
            return Ok(());
        }
        self.destroyed = true;
        self.conn.destroy_window(self.window)?;
        self.conn.flush()?;
        debug!(window = self.window, "cancel window destroyed");
        Ok(())
    }
}

impl Drop for CancelWindow {
    fn drop(&mut self) {
        if let Err(e) = self.destroy_inner() {
            debug!(error = %e, "failed to destroy cancel window");
        }
    }
}

/// Cross-thread handle that wakes a waiting hotkey loop
#[derive(Clone)]
pub struct Canceller {
    conn: Arc<dyn XConnection>,
    window: Window,
    message_type: Atom,
}

impl Canceller {
    /// Enqueue the cancel message and flush so it reaches the server now
    pub fn send_cancel(&self) -> Result<(), XError> {
        self.conn.send_client_message(self.window, self.message_type)?;
        self.conn.flush()?;
        info!(window = self.window, "cancel message sent");
        Ok(())
    }
}

impl std::fmt::Debug for Canceller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Canceller")
            .field("window", &self.window)
            .field("message_type", &self.message_type)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::fake::FakeServer;
    use crate::display::ConnectOptions;

    fn open(server: &FakeServer) -> DisplayHandle {
        DisplayHandle::open_with(&ConnectOptions::default(), || Ok(server.connect())).unwrap()
    }

    #[test]
    fn test_cancel_message_reaches_owner() {
        let server = FakeServer::new();
        let display = open(&server);
        let window = CancelWindow::create(&display).unwrap();

        let flushes = server.flush_count();
        window.send_cancel().unwrap();
        assert!(server.flush_count() > flushes);

        let event = display.connection().next_event().unwrap();
        assert!(window.is_cancel(&event));
    }

    #[test]
    fn test_foreign_client_message_is_not_cancel() {
        let server = FakeServer::new();
        let display = open(&server);
        let window = CancelWindow::create(&display).unwrap();

        let other = NativeEvent::ClientMessage {
            window: window.window(),
            message_type: window.message_type() + 1,
        };
        assert!(!window.is_cancel(&other));
        assert!(!window.is_cancel(&NativeEvent::Other));
    }

    #[test]
    fn test_canceller_works_from_another_thread() {
        let server = FakeServer::new();
        let display = open(&server);
        let window = CancelWindow::create(&display).unwrap();
        let canceller = window.canceller();

        std::thread::spawn(move || canceller.send_cancel().unwrap())
            .join()
            .unwrap();

        let event = display.connection().next_event().unwrap();
        assert!(window.is_cancel(&event));
    }

    #[test]
    fn test_destroy_and_drop_release_window() {
        let server = FakeServer::new();
        let display = open(&server);

        let window = CancelWindow::create(&display).unwrap();
        assert_eq!(server.window_count(), 1);
        window.destroy().unwrap();
        assert_eq!(server.window_count(), 0);

        {
            let _window = CancelWindow::create(&display).unwrap();
            assert_eq!(server.window_count(), 1);
        }
        assert_eq!(server.window_count(), 0);
    }
}
