//! Process-wide protocol error interception
//!
//! Errors for unchecked requests (most importantly a GrabKey that collides
//! with another client's grab) arrive asynchronously in the event stream.
//! Once a handler is installed they are handed to it instead of failing the
//! wait loop.
//!
//! The handler is global: it sees protocol errors from every hotkey loop in
//! the process, not just the one that installed it. Only one owner should
//! have it installed at a time, otherwise error attribution between
//! listeners is ambiguous.
//!
//! The process starts with no handler, and `restore` always returns to that
//! state. There is no handler chain: a second `install` is refused rather
//! than stacked.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Major opcode of the core GrabKey request
pub const GRAB_KEY_REQUEST: u8 = 33;

/// Error code reported when a resource is held by another client
pub const BAD_ACCESS: u8 = 10;

/// Snapshot of a protocol error reported by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEvent {
    /// Always 0 for errors on the wire
    pub response_type: u8,
    /// Sequence number of the failed request
    pub serial: u64,
    pub error_code: u8,
    /// Major opcode of the failed request
    pub request_code: u8,
    pub minor_code: u8,
}

impl ErrorEvent {
    /// The key combination is already grabbed by another client
    pub fn is_grab_conflict(&self) -> bool {
        self.request_code == GRAB_KEY_REQUEST && self.error_code == BAD_ACCESS
    }
}

impl std::fmt::Display for ErrorEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "X error {}/{}/{}/{}/{}",
            self.response_type, self.serial, self.error_code, self.request_code, self.minor_code
        )
    }
}

/// Callback invoked for every intercepted protocol error
pub type ErrorHandler = Arc<dyn Fn(&ErrorEvent) + Send + Sync>;

static HANDLER: Mutex<Option<ErrorHandler>> = Mutex::new(None);

/// Install `handler` as the process-wide error callback
///
/// Returns `false` without touching anything if a handler is already
/// installed and has not been restored yet.
pub fn install<F>(handler: F) -> bool
where
    F: Fn(&ErrorEvent) + Send + Sync + 'static,
{
    let mut slot = HANDLER.lock();
    if slot.is_some() {
        debug!("error interceptor already installed");
        return false;
    }

    *slot = Some(Arc::new(handler));
    info!("error interceptor installed");
    true
}

/// Go back to having no handler installed
///
/// Without a prior `install` this leaves the process untouched.
pub fn restore() {
    if HANDLER.lock().take().is_none() {
        return;
    }
    info!("error interceptor restored");
}

/// Whether a handler is currently installed
pub fn is_installed() -> bool {
    HANDLER.lock().is_some()
}

/// Install `handler` for as long as the returned guard lives
///
/// If another handler is already installed the guard does nothing on drop,
/// leaving the existing owner in charge.
pub fn install_scoped<F>(handler: F) -> InterceptorGuard
where
    F: Fn(&ErrorEvent) + Send + Sync + 'static,
{
    InterceptorGuard {
        owns: install(handler),
    }
}

/// Uninstalls the handler when dropped, if this guard installed it
#[must_use = "the handler is restored as soon as the guard is dropped"]
pub struct InterceptorGuard {
    owns: bool,
}

impl InterceptorGuard {
    /// Whether this guard performed the install
    pub fn owns_install(&self) -> bool {
        self.owns
    }
}

impl Drop for InterceptorGuard {
    fn drop(&mut self) {
        if self.owns {
            restore();
        }
    }
}

/// Hand `event` to the installed handler, if any
///
/// Returns `false` when nobody is installed, in which case the caller has to
/// treat the error as fatal to its own operation.
pub(crate) fn dispatch(event: &ErrorEvent) -> bool {
    // Clone out of the lock so the handler may call install/restore itself
    let handler = HANDLER.lock().clone();
    match handler {
        Some(handler) => {
            handler(event);
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn grab_conflict() -> ErrorEvent {
        ErrorEvent {
            response_type: 0,
            serial: 7,
            error_code: BAD_ACCESS,
            request_code: GRAB_KEY_REQUEST,
            minor_code: 0,
        }
    }

    #[test]
    #[serial]
    fn test_restore_without_install_is_noop() {
        assert!(!is_installed());
        restore();
        assert!(!is_installed());
        assert!(!dispatch(&grab_conflict()));
    }

    #[test]
    #[serial]
    fn test_install_dispatch_restore() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);

        assert!(install(move |event| {
            assert!(event.is_grab_conflict());
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        assert!(dispatch(&grab_conflict()));
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        restore();
        assert!(!is_installed());
        assert!(!dispatch(&grab_conflict()));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    #[serial]
    fn test_second_install_is_noop() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let (a, b) = (Arc::clone(&first), Arc::clone(&second));

        assert!(install(move |_| {
            a.fetch_add(1, Ordering::SeqCst);
        }));
        assert!(!install(move |_| {
            b.fetch_add(1, Ordering::SeqCst);
        }));

        dispatch(&grab_conflict());
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 0);

        // A single restore undoes the single effective install
        restore();
        assert!(!is_installed());
    }

    #[test]
    #[serial]
    fn test_reinstall_after_restore_starts_from_no_handler() {
        let hits = Arc::new(AtomicUsize::new(0));
        for _ in 0..2 {
            let counter = Arc::clone(&hits);
            assert!(install(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }));
            assert!(dispatch(&grab_conflict()));
            restore();

            // Nothing from the earlier round is left behind
            assert!(!is_installed());
            assert!(!dispatch(&grab_conflict()));
        }
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    #[serial]
    fn test_scoped_guard_restores_on_drop() {
        {
            let guard = install_scoped(|_| {});
            assert!(guard.owns_install());
            assert!(is_installed());

            let nested = install_scoped(|_| {});
            assert!(!nested.owns_install());
            drop(nested);
            assert!(is_installed());
        }
        assert!(!is_installed());
    }

    #[test]
    fn test_grab_conflict_detection() {
        assert!(grab_conflict().is_grab_conflict());

        let other = ErrorEvent {
            request_code: 4,
            ..grab_conflict()
        };
        assert!(!other.is_grab_conflict());
    }

    #[test]
    fn test_error_event_display() {
        assert_eq!(grab_conflict().to_string(), "X error 0/7/10/33/0");
    }
}
