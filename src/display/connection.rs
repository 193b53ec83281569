//! Display connection with bounded retry
//!
//! The X server is frequently not ready yet when a session starts, so
//! opening is retried a fixed number of times before giving up.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::{X11Connection, XConnection, XError};

/// Number of open attempts made before reporting failure
pub const DEFAULT_MAX_ATTEMPTS: u32 = 42;

/// How to open the display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Display name, `None` uses `$DISPLAY`
    pub display: Option<String>,
    /// Upper bound on open attempts (values below 1 are treated as 1)
    pub max_attempts: u32,
    /// Delay between failed attempts, `None` retries immediately
    pub backoff: Option<Duration>,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            display: None,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: None,
        }
    }
}

/// The display could not be opened
#[derive(Debug, thiserror::Error)]
#[error("could not open X display after {attempts} attempt(s)")]
pub struct ConnectionError {
    pub attempts: u32,
    #[source]
    pub last: XError,
}

/// Exclusive handle to one open display connection
///
/// Closing happens exactly once: either through `close()`, which consumes
/// the handle, or when the handle is dropped.
///
/// At most one hotkey registration may be active on a handle; they would
/// otherwise read each other's events from the shared queue.
pub struct DisplayHandle {
    conn: Arc<dyn XConnection>,
    registration_active: AtomicBool,
}

impl DisplayHandle {
    /// Open the display described by `options` via x11rb
    pub fn open(options: &ConnectOptions) -> Result<Self, ConnectionError> {
        let name = options.display.clone();
        Self::open_with(options, move || {
            X11Connection::connect(name.as_deref())
                .map(|conn| Arc::new(conn) as Arc<dyn XConnection>)
        })
    }

    /// Open using a caller-provided connector, retrying per `options`
    pub fn open_with<F>(options: &ConnectOptions, mut connect: F) -> Result<Self, ConnectionError>
    where
        F: FnMut() -> Result<Arc<dyn XConnection>, XError>,
    {
        let max_attempts = options.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match connect() {
                Ok(conn) => {
                    info!(attempt, "display connection opened");
                    return Ok(Self {
                        conn,
                        registration_active: AtomicBool::new(false),
                    });
                }
                Err(e) if attempt >= max_attempts => {
                    warn!(attempts = attempt, error = %e, "giving up on display connection");
                    return Err(ConnectionError {
                        attempts: attempt,
                        last: e,
                    });
                }
                Err(e) => {
                    debug!(attempt, error = %e, "display not available, retrying");
                    if let Some(delay) = options.backoff {
                        thread::sleep(delay);
                    }
                }
            }
        }
    }

    /// Check that a display can be opened, closing it again immediately
    pub fn probe(options: &ConnectOptions) -> bool {
        let name = options.display.clone();
        Self::probe_with(options, move || {
            X11Connection::connect(name.as_deref())
                .map(|conn| Arc::new(conn) as Arc<dyn XConnection>)
        })
    }

    /// `probe` through a caller-provided connector
    pub fn probe_with<F>(options: &ConnectOptions, connect: F) -> bool
    where
        F: FnMut() -> Result<Arc<dyn XConnection>, XError>,
    {
        match Self::open_with(options, connect) {
            Ok(display) => {
                display.close();
                true
            }
            Err(_) => false,
        }
    }

    /// The underlying connection
    pub fn connection(&self) -> &Arc<dyn XConnection> {
        &self.conn
    }

    /// Reserve the handle for one registration; `false` if one is active
    pub(crate) fn claim_registration(&self) -> bool {
        !self.registration_active.swap(true, Ordering::SeqCst)
    }

    pub(crate) fn release_registration(&self) {
        self.registration_active.store(false, Ordering::SeqCst);
    }

    /// Close the connection
    pub fn close(self) {
        drop(self)
    }
}

impl Drop for DisplayHandle {
    fn drop(&mut self) {
        // Pending ungrab/destroy requests must reach the server before the socket goes away
        if let Err(e) = self.conn.flush() {
            debug!(error = %e, "flush on close failed");
        }
        debug!("display connection closed");
    }
}

impl std::fmt::Debug for DisplayHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DisplayHandle")
            .field("root", &self.conn.root())
            .finish()
    }
}
