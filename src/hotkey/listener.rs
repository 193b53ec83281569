//! Global hotkey listener thread
//!
//! Owns a display connection on a dedicated thread, grabs the configured
//! combination and forwards key-down/key-up to a channel. After every
//! release the grab is re-armed, so the hotkey keeps working until the
//! listener is stopped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::cancel::{CancelWindow, Canceller};
use crate::display::{ConnectOptions, ConnectionError, DisplayHandle, X11Connection, XConnection, XError};
use crate::events::HotkeyEvent;
use crate::interceptor::ErrorEvent;

use super::keys::{Combination, Key, ParseCombinationError};
use super::registration::{HotkeyHandler, HotkeyRegistration, Outcome};

/// Opens one connection attempt; retried by `DisplayHandle::open_with`
pub type Connector = Arc<dyn Fn() -> Result<Arc<dyn XConnection>, XError> + Send + Sync>;

/// Errors that can occur in the hotkey listener
#[derive(Debug, thiserror::Error)]
pub enum HotkeyError {
    #[error("hotkey listener is already running")]
    AlreadyRunning,

    #[error("hotkey listener is not running")]
    NotRunning,

    #[error("failed to spawn listener thread: {0}")]
    ThreadSpawn(String),

    #[error("listener thread panicked")]
    ThreadPanicked,

    #[error("no keycode is mapped to key {0}")]
    UnknownKey(Key),

    #[error("hotkey is not grabbed")]
    NotGrabbed,

    #[error("another hotkey registration is active on this display")]
    AlreadyGrabbed,

    #[error("unhandled protocol error ({0}) - is the error interceptor installed?")]
    Protocol(ErrorEvent),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Native(#[from] XError),

    #[error(transparent)]
    InvalidCombination(#[from] ParseCombinationError),
}

/// Forwards key notifications to the listener's channel
struct ChannelHandler {
    event_tx: mpsc::Sender<HotkeyEvent>,
}

impl ChannelHandler {
    fn send(&self, event: HotkeyEvent) {
        // We're on a plain thread, not inside the runtime
        if self.event_tx.blocking_send(event).is_err() {
            warn!("failed to send hotkey event - channel closed?");
        }
    }
}

impl HotkeyHandler for ChannelHandler {
    fn on_key_down(&mut self) {
        self.send(HotkeyEvent::KeyDown);
    }

    fn on_key_up(&mut self) {
        self.send(HotkeyEvent::KeyUp);
    }
}

/// Global hotkey listener that reports presses and releases of one combination
pub struct HotkeyListener {
    options: ConnectOptions,
    combination: Combination,
    connector: Connector,
    event_tx: mpsc::Sender<HotkeyEvent>,
    running: Arc<AtomicBool>,
    canceller: Arc<Mutex<Option<Canceller>>>,
    thread: Mutex<Option<JoinHandle<Result<(), HotkeyError>>>>,
}

impl HotkeyListener {
    /// Create a listener backed by the X server named in `options`
    pub fn new(
        options: ConnectOptions,
        combination: Combination,
        event_tx: mpsc::Sender<HotkeyEvent>,
    ) -> Self {
        let display = options.display.clone();
        let connector: Connector = Arc::new(move || {
            X11Connection::connect(display.as_deref())
                .map(|conn| Arc::new(conn) as Arc<dyn XConnection>)
        });
        Self::with_connector(options, combination, event_tx, connector)
    }

    /// Create a listener that opens its connection through `connector`
    pub fn with_connector(
        options: ConnectOptions,
        combination: Combination,
        event_tx: mpsc::Sender<HotkeyEvent>,
        connector: Connector,
    ) -> Self {
        Self {
            options,
            combination,
            connector,
            event_tx,
            running: Arc::new(AtomicBool::new(false)),
            canceller: Arc::new(Mutex::new(None)),
            thread: Mutex::new(None),
        }
    }

    /// Start the hotkey listener
    ///
    /// This spawns a dedicated thread that blocks on the X connection.
    /// The listener runs until `stop()` is called or the thread hits an
    /// unrecoverable error.
    pub fn start(&self) -> Result<(), HotkeyError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(HotkeyError::AlreadyRunning);
        }

        // A previous run that ended on its own is finished already
        if let Some(previous) = self.thread.lock().take() {
            let _ = previous.join();
        }

        let options = self.options.clone();
        let combination = self.combination;
        let connector = Arc::clone(&self.connector);
        let event_tx = self.event_tx.clone();
        let running = Arc::clone(&self.running);
        let canceller = Arc::clone(&self.canceller);

        let handle = thread::Builder::new()
            .name("hotkey-listener".to_string())
            .spawn(move || {
                info!(%combination, "hotkey listener thread started");

                let result = run_event_loop(
                    &options,
                    combination,
                    &connector,
                    event_tx,
                    &running,
                    &canceller,
                );
                if let Err(e) = &result {
                    error!(error = %e, "hotkey listener error");
                }

                canceller.lock().take();
                running.store(false, Ordering::SeqCst);
                info!("hotkey listener thread stopped");
                result
            })
            .map_err(|e| {
                self.running.store(false, Ordering::SeqCst);
                HotkeyError::ThreadSpawn(e.to_string())
            })?;

        *self.thread.lock() = Some(handle);
        Ok(())
    }

    /// Stop the hotkey listener and wait for its thread to finish
    ///
    /// If the thread already ended because of an error, that error is
    /// returned here.
    pub fn stop(&self) -> Result<(), HotkeyError> {
        let was_running = self.running.swap(false, Ordering::SeqCst);

        if let Some(canceller) = self.canceller.lock().as_ref() {
            if let Err(e) = canceller.send_cancel() {
                warn!(error = %e, "failed to send cancel message");
            }
        }

        let handle = self.thread.lock().take();
        match handle {
            Some(handle) => handle.join().map_err(|_| HotkeyError::ThreadPanicked)?,
            None if was_running => Ok(()),
            None => Err(HotkeyError::NotRunning),
        }
    }

    /// Check if the listener is currently running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn combination(&self) -> Combination {
        self.combination
    }
}

impl Drop for HotkeyListener {
    fn drop(&mut self) {
        if self.is_running() {
            if let Err(e) = self.stop() {
                debug!(error = %e, "listener stopped with error");
            }
        }
    }
}

/// Grab, wait and re-arm until cancelled
fn run_event_loop(
    options: &ConnectOptions,
    combination: Combination,
    connector: &Connector,
    event_tx: mpsc::Sender<HotkeyEvent>,
    running: &AtomicBool,
    canceller: &Mutex<Option<Canceller>>,
) -> Result<(), HotkeyError> {
    let display = DisplayHandle::open_with(options, || connector())?;
    let window = CancelWindow::create(&display)?;

    // Publish before checking `running` so a concurrent stop() can't be missed
    *canceller.lock() = Some(window.canceller());

    let mut handler = ChannelHandler { event_tx };

    while running.load(Ordering::SeqCst) {
        let mut registration = HotkeyRegistration::grab(&display, combination)?;
        match registration.wait(&window, &mut handler)? {
            Outcome::Released => {
                debug!(%combination, "re-arming hotkey");
            }
            Outcome::Cancelled => break,
        }
    }

    canceller.lock().take();
    window.destroy()?;
    display.close();
    Ok(())
}
