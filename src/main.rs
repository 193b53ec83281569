//! xhotkey-daemon: listens for one global hotkey and logs its presses
//!
//! This daemon provides:
//! - Global hotkey detection via an X11 key grab
//! - Protocol error interception so a taken hotkey is reported, not fatal
//! - Clean teardown (ungrab, destroy cancel window, close display) on
//!   SIGTERM/SIGINT

mod config;
mod lifecycle;

use anyhow::{bail, Result};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use xhotkey::{interceptor, DisplayHandle, HotkeyEvent, HotkeyListener};

use crate::config::Config;
use crate::lifecycle::ShutdownSignal;

const DISPLAY_HELP: &str = "failed to open the X display. If this is a machine without a \
frame buffer (e.g. a server), start a virtual one with `Xvfb :99 -screen 0 1024x768x24 &` \
and set DISPLAY=:99 (or XHOTKEY_DISPLAY=:99)";

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "xhotkey-daemon starting"
    );

    // Load configuration
    let config = Config::load()?;
    info!(
        combination = %config.combination,
        display = ?config.connect.display,
        max_attempts = config.connect.max_attempts,
        "configuration loaded"
    );

    let connect = config.connect.clone();
    if !tokio::task::spawn_blocking(move || DisplayHandle::probe(&connect)).await? {
        bail!(DISPLAY_HELP);
    }

    // Create shutdown signal handler
    let shutdown = ShutdownSignal::new();

    // Hotkey listener + error interceptor -> main loop
    let (event_tx, mut event_rx) = mpsc::channel(32);

    let error_tx = event_tx.clone();
    let _interceptor = interceptor::install_scoped(move |event| {
        // Runs on the listener thread, must not block
        if error_tx.try_send(HotkeyEvent::ProtocolError(*event)).is_err() {
            warn!(%event, "dropped protocol error notification");
        }
    });

    let listener = HotkeyListener::new(config.connect.clone(), config.combination, event_tx);

    // Start the hotkey listener (runs on dedicated thread)
    listener.start()?;
    info!(combination = %listener.combination(), "hotkey listener started");

    info!("daemon initialized, entering main loop");

    // Main event loop
    tokio::select! {
        _ = async {
            let mut presses: u64 = 0;
            while let Some(event) = event_rx.recv().await {
                match event {
                    HotkeyEvent::KeyDown => {
                        presses += 1;
                        info!(presses, "hotkey pressed");
                    }
                    HotkeyEvent::KeyUp => {
                        info!("hotkey released");
                    }
                    HotkeyEvent::ProtocolError(e) if e.is_grab_conflict() => {
                        // Waiting on would never fire
                        error!(%e, "another application owns this hotkey");
                        break;
                    }
                    HotkeyEvent::ProtocolError(e) => {
                        warn!(%e, "X protocol error");
                    }
                }
            }
        } => {
            info!("hotkey event loop exited");
        }

        // Wait for shutdown signal
        result = shutdown.wait() => {
            match result {
                Ok(signal) => info!(?signal, "shutdown signal received"),
                Err(e) => error!(?e, "failed to listen for shutdown signals"),
            }
        }
    }

    // Cleanup
    info!("shutting down...");

    match tokio::task::spawn_blocking(move || listener.stop()).await? {
        Ok(()) => info!("hotkey listener stopped"),
        Err(e) => error!(error = %e, "hotkey listener ended with error"),
    }

    info!("xhotkey-daemon stopped");

    Ok(())
}
