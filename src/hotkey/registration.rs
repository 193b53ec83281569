//! Hotkey grab and blocking wait
//!
//! A registration moves through
//! `Idle -> Grabbing -> Waiting -> {Released, Cancelled, GrabFailed}`.
//! The grab is released on every exit path: explicitly when `wait`
//! returns, and from `Drop` if the registration is abandoned or `wait`
//! fails part way.

use tracing::{debug, info, warn};

use crate::cancel::CancelWindow;
use crate::display::{DisplayHandle, NativeEvent};
use crate::interceptor;

use super::keys::{Combination, Modifiers};
use super::listener::HotkeyError;

/// Where a registration is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum State {
    /// Nothing requested yet
    #[default]
    Idle,
    /// Grab requested, not yet waiting
    Grabbing,
    /// Blocked waiting for the hotkey
    Waiting,
    /// Key was released, grab dropped
    Released,
    /// Cancel message observed, grab dropped
    Cancelled,
    /// Server reported that another client holds the combination
    GrabFailed,
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            State::Idle => write!(f, "Idle"),
            State::Grabbing => write!(f, "Grabbing"),
            State::Waiting => write!(f, "Waiting"),
            State::Released => write!(f, "Released"),
            State::Cancelled => write!(f, "Cancelled"),
            State::GrabFailed => write!(f, "GrabFailed"),
        }
    }
}

/// How a `wait` call ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The hotkey was pressed and released
    Released,
    /// The cancel message arrived
    Cancelled,
}

/// Receives key-down and key-up notifications from `wait`
///
/// Called on the waiting thread; slow handlers stall the hotkey loop.
pub trait HotkeyHandler {
    /// Pressed, or auto-repeated while held
    fn on_key_down(&mut self);

    fn on_key_up(&mut self);
}

impl<D, U> HotkeyHandler for (D, U)
where
    D: FnMut(),
    U: FnMut(),
{
    fn on_key_down(&mut self) {
        (self.0)()
    }

    fn on_key_up(&mut self) {
        (self.1)()
    }
}

/// Modifier bits of a key event state; the upper bits carry pointer buttons
const MODIFIER_MASK: u16 = 0xff;

/// Lock-style modifiers a user may have toggled on without meaning to
const LOCK_MODIFIERS: u16 = Modifiers::LOCK.bits() | Modifiers::MOD2.bits();

/// One grabbed key combination on a display
///
/// Only one registration can be live per `DisplayHandle` at a time, since
/// both would consume the same event queue. It stays claimed until it
/// reaches `Released` or `Cancelled`, or is dropped.
pub struct HotkeyRegistration<'d> {
    display: &'d DisplayHandle,
    combination: Combination,
    keycode: u8,
    grabbed: bool,
    claimed: bool,
    state: State,
}

impl<'d> HotkeyRegistration<'d> {
    /// Grab `combination` on the root window and listen for key presses
    ///
    /// A conflicting grab is not reported here: the server answers
    /// asynchronously and the error surfaces during `wait`.
    ///
    /// Fails with `AlreadyGrabbed` while another registration on the same
    /// display is still live.
    pub fn grab(display: &'d DisplayHandle, combination: Combination) -> Result<Self, HotkeyError> {
        if !display.claim_registration() {
            return Err(HotkeyError::AlreadyGrabbed);
        }
        let mut registration = Self {
            display,
            combination,
            keycode: 0,
            grabbed: false,
            claimed: true,
            state: State::Grabbing,
        };

        let conn = display.connection();
        registration.keycode = conn
            .keysym_to_keycode(combination.key.keysym())?
            .ok_or(HotkeyError::UnknownKey(combination.key))?;
        let keycode = registration.keycode;

        conn.grab_key(combination.modifiers.bits(), keycode)?;
        registration.grabbed = true;

        conn.select_key_press()?;
        conn.flush()?;

        info!(%combination, keycode, "hotkey grab requested");
        Ok(registration)
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn combination(&self) -> Combination {
        self.combination
    }

    pub fn keycode(&self) -> u8 {
        self.keycode
    }

    pub fn is_grabbed(&self) -> bool {
        self.grabbed
    }

    /// Whether an event's modifier state is exactly this combination
    ///
    /// Caps Lock and Num Lock are ignored unless the combination names them.
    fn modifiers_match(&self, state: u16) -> bool {
        let wanted = self.combination.modifiers.bits();
        let ignored = LOCK_MODIFIERS & !wanted;
        (state & MODIFIER_MASK & !ignored) == wanted
    }

    /// Block until the hotkey is released or `cancel` receives its message
    ///
    /// Events are handled one at a time in arrival order. Every press of
    /// the grabbed key with the combination's modifiers calls
    /// `on_key_down`; the first release after such a press calls
    /// `on_key_up` and ends the wait. Modifiers may already be let go at
    /// release time. A cancellation ends the wait without
    /// calling either handler, so a down may be left without its up.
    ///
    /// Protocol errors go to the installed interceptor. A grab conflict
    /// marks the registration `GrabFailed` but keeps waiting; the caller
    /// decides whether to cancel. Without an interceptor the error is
    /// returned as `HotkeyError::Protocol`.
    pub fn wait<H>(&mut self, cancel: &CancelWindow, handler: &mut H) -> Result<Outcome, HotkeyError>
    where
        H: HotkeyHandler + ?Sized,
    {
        if matches!(self.state, State::Released | State::Cancelled) {
            return Err(HotkeyError::NotGrabbed);
        }
        if self.state != State::GrabFailed {
            self.state = State::Waiting;
        }

        let display = self.display;
        let conn = display.connection();
        debug!(combination = %self.combination, "waiting for hotkey");

        let mut pressed = false;
        loop {
            let event = conn.next_event()?;

            match event {
                NativeEvent::KeyPress { keycode, state }
                    if keycode == self.keycode && self.modifiers_match(state) =>
                {
                    debug!(combination = %self.combination, "hotkey down");
                    pressed = true;
                    handler.on_key_down();
                }
                NativeEvent::KeyRelease { keycode, state }
                    if keycode == self.keycode && (pressed || self.modifiers_match(state)) =>
                {
                    debug!(combination = %self.combination, "hotkey up");
                    handler.on_key_up();
                    self.ungrab()?;
                    self.release_claim();
                    self.state = State::Released;
                    return Ok(Outcome::Released);
                }
                ref event if cancel.is_cancel(event) => {
                    info!(combination = %self.combination, "hotkey wait cancelled");
                    self.ungrab()?;
                    self.release_claim();
                    self.state = State::Cancelled;
                    return Ok(Outcome::Cancelled);
                }
                NativeEvent::Error(error) => {
                    if error.is_grab_conflict() {
                        warn!(
                            combination = %self.combination,
                            serial = error.serial,
                            "hotkey already grabbed by another client"
                        );
                        // The server never granted it, nothing to release
                        self.grabbed = false;
                        self.state = State::GrabFailed;
                    }
                    if !interceptor::dispatch(&error) {
                        return Err(HotkeyError::Protocol(error));
                    }
                }
                _ => {}
            }
        }
    }

    /// Release the grab if it is still held
    pub fn ungrab(&mut self) -> Result<(), HotkeyError> {
        if !self.grabbed {
            return Ok(());
        }
        self.grabbed = false;

        let conn = self.display.connection();
        conn.ungrab_key(self.combination.modifiers.bits(), self.keycode)?;
        conn.flush()?;

        debug!(combination = %self.combination, "hotkey ungrabbed");
        Ok(())
    }

    fn release_claim(&mut self) {
        if self.claimed {
            self.claimed = false;
            self.display.release_registration();
        }
    }
}

impl Drop for HotkeyRegistration<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.ungrab() {
            warn!(error = %e, combination = %self.combination, "failed to release hotkey grab");
        }
        self.release_claim();
    }
}
