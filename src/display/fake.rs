//! In-process X server stand-in for tests
//!
//! Models only what the hotkey loop relies on: a grab table shared by all
//! clients, per-client FIFO event queues, BadAccess delivery for
//! conflicting grabs, and client messages routed to the window owner.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::interceptor::{ErrorEvent, BAD_ACCESS, GRAB_KEY_REQUEST};

use super::{Atom, NativeEvent, Window, XConnection, XError};

const ROOT: Window = 0x100;

/// Deterministic keysym -> keycode table
pub(crate) fn fake_keycode(keysym: u32) -> Option<u8> {
    match keysym {
        0x20..=0x7e => Some((keysym - 0x20 + 10) as u8),
        0xffbe..=0xffc9 => Some((keysym - 0xffbe + 200) as u8),
        0xff09 => Some(23),
        0xff0d => Some(36),
        0xff1b => Some(9),
        _ => None,
    }
}

#[derive(Default)]
struct ClientQueue {
    events: Mutex<VecDeque<NativeEvent>>,
    ready: Condvar,
}

impl ClientQueue {
    fn push(&self, event: NativeEvent) {
        self.events.lock().push_back(event);
        self.ready.notify_all();
    }
}

#[derive(Default)]
struct ServerState {
    next_client: u32,
    next_window: Window,
    next_atom: Atom,
    next_serial: u64,
    clients: HashMap<u32, Arc<ClientQueue>>,
    grabs: HashMap<(u8, u16), u32>,
    windows: HashMap<Window, u32>,
    atoms: HashMap<String, Atom>,
    key_press_selected: HashSet<u32>,
}

#[derive(Default)]
struct Shared {
    state: Mutex<ServerState>,
    flushes: AtomicUsize,
    grants: AtomicUsize,
}

/// Handle used by tests to drive the fake server
#[derive(Clone, Default)]
pub(crate) struct FakeServer {
    shared: Arc<Shared>,
}

impl FakeServer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Open a new client connection
    pub(crate) fn connect(&self) -> Arc<dyn XConnection> {
        let queue = Arc::new(ClientQueue::default());
        let mut state = self.shared.state.lock();
        state.next_client += 1;
        let id = state.next_client;
        state.clients.insert(id, Arc::clone(&queue));

        Arc::new(FakeConnection {
            id,
            shared: Arc::clone(&self.shared),
            queue,
        })
    }

    /// Simulate the user pressing `keysym` with `modifiers` held
    pub(crate) fn press(&self, keysym: u32, modifiers: u16) {
        self.deliver(keysym, modifiers, true);
    }

    /// Simulate the user releasing `keysym`
    pub(crate) fn release(&self, keysym: u32, modifiers: u16) {
        self.deliver(keysym, modifiers, false);
    }

    fn deliver(&self, keysym: u32, modifiers: u16, pressed: bool) {
        let Some(keycode) = fake_keycode(keysym) else {
            return;
        };
        let event = if pressed {
            NativeEvent::KeyPress { keycode, state: modifiers }
        } else {
            NativeEvent::KeyRelease { keycode, state: modifiers }
        };

        let state = self.shared.state.lock();
        match state.grabs.get(&(keycode, modifiers)) {
            Some(owner) => {
                if let Some(queue) = state.clients.get(owner) {
                    queue.push(event);
                }
            }
            // Ungrabbed presses go to whoever listens on the root window
            None if pressed => {
                for client in &state.key_press_selected {
                    if let Some(queue) = state.clients.get(client) {
                        queue.push(event.clone());
                    }
                }
            }
            None => {}
        }
    }

    pub(crate) fn is_grabbed(&self, keysym: u32, modifiers: u16) -> bool {
        let Some(keycode) = fake_keycode(keysym) else {
            return false;
        };
        let state = self.shared.state.lock();
        state.grabs.contains_key(&(keycode, modifiers))
    }

    pub(crate) fn window_count(&self) -> usize {
        self.shared.state.lock().windows.len()
    }

    pub(crate) fn client_count(&self) -> usize {
        self.shared.state.lock().clients.len()
    }

    pub(crate) fn flush_count(&self) -> usize {
        self.shared.flushes.load(Ordering::SeqCst)
    }

    /// Number of grab requests the server has granted so far
    pub(crate) fn grant_count(&self) -> usize {
        self.shared.grants.load(Ordering::SeqCst)
    }
}

struct FakeConnection {
    id: u32,
    shared: Arc<Shared>,
    queue: Arc<ClientQueue>,
}

impl XConnection for FakeConnection {
    fn root(&self) -> Window {
        ROOT
    }

    fn keysym_to_keycode(&self, keysym: u32) -> Result<Option<u8>, XError> {
        Ok(fake_keycode(keysym))
    }

    fn grab_key(&self, modifiers: u16, keycode: u8) -> Result<(), XError> {
        let mut state = self.shared.state.lock();
        state.next_serial += 1;
        let serial = state.next_serial;

        match state.grabs.get(&(keycode, modifiers)) {
            Some(&owner) if owner != self.id => {
                self.queue.push(NativeEvent::Error(ErrorEvent {
                    response_type: 0,
                    serial,
                    error_code: BAD_ACCESS,
                    request_code: GRAB_KEY_REQUEST,
                    minor_code: 0,
                }));
            }
            _ => {
                state.grabs.insert((keycode, modifiers), self.id);
                self.shared.grants.fetch_add(1, Ordering::SeqCst);
            }
        }
        Ok(())
    }

    fn ungrab_key(&self, modifiers: u16, keycode: u8) -> Result<(), XError> {
        let mut state = self.shared.state.lock();
        if state.grabs.get(&(keycode, modifiers)) == Some(&self.id) {
            state.grabs.remove(&(keycode, modifiers));
        }
        Ok(())
    }

    fn select_key_press(&self) -> Result<(), XError> {
        self.shared.state.lock().key_press_selected.insert(self.id);
        Ok(())
    }

    fn next_event(&self) -> Result<NativeEvent, XError> {
        let mut events = self.queue.events.lock();
        loop {
            if let Some(event) = events.pop_front() {
                return Ok(event);
            }
            self.queue.ready.wait(&mut events);
        }
    }

    fn create_input_only_window(&self) -> Result<Window, XError> {
        let mut state = self.shared.state.lock();
        state.next_window += 1;
        let window = ROOT + state.next_window;
        state.windows.insert(window, self.id);
        Ok(window)
    }

    fn destroy_window(&self, window: Window) -> Result<(), XError> {
        let mut state = self.shared.state.lock();
        match state.windows.remove(&window) {
            Some(_) => Ok(()),
            None => Err(XError::Request(format!("BadWindow {window:#x}"))),
        }
    }

    fn intern_atom(&self, name: &str) -> Result<Atom, XError> {
        let mut state = self.shared.state.lock();
        if let Some(&atom) = state.atoms.get(name) {
            return Ok(atom);
        }
        state.next_atom += 1;
        let atom = 300 + state.next_atom;
        state.atoms.insert(name.to_string(), atom);
        Ok(atom)
    }

    fn send_client_message(&self, window: Window, message_type: Atom) -> Result<(), XError> {
        let state = self.shared.state.lock();
        let owner = state
            .windows
            .get(&window)
            .ok_or_else(|| XError::Request(format!("BadWindow {window:#x}")))?;
        if let Some(queue) = state.clients.get(owner) {
            queue.push(NativeEvent::ClientMessage { window, message_type });
        }
        Ok(())
    }

    fn flush(&self) -> Result<(), XError> {
        self.shared.flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl Drop for FakeConnection {
    fn drop(&mut self) {
        // Disconnecting releases everything the client held
        let mut state = self.shared.state.lock();
        let id = self.id;
        state.clients.remove(&id);
        state.grabs.retain(|_, owner| *owner != id);
        state.windows.retain(|_, owner| *owner != id);
        state.key_press_selected.remove(&id);
    }
}
