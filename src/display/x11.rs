//! x11rb-backed connection
//!
//! `RustConnection` is thread safe, so a single connection can be blocked
//! in `wait_for_event` on the listener thread while another thread sends
//! the cancel message through it.

use x11rb::connection::Connection;
use x11rb::errors::{ConnectionError, ReplyError, ReplyOrIdError};
use x11rb::protocol::xproto::{
    ChangeWindowAttributesAux, ClientMessageEvent, ConnectionExt as _, CreateWindowAux,
    EventMask, GrabMode, ModMask, WindowClass,
};
use x11rb::protocol::Event;
use x11rb::rust_connection::RustConnection;
use x11rb::x11_utils::X11Error;
use x11rb::{COPY_DEPTH_FROM_PARENT, COPY_FROM_PARENT};

use crate::interceptor::ErrorEvent;

use super::{Atom, NativeEvent, Window, XConnection, XError};

/// A live connection to an X server
pub struct X11Connection {
    conn: RustConnection,
    root: Window,
}

impl X11Connection {
    /// Connect to `display`, or to `$DISPLAY` when `None`
    pub fn connect(display: Option<&str>) -> Result<Self, XError> {
        let (conn, screen_num) =
            RustConnection::connect(display).map_err(|e| XError::Connect(e.to_string()))?;
        let root = conn
            .setup()
            .roots
            .get(screen_num)
            .map(|screen| screen.root)
            .ok_or_else(|| XError::Connect(format!("screen {screen_num} does not exist")))?;

        Ok(Self { conn, root })
    }
}

fn connection_error(e: ConnectionError) -> XError {
    XError::Connection(e.to_string())
}

fn reply_error(e: ReplyError) -> XError {
    match e {
        ReplyError::ConnectionError(e) => connection_error(e),
        ReplyError::X11Error(e) => XError::Request(format!("{:?}", e.error_kind)),
    }
}

fn reply_or_id_error(e: ReplyOrIdError) -> XError {
    match e {
        ReplyOrIdError::ConnectionError(e) => connection_error(e),
        other => XError::Request(other.to_string()),
    }
}

impl From<&X11Error> for ErrorEvent {
    fn from(e: &X11Error) -> Self {
        Self {
            response_type: 0,
            serial: u64::from(e.sequence),
            error_code: e.error_code,
            request_code: e.major_opcode,
            minor_code: e.minor_opcode as u8,
        }
    }
}

impl XConnection for X11Connection {
    fn root(&self) -> Window {
        self.root
    }

    fn keysym_to_keycode(&self, keysym: u32) -> Result<Option<u8>, XError> {
        let setup = self.conn.setup();
        let min = setup.min_keycode;
        let count = setup.max_keycode - min + 1;

        let mapping = self
            .conn
            .get_keyboard_mapping(min, count)
            .map_err(connection_error)?
            .reply()
            .map_err(reply_error)?;

        let per_keycode = usize::from(mapping.keysyms_per_keycode);
        if per_keycode == 0 {
            return Ok(None);
        }

        let keycode = mapping
            .keysyms
            .chunks(per_keycode)
            .position(|syms| syms.contains(&keysym))
            .map(|index| min + index as u8);

        Ok(keycode)
    }

    fn grab_key(&self, modifiers: u16, keycode: u8) -> Result<(), XError> {
        // The cookie is dropped unchecked so a BadAccess lands in the event queue
        self.conn
            .grab_key(
                false,
                self.root,
                ModMask::from(modifiers),
                keycode,
                GrabMode::ASYNC,
                GrabMode::ASYNC,
            )
            .map_err(connection_error)?;
        Ok(())
    }

    fn ungrab_key(&self, modifiers: u16, keycode: u8) -> Result<(), XError> {
        self.conn
            .ungrab_key(keycode, self.root, ModMask::from(modifiers))
            .map_err(connection_error)?;
        Ok(())
    }

    fn select_key_press(&self) -> Result<(), XError> {
        let aux = ChangeWindowAttributesAux::new().event_mask(EventMask::KEY_PRESS);
        self.conn
            .change_window_attributes(self.root, &aux)
            .map_err(connection_error)?;
        Ok(())
    }

    fn next_event(&self) -> Result<NativeEvent, XError> {
        let event = self.conn.wait_for_event().map_err(connection_error)?;

        let native = match event {
            Event::KeyPress(e) => NativeEvent::KeyPress {
                keycode: e.detail,
                state: u16::from(e.state),
            },
            Event::KeyRelease(e) => NativeEvent::KeyRelease {
                keycode: e.detail,
                state: u16::from(e.state),
            },
            Event::ClientMessage(e) => NativeEvent::ClientMessage {
                window: e.window,
                message_type: e.type_,
            },
            Event::Error(e) => NativeEvent::Error(ErrorEvent::from(&e)),
            _ => NativeEvent::Other,
        };

        Ok(native)
    }

    fn create_input_only_window(&self) -> Result<Window, XError> {
        let window = self.conn.generate_id().map_err(reply_or_id_error)?;
        self.conn
            .create_window(
                COPY_DEPTH_FROM_PARENT,
                window,
                self.root,
                0,
                0,
                1,
                1,
                0,
                WindowClass::INPUT_ONLY,
                COPY_FROM_PARENT,
                &CreateWindowAux::new(),
            )
            .map_err(connection_error)?;
        Ok(window)
    }

    fn destroy_window(&self, window: Window) -> Result<(), XError> {
        self.conn.destroy_window(window).map_err(connection_error)?;
        Ok(())
    }

    fn intern_atom(&self, name: &str) -> Result<Atom, XError> {
        let reply = self
            .conn
            .intern_atom(false, name.as_bytes())
            .map_err(connection_error)?
            .reply()
            .map_err(reply_error)?;
        Ok(reply.atom)
    }

    fn send_client_message(&self, window: Window, message_type: Atom) -> Result<(), XError> {
        let event = ClientMessageEvent::new(8, window, message_type, [0u8; 20]);
        self.conn
            .send_event(false, window, EventMask::NO_EVENT, event)
            .map_err(connection_error)?;
        Ok(())
    }

    fn flush(&self) -> Result<(), XError> {
        self.conn.flush().map_err(connection_error)
    }
}
