//! Modifier masks, key symbols and hotkey combinations
//!
//! Values are the X11 core protocol ones (see X11/X.h and X11/keysymdef.h).
//! They are opaque to the listener: modifiers are only ever OR-ed together.

use std::fmt;
use std::ops::BitOr;
use std::str::FromStr;

/// Bitset of modifier keys that must be held with the hotkey
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Modifiers(u16);

impl Modifiers {
    pub const NONE: Modifiers = Modifiers(0);
    pub const SHIFT: Modifiers = Modifiers(1 << 0);
    pub const LOCK: Modifiers = Modifiers(1 << 1);
    pub const CONTROL: Modifiers = Modifiers(1 << 2);
    pub const MOD1: Modifiers = Modifiers(1 << 3);
    pub const MOD2: Modifiers = Modifiers(1 << 4);
    pub const MOD3: Modifiers = Modifiers(1 << 5);
    pub const MOD4: Modifiers = Modifiers(1 << 6);
    pub const MOD5: Modifiers = Modifiers(1 << 7);

    /// Alt on most keyboard layouts
    pub const ALT: Modifiers = Modifiers::MOD1;
    /// Super/Windows key on most keyboard layouts
    pub const SUPER: Modifiers = Modifiers::MOD4;

    pub const fn from_bits(bits: u16) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u16 {
        self.0
    }

    pub const fn contains(self, other: Modifiers) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for Modifiers {
    type Output = Modifiers;

    fn bitor(self, rhs: Modifiers) -> Modifiers {
        Modifiers(self.0 | rhs.0)
    }
}

// Order used when formatting a combination
const MODIFIER_NAMES: [(Modifiers, &str); 8] = [
    (Modifiers::CONTROL, "ctrl"),
    (Modifiers::SHIFT, "shift"),
    (Modifiers::MOD1, "alt"),
    (Modifiers::MOD4, "super"),
    (Modifiers::LOCK, "lock"),
    (Modifiers::MOD2, "mod2"),
    (Modifiers::MOD3, "mod3"),
    (Modifiers::MOD5, "mod5"),
];

fn parse_modifier(name: &str) -> Option<Modifiers> {
    let modifier = match name {
        "ctrl" | "control" => Modifiers::CONTROL,
        "shift" => Modifiers::SHIFT,
        "alt" | "mod1" => Modifiers::MOD1,
        "super" | "win" | "mod4" => Modifiers::MOD4,
        "lock" => Modifiers::LOCK,
        "mod2" => Modifiers::MOD2,
        "mod3" => Modifiers::MOD3,
        "mod5" => Modifiers::MOD5,
        _ => return None,
    };
    Some(modifier)
}

/// A logical key, identified by its X keysym
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Key(u32);

impl Key {
    pub const SPACE: Key = Key(0x0020);
    pub const KEY_0: Key = Key(0x0030);
    pub const KEY_1: Key = Key(0x0031);
    pub const KEY_2: Key = Key(0x0032);
    pub const KEY_3: Key = Key(0x0033);
    pub const KEY_4: Key = Key(0x0034);
    pub const KEY_5: Key = Key(0x0035);
    pub const KEY_6: Key = Key(0x0036);
    pub const KEY_7: Key = Key(0x0037);
    pub const KEY_8: Key = Key(0x0038);
    pub const KEY_9: Key = Key(0x0039);
    pub const A: Key = Key(0x0061);
    pub const B: Key = Key(0x0062);
    pub const C: Key = Key(0x0063);
    pub const D: Key = Key(0x0064);
    pub const E: Key = Key(0x0065);
    pub const F: Key = Key(0x0066);
    pub const G: Key = Key(0x0067);
    pub const H: Key = Key(0x0068);
    pub const I: Key = Key(0x0069);
    pub const J: Key = Key(0x006a);
    pub const K: Key = Key(0x006b);
    pub const L: Key = Key(0x006c);
    pub const M: Key = Key(0x006d);
    pub const N: Key = Key(0x006e);
    pub const O: Key = Key(0x006f);
    pub const P: Key = Key(0x0070);
    pub const Q: Key = Key(0x0071);
    pub const R: Key = Key(0x0072);
    pub const S: Key = Key(0x0073);
    pub const T: Key = Key(0x0074);
    pub const U: Key = Key(0x0075);
    pub const V: Key = Key(0x0076);
    pub const W: Key = Key(0x0077);
    pub const X: Key = Key(0x0078);
    pub const Y: Key = Key(0x0079);
    pub const Z: Key = Key(0x007a);
    pub const TAB: Key = Key(0xff09);
    pub const RETURN: Key = Key(0xff0d);
    pub const ESCAPE: Key = Key(0xff1b);
    pub const F1: Key = Key(0xffbe);
    pub const F2: Key = Key(0xffbf);
    pub const F3: Key = Key(0xffc0);
    pub const F4: Key = Key(0xffc1);
    pub const F5: Key = Key(0xffc2);
    pub const F6: Key = Key(0xffc3);
    pub const F7: Key = Key(0xffc4);
    pub const F8: Key = Key(0xffc5);
    pub const F9: Key = Key(0xffc6);
    pub const F10: Key = Key(0xffc7);
    pub const F11: Key = Key(0xffc8);
    pub const F12: Key = Key(0xffc9);

    /// Wrap a raw keysym
    pub const fn from_keysym(keysym: u32) -> Self {
        Self(keysym)
    }

    pub const fn keysym(self) -> u32 {
        self.0
    }

    fn parse(name: &str) -> Option<Key> {
        let mut chars = name.chars();
        if let (Some(c), None) = (chars.next(), chars.next()) {
            return match c {
                'a'..='z' | '0'..='9' => Some(Key(c as u32)),
                _ => None,
            };
        }

        let key = match name {
            "space" => Key::SPACE,
            "tab" => Key::TAB,
            "return" | "enter" => Key::RETURN,
            "escape" | "esc" => Key::ESCAPE,
            _ => {
                let number: u32 = name.strip_prefix('f')?.parse().ok()?;
                if !(1..=12).contains(&number) {
                    return None;
                }
                Key(Key::F1.0 + number - 1)
            }
        };
        Some(key)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Key::SPACE => write!(f, "space"),
            Key::TAB => write!(f, "tab"),
            Key::RETURN => write!(f, "return"),
            Key::ESCAPE => write!(f, "escape"),
            Key(sym @ (0x30..=0x39 | 0x61..=0x7a)) => {
                write!(f, "{}", char::from(sym as u8))
            }
            Key(sym) if (Key::F1.0..=Key::F12.0).contains(&sym) => {
                write!(f, "f{}", sym - Key::F1.0 + 1)
            }
            Key(sym) => write!(f, "{sym:#06x}"),
        }
    }
}

/// A modifier mask plus exactly one key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Combination {
    pub modifiers: Modifiers,
    pub key: Key,
}

impl Combination {
    pub fn new(modifiers: Modifiers, key: Key) -> Self {
        Self { modifiers, key }
    }
}

/// A combination string could not be parsed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseCombinationError {
    #[error("empty hotkey combination")]
    Empty,

    #[error("unknown key or modifier: {0}")]
    Unknown(String),

    #[error("hotkey combination has no key")]
    MissingKey,

    #[error("hotkey combination has more than one key: {0}")]
    MultipleKeys(String),
}

impl FromStr for Combination {
    type Err = ParseCombinationError;

    /// Parse `"ctrl+shift+h"` style strings (case insensitive)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        if s.is_empty() {
            return Err(ParseCombinationError::Empty);
        }

        let mut modifiers = Modifiers::NONE;
        let mut key = None;

        for part in s.split('+').map(str::trim) {
            if let Some(modifier) = parse_modifier(part) {
                modifiers = modifiers | modifier;
            } else if let Some(parsed) = Key::parse(part) {
                if key.replace(parsed).is_some() {
                    return Err(ParseCombinationError::MultipleKeys(s.clone()));
                }
            } else {
                return Err(ParseCombinationError::Unknown(part.to_string()));
            }
        }

        let key = key.ok_or(ParseCombinationError::MissingKey)?;
        Ok(Self { modifiers, key })
    }
}

impl fmt::Display for Combination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (modifier, name) in MODIFIER_NAMES {
            if self.modifiers.contains(modifier) {
                write!(f, "{name}+")?;
            }
        }
        write!(f, "{}", self.key)
    }
}
