//! Key decoding for raw terminal input.
//!
//! Converts single input bytes to keys and keys to editor actions.

use bitflags::bitflags;

bitflags! {
    /// Modifier keys
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct Modifiers: u8 {
        const CTRL = 0b0001;
    }
}

/// A decoded key press.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Key {
    pub code: u8,
    pub modifiers: Modifiers,
}

impl Key {
    pub const fn plain(code: u8) -> Self {
        Self {
            code,
            modifiers: Modifiers::empty(),
        }
    }

    pub const fn ctrl(code: u8) -> Self {
        Self {
            code: code.to_ascii_lowercase(),
            modifiers: Modifiers::CTRL,
        }
    }
}

/// What the session should do with a key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    Quit,
    None,
}

/// Byte a terminal sends for Ctrl+`key`: the key with bits 5-7 cleared.
pub const fn ctrl_byte(key: u8) -> u8 {
    key & 0x1f
}

/// Maps input bytes to actions.
pub struct KeyMapper {
    quit: Key,
}

impl Default for KeyMapper {
    fn default() -> Self {
        Self::new(b'q')
    }
}

impl KeyMapper {
    /// `quit_key` is combined with Ctrl.
    pub fn new(quit_key: u8) -> Self {
        Self {
            quit: Key::ctrl(quit_key),
        }
    }

    /// Decode a raw byte. Ctrl+A..Ctrl+Z arrive as 0x01..0x1a.
    pub fn decode(byte: u8) -> Key {
        match byte {
            0x01..=0x1a => Key::ctrl(byte | 0x60),
            _ => Key::plain(byte),
        }
    }

    pub fn map(&self, byte: u8) -> Action {
        if byte == ctrl_byte(self.quit.code) {
            Action::Quit
        } else {
            Action::None
        }
    }

    pub fn quit_key(&self) -> Key {
        self.quit
    }
}
