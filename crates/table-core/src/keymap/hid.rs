//! USB HID Usage IDs (page 0x07, Keyboard/Keypad) used by barcode scanners.
//!
//! # What is a HID Usage ID? (for beginners)
//!
//! The USB HID standard numbers every key by its *physical position*, not by
//! the character it prints.  Letter A is 0x04, digit 1 is 0x1E, Enter is
//! 0x28.  The character depends on the modifier keys held at the same time:
//! usage 0x20 is `3` on its own and `#` with Shift (US layout, which is what
//! scanners emulate).
//!
//! Only the keys a scanner can type are modelled; every other usage decodes
//! to [`ScanKey::Other`] and is ignored.
//!
//! Reference: USB HID Usage Tables 1.3, Section 10.

use serde::{Deserialize, Serialize};

/// Modifier bits in byte 0 of a boot keyboard report.
pub const MOD_LEFT_SHIFT: u8 = 0x02;
pub const MOD_RIGHT_SHIFT: u8 = 0x20;

const USAGE_A: u8 = 0x04;
const USAGE_Z: u8 = 0x1D;
const USAGE_1: u8 = 0x1E;
const USAGE_0: u8 = 0x27;
const USAGE_KP_1: u8 = 0x59;
const USAGE_KP_0: u8 = 0x62;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScanKey {
    /// Uppercase ASCII letter.
    Letter(char),
    /// Digit 0–9 from the main row.
    Digit(u8),
    /// Digit 0–9 from the keypad; unaffected by Shift.
    KeypadDigit(u8),
    Enter,
    KeypadEnter,
    Tab,
    Space,
    Minus,
    Period,
    Slash,
    /// Any usage a scanner is not expected to send.
    Other(u8),
}

impl ScanKey {
    /// Maps a raw usage ID from a boot report.
    pub fn from_usage(usage: u8) -> Self {
        match usage {
            USAGE_A..=USAGE_Z => ScanKey::Letter((b'A' + (usage - USAGE_A)) as char),
            // The main row runs 1, 2, ... 9, 0.
            USAGE_1..=USAGE_0 => ScanKey::Digit((usage - USAGE_1 + 1) % 10),
            USAGE_KP_1..=USAGE_KP_0 => ScanKey::KeypadDigit((usage - USAGE_KP_1 + 1) % 10),
            0x28 => ScanKey::Enter,
            0x58 => ScanKey::KeypadEnter,
            0x2B => ScanKey::Tab,
            0x2C => ScanKey::Space,
            0x2D => ScanKey::Minus,
            0x37 => ScanKey::Period,
            0x38 => ScanKey::Slash,
            other => ScanKey::Other(other),
        }
    }

    /// `true` for the keys that end one scan.
    pub fn is_terminator(self) -> bool {
        matches!(self, ScanKey::Enter | ScanKey::KeypadEnter | ScanKey::Tab)
    }

    /// The character typed by this key, given the Shift state.
    ///
    /// Letters are returned uppercase regardless of Shift; card codes are
    /// case-insensitive.
    pub fn to_char(self, shift: bool) -> Option<char> {
        const SHIFTED_DIGITS: [char; 10] = [')', '!', '@', '#', '$', '%', '^', '&', '*', '('];
        match self {
            ScanKey::Letter(c) => Some(c),
            ScanKey::Digit(d) if shift => Some(SHIFTED_DIGITS[d as usize]),
            ScanKey::Digit(d) | ScanKey::KeypadDigit(d) => char::from_digit(d as u32, 10),
            ScanKey::Space => Some(' '),
            ScanKey::Minus => Some(if shift { '_' } else { '-' }),
            ScanKey::Period => Some(if shift { '>' } else { '.' }),
            ScanKey::Slash => Some(if shift { '?' } else { '/' }),
            ScanKey::Enter | ScanKey::KeypadEnter | ScanKey::Tab | ScanKey::Other(_) => None,
        }
    }
}
