//! Modifier key definitions and conversions
//!
//! Windows describes modifier keys in two ways: the `MOD_*` flags accepted by
//! global hotkey registration and the `HOTKEYF_*` flags reported by the
//! hotkey edit control. This module provides both encodings, the conversion
//! between them, and a small chord type used for logging and matching.

use std::fmt;

use bitflags::bitflags;

bitflags! {
    /// Modifier flags used when registering a global hotkey (`MOD_*`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Modifiers: u16 {
        /// Either Alt key
        const ALT = 0x0001;
        /// Either Control key
        const CONTROL = 0x0002;
        /// Either Shift key
        const SHIFT = 0x0004;
        /// Either Windows key
        const WIN = 0x0008;
    }
}

bitflags! {
    /// Modifier flags used by the hotkey control (`HOTKEYF_*`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct HotkeyFlags: u16 {
        /// Shift key
        const SHIFT = 0x01;
        /// Control key
        const CONTROL = 0x02;
        /// Alt key
        const ALT = 0x04;
        /// Extended key
        const EXT = 0x08;
    }
}

/// Convert hotkey-control flags into registration modifiers.
///
/// Only control, alt and shift are carried across.
pub fn flags_to_modifiers(flags: HotkeyFlags) -> Modifiers {
    let mut mods = Modifiers::empty();
    mods.set(Modifiers::CONTROL, flags.contains(HotkeyFlags::CONTROL));
    mods.set(Modifiers::ALT, flags.contains(HotkeyFlags::ALT));
    mods.set(Modifiers::SHIFT, flags.contains(HotkeyFlags::SHIFT));
    mods
}

/// Convert registration modifiers into hotkey-control flags.
pub fn modifiers_to_flags(mods: Modifiers) -> HotkeyFlags {
    let mut flags = HotkeyFlags::empty();
    flags.set(HotkeyFlags::CONTROL, mods.contains(Modifiers::CONTROL));
    flags.set(HotkeyFlags::ALT, mods.contains(Modifiers::ALT));
    flags.set(HotkeyFlags::SHIFT, mods.contains(Modifiers::SHIFT));
    flags
}

impl Modifiers {
    /// Parse a single modifier name such as `ctrl`, `alt`, `shift` or `win`.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "ctrl" | "control" => Some(Self::CONTROL),
            "alt" | "menu" => Some(Self::ALT),
            "shift" => Some(Self::SHIFT),
            "win" | "meta" | "super" => Some(Self::WIN),
            _ => None,
        }
    }
}

impl fmt::Display for Modifiers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (flag, name) in [
            (Self::CONTROL, "Ctrl"),
            (Self::ALT, "Alt"),
            (Self::SHIFT, "Shift"),
            (Self::WIN, "Win"),
        ] {
            if self.contains(flag) {
                if !first {
                    f.write_str("+")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}

/// Map a character to its virtual key code.
///
/// Letters map to their upper-case ASCII value and digits to their ASCII
/// value, matching the `VK_A..VK_Z` and `VK_0..VK_9` ranges.
pub fn key_code_for_char(c: char) -> Option<u16> {
    if c.is_ascii_alphabetic() {
        Some(c.to_ascii_uppercase() as u16)
    } else if c.is_ascii_digit() {
        Some(c as u16)
    } else {
        None
    }
}

/// A modifier set plus a virtual key code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Chord {
    /// Modifier keys that must be held
    pub modifiers: Modifiers,
    /// Virtual key code
    pub key: u16,
}

impl Chord {
    /// Create a new chord
    pub fn new(modifiers: Modifiers, key: u16) -> Self {
        Self { modifiers, key }
    }

    /// Pack the chord the way `MAKELONG(key, modifiers)` does.
    pub fn packed(&self) -> u32 {
        u32::from(self.key) | (u32::from(self.modifiers.bits()) << 16)
    }
}

impl fmt::Display for Chord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.modifiers.is_empty() {
            write!(f, "{}+", self.modifiers)?;
        }
        match self.key {
            0x30..=0x39 | 0x41..=0x5A => write!(f, "{}", self.key as u8 as char),
            _ => write!(f, "0x{:02X}", self.key),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codec_round_trip() {
        for bits in 0u16..8 {
            let flags = HotkeyFlags::from_bits_truncate(bits);
            assert_eq!(modifiers_to_flags(flags_to_modifiers(flags)), flags);

            let mods = Modifiers::from_bits_truncate(bits);
            assert_eq!(flags_to_modifiers(modifiers_to_flags(mods)), mods);
        }
    }

    #[test]
    fn test_codec_bit_values() {
        assert_eq!(
            flags_to_modifiers(HotkeyFlags::SHIFT).bits(),
            Modifiers::SHIFT.bits()
        );
        assert_eq!(modifiers_to_flags(Modifiers::ALT).bits(), 0x04);
        assert_eq!(modifiers_to_flags(Modifiers::SHIFT).bits(), 0x01);
        assert_eq!(
            modifiers_to_flags(Modifiers::CONTROL | Modifiers::ALT).bits(),
            0x06
        );
    }

    #[test]
    fn test_codec_drops_unshared_bits() {
        assert!(modifiers_to_flags(Modifiers::WIN).is_empty());
        assert!(flags_to_modifiers(HotkeyFlags::EXT).is_empty());
    }

    #[test]
    fn test_modifier_names() {
        assert_eq!(Modifiers::parse("Ctrl"), Some(Modifiers::CONTROL));
        assert_eq!(Modifiers::parse(" alt "), Some(Modifiers::ALT));
        assert_eq!(Modifiers::parse("win"), Some(Modifiers::WIN));
        assert_eq!(Modifiers::parse("hyper"), None);
    }

    #[test]
    fn test_key_codes() {
        assert_eq!(key_code_for_char('q'), Some(0x51));
        assert_eq!(key_code_for_char('Q'), Some(0x51));
        assert_eq!(key_code_for_char('1'), Some(0x31));
        assert_eq!(key_code_for_char('-'), None);
    }

    #[test]
    fn test_chord_display_and_packing() {
        let chord = Chord::new(Modifiers::CONTROL | Modifiers::ALT, 0x51);
        assert_eq!(chord.to_string(), "Ctrl+Alt+Q");
        assert_eq!(chord.packed(), 0x0003_0051);
        assert_eq!(Chord::new(Modifiers::empty(), 0x70).to_string(), "0x70");
    }
}
