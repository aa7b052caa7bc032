//! Embedded USB HID usage tables.
//!
//! KLL sources may name HID usages symbolically (`U"Enter"`,
//! `CONS"Eject"`, `SYS"Sleep"`, `I"NumLock"`). This module resolves
//! those names to numeric usage codes and back, for the usage pages
//! the language can address. The tables are embedded in the binary;
//! lookup is case-insensitive on the symbolic name.

use crate::models::id::HidKind;
use std::collections::HashMap;

/// USB HID keyboard usage page (0x07), the subset addressable from KLL.
static KEYBOARD_USAGES: &[(&str, u16)] = &[
    ("A", 0x04),
    ("B", 0x05),
    ("C", 0x06),
    ("D", 0x07),
    ("E", 0x08),
    ("F", 0x09),
    ("G", 0x0A),
    ("H", 0x0B),
    ("I", 0x0C),
    ("J", 0x0D),
    ("K", 0x0E),
    ("L", 0x0F),
    ("M", 0x10),
    ("N", 0x11),
    ("O", 0x12),
    ("P", 0x13),
    ("Q", 0x14),
    ("R", 0x15),
    ("S", 0x16),
    ("T", 0x17),
    ("U", 0x18),
    ("V", 0x19),
    ("W", 0x1A),
    ("X", 0x1B),
    ("Y", 0x1C),
    ("Z", 0x1D),
    ("1", 0x1E),
    ("2", 0x1F),
    ("3", 0x20),
    ("4", 0x21),
    ("5", 0x22),
    ("6", 0x23),
    ("7", 0x24),
    ("8", 0x25),
    ("9", 0x26),
    ("0", 0x27),
    ("Enter", 0x28),
    ("Esc", 0x29),
    ("Escape", 0x29),
    ("Backspace", 0x2A),
    ("Tab", 0x2B),
    ("Space", 0x2C),
    ("Minus", 0x2D),
    ("-", 0x2D),
    ("Equals", 0x2E),
    ("=", 0x2E),
    ("LBrace", 0x2F),
    ("[", 0x2F),
    ("RBrace", 0x30),
    ("]", 0x30),
    ("Backslash", 0x31),
    ("\\", 0x31),
    ("Number", 0x32),
    ("Semicolon", 0x33),
    (";", 0x33),
    ("Quote", 0x34),
    ("'", 0x34),
    ("Backtick", 0x35),
    ("`", 0x35),
    ("Comma", 0x36),
    (",", 0x36),
    ("Period", 0x37),
    (".", 0x37),
    ("Slash", 0x38),
    ("/", 0x38),
    ("CapsLock", 0x39),
    ("F1", 0x3A),
    ("F2", 0x3B),
    ("F3", 0x3C),
    ("F4", 0x3D),
    ("F5", 0x3E),
    ("F6", 0x3F),
    ("F7", 0x40),
    ("F8", 0x41),
    ("F9", 0x42),
    ("F10", 0x43),
    ("F11", 0x44),
    ("F12", 0x45),
    ("PrintScreen", 0x46),
    ("ScrollLock", 0x47),
    ("Pause", 0x48),
    ("Insert", 0x49),
    ("Home", 0x4A),
    ("PageUp", 0x4B),
    ("Delete", 0x4C),
    ("End", 0x4D),
    ("PageDown", 0x4E),
    ("Right", 0x4F),
    ("Left", 0x50),
    ("Down", 0x51),
    ("Up", 0x52),
    ("NumLock", 0x53),
    ("P/", 0x54),
    ("P*", 0x55),
    ("P-", 0x56),
    ("P+", 0x57),
    ("PEnter", 0x58),
    ("P1", 0x59),
    ("P2", 0x5A),
    ("P3", 0x5B),
    ("P4", 0x5C),
    ("P5", 0x5D),
    ("P6", 0x5E),
    ("P7", 0x5F),
    ("P8", 0x60),
    ("P9", 0x61),
    ("P0", 0x62),
    ("P.", 0x63),
    ("ISO/", 0x64),
    ("App", 0x65),
    ("F13", 0x68),
    ("F14", 0x69),
    ("F15", 0x6A),
    ("F16", 0x6B),
    ("F17", 0x6C),
    ("F18", 0x6D),
    ("F19", 0x6E),
    ("F20", 0x6F),
    ("F21", 0x70),
    ("F22", 0x71),
    ("F23", 0x72),
    ("F24", 0x73),
    ("LCtrl", 0xE0),
    ("LShift", 0xE1),
    ("LAlt", 0xE2),
    ("LGui", 0xE3),
    ("RCtrl", 0xE4),
    ("RShift", 0xE5),
    ("RAlt", 0xE6),
    ("RGui", 0xE7),
];

/// USB HID consumer control usage page (0x0C), common subset.
static CONSUMER_USAGES: &[(&str, u16)] = &[
    ("Power", 0x30),
    ("Reset", 0x31),
    ("Sleep", 0x32),
    ("Menu", 0x40),
    ("BrightnessUp", 0x6F),
    ("BrightnessDown", 0x70),
    ("Play", 0xB0),
    ("Pause", 0xB1),
    ("Record", 0xB2),
    ("FastForward", 0xB3),
    ("Rewind", 0xB4),
    ("NextTrack", 0xB5),
    ("PrevTrack", 0xB6),
    ("Stop", 0xB7),
    ("Eject", 0xB8),
    ("StopEject", 0xCC),
    ("PlayPause", 0xCD),
    ("Mute", 0xE2),
    ("BassBoost", 0xE5),
    ("Loudness", 0xE7),
    ("VolumeUp", 0xE9),
    ("VolumeDown", 0xEA),
    ("Mail", 0x18A),
    ("Calc", 0x192),
    ("Calculator", 0x192),
    ("WWWSearch", 0x221),
    ("WWWHome", 0x223),
    ("WWWBack", 0x224),
    ("WWWForward", 0x225),
    ("WWWStop", 0x226),
    ("WWWRefresh", 0x227),
    ("WWWFavorites", 0x22A),
];

/// USB HID system control usages (generic desktop page 0x01).
static SYSTEM_USAGES: &[(&str, u16)] = &[
    ("PowerDown", 0x81),
    ("Power", 0x81),
    ("Sleep", 0x82),
    ("WakeUp", 0x83),
    ("ContextMenu", 0x84),
    ("MainMenu", 0x85),
    ("AppMenu", 0x86),
    ("MenuHelp", 0x87),
    ("MenuExit", 0x88),
];

/// USB HID LED indicator usage page (0x08).
static INDICATOR_USAGES: &[(&str, u16)] = &[
    ("NumLock", 0x01),
    ("CapsLock", 0x02),
    ("ScrollLock", 0x03),
    ("Compose", 0x04),
    ("Kana", 0x05),
    ("Power", 0x06),
    ("Shift", 0x07),
    ("Mute", 0x09),
];

/// HID usage lookup tables with O(1) name resolution.
#[derive(Debug)]
pub struct HidDb {
    keyboard: HashMap<String, u16>,
    consumer: HashMap<String, u16>,
    system: HashMap<String, u16>,
    indicator: HashMap<String, u16>,
}

/// Uppercases table keys so lookup is case-insensitive.
fn build_table(usages: &[(&str, u16)]) -> HashMap<String, u16> {
    usages
        .iter()
        .map(|(name, code)| (name.to_uppercase(), *code))
        .collect()
}

impl HidDb {
    /// Builds the lookup tables from the embedded usage lists.
    #[must_use]
    pub fn new() -> Self {
        Self {
            keyboard: build_table(KEYBOARD_USAGES),
            consumer: build_table(CONSUMER_USAGES),
            system: build_table(SYSTEM_USAGES),
            indicator: build_table(INDICATOR_USAGES),
        }
    }

    /// Resolves a symbolic usage name to its numeric code.
    ///
    /// Lookup is case-insensitive. Returns `None` for unknown names or
    /// for the `Locale` page, which carries no symbolic table.
    #[must_use]
    pub fn lookup(&self, kind: HidKind, name: &str) -> Option<u16> {
        let table = self.table(kind)?;
        table.get(name.to_uppercase().as_str()).copied()
    }

    /// Reverse lookup: finds the canonical name for a usage code.
    #[must_use]
    pub fn name_of(&self, kind: HidKind, code: u16) -> Option<&'static str> {
        let list: &[(&str, u16)] = match kind {
            HidKind::Keyboard => KEYBOARD_USAGES,
            HidKind::Consumer => CONSUMER_USAGES,
            HidKind::System => SYSTEM_USAGES,
            HidKind::Indicator => INDICATOR_USAGES,
            HidKind::Locale => return None,
        };
        list.iter().find(|(_, c)| *c == code).map(|(n, _)| *n)
    }

    fn table(&self, kind: HidKind) -> Option<&HashMap<String, u16>> {
        match kind {
            HidKind::Keyboard => Some(&self.keyboard),
            HidKind::Consumer => Some(&self.consumer),
            HidKind::System => Some(&self.system),
            HidKind::Indicator => Some(&self.indicator),
            HidKind::Locale => None,
        }
    }
}

impl Default for HidDb {
    fn default() -> Self {
        Self::new()
    }
}
