//! Identifier values: everything a KLL expression can name.
//!
//! Identifiers form a tagged union so that every consumer has to match
//! exhaustively; adding a new identifier kind breaks compilation of
//! every site that would otherwise silently ignore it.

use crate::constants;
use serde::Serialize;
use std::fmt;

/// USB HID usage page addressed by a HID identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HidKind {
    /// Keyboard usage page (`U"A"`, `U0x28`)
    Keyboard,
    /// Consumer control page (`CONS"Eject"`)
    Consumer,
    /// System control usages (`SYS"Sleep"`)
    System,
    /// LED indicator page (`I"NumLock"`)
    Indicator,
    /// Locale identifiers (layout-dependent)
    Locale,
}

impl HidKind {
    /// Highest legal usage code for this page.
    #[must_use]
    pub const fn max_code(self) -> u16 {
        match self {
            HidKind::Keyboard => constants::MAX_KEYBOARD_CODE,
            HidKind::Consumer => constants::MAX_CONSUMER_CODE,
            HidKind::System => constants::MAX_SYSTEM_CODE,
            HidKind::Indicator => constants::MAX_INDICATOR_CODE,
            HidKind::Locale => 0xFF,
        }
    }

    /// KLL namespace prefix for this page.
    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            HidKind::Keyboard => "U",
            HidKind::Consumer => "CONS",
            HidKind::System => "SYS",
            HidKind::Indicator => "I",
            HidKind::Locale => "LOCALE",
        }
    }
}

/// A USB HID usage: page, numeric code, and the symbolic name it was
/// written with (if any). The symbol is preserved for canonical
/// regeneration; equality is decided by page and code only.
#[derive(Debug, Clone, Serialize)]
pub struct HidId {
    /// Serialized as "page" so the id discriminator keeps the "kind" key
    #[serde(rename = "page")]
    pub kind: HidKind,
    pub code: u16,
    pub symbol: Option<String>,
}

impl HidId {
    /// Creates a HID id from a numeric code.
    #[must_use]
    pub const fn new(kind: HidKind, code: u16) -> Self {
        Self {
            kind,
            code,
            symbol: None,
        }
    }

    /// Creates a HID id resolved from a symbolic name.
    pub fn named(kind: HidKind, code: u16, symbol: impl Into<String>) -> Self {
        Self {
            kind,
            code,
            symbol: Some(symbol.into()),
        }
    }

    /// Checks the code against the legal range of the usage page.
    #[must_use]
    pub const fn in_range(&self) -> bool {
        self.code <= self.kind.max_code()
    }
}

impl PartialEq for HidId {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.code == other.code
    }
}

impl Eq for HidId {}

impl fmt::Display for HidId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.symbol {
            Some(symbol) => write!(f, "{}\"{}\"", self.kind.prefix(), symbol),
            None => write!(f, "{}0x{:02X}", self.kind.prefix(), self.code),
        }
    }
}

/// Physical key switch identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ScanCodeId {
    pub code: u16,
}

impl ScanCodeId {
    #[must_use]
    pub const fn new(code: u16) -> Self {
        Self { code }
    }
}

impl fmt::Display for ScanCodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S0x{:02X}", self.code)
    }
}

/// Pixel addressing mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelAddressMode {
    /// Absolute pixel index (`P[12]`)
    Absolute,
    /// Signed offset relative to the current pixel (`P[+1]`, `P[-2]`)
    RelativeSigned,
}

/// One channel of a pixel: channel index plus bit width (`30:8`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PixelChannel {
    pub channel: u16,
    pub width: u8,
}

impl fmt::Display for PixelChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.channel, self.width)
    }
}

/// An addressable pixel with optional channel tuples.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PixelId {
    /// Signed so relative addressing can carry direction; absolute
    /// indices are validated non-negative at parse time.
    pub index: i32,
    pub channels: Vec<PixelChannel>,
    pub address_mode: PixelAddressMode,
}

impl PixelId {
    /// Creates an absolute pixel id with no channels.
    #[must_use]
    pub const fn absolute(index: u32) -> Self {
        Self {
            index: index as i32,
            channels: Vec::new(),
            address_mode: PixelAddressMode::Absolute,
        }
    }
}

impl fmt::Display for PixelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.address_mode {
            PixelAddressMode::Absolute => write!(f, "P[{}]", self.index)?,
            PixelAddressMode::RelativeSigned => write!(f, "P[{:+}]", self.index)?,
        }
        if !self.channels.is_empty() {
            write!(f, "(")?;
            for (idx, channel) in self.channels.iter().enumerate() {
                if idx > 0 {
                    write!(f, ",")?;
                }
                write!(f, "{channel}")?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

/// A frame-buffer layer of pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PixelLayerId {
    pub index: u32,
}

impl fmt::Display for PixelLayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PL[{}]", self.index)
    }
}

/// Argument of an animation modifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ModifierArg {
    Number(i64),
    Name(String),
    /// Function-style value, e.g. `pfunc:interp(2)`
    Call(String, Vec<i64>),
}

impl fmt::Display for ModifierArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModifierArg::Number(n) => write!(f, "{n}"),
            ModifierArg::Name(name) => write!(f, "{name}"),
            ModifierArg::Call(name, args) => {
                write!(f, "{name}(")?;
                for (idx, arg) in args.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ")")
            }
        }
    }
}

/// A single animation setting or playback modifier (`loop`, `frames:12`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnimationModifier {
    pub name: String,
    pub arg: Option<ModifierArg>,
}

impl fmt::Display for AnimationModifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.arg {
            Some(arg) => write!(f, "{}:{}", self.name, arg),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Reference to a named animation, optionally with playback modifiers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnimationId {
    pub name: String,
    pub modifiers: Vec<AnimationModifier>,
}

impl fmt::Display for AnimationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "A[{}]", self.name)?;
        if !self.modifiers.is_empty() {
            write!(f, "(")?;
            for (idx, modifier) in self.modifiers.iter().enumerate() {
                if idx > 0 {
                    write!(f, ",")?;
                }
                write!(f, "{modifier}")?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

/// Argument in a capability invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum CapabilityArg {
    Int(i64),
    Str(String),
}

impl fmt::Display for CapabilityArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapabilityArg::Int(n) => write!(f, "{n}"),
            CapabilityArg::Str(s) => write!(f, "\"{s}\""),
        }
    }
}

/// Invocation of a named firmware capability with arguments.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CapabilityCall {
    pub name: String,
    pub args: Vec<CapabilityArg>,
}

impl fmt::Display for CapabilityCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (idx, arg) in self.args.iter().enumerate() {
            if idx > 0 {
                write!(f, ",")?;
            }
            write!(f, "{arg}")?;
        }
        write!(f, ")")
    }
}

/// How a layer id manipulates the layer stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerMode {
    /// Active while held
    Shift,
    /// Active until the next key press
    Latch,
    /// Toggled on/off
    Lock,
    /// Plain layer reference
    Default,
}

impl LayerMode {
    /// KLL namespace prefix for this mode.
    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            LayerMode::Shift => "LayerShift",
            LayerMode::Latch => "LayerLatch",
            LayerMode::Lock => "LayerLock",
            LayerMode::Default => "Layer",
        }
    }
}

/// Layer stack operation target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LayerId {
    pub mode: LayerMode,
    pub index: u32,
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.mode.prefix(), self.index)
    }
}

/// Generic trigger: a firmware-defined trigger bank and index (`T[5,2]`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GenericTriggerId {
    pub group: u16,
    pub index: u16,
}

impl fmt::Display for GenericTriggerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T[{},{}]", self.group, self.index)
    }
}

/// Tagged union over the kinds of things a KLL expression can name.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Id {
    Hid(HidId),
    ScanCode(ScanCodeId),
    Pixel(PixelId),
    PixelLayer(PixelLayerId),
    Animation(AnimationId),
    Capability(CapabilityCall),
    Layer(LayerId),
    GenericTrigger(GenericTriggerId),
    /// Unicode code point (`U+2603`)
    Unicode { point: u32 },
    /// Raw character string (`'abc'`), expanded by the firmware
    Text { text: String },
    /// The `None` result sentinel
    None,
}

impl Id {
    /// Validates numeric ranges for this identifier kind.
    ///
    /// # Errors
    ///
    /// Returns a description of the violated range.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Id::Hid(hid) => {
                if hid.in_range() {
                    Ok(())
                } else {
                    Err(format!(
                        "{} code 0x{:X} exceeds the {} page maximum 0x{:X}",
                        hid.kind.prefix(),
                        hid.code,
                        hid.kind.prefix(),
                        hid.kind.max_code()
                    ))
                }
            }
            Id::ScanCode(scan) => {
                if scan.code <= constants::MAX_SCAN_CODE {
                    Ok(())
                } else {
                    Err(format!(
                        "scan code 0x{:X} exceeds maximum 0x{:X}",
                        scan.code,
                        constants::MAX_SCAN_CODE
                    ))
                }
            }
            Id::Pixel(pixel) => {
                if pixel.address_mode == PixelAddressMode::Absolute && pixel.index < 0 {
                    Err(format!("pixel index {} must be non-negative", pixel.index))
                } else {
                    Ok(())
                }
            }
            Id::Unicode { point } => {
                if *point <= 0x0010_FFFF {
                    Ok(())
                } else {
                    Err(format!("U+{point:X} is outside the Unicode range"))
                }
            }
            _ => Ok(()),
        }
    }

    /// Returns the scan code when this id is one.
    #[must_use]
    pub const fn as_scan_code(&self) -> Option<u16> {
        match self {
            Id::ScanCode(scan) => Some(scan.code),
            _ => None,
        }
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Id::Hid(id) => write!(f, "{id}"),
            Id::ScanCode(id) => write!(f, "{id}"),
            Id::Pixel(id) => write!(f, "{id}"),
            Id::PixelLayer(id) => write!(f, "{id}"),
            Id::Animation(id) => write!(f, "{id}"),
            Id::Capability(id) => write!(f, "{id}"),
            Id::Layer(id) => write!(f, "{id}"),
            Id::GenericTrigger(id) => write!(f, "{id}"),
            Id::Unicode { point } => write!(f, "U+{point:04X}"),
            Id::Text { text } => write!(f, "'{text}'"),
            Id::None => write!(f, "None"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hid_display_prefers_symbol() {
        let named = HidId::named(HidKind::Keyboard, 0x04, "A");
        assert_eq!(named.to_string(), "U\"A\"");

        let numeric = HidId::new(HidKind::Keyboard, 0x28);
        assert_eq!(numeric.to_string(), "U0x28");
    }

    #[test]
    fn test_hid_equality_ignores_symbol() {
        let named = HidId::named(HidKind::Keyboard, 0x04, "A");
        let numeric = HidId::new(HidKind::Keyboard, 0x04);
        assert_eq!(named, numeric);
    }

    #[test]
    fn test_hid_range_validation() {
        let ok = Id::Hid(HidId::new(HidKind::Keyboard, 0xFF));
        assert!(ok.validate().is_ok());

        let bad = Id::Hid(HidId::new(HidKind::Keyboard, 0x100));
        assert!(bad.validate().is_err());

        let consumer = Id::Hid(HidId::new(HidKind::Consumer, 0x3FF));
        assert!(consumer.validate().is_ok());
    }

    #[test]
    fn test_scan_code_display() {
        assert_eq!(ScanCodeId::new(0x43).to_string(), "S0x43");
        assert_eq!(ScanCodeId::new(0x05).to_string(), "S0x05");
    }

    #[test]
    fn test_pixel_display() {
        let plain = PixelId::absolute(12);
        assert_eq!(plain.to_string(), "P[12]");

        let with_channels = PixelId {
            index: 5,
            channels: vec![
                PixelChannel {
                    channel: 30,
                    width: 8,
                },
                PixelChannel {
                    channel: 31,
                    width: 8,
                },
            ],
            address_mode: PixelAddressMode::Absolute,
        };
        assert_eq!(with_channels.to_string(), "P[5](30:8,31:8)");

        let relative = PixelId {
            index: -2,
            channels: Vec::new(),
            address_mode: PixelAddressMode::RelativeSigned,
        };
        assert_eq!(relative.to_string(), "P[-2]");
    }

    #[test]
    fn test_layer_display() {
        let shift = LayerId {
            mode: LayerMode::Shift,
            index: 1,
        };
        assert_eq!(shift.to_string(), "LayerShift[1]");

        let plain = LayerId {
            mode: LayerMode::Default,
            index: 2,
        };
        assert_eq!(plain.to_string(), "Layer[2]");
    }

    #[test]
    fn test_capability_display() {
        let call = CapabilityCall {
            name: "fadeLayer".to_string(),
            args: vec![CapabilityArg::Int(1), CapabilityArg::Int(-3)],
        };
        assert_eq!(call.to_string(), "fadeLayer(1,-3)");
    }

    #[test]
    fn test_unicode_display() {
        assert_eq!(Id::Unicode { point: 0x2603 }.to_string(), "U+2603");
        assert_eq!(Id::Unicode { point: 0x41 }.to_string(), "U+0041");
    }
}
