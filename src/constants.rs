//! Compiler-wide constants.

/// Version of the KLL language specification this compiler implements.
pub const KLL_VERSION: &str = "0.5.7";

/// Compiler version, taken from the crate metadata.
pub const COMPILER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Highest legal USB HID keyboard usage code.
pub const MAX_KEYBOARD_CODE: u16 = 0xFF;

/// Highest legal USB HID consumer control usage code.
pub const MAX_CONSUMER_CODE: u16 = 0x3FF;

/// Highest legal USB HID system control usage code.
pub const MAX_SYSTEM_CODE: u16 = 0xFF;

/// Highest legal USB HID LED indicator usage code.
pub const MAX_INDICATOR_CODE: u16 = 0xFF;

/// Highest addressable scan code.
pub const MAX_SCAN_CODE: u16 = 0x3FF;

/// Highest analog schedule value (fully pressed).
pub const MAX_ANALOG_VALUE: u16 = 255;

/// Default emitter when none is requested.
pub const DEFAULT_EMITTER: &str = "kll";

/// Default output directory for file-producing emitters.
pub const DEFAULT_TARGET_DIR: &str = "generated";
