//! Shared fixtures for end-to-end compiler tests.
#![allow(dead_code)] // Some fixtures reserved for future tests

use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tempfile::TempDir;

/// Path to the compiled kllc binary.
pub fn kllc_bin() -> &'static str {
    env!("CARGO_BIN_EXE_kllc")
}

/// Writes a KLL source file into a temp directory.
pub fn write_kll(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).expect("Failed to write fixture file");
    path
}

/// A small but representative base map: letters, a held modifier
/// combo, a scan code range, and physical positions.
pub fn basemap_source() -> &'static str {
    "# Test base map\n\
     S0x10 : U\"A\";\n\
     S0x11 : U\"B\";\n\
     S0x12 + S0x13 : U\"C\";\n\
     S[0x20-0x22] : U\"X\";\n\
     S0x10 <= x:0, y:0;\n\
     S0x11 <= x:19, y:0;\n"
}

/// Configuration with naming variables and display-mapping pitch.
pub fn config_source() -> &'static str {
    "Name = \"TestBoard\";\n\
     Version = \"0.1\";\n\
     USBProtocol = 1;\n"
}

/// Runs kllc with the given arguments in the given directory.
pub fn run_kllc(dir: &TempDir, args: &[&str]) -> std::process::Output {
    Command::new(kllc_bin())
        .current_dir(dir.path())
        .args(args)
        .output()
        .expect("Failed to execute kllc")
}
