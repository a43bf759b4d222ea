//! Android Debug Bridge client for adbscope
//!
//! This crate wraps the `adb` binary for listing devices, packages and
//! processes, and for spawning the `logcat` stream.

mod client;
mod output;

pub use client::{AdbClient, AdbError, Connection, ProcessLister, resolve_pid};
pub use output::{parse_current_app, parse_devices, parse_packages, parse_processes};

// Re-export types that are used in our public API
pub use adbscope_types::ProcessRecord;
