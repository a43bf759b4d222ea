//! Parsers for the text output of `adb` subcommands

use regex::Regex;
use std::sync::LazyLock;

use adbscope_types::ProcessRecord;

/// One row of `adb shell ps`
static PS_ROW: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\S+)\s+(\d+)\s+(\d+)\s+(\d+)\s+(\d+)\s+(\S+)\s+(\S+)\s+(\S)\s+(\S+)")
        .expect("ps row pattern is valid")
});

/// One row of `adb devices`
static DEVICE_ROW: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(.*)\s+(\S+)").expect("device row pattern is valid"));

/// Most recent task in `dumpsys activity recents`
static RECENT_TASK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Recent #0: \S+\{\S+ \S+ \S+ \S+:([\S.]+)\}").expect("recents pattern is valid")
});

/// Parse `adb shell ps` output, skipping the header and malformed rows
pub fn parse_processes(output: &str) -> Vec<ProcessRecord> {
    output
        .lines()
        .filter_map(|line| {
            let caps = PS_ROW.captures(line)?;
            let field = |i: usize| caps[i].trim().to_string();
            Some(ProcessRecord {
                user: field(1),
                pid: field(2),
                ppid: field(3),
                vsz: field(4),
                rss: field(5),
                wchan: field(6),
                addr: field(7),
                state: field(8),
                name: field(9),
            })
        })
        .collect()
}

/// Parse `adb devices` output into serial numbers of attached devices
pub fn parse_devices(output: &str, emulator_only: bool) -> Vec<String> {
    let mut devices = Vec::new();

    for line in output.lines() {
        if line.to_lowercase().contains("list of devices attached") {
            continue;
        }
        let Some(caps) = DEVICE_ROW.captures(line) else {
            continue;
        };
        let serial = caps[1].trim();
        if serial.is_empty() || !caps[2].contains("device") {
            continue;
        }
        if emulator_only && !serial.to_lowercase().contains("emulator-") {
            tracing::warn!("Ignoring non emulator device: {}", serial);
            continue;
        }
        devices.push(serial.to_string());
    }

    devices
}

/// Parse `pm list packages` output into sorted package names
pub fn parse_packages(output: &str) -> Vec<String> {
    let mut packages: Vec<String> = output
        .lines()
        .filter_map(|line| line.strip_prefix("package:"))
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .collect();
    packages.sort();
    packages
}

/// Extract the package of the foreground task from `dumpsys activity recents`
pub fn parse_current_app(output: &str) -> Option<String> {
    RECENT_TASK
        .captures(output)
        .map(|caps| caps[1].to_string())
        .filter(|slug| !slug.is_empty())
}
