use regex::Regex;
use std::sync::LazyLock;

use adbscope_types::{Level, ParsedLine};

/// `MM-DD HH:MM:SS.mmm  PID  TID  L  TAG: MESSAGE` (logcat "threadtime" format)
static THREADTIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(\d{2}-\d{2})\s(\d{2}:\d{2}:\d{2}\.\d{3})\s+(\d+)\s+(\d+)\s+(\S)\s+([^(:]*):\s+([^\n]*)",
    )
    .expect("threadtime pattern is valid")
});

/// Log parser for splitting raw logcat lines into fields
pub struct LogParser;

impl LogParser {
    /// Parse a raw logcat line.
    ///
    /// Returns `None` for lines that do not follow the threadtime layout
    /// (buffer banners, wrapped output, unknown severity letters). Those are
    /// noise from the source and are dropped without error.
    pub fn parse(raw: &str) -> Option<ParsedLine> {
        let caps = THREADTIME.captures(raw)?;
        let level = Level::from_letter(&caps[5])?;

        Some(ParsedLine {
            date: caps[1].trim().to_string(),
            time: caps[2].trim().to_string(),
            pid: caps[3].trim().to_string(),
            tid: caps[4].trim().to_string(),
            level,
            tag: caps[6].trim().to_string(),
            message: Self::clean_message(&caps[7]),
        })
    }

    fn clean_message(message: &str) -> String {
        message
            .trim()
            .replace('\r', "")
            .trim_end_matches('\n')
            .to_string()
    }
}
