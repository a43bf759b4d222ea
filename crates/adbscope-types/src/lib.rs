//! Shared types for adbscope
//!
//! This crate contains data structures used across multiple adbscope crates.

use crossterm::style::Color;
use std::fmt;

// ============================================================================
// Device Types
// ============================================================================

/// One row of the device process listing (`adb shell ps`)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcessRecord {
    pub user: String,
    pub pid: String,
    pub ppid: String,
    pub vsz: String,
    pub rss: String,
    pub wchan: String,
    pub addr: String,
    pub state: String,
    pub name: String,
}

// ============================================================================
// Log Types
// ============================================================================

/// Logcat severity level.
///
/// Declaration order is the rank order, so the derived `Ord` compares by
/// rank: `Verbose < Debug < Info < Warn < Error < Fatal`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Level {
    #[default]
    Verbose,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl Level {
    /// All levels in rank order
    pub const ALL: [Level; 6] = [
        Self::Verbose,
        Self::Debug,
        Self::Info,
        Self::Warn,
        Self::Error,
        Self::Fatal,
    ];

    /// Parse the single-letter logcat form (case-insensitive)
    pub fn from_letter(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "V" => Some(Self::Verbose),
            "D" => Some(Self::Debug),
            "I" => Some(Self::Info),
            "W" => Some(Self::Warn),
            "E" => Some(Self::Error),
            "F" => Some(Self::Fatal),
            _ => None,
        }
    }

    /// Single-letter logcat form
    pub fn as_char(&self) -> char {
        match self {
            Self::Verbose => 'V',
            Self::Debug => 'D',
            Self::Info => 'I',
            Self::Warn => 'W',
            Self::Error => 'E',
            Self::Fatal => 'F',
        }
    }

    /// Numeric rank, 0 for verbose up to 5 for fatal
    pub fn rank(&self) -> u8 {
        *self as u8
    }

    /// Foreground color used for the tag and message of this level
    pub fn color(&self) -> Color {
        match self {
            Self::Verbose => Color::White,
            Self::Debug => Color::Cyan,
            Self::Info => Color::Green,
            Self::Warn => Color::Yellow,
            Self::Error => Color::Red,
            Self::Fatal => Color::Magenta,
        }
    }

    /// Foreground/background pair for the one-letter severity badge
    pub fn badge_style(&self) -> (Color, Color) {
        const BADGE_BG: Color = Color::Rgb {
            r: 60,
            g: 60,
            b: 60,
        };
        match self {
            Self::Fatal => (Color::White, Color::DarkRed),
            other => (other.color(), BADGE_BG),
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// Fields that decide whether two consecutive lines belong to one entry
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IdentityKey<'a> {
    pub date: &'a str,
    pub time: &'a str,
    pub pid: &'a str,
    pub tid: &'a str,
    pub level: Level,
}

/// A single logcat line split into its fields
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedLine {
    pub date: String,
    pub time: String,
    pub pid: String,
    pub tid: String,
    pub level: Level,
    pub tag: String,
    pub message: String,
}

impl ParsedLine {
    pub fn key(&self) -> IdentityKey<'_> {
        IdentityKey {
            date: &self.date,
            time: &self.time,
            pid: &self.pid,
            tid: &self.tid,
            level: self.level,
        }
    }

    /// Start a new entry from this line
    pub fn into_entry(self) -> LogEntry {
        LogEntry {
            date: self.date,
            time: self.time,
            level: self.level,
            tag: self.tag,
            pid: self.pid,
            tid: self.tid,
            message: self.message,
        }
    }
}

/// A logical log record; `message` holds one line per merged logcat line
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogEntry {
    pub date: String,
    pub time: String,
    pub level: Level,
    pub tag: String,
    pub pid: String,
    pub tid: String,
    pub message: String,
}

impl LogEntry {
    pub fn key(&self) -> IdentityKey<'_> {
        IdentityKey {
            date: &self.date,
            time: &self.time,
            pid: &self.pid,
            tid: &self.tid,
            level: self.level,
        }
    }

    /// Iterate the physical lines of the message
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.message.split('\n')
    }

    /// Number of logcat lines merged into this entry
    pub fn line_count(&self) -> usize {
        self.message.split('\n').count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_order_all_pairs() {
        for (i, a) in Level::ALL.iter().enumerate() {
            for (j, b) in Level::ALL.iter().enumerate() {
                assert_eq!(a.cmp(b), i.cmp(&j), "{a} vs {b}");
                assert_eq!(a.rank().cmp(&b.rank()), i.cmp(&j));
            }
        }
    }

    #[test]
    fn test_level_from_letter() {
        assert_eq!(Level::from_letter("w"), Some(Level::Warn));
        assert_eq!(Level::from_letter(" F "), Some(Level::Fatal));
        assert_eq!(Level::from_letter("X"), None);
        assert_eq!(Level::from_letter("VV"), None);
        for level in Level::ALL {
            assert_eq!(Level::from_letter(&level.to_string()), Some(level));
        }
    }

    #[test]
    fn test_badge_styles_are_distinct() {
        let styles: Vec<_> = Level::ALL.iter().map(|l| l.badge_style()).collect();
        for (i, a) in styles.iter().enumerate() {
            for b in styles.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_entry_key_matches_line_key() {
        let line = ParsedLine {
            date: "03-14".to_string(),
            time: "12:00:01.123".to_string(),
            pid: "100".to_string(),
            tid: "101".to_string(),
            level: Level::Info,
            tag: "MyTag".to_string(),
            message: "hello".to_string(),
        };
        let entry = line.clone().into_entry();
        assert_eq!(line.key(), entry.key());
        assert_eq!(entry.line_count(), 1);
    }
}
