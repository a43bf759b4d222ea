use crossterm::style::{Color, Stylize};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use adbscope_types::LogEntry;

/// Columns for the time of day, including the trailing space
pub const TIME_WIDTH: usize = 13;

/// Columns for each of the pid and tid fields
pub const PID_WIDTH: usize = 5;

/// Columns for the right-aligned tag
pub const TAG_WIDTH: usize = 24;

/// Which optional columns the interactive form shows
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderOptions {
    pub show_time: bool,
    pub show_pid: bool,
}

/// Turns entries into terminal (styled, width-aware) or file (plain) text
#[derive(Clone, Copy, Debug, Default)]
pub struct Renderer {
    options: RenderOptions,
}

impl Renderer {
    pub fn new(options: RenderOptions) -> Self {
        Self { options }
    }

    /// Styled rendering for a terminal `width` columns wide.
    ///
    /// Every message line is cut or padded to fit the line; without a width
    /// the message is left as is. Continuation lines repeat only the badge,
    /// indented by the visible width of the first line's prefix.
    pub fn interactive(&self, entry: &LogEntry, width: Option<u16>) -> String {
        let color = entry.level.color();

        let mut head = String::new();
        if self.options.show_time {
            head.push_str(&format_time(&entry.time));
        }
        if self.options.show_pid {
            head.push_str(&format_pid_tid(&entry.pid, &entry.tid));
        }

        let mut prefix = String::new();
        if !head.is_empty() {
            prefix.push_str(&head.dark_grey().bold().to_string());
        }
        prefix.push_str(&format_tag(&entry.tag).with(color).on(Color::Black).to_string());
        let prefix_width = visible_width(&prefix);

        let (badge_fg, badge_bg) = entry.level.badge_style();
        let badge = format!(" {} ", entry.level)
            .with(badge_fg)
            .on(badge_bg)
            .to_string();
        let used = prefix_width + visible_width(&badge);

        let mut out = String::new();
        for (i, line) in entry.lines().enumerate() {
            if i == 0 {
                out.push_str(&prefix);
            } else {
                out.push('\n');
                out.push_str(&" ".repeat(prefix_width));
            }
            out.push_str(&badge);

            let message = fit_message(&strip_ansi(line), used, width);
            out.push_str(&message.with(color).on(Color::Black).to_string());
        }
        out
    }

    /// Unstyled rendering with every column, for log files
    pub fn plain(&self, entry: &LogEntry) -> String {
        let prefix = format!(
            "{}{}{}",
            format_time(&entry.time),
            format_pid_tid(&entry.pid, &entry.tid),
            format_tag(&entry.tag)
        );
        let indent = " ".repeat(visible_width(&prefix));
        let badge = format!(" {} ", entry.level);

        entry
            .lines()
            .enumerate()
            .map(|(i, line)| {
                let lead = if i == 0 { prefix.as_str() } else { indent.as_str() };
                format!("{lead}{badge}{}", strip_ansi(line))
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Time of day padded (or cut) to [`TIME_WIDTH`]
fn format_time(time: &str) -> String {
    let mut time = time.to_string();
    if !time.ends_with(' ') {
        time.push(' ');
    }
    if visible_width(&time) > TIME_WIDTH {
        return format!("{} ", truncate_to_width(&time, TIME_WIDTH - 1));
    }
    pad_right(&time, TIME_WIDTH)
}

/// `"  pid-tid   "`: pid right-aligned, tid left-aligned, then a space
fn format_pid_tid(pid: &str, tid: &str) -> String {
    format!(
        "{}-{} ",
        pad_left(truncate_to_width(pid, PID_WIDTH), PID_WIDTH),
        pad_right(truncate_to_width(tid, PID_WIDTH), PID_WIDTH)
    )
}

/// Tag right-aligned in [`TAG_WIDTH`], shortened with "..." when too long
fn format_tag(tag: &str) -> String {
    let mut tag = tag.to_string();
    if !tag.ends_with(' ') {
        tag.push(' ');
    }
    if visible_width(&tag) > TAG_WIDTH {
        tag = format!("{}...", truncate_to_width(&tag, TAG_WIDTH - 3));
    }
    pad_left(&tag, TAG_WIDTH)
}

/// Marker for a cut message
const ELLIPSIS: &str = "... ";

/// Fit a message line into what is left of a `width`-column line after `used` columns
fn fit_message(line: &str, used: usize, width: Option<u16>) -> String {
    let mut message = if line.starts_with(' ') {
        line.to_string()
    } else {
        format!(" {line}")
    };

    let Some(width) = width else {
        return message;
    };

    let max = (width as usize).saturating_sub(used + 1);
    let len = visible_width(&message);
    if len > max {
        if max < ELLIPSIS.len() {
            return ELLIPSIS[..max].to_string();
        }
        return format!("{}{ELLIPSIS}", truncate_to_width(&message, max - ELLIPSIS.len()));
    }

    message.push_str(&" ".repeat(max - len));
    message
}

fn pad_left(s: &str, width: usize) -> String {
    let len = visible_width(s);
    format!("{}{}", " ".repeat(width.saturating_sub(len)), s)
}

fn pad_right(s: &str, width: usize) -> String {
    let len = visible_width(s);
    format!("{}{}", s, " ".repeat(width.saturating_sub(len)))
}

/// Longest prefix of `s` that fits in `max` columns
pub fn truncate_to_width(s: &str, max: usize) -> &str {
    let mut used = 0;
    for (idx, c) in s.char_indices() {
        let w = c.width().unwrap_or(0);
        if used + w > max {
            return &s[..idx];
        }
        used += w;
    }
    s
}

/// Remove ANSI escape sequences (CSI, OSC and two-byte escapes)
pub fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\x1b' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('[') => {
                // Parameters and intermediates, then one final byte in '@'..='~'
                for c in chars.by_ref() {
                    if ('@'..='~').contains(&c) {
                        break;
                    }
                }
            }
            Some(']') => {
                // Terminated by BEL or ST (ESC \)
                while let Some(c) = chars.next() {
                    if c == '\x07' {
                        break;
                    }
                    if c == '\x1b' && chars.peek() == Some(&'\\') {
                        chars.next();
                        break;
                    }
                }
            }
            _ => {}
        }
    }

    out
}

/// Terminal columns taken by `s` once escape sequences are removed
pub fn visible_width(s: &str) -> usize {
    if s.contains('\x1b') {
        strip_ansi(s).width()
    } else {
        s.width()
    }
}
