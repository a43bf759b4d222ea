use adbscope_types::{LogEntry, ParsedLine};

/// Merges consecutive lines with the same identity key into one entry.
///
/// Logcat splits a multi-line message (stack traces, dumps) into one line per
/// physical line, all stamped with the same time, pid, tid and level. At most
/// one entry is pending; it is handed out when a line with a different key
/// arrives, or by [`EntryAggregator::flush`] when the stream ends.
#[derive(Debug, Default)]
pub struct EntryAggregator {
    pending: Option<LogEntry>,
}

impl EntryAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one parsed line, returning the previous entry if it is now complete
    pub fn push(&mut self, line: ParsedLine) -> Option<LogEntry> {
        if let Some(pending) = self.pending.as_mut() {
            if pending.key() == line.key() {
                pending.message.push('\n');
                pending.message.push_str(&line.message);
                return None;
            }
        }

        self.pending.replace(line.into_entry())
    }

    /// Take the pending entry, if any
    pub fn flush(&mut self) -> Option<LogEntry> {
        self.pending.take()
    }
}
