use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use tokio_util::sync::CancellationToken;

use crate::render::Renderer;
use adbscope_types::LogEntry;

/// Where the interactive renderer gets its line width from
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TerminalWidth {
    /// Ask the terminal on every entry, so resizes apply immediately
    #[default]
    Detect,
    /// A fixed width, or `None` for no truncation or padding
    Fixed(Option<u16>),
}

impl TerminalWidth {
    pub fn current(&self) -> Option<u16> {
        match self {
            Self::Detect => crossterm::terminal::size()
                .ok()
                .map(|(cols, _)| cols)
                .filter(|cols| *cols > 0),
            Self::Fixed(width) => *width,
        }
    }
}

/// Open (creating if needed) a log file for appending
pub fn open_log_file(path: &Path, truncate: bool) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.create(true);
    if truncate {
        options.write(true).truncate(true);
    } else {
        options.append(true);
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    options.open(path)
}

/// Final pipeline stage: writes entries to the terminal and optional log file.
///
/// Nothing is written once `live` is cancelled, even for entries that were
/// already on their way through the pipeline.
pub struct Sink<W> {
    terminal: W,
    file: Option<File>,
    file_styled: bool,
    renderer: Renderer,
    width: TerminalWidth,
    live: CancellationToken,
    dispatched: u64,
}

impl<W: Write> Sink<W> {
    pub fn new(terminal: W, renderer: Renderer, live: CancellationToken) -> Self {
        Self {
            terminal,
            file: None,
            file_styled: false,
            renderer,
            width: TerminalWidth::Detect,
            live,
            dispatched: 0,
        }
    }

    /// Also append every entry to `file`, styled or plain
    pub fn with_file(mut self, file: File, styled: bool) -> Self {
        self.file = Some(file);
        self.file_styled = styled;
        self
    }

    pub fn with_width(mut self, width: TerminalWidth) -> Self {
        self.width = width;
        self
    }

    /// Write one entry, returning `false` if it was suppressed by a stop
    pub fn dispatch(&mut self, entry: &LogEntry) -> io::Result<bool> {
        if self.live.is_cancelled() {
            return Ok(false);
        }

        let styled = self.renderer.interactive(entry, self.width.current());
        writeln!(self.terminal, "{styled}")?;
        self.terminal.flush()?;

        if let Some(file) = self.file.as_mut() {
            if self.file_styled {
                writeln!(file, "{styled}")?;
            } else {
                writeln!(file, "{}", self.renderer.plain(entry))?;
            }
        }

        self.dispatched += 1;
        Ok(true)
    }

    /// Number of entries written so far
    pub fn dispatched(&self) -> u64 {
        self.dispatched
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.terminal.flush()?;
        if let Some(file) = self.file.as_mut() {
            file.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::strip_ansi;
    use adbscope_types::Level;
    use std::fs;

    fn entry(message: &str) -> LogEntry {
        LogEntry {
            date: "03-14".to_string(),
            time: "12:00:01.123".to_string(),
            level: Level::Info,
            tag: "MyTag".to_string(),
            pid: "100".to_string(),
            tid: "100".to_string(),
            message: message.to_string(),
        }
    }

    #[test]
    fn test_dispatch_writes_terminal_and_plain_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logcat.txt");
        let file = open_log_file(&path, false).unwrap();

        let mut sink = Sink::new(Vec::new(), Renderer::default(), CancellationToken::new())
            .with_width(TerminalWidth::Fixed(None))
            .with_file(file, false);

        assert!(sink.dispatch(&entry("hello\nworld")).unwrap());
        assert!(sink.dispatch(&entry("next")).unwrap());
        sink.flush().unwrap();
        assert_eq!(sink.dispatched(), 2);

        let terminal = strip_ansi(&String::from_utf8(sink.terminal.clone()).unwrap());
        assert_eq!(terminal.lines().count(), 3);
        assert!(terminal.lines().next().unwrap().ends_with(" I  hello"));

        let renderer = Renderer::default();
        let written = fs::read_to_string(&path).unwrap();
        assert_eq!(
            written,
            format!(
                "{}\n{}\n",
                renderer.plain(&entry("hello\nworld")),
                renderer.plain(&entry("next"))
            )
        );
    }

    #[test]
    fn test_styled_file_matches_terminal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("styled.txt");
        let file = open_log_file(&path, false).unwrap();

        let mut sink = Sink::new(Vec::new(), Renderer::default(), CancellationToken::new())
            .with_width(TerminalWidth::Fixed(Some(100)))
            .with_file(file, true);
        sink.dispatch(&entry("hello")).unwrap();
        sink.flush().unwrap();

        let terminal = String::from_utf8(sink.terminal.clone()).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), terminal);
    }

    #[test]
    fn test_stopped_sink_writes_nothing() {
        let live = CancellationToken::new();
        let mut sink = Sink::new(Vec::new(), Renderer::default(), live.clone())
            .with_width(TerminalWidth::Fixed(None));

        assert!(sink.dispatch(&entry("before")).unwrap());
        live.cancel();
        assert!(!sink.dispatch(&entry("after")).unwrap());

        let terminal = strip_ansi(&String::from_utf8(sink.terminal.clone()).unwrap());
        assert!(terminal.contains("before"));
        assert!(!terminal.contains("after"));
        assert_eq!(sink.dispatched(), 1);
    }

    #[test]
    fn test_open_log_file_appends_or_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        fs::write(&path, "old\n").unwrap();

        {
            let mut f = open_log_file(&path, false).unwrap();
            writeln!(f, "new").unwrap();
        }
        assert_eq!(fs::read_to_string(&path).unwrap(), "old\nnew\n");

        {
            let mut f = open_log_file(&path, true).unwrap();
            writeln!(f, "fresh").unwrap();
        }
        assert_eq!(fs::read_to_string(&path).unwrap(), "fresh\n");
    }
}
