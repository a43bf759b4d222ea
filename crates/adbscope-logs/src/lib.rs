//! Logcat stream processing for adbscope
//!
//! This crate provides line parsing, entry aggregation, PID allow-listing,
//! filtering, rendering, and the streaming pipeline that ties them together.

mod aggregate;
mod allow_list;
mod filter;
mod parser;
mod pipeline;
mod render;
mod sink;
mod stream;
mod watcher;

pub use aggregate::EntryAggregator;
pub use allow_list::{AllowListWriter, AllowSnapshot, ProcessAllowList, UNRESOLVED_PID};
pub use filter::{FilterConfig, accept};
pub use parser::LogParser;
pub use pipeline::{LogcatPipeline, PipelineError, ResolutionPolicy, RunSummary};
pub use render::{RenderOptions, Renderer, strip_ansi, truncate_to_width, visible_width};
pub use sink::{Sink, TerminalWidth, open_log_file};
pub use stream::read_lines;
pub use watcher::{PidWatcher, WatcherConfig};

// Re-export types used in our public API
pub use adbscope_types::{Level, LogEntry, ParsedLine};
