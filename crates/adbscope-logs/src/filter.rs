use regex::Regex;
use std::sync::LazyLock;

use crate::allow_list::AllowSnapshot;
use adbscope_types::{Level, LogEntry};

/// Characters a filter term may contain
static DISALLOWED_TERM_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9@_.\-]").expect("term pattern is valid"));

/// Severity and text filter settings, fixed for the whole run
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FilterConfig {
    min_level: Level,
    include: Vec<String>,
    exclude: Vec<String>,
}

impl FilterConfig {
    pub fn new(min_level: Level) -> Self {
        Self {
            min_level,
            include: Vec::new(),
            exclude: Vec::new(),
        }
    }

    /// Only pass entries containing at least one of these terms
    pub fn with_include<I, S>(mut self, terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.include = normalize_terms(terms);
        self
    }

    /// Drop entries containing any of these terms (ignored when include terms are set)
    pub fn with_exclude<I, S>(mut self, terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.exclude = normalize_terms(terms);
        self
    }

    /// Trim, strip disallowed characters and lowercase a term.
    ///
    /// Returns `None` when nothing is left.
    pub fn normalize_term(term: &str) -> Option<String> {
        let cleaned = DISALLOWED_TERM_CHARS
            .replace_all(term.trim(), "")
            .to_lowercase();
        (!cleaned.is_empty()).then_some(cleaned)
    }
}

fn normalize_terms<I, S>(terms: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    terms
        .into_iter()
        .filter_map(|t| FilterConfig::normalize_term(t.as_ref()))
        .collect()
}

/// Decide whether an entry is dispatched.
///
/// Checks, in order: PID allow-list, minimum severity, then include terms
/// (which take precedence) or exclude terms against `"<pid> <tag> <message>"`.
/// Terms are lowercase, and the text is lowercased before matching.
pub fn accept(entry: &LogEntry, allow_list: &AllowSnapshot, config: &FilterConfig) -> bool {
    if !allow_list.allows(&entry.pid) {
        return false;
    }

    if entry.level < config.min_level {
        return false;
    }

    if config.include.is_empty() && config.exclude.is_empty() {
        return true;
    }

    let text = format!("{} {} {}", entry.pid, entry.tag, entry.message).to_lowercase();

    if !config.include.is_empty() {
        return config.include.iter().any(|t| text.contains(t.as_str()));
    }

    !config.exclude.iter().any(|t| text.contains(t.as_str()))
}
