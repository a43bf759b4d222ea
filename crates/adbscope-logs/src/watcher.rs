use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::allow_list::AllowListWriter;
use adbscope_adb::{AdbError, ProcessLister, resolve_pid};

/// Polling schedule for the PID watcher
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WatcherConfig {
    /// Delay between successful polls
    pub interval: Duration,
    /// Upper bound for the delay after consecutive failures
    pub max_backoff: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            max_backoff: Duration::from_secs(30),
        }
    }
}

/// Keeps the allow-list pointed at the current PIDs of the watched packages
pub struct PidWatcher<L> {
    lister: L,
    packages: Vec<String>,
    writer: AllowListWriter,
    config: WatcherConfig,
}

impl<L: ProcessLister> PidWatcher<L> {
    pub fn new(lister: L, packages: Vec<String>, writer: AllowListWriter) -> Self {
        Self {
            lister,
            packages,
            writer,
            config: WatcherConfig::default(),
        }
    }

    pub fn with_config(mut self, config: WatcherConfig) -> Self {
        self.config = config;
        self
    }

    /// Run one resolution round.
    ///
    /// Packages that resolve are updated even when another one fails; the
    /// first unresolved package is reported. A package that stops running
    /// keeps its last known PID.
    pub async fn poll_once(&self) -> Result<(), AdbError> {
        let processes = self.lister.list_processes().await?;
        let mut missing = None;

        for package in &self.packages {
            match resolve_pid(&processes, package) {
                Some(pid) => {
                    if self.writer.update(package, pid) {
                        tracing::info!(package = %package, pid = %pid, "resolved package pid");
                    }
                }
                None => {
                    missing.get_or_insert_with(|| package.clone());
                }
            }
        }

        match missing {
            Some(package) => Err(AdbError::PackageNotRunning(package)),
            None => Ok(()),
        }
    }

    /// Poll until cancelled, reporting failures on `errors`.
    ///
    /// After a failure the delay doubles, up to `max_backoff`; a successful
    /// round resets it to `interval`.
    pub async fn run(self, cancel: CancellationToken, errors: mpsc::UnboundedSender<AdbError>) {
        if self.packages.is_empty() {
            return;
        }

        let mut delay = self.config.interval;

        loop {
            let result = tokio::select! {
                _ = cancel.cancelled() => break,
                result = self.poll_once() => result,
            };

            match result {
                Ok(()) => delay = self.config.interval,
                Err(e) => {
                    tracing::debug!(error = %e, retry_in = ?delay, "pid resolution failed");
                    if errors.send(e).is_err() {
                        break;
                    }
                    delay = (delay * 2).min(self.config.max_backoff.max(self.config.interval));
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        tracing::debug!("pid watcher stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allow_list::ProcessAllowList;
    use adbscope_types::ProcessRecord;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::Arc;

    /// Replays canned listings, repeating the last one forever
    #[derive(Clone, Default)]
    struct FakeLister {
        listings: Arc<Mutex<VecDeque<Option<Vec<(&'static str, &'static str)>>>>>,
        calls: Arc<Mutex<usize>>,
    }

    impl FakeLister {
        fn new(listings: Vec<Option<Vec<(&'static str, &'static str)>>>) -> Self {
            Self {
                listings: Arc::new(Mutex::new(listings.into())),
                calls: Arc::default(),
            }
        }

        fn calls(&self) -> usize {
            *self.calls.lock()
        }
    }

    fn record(pid: &str, name: &str) -> ProcessRecord {
        ProcessRecord {
            user: "u0_a1".to_string(),
            pid: pid.to_string(),
            ppid: "1".to_string(),
            vsz: "0".to_string(),
            rss: "0".to_string(),
            wchan: "0".to_string(),
            addr: "0".to_string(),
            state: "S".to_string(),
            name: name.to_string(),
        }
    }

    impl ProcessLister for FakeLister {
        async fn list_processes(&self) -> Result<Vec<ProcessRecord>, AdbError> {
            *self.calls.lock() += 1;
            let next = {
                let mut listings = self.listings.lock();
                if listings.len() > 1 {
                    listings.pop_front().flatten()
                } else {
                    listings.front().cloned().flatten()
                }
            };
            match next {
                Some(rows) => Ok(rows.into_iter().map(|(pid, name)| record(pid, name)).collect()),
                None => Err(AdbError::NoDevice),
            }
        }
    }

    fn packages(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_poll_once_resolves_and_tracks_restarts() {
        let lister = FakeLister::new(vec![
            Some(vec![("100", "com.example")]),
            Some(vec![("250", "com.example")]),
        ]);
        let (list, writer) = ProcessAllowList::for_packages(&packages(&["com.example"]));
        let watcher = PidWatcher::new(lister, packages(&["com.example"]), writer);

        watcher.poll_once().await.unwrap();
        assert!(list.snapshot().allows("100"));

        watcher.poll_once().await.unwrap();
        let snap = list.snapshot();
        assert!(snap.allows("250"));
        assert!(!snap.allows("100"));
    }

    #[tokio::test]
    async fn test_poll_once_reports_missing_package() {
        let lister = FakeLister::new(vec![Some(vec![("100", "com.a")])]);
        let names = packages(&["com.a", "com.b"]);
        let (list, writer) = ProcessAllowList::for_packages(&names);
        let watcher = PidWatcher::new(lister, names, writer);

        let err = watcher.poll_once().await.unwrap_err();
        assert!(matches!(err, AdbError::PackageNotRunning(ref p) if p == "com.b"));

        // The resolvable package is still applied
        let snap = list.snapshot();
        assert!(snap.is_resolved("com.a"));
        assert!(!snap.is_resolved("com.b"));
    }

    #[tokio::test]
    async fn test_listing_failure_keeps_last_pid() {
        let lister = FakeLister::new(vec![Some(vec![("100", "com.a")]), None]);
        let names = packages(&["com.a"]);
        let (list, writer) = ProcessAllowList::for_packages(&names);
        let watcher = PidWatcher::new(lister, names, writer);

        watcher.poll_once().await.unwrap();
        assert!(watcher.poll_once().await.is_err());
        assert!(list.snapshot().allows("100"));
    }

    #[tokio::test]
    async fn test_run_reports_errors_and_stops_on_cancel() {
        let lister = FakeLister::new(vec![None, Some(vec![("7", "com.a")])]);
        let names = packages(&["com.a"]);
        let (list, writer) = ProcessAllowList::for_packages(&names);
        let watcher = PidWatcher::new(lister.clone(), names, writer).with_config(WatcherConfig {
            interval: Duration::from_millis(5),
            max_backoff: Duration::from_millis(20),
        });

        let cancel = CancellationToken::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(watcher.run(cancel.clone(), tx));

        let err = rx.recv().await.unwrap();
        assert!(matches!(err, AdbError::NoDevice));

        // Wait for the retry to resolve the pid
        for _ in 0..200 {
            if list.snapshot().allows("7") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(list.snapshot().allows("7"));

        cancel.cancel();
        task.await.unwrap();
        assert!(lister.calls() >= 2);
    }

    #[tokio::test]
    async fn test_run_without_packages_returns_immediately() {
        let lister = FakeLister::new(vec![None]);
        let (_list, writer) = ProcessAllowList::for_packages(&[]);
        let watcher = PidWatcher::new(lister.clone(), Vec::new(), writer);
        let (tx, _rx) = mpsc::unbounded_channel();

        watcher.run(CancellationToken::new(), tx).await;
        assert_eq!(lister.calls(), 0);
    }
}
