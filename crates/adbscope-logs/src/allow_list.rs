use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

/// PID placeholder for a package that has not been resolved yet.
///
/// Logcat PIDs are numeric, so this never matches an entry.
pub const UNRESOLVED_PID: &str = "unresolved";

/// Immutable view of the package to PID mapping
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AllowSnapshot {
    pids: HashMap<String, String>,
}

impl AllowSnapshot {
    /// An empty snapshot places no restriction on PIDs
    pub fn is_empty(&self) -> bool {
        self.pids.is_empty()
    }

    /// Whether an entry with this PID may pass
    pub fn allows(&self, pid: &str) -> bool {
        self.is_empty() || self.pids.values().any(|p| p == pid)
    }

    pub fn pid_for(&self, package: &str) -> Option<&str> {
        self.pids.get(package).map(String::as_str)
    }

    #[cfg(test)]
    pub(crate) fn is_resolved(&self, package: &str) -> bool {
        self.pid_for(package).is_some_and(|p| p != UNRESOLVED_PID)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for AllowSnapshot {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            pids: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Shared, read-only handle to the PIDs of the watched packages.
///
/// Readers take a cheap snapshot; the only writer is the [`AllowListWriter`]
/// returned alongside the handle, which replaces the snapshot wholesale.
#[derive(Clone, Debug, Default)]
pub struct ProcessAllowList {
    current: Arc<RwLock<Arc<AllowSnapshot>>>,
}

/// Single writer for a [`ProcessAllowList`]
#[derive(Debug)]
pub struct AllowListWriter {
    current: Arc<RwLock<Arc<AllowSnapshot>>>,
}

impl ProcessAllowList {
    /// An allow-list that passes every PID and has no writer
    pub fn unrestricted() -> Self {
        Self::default()
    }

    /// Create an allow-list for `packages`, each seeded as unresolved
    pub fn for_packages(packages: &[String]) -> (Self, AllowListWriter) {
        let seeded: AllowSnapshot = packages
            .iter()
            .map(|p| (p.clone(), UNRESOLVED_PID))
            .collect();
        let current = Arc::new(RwLock::new(Arc::new(seeded)));

        (
            Self {
                current: Arc::clone(&current),
            },
            AllowListWriter { current },
        )
    }

    /// Current snapshot
    pub fn snapshot(&self) -> Arc<AllowSnapshot> {
        self.current.read().clone()
    }
}

impl AllowListWriter {
    pub fn snapshot(&self) -> Arc<AllowSnapshot> {
        self.current.read().clone()
    }

    /// Replace the whole mapping
    pub fn replace(&self, snapshot: AllowSnapshot) {
        *self.current.write() = Arc::new(snapshot);
    }

    /// Point `package` at `pid`, returning whether anything changed
    pub fn update(&self, package: &str, pid: &str) -> bool {
        let current = self.snapshot();
        if current.pid_for(package) == Some(pid) {
            return false;
        }

        let mut next = (*current).clone();
        next.pids.insert(package.to_string(), pid.to_string());
        self.replace(next);
        true
    }
}
