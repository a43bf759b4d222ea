//! `adb` process wrapper

use std::future::Future;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::{Child, Command};

use crate::output;
use adbscope_types::ProcessRecord;

/// Default timeout for `adb shell ps`
const PROCESS_QUERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Default timeout for short setup queries (devices, packages, dumpsys)
const SETUP_QUERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors raised while talking to the device
#[derive(Debug, thiserror::Error)]
pub enum AdbError {
    #[error("failed to launch `{program}`")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`adb {command}` timed out after {}s", timeout.as_secs())]
    Timeout { command: String, timeout: Duration },

    #[error("`adb {command}` exited with {status}: {stderr}")]
    Failed {
        command: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("error checking device connection, do you have a connected device?")]
    NoDevice,

    #[error("no PID for '{0}' found")]
    PackageNotRunning(String),

    #[error("error parsing dumpsys output, do you have an app open?")]
    NoForegroundApp,
}

/// Which device `adb` should talk to
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Connection {
    /// Let adb pick (fails when several devices are attached)
    #[default]
    Any,
    /// A specific serial number (`adb -s`)
    Serial(String),
    /// The only USB device (`adb -d`)
    Device,
    /// The only emulator (`adb -e`)
    Emulator,
}

impl Connection {
    fn args(&self) -> Vec<String> {
        match self {
            Self::Any => Vec::new(),
            Self::Serial(serial) => vec!["-s".to_string(), serial.clone()],
            Self::Device => vec!["-d".to_string()],
            Self::Emulator => vec!["-e".to_string()],
        }
    }
}

/// Source of device process listings.
///
/// The PID watcher only needs this one query, so it is kept behind a trait
/// to let the watcher run against canned listings.
pub trait ProcessLister: Send + Sync + 'static {
    fn list_processes(&self) -> impl Future<Output = Result<Vec<ProcessRecord>, AdbError>> + Send;
}

/// Find the PID of a package by exact (ASCII case-insensitive) process name
pub fn resolve_pid<'a>(processes: &'a [ProcessRecord], package: &str) -> Option<&'a str> {
    processes
        .iter()
        .find(|p| p.name.eq_ignore_ascii_case(package))
        .map(|p| p.pid.as_str())
}

/// Android Debug Bridge client wrapper
#[derive(Clone, Debug)]
pub struct AdbClient {
    program: String,
    connection: Connection,
    query_timeout: Duration,
}

impl AdbClient {
    /// Create a client for `adb` at `program` (or on `PATH` when `None`)
    pub fn new(program: Option<&str>, connection: Connection) -> Self {
        Self {
            program: program
                .filter(|p| !p.is_empty())
                .unwrap_or("adb")
                .to_string(),
            connection,
            query_timeout: PROCESS_QUERY_TIMEOUT,
        }
    }

    /// Override the timeout for process listings
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(self.connection.args())
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        cmd
    }

    /// Run an adb subcommand to completion and return its stdout
    pub async fn run(&self, timeout: Duration, args: &[&str]) -> Result<String, AdbError> {
        let command = args.join(" ");
        tracing::debug!(command = %command, "running adb");

        let mut cmd = self.command(args);
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

        let output = match tokio::time::timeout(timeout, cmd.output()).await {
            Ok(result) => result.map_err(|source| AdbError::Spawn {
                program: self.program.clone(),
                source,
            })?,
            Err(_) => return Err(AdbError::Timeout { command, timeout }),
        };

        if !output.status.success() {
            return Err(AdbError::Failed {
                command,
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Fetch the device process listing
    pub async fn get_processes(&self) -> Result<Vec<ProcessRecord>, AdbError> {
        let out = self.run(self.query_timeout, &["shell", "ps"]).await?;
        Ok(output::parse_processes(&out))
    }

    /// Verify that a device answers process listings
    pub async fn check_connection(&self) -> Result<(), AdbError> {
        if self.get_processes().await?.is_empty() {
            return Err(AdbError::NoDevice);
        }
        Ok(())
    }

    /// List attached device serials
    pub async fn list_devices(&self) -> Result<Vec<String>, AdbError> {
        let out = self.run(SETUP_QUERY_TIMEOUT, &["devices"]).await?;
        let devices = output::parse_devices(&out, self.connection == Connection::Emulator);
        if devices.is_empty() {
            return Err(AdbError::NoDevice);
        }
        Ok(devices)
    }

    /// List installed packages, optionally only third-party ones
    pub async fn list_packages(&self, third_party: bool) -> Result<Vec<String>, AdbError> {
        let mut args = vec!["shell", "pm", "list", "packages"];
        if third_party {
            args.push("-3");
        }
        let out = self.run(SETUP_QUERY_TIMEOUT, &args).await?;
        Ok(output::parse_packages(&out))
    }

    /// Package name of the app currently in the foreground
    pub async fn current_app(&self) -> Result<String, AdbError> {
        let out = self
            .run(
                SETUP_QUERY_TIMEOUT,
                &["shell", "dumpsys", "activity", "recents"],
            )
            .await?;
        output::parse_current_app(&out).ok_or(AdbError::NoForegroundApp)
    }

    /// Clear the device log buffer (`adb logcat -c`)
    pub async fn clear_logcat(&self) -> Result<(), AdbError> {
        self.run(SETUP_QUERY_TIMEOUT, &["logcat", "-c"]).await?;
        Ok(())
    }

    /// Spawn the long-running `adb logcat` process with piped stdout
    pub fn spawn_logcat(&self) -> Result<Child, AdbError> {
        tracing::debug!(connection = ?self.connection, "spawning logcat");
        self.command(&["logcat"])
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| AdbError::Spawn {
                program: self.program.clone(),
                source,
            })
    }
}

impl ProcessLister for AdbClient {
    async fn list_processes(&self) -> Result<Vec<ProcessRecord>, AdbError> {
        self.get_processes().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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

    #[test]
    fn test_resolve_pid_exact_name() {
        let procs = vec![
            record("10", "com.example.app:remote"),
            record("11", "com.example.app"),
        ];
        assert_eq!(resolve_pid(&procs, "com.example.app"), Some("11"));
        assert_eq!(resolve_pid(&procs, "COM.EXAMPLE.APP"), Some("11"));
        assert_eq!(resolve_pid(&procs, "com.example"), None);
    }

    #[test]
    fn test_connection_args() {
        assert!(Connection::Any.args().is_empty());
        assert_eq!(Connection::Serial("abc".into()).args(), vec!["-s", "abc"]);
        assert_eq!(Connection::Device.args(), vec!["-d"]);
        assert_eq!(Connection::Emulator.args(), vec!["-e"]);
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let client = AdbClient::new(Some("/nonexistent/adbscope-adb"), Connection::Any);
        let err = client.get_processes().await.unwrap_err();
        assert!(matches!(err, AdbError::Spawn { .. }));
        assert!(client.spawn_logcat().is_err());
    }
}
