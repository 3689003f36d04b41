//! # Subprocess Executor Support
//!
//! Helper embedded by profiles that drive an external binary (`ping`,
//! `iperf`, ...). Mirrors the original's `SubProcessExecutorBase`: resolve
//! the binary once via [`crate::utils::which`], refuse to run a second
//! subprocess while one is already live, and make cleanup idempotent so a
//! `cleanup()` call after a normal `kill_subprocess()` is harmless.

use crate::error::{NstsError, ProfileRuntimeError};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};

/// Poll interval while waiting for a subprocess to exit. Kept well under
/// the per-sample budget so a finished subprocess is noticed promptly.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

pub struct SubprocessSupport {
    binary: String,
    resolved: Option<std::path::PathBuf>,
    child: Option<Child>,
}

impl SubprocessSupport {
    pub fn new(binary: impl Into<String>) -> Self {
        let binary = binary.into();
        let resolved = crate::utils::which(&binary);
        Self {
            binary,
            resolved,
            child: None,
        }
    }

    pub fn is_supported(&self) -> bool {
        self.resolved.is_some()
    }

    /// Spawn the subprocess with the given arguments. Fails if a
    /// subprocess from this support instance is already running, or if
    /// the binary never resolved.
    pub fn execute(&mut self, args: &[String]) -> Result<(), NstsError> {
        if self.child.is_some() {
            return Err(ProfileRuntimeError::Other(format!(
                "subprocess '{}' is already running",
                self.binary
            ))
            .into());
        }
        let path = self
            .resolved
            .clone()
            .ok_or_else(|| ProfileRuntimeError::NotSupported(self.binary.clone()))?;

        let child = Command::new(path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                ProfileRuntimeError::Other(format!("failed to spawn '{}': {}", self.binary, e))
            })?;
        self.child = Some(child);
        Ok(())
    }

    /// Non-blocking check of whether the subprocess is still running.
    pub fn is_running(&mut self) -> bool {
        match self.child.as_mut() {
            Some(c) => matches!(c.try_wait(), Ok(None)),
            None => false,
        }
    }

    /// Poll at [`POLL_INTERVAL`] until the subprocess exits.
    pub async fn wait_until_exit(&mut self) {
        while self.is_running() {
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Kill the subprocess if one is running. Safe to call more than once.
    pub async fn kill(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill().await;
        }
    }

    /// Take ownership of the finished subprocess and return its combined
    /// stdout+stderr output as text.
    pub async fn take_output(&mut self) -> Result<String, NstsError> {
        let child = self.child.take().ok_or_else(|| {
            ProfileRuntimeError::Other(format!(
                "no subprocess output available for '{}'",
                self.binary
            ))
        })?;
        let output = child.wait_with_output().await.map_err(|e| {
            ProfileRuntimeError::Other(format!("failed to collect output from '{}': {}", self.binary, e))
        })?;
        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(combined)
    }

    /// Idempotent cleanup: kills the subprocess if still running, and is a
    /// no-op if it already exited or was never started.
    pub async fn cleanup(&mut self) {
        self.kill().await;
    }
}
