//! Running the external flashing program
//!
//! Every invocation is bounded by a wall-clock timeout. A program that
//! overruns it is killed, never left behind.

use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::ProcessError;

/// One run of an external program
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    program: PathBuf,
    args: Vec<OsString>,
    timeout: Duration,
    capture: bool,
}

impl Invocation {
    /// Run `program` with no arguments, bounded by `timeout`
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout,
            capture: false,
        }
    }

    /// Append an argument
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    /// Keep the program's standard output instead of discarding it
    pub fn capture_stdout(mut self) -> Self {
        self.capture = true;
        self
    }

    /// Program to run
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Arguments in order
    pub fn args(&self) -> &[OsString] {
        &self.args
    }

    /// Wall-clock limit
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Whether standard output is kept
    pub fn captures_stdout(&self) -> bool {
        self.capture
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program().display())?;
        for arg in self.args() {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

/// Something that can run an [`Invocation`]
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run to completion, returning captured stdout (empty when not captured)
    async fn run(&self, invocation: &Invocation) -> Result<String, ProcessError>;
}

/// Runs invocations as real child processes
#[derive(Debug, Default, Clone, Copy)]
pub struct Subprocess;

#[async_trait]
impl CommandRunner for Subprocess {
    async fn run(&self, invocation: &Invocation) -> Result<String, ProcessError> {
        log::debug!("Running {}", invocation);

        let stdout = if invocation.captures_stdout() {
            Stdio::piped()
        } else {
            Stdio::null()
        };
        let child = Command::new(invocation.program())
            .args(invocation.args())
            .stdin(Stdio::null())
            .stdout(stdout)
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ProcessError::Spawn {
                program: invocation.program().to_path_buf(),
                source,
            })?;

        // Dropping the child on timeout kills it
        let limit = invocation.timeout();
        let output = tokio::time::timeout(limit, child.wait_with_output())
            .await
            .map_err(|_| ProcessError::TimedOut(limit))?
            .map_err(ProcessError::Wait)?;

        if !output.status.success() {
            return Err(ProcessError::Failed(output.status));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn shell(script: &str, timeout: Duration) -> Invocation {
        Invocation::new("sh", timeout).arg("-c").arg(script)
    }

    #[test]
    fn test_invocation_display() {
        let inv = Invocation::new("external/bossac/bossac", Duration::from_secs(10))
            .arg("--port=/dev/ttyACM0")
            .arg("--info");
        assert_eq!(
            inv.to_string(),
            "external/bossac/bossac --port=/dev/ttyACM0 --info"
        );
        assert_eq!(inv.program(), Path::new("external/bossac/bossac"));
        assert_eq!(inv.args().len(), 2);
        assert_eq!(inv.timeout(), Duration::from_secs(10));
        assert!(!inv.captures_stdout());
        assert!(inv.capture_stdout().captures_stdout());
    }

    #[tokio::test]
    async fn test_captures_stdout() {
        let inv = shell("echo 'Device: ATSAMD21G18A'", Duration::from_secs(5)).capture_stdout();
        let out = Subprocess.run(&inv).await.unwrap();
        assert_eq!(out, "Device: ATSAMD21G18A\n");
    }

    #[tokio::test]
    async fn test_discarded_stdout_is_empty() {
        let inv = shell("echo hidden", Duration::from_secs(5));
        assert_eq!(Subprocess.run(&inv).await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_nonzero_exit_fails() {
        let inv = shell("exit 3", Duration::from_secs(5));
        match Subprocess.run(&inv).await {
            Err(ProcessError::Failed(status)) => assert_eq!(status.code(), Some(3)),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_timeout_kills_child() {
        let inv = shell("sleep 5", Duration::from_millis(200));
        let start = Instant::now();
        let err = Subprocess.run(&inv).await.unwrap_err();
        assert!(matches!(err, ProcessError::TimedOut(_)));
        assert!(start.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_missing_program() {
        let inv = Invocation::new("/nonexistent/bossac", Duration::from_secs(1));
        assert!(matches!(
            Subprocess.run(&inv).await,
            Err(ProcessError::Spawn { .. })
        ));
    }
}
