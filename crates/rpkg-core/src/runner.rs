//! Process execution boundary.
//!
//! The scheduler never talks to `std::process` directly; it goes through
//! the [`ProcessRunner`] capability so tests can substitute a deterministic
//! fake that simulates success, failure, and timeouts.

use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Duration;

use thiserror::Error;
use wait_timeout::ChildExt;

use crate::types::{PackageName, Version};

/// Exit code reported when a child terminates without one (signal).
const DEFAULT_FAILED_CODE: i32 = 1;

/// One external build invocation, fully described.
#[derive(Debug, Clone)]
pub struct BuildInvocation {
    /// The package being built; carried for logging and bookkeeping.
    pub package: PackageName,
    /// The version being built.
    pub version: Version,
    /// Program to execute.
    pub program: PathBuf,
    /// Arguments, in order.
    pub args: Vec<String>,
    /// Working directory for the child.
    pub dir: PathBuf,
    /// Environment variables layered over the inherited environment.
    pub env: Vec<(String, String)>,
    /// Kill the child after this long.
    pub timeout: Option<Duration>,
}

/// Captured result of a finished invocation.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    /// Child exit code.
    pub code: i32,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl ProcessOutput {
    /// Whether the invocation exited zero.
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// Failures to run the tool at all (as opposed to the tool failing).
#[derive(Error, Debug)]
pub enum RunnerError {
    /// Spawning or reaping the child failed.
    #[error("failed to run build tool: {0}")]
    Io(#[from] std::io::Error),

    /// The child ran past its timeout and was killed.
    #[error("build timed out after {0:?}")]
    TimedOut(Duration),
}

/// Capability to run one build invocation to completion.
pub trait ProcessRunner: Send + Sync {
    /// Run the invocation, blocking until it finishes or times out.
    fn run(&self, invocation: &BuildInvocation) -> Result<ProcessOutput, RunnerError>;
}

/// The real runner: spawns the external tool via `std::process::Command`.
#[derive(Debug, Default)]
pub struct SystemRunner;

impl ProcessRunner for SystemRunner {
    fn run(&self, invocation: &BuildInvocation) -> Result<ProcessOutput, RunnerError> {
        tracing::debug!(
            package = %invocation.package,
            program = %invocation.program.display(),
            args = ?invocation.args,
            dir = %invocation.dir.display(),
            "running build tool"
        );

        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .current_dir(&invocation.dir)
            .envs(invocation.env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command.spawn()?;

        if let Some(limit) = invocation.timeout {
            if child.wait_timeout(limit)?.is_none() {
                child.kill()?;
                child.wait()?;
                return Err(RunnerError::TimedOut(limit));
            }
        }

        let output = child.wait_with_output()?;
        Ok(ProcessOutput {
            code: output.status.code().unwrap_or(DEFAULT_FAILED_CODE),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
