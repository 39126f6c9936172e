// SPDX-License-Identifier: MIT OR Apache-2.0
//! Error types for process execution.

use std::fmt;
use std::process::ExitStatus;

use pipexec_which::NotFoundError;
use thiserror::Error;

/// A process ran but did not exit successfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitError {
    status: ExitStatus,
}

impl ExitError {
    /// Wrap a non-successful exit status.
    pub fn new(status: ExitStatus) -> Self {
        Self { status }
    }

    /// The raw exit status.
    pub fn status(&self) -> ExitStatus {
        self.status
    }

    /// Exit code, or `-1` when the process was terminated by a signal.
    pub fn code(&self) -> i32 {
        self.status.code().unwrap_or(-1)
    }
}

impl fmt::Display for ExitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(code) = self.status.code() {
            return write!(f, "exit status {code}");
        }

        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;

            if let Some(signal) = self.status.signal() {
                return write!(f, "signal: {signal}");
            }
        }

        f.write_str("exit status unknown")
    }
}

impl std::error::Error for ExitError {}

/// Errors from starting, waiting on, or running a [`Cmd`](crate::Cmd).
#[derive(Debug, Error)]
pub enum ExecError {
    /// The executable could not be resolved. Deferred from construction until
    /// the command is started.
    #[error(transparent)]
    NotFound(#[from] NotFoundError),

    /// `start` was called on a command that already has a live process.
    #[error("exec: already started")]
    AlreadyStarted,

    /// `wait` was called before `start`.
    #[error("exec: not started")]
    NotStarted,

    /// `wait` was called after it had already collected the exit status.
    #[error("exec: Wait was already called")]
    AlreadyWaited,

    /// The operating system refused to spawn the process.
    #[error("exec: failed to start process: {0}")]
    Spawn(#[source] std::io::Error),

    /// The process exited unsuccessfully.
    #[error(transparent)]
    Exit(#[from] ExitError),

    /// Copying to or from the process's standard streams failed.
    #[error("exec: copying stdio: {0}")]
    Io(#[source] std::io::Error),

    /// The command's context was cancelled.
    #[error("exec: context cancelled")]
    Cancelled,
}

impl ExecError {
    /// Returns `true` when the executable could not be found.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ExecError::NotFound(_))
    }

    /// Exit code carried by an [`ExecError::Exit`].
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            ExecError::Exit(exit) => Some(exit.code()),
            _ => None,
        }
    }
}
