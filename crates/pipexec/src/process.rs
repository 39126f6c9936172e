// SPDX-License-Identifier: MIT OR Apache-2.0
//! Low-level process spawning and stdio plumbing.

use std::io;
use std::process::{ExitStatus, Stdio};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::cancel::CancelToken;
use crate::error::{ExecError, ExitError};
use crate::stdio::{Input, Output, SharedBuffer, SharedWriter};

const COPY_BUF: usize = 8 * 1024;

/// Exit information of a waited process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessState {
    status: Option<ExitStatus>,
    pid: Option<u32>,
}

impl ProcessState {
    /// OS process id, if it was known at spawn time.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Raw exit status, `None` when waiting on the process itself failed.
    pub fn status(&self) -> Option<ExitStatus> {
        self.status
    }

    /// Exit code, or `-1` when the process was killed by a signal or its
    /// status is unknown.
    pub fn exit_code(&self) -> i32 {
        self.status.and_then(|s| s.code()).unwrap_or(-1)
    }

    /// Whether the process exited with status zero.
    pub fn success(&self) -> bool {
        self.status.is_some_and(|s| s.success())
    }
}

/// Everything needed to launch one process.
pub(crate) struct SpawnSpec<'a> {
    pub program: &'a str,
    /// Full argument vector; element zero mirrors the program.
    pub args: &'a [String],
    /// `KEY=VALUE` entries, applied in order over an empty environment.
    pub env: &'a [String],
    pub stdin: Input,
    pub stdout: Output,
    pub stderr: Output,
    /// Receives a copy of everything written to stderr.
    pub capture: SharedBuffer,
    /// Kills the process when fired.
    pub cancel: CancelToken,
}

/// Exit status as reported by the reaper, and whether it had to kill.
type Reaped = (io::Result<ExitStatus>, bool);

/// A running child plus the tasks copying its standard streams.
///
/// The child itself is owned by a reaper task, so cancellation takes effect
/// even when nobody is waiting on this stage.
pub(crate) struct Process {
    pid: Option<u32>,
    reaper: JoinHandle<Reaped>,
    stdin_task: Option<JoinHandle<io::Result<()>>>,
    output_tasks: Vec<JoinHandle<io::Result<()>>>,
}

impl Process {
    /// Spawn the child and its copy tasks. Must run inside a tokio runtime.
    pub(crate) fn spawn(spec: SpawnSpec<'_>) -> Result<Self, ExecError> {
        let mut cmd = Command::new(spec.program);
        cmd.args(spec.args.iter().skip(1)).env_clear();
        for entry in spec.env {
            match entry.split_once('=') {
                Some((key, value)) if !key.is_empty() => {
                    cmd.env(key, value);
                }
                _ => {}
            }
        }

        let stdin_reader = match spec.stdin {
            Input::Null => {
                cmd.stdin(Stdio::null());
                None
            }
            Input::Inherit => {
                cmd.stdin(Stdio::inherit());
                None
            }
            Input::Reader(reader) => {
                cmd.stdin(Stdio::piped());
                Some(reader)
            }
        };

        let stdout_sink = match spec.stdout {
            Output::Null => {
                cmd.stdout(Stdio::null());
                None
            }
            Output::Inherit => {
                cmd.stdout(Stdio::inherit());
                None
            }
            Output::Writer(writer) => {
                cmd.stdout(Stdio::piped());
                Some(writer)
            }
        };

        cmd.stderr(Stdio::piped());
        let stderr_sink = match spec.stderr {
            Output::Null => None,
            Output::Inherit => Some(SharedWriter::new(tokio::io::stderr())),
            Output::Writer(writer) => Some(writer),
        };

        let mut child = cmd.spawn().map_err(ExecError::Spawn)?;
        let pid = child.id();
        debug!(target: "pipexec", program = spec.program, pid, "spawned process");

        let stdin_task = match (stdin_reader, child.stdin.take()) {
            (Some(mut reader), Some(mut stdin)) => Some(tokio::spawn(async move {
                match tokio::io::copy(&mut reader, &mut stdin).await {
                    Ok(_) => Ok(()),
                    Err(err) if err.kind() == io::ErrorKind::BrokenPipe => Ok(()),
                    Err(err) => Err(err),
                }
                // Dropping `stdin` closes the child's end.
            })),
            _ => None,
        };

        let mut output_tasks = Vec::with_capacity(2);
        if let (Some(sink), Some(stdout)) = (stdout_sink, child.stdout.take()) {
            output_tasks.push(tokio::spawn(pump(stdout, Some(sink), None)));
        }
        if let Some(stderr) = child.stderr.take() {
            output_tasks.push(tokio::spawn(pump(stderr, stderr_sink, Some(spec.capture))));
        }

        let reaper = tokio::spawn(reap(child, spec.cancel, pid));

        Ok(Self {
            pid,
            reaper,
            stdin_task,
            output_tasks,
        })
    }

    pub(crate) fn id(&self) -> Option<u32> {
        self.pid
    }

    /// Wait for the child to exit and its output to drain.
    ///
    /// The returned state is always populated as far as it is known, even when
    /// the result is an error.
    pub(crate) async fn wait(&mut self) -> (ProcessState, Result<(), ExecError>) {
        let (waited, cancelled) = match (&mut self.reaper).await {
            Ok(reaped) => reaped,
            Err(err) => (Err(io::Error::other(err)), false),
        };

        let mut copy_err = None;
        if let Some(task) = self.stdin_task.take() {
            if task.is_finished() {
                copy_err = join_copy(task).await.err();
            } else {
                task.abort();
            }
        }
        for task in std::mem::take(&mut self.output_tasks) {
            if cancelled {
                task.abort();
                continue;
            }
            if let Err(err) = join_copy(task).await {
                copy_err.get_or_insert(err);
            }
        }

        let state = ProcessState {
            status: waited.as_ref().ok().copied(),
            pid: self.pid,
        };
        debug!(target: "pipexec", pid = self.pid, exit_code = state.exit_code(), "process exited");

        let result = match waited {
            Err(err) => Err(ExecError::Io(err)),
            Ok(_) if cancelled => Err(ExecError::Cancelled),
            Ok(status) if !status.success() => Err(ExitError::new(status).into()),
            Ok(_) => match copy_err {
                Some(err) => Err(ExecError::Io(err)),
                None => Ok(()),
            },
        };
        (state, result)
    }
}

/// Own `child` until it exits, killing it as soon as `cancel` fires.
async fn reap(mut child: Child, cancel: CancelToken, pid: Option<u32>) -> Reaped {
    if let Some(status) = cancel.run_until_cancelled(child.wait()).await {
        return (status, false);
    }
    debug!(target: "pipexec", pid, "cancelled, killing process");
    if let Err(err) = child.start_kill() {
        warn!(target: "pipexec", pid, error = %err, "failed to kill process");
    }
    (child.wait().await, true)
}

async fn join_copy(task: JoinHandle<io::Result<()>>) -> io::Result<()> {
    match task.await {
        Ok(result) => result,
        Err(err) => Err(io::Error::other(err)),
    }
}

/// Copy `src` into `sink` and `capture` until end of stream.
///
/// A sink whose reader went away is dropped and the rest of the stream is
/// discarded, so the child never blocks on a full pipe.
async fn pump<R>(mut src: R, mut sink: Option<SharedWriter>, capture: Option<SharedBuffer>) -> io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; COPY_BUF];
    let mut result = Ok(());
    loop {
        let n = src.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        if let Some(capture) = &capture {
            capture.extend_from_slice(&buf[..n]);
        }
        if let Some(writer) = &sink {
            if let Err(err) = writer.write_all(&buf[..n]).await {
                if err.kind() != io::ErrorKind::BrokenPipe {
                    warn!(target: "pipexec", error = %err, "dropping output sink after write failure");
                    result = Err(err);
                }
                sink = None;
            }
        }
    }
    if let Some(writer) = &sink {
        writer.flush().await?;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_state_reports_minus_one() {
        let state = ProcessState {
            status: None,
            pid: None,
        };
        assert_eq!(state.exit_code(), -1);
        assert!(!state.success());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn spawn_captures_stderr_and_env() {
        let out = SharedBuffer::new();
        let capture = SharedBuffer::new();
        let args = vec![
            "/bin/sh".to_string(),
            "-c".to_string(),
            "echo \"$GREETING\"; echo oops >&2; exit 3".to_string(),
        ];
        let env = vec!["GREETING=first".to_string(), "GREETING=hi".to_string(), "junk".to_string()];
        let mut process = Process::spawn(SpawnSpec {
            program: "/bin/sh",
            args: &args,
            env: &env,
            stdin: Input::Null,
            stdout: out.clone().into(),
            stderr: Output::Null,
            capture: capture.clone(),
            cancel: CancelToken::new(),
        })
        .unwrap();
        assert!(process.id().is_some());

        let (state, result) = process.wait().await;
        assert_eq!(state.exit_code(), 3);
        assert_eq!(result.unwrap_err().exit_code(), Some(3));
        assert_eq!(out.contents(), "hi\n");
        assert_eq!(capture.contents(), "oops\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn cancel_kills_without_anyone_waiting() {
        let token = CancelToken::new();
        let args = vec!["/bin/sh".to_string(), "-c".to_string(), "while :; do :; done".to_string()];
        let mut process = Process::spawn(SpawnSpec {
            program: "/bin/sh",
            args: &args,
            env: &[],
            stdin: Input::Null,
            stdout: Output::Null,
            stderr: Output::Null,
            capture: SharedBuffer::new(),
            cancel: token.clone(),
        })
        .unwrap();

        token.cancel();
        tokio::time::timeout(std::time::Duration::from_secs(10), async {
            while !process.reaper.is_finished() {
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("reaper should kill the process on its own");

        let (state, result) = process.wait().await;
        assert!(matches!(result, Err(ExecError::Cancelled)));
        assert!(!state.success());
    }
}
