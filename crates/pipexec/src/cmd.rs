// SPDX-License-Identifier: MIT OR Apache-2.0
//! The process descriptor and its start/wait state machine.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use pipexec_telemetry::{KeyValue, Logger, NoopLogger, NoopTracer, Span, Status, Tracer};
use pipexec_which::{NotFoundError, look_path};
use tracing::{debug, warn};

use crate::context::Context;
use crate::error::ExecError;
use crate::pipe::Closer;
use crate::process::{Process, ProcessState, SpawnSpec};
use crate::quote;
use crate::stdio::{Input, Output, SharedBuffer};
use crate::{SPAN_ID_ENV, SPAN_NAME, TRACE_ID_ENV};

/// Transform applied to the argument list before it is attached to spans and
/// logs. The spawned argument list is never affected.
pub type ArgsRedaction = Arc<dyn Fn(&[String]) -> Vec<String> + Send + Sync>;

/// One external command, optionally the head of a pipeline.
///
/// Lifecycle is `created -> started -> waited`. Build one with
/// [`command`](crate::command) or [`command_with_context`](crate::command_with_context).
pub struct Cmd {
    pub(crate) path: String,
    pub(crate) args: Vec<String>,
    pub(crate) env: Vec<String>,
    pub(crate) stdin: Input,
    pub(crate) stdout: Output,
    pub(crate) stderr: Output,
    pub(crate) next: Option<Box<Cmd>>,
    pub(crate) err: Option<NotFoundError>,
    pub(crate) ctx: Context,
    pub(crate) closer: Closer,
    pub(crate) tracer: Arc<dyn Tracer>,
    pub(crate) logger: Arc<dyn Logger>,
    pub(crate) args_redaction: Option<ArgsRedaction>,
    captured_stderr: SharedBuffer,
    process: Option<Process>,
    state: Option<ProcessState>,
}

impl Cmd {
    /// Resolve `name` and create an unwired descriptor. Resolution failure is
    /// kept as the deferred error.
    pub(crate) fn new(ctx: Context, name: &str) -> Self {
        let (path, err) = match look_path(name) {
            Ok(path) => (path.to_string_lossy().into_owned(), None),
            Err(err) => (name.to_string(), Some(err)),
        };
        let env = std::env::vars_os()
            .map(|(k, v)| format!("{}={}", k.to_string_lossy(), v.to_string_lossy()))
            .collect();

        Self {
            args: vec![path.clone()],
            path,
            env,
            stdin: Input::Null,
            stdout: Output::Null,
            stderr: Output::Null,
            next: None,
            err,
            ctx,
            closer: Closer::default(),
            tracer: Arc::new(NoopTracer),
            logger: Arc::new(NoopLogger),
            args_redaction: None,
            captured_stderr: SharedBuffer::new(),
            process: None,
            state: None,
        }
    }

    /// Replace the arguments, keeping the path as argument zero.
    pub(crate) fn set_args<I, S>(&mut self, args: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = std::iter::once(self.path.clone())
            .chain(args.into_iter().map(Into::into))
            .collect();
    }

    /// The last stage of the chain.
    pub(crate) fn tail_mut(&mut self) -> &mut Cmd {
        match self.next {
            Some(ref mut next) => next.tail_mut(),
            None => self,
        }
    }

    /// Start this stage without waiting for it to complete.
    ///
    /// Fails without side effects when already started, and with the deferred
    /// error when the executable could not be resolved. On success the stage's
    /// span stays open until [`wait`](Cmd::wait).
    pub fn start(&mut self) -> Result<(), ExecError> {
        if self.process.is_some() {
            return Err(ExecError::AlreadyStarted);
        }
        if let Some(err) = &self.err {
            return Err(err.clone().into());
        }

        let parent = self.ctx.span_context();
        let span = self.tracer.start(
            SPAN_NAME,
            parent.as_ref(),
            vec![KeyValue::new("exec.args", self.telemetry_args())],
        );
        let sc = span.span_context();
        self.env.push(format!("{TRACE_ID_ENV}={}", sc.trace_id()));
        self.env.push(format!("{SPAN_ID_ENV}={}", sc.span_id()));

        self.ctx = self.ctx.with_span(Arc::clone(&span));
        if let Some(next) = self.next.as_mut() {
            next.ctx = self.ctx.clone();
        }

        let spawned = if self.ctx.is_cancelled() {
            Err(ExecError::Cancelled)
        } else {
            Process::spawn(SpawnSpec {
                program: &self.path,
                args: &self.args,
                env: &self.env,
                stdin: std::mem::take(&mut self.stdin),
                stdout: self.stdout.clone(),
                stderr: self.stderr.clone(),
                capture: self.captured_stderr.clone(),
                cancel: self.ctx.cancel_token().clone(),
            })
        };

        match spawned {
            Ok(process) => {
                span.set_status(Status::Ok);
                self.process = Some(process);
                Ok(())
            }
            Err(err) => {
                debug!(target: "pipexec", path = %self.path, error = %err, "failed to start");
                span.record_error(&err);
                span.set_status(Status::error(err.to_string()));
                span.end();
                Err(err)
            }
        }
    }

    /// Wait for this stage, and every stage after it, to finish.
    ///
    /// The next stage is started first. If this stage fails, the next stage's
    /// span is marked failed and closed without waiting on it; otherwise its
    /// result becomes the result of this call.
    ///
    /// Dropping the future early ends the spans it still holds with an error
    /// status and releases the pipe to the next stage. Processes keep running
    /// unless the context is cancelled.
    pub fn wait(&mut self) -> BoxFuture<'_, Result<(), ExecError>> {
        self.wait_chain().boxed()
    }

    /// [`start`](Cmd::start) followed by [`wait`](Cmd::wait).
    pub async fn run(&mut self) -> Result<(), ExecError> {
        self.start()?;
        self.wait().await
    }

    async fn wait_chain(&mut self) -> Result<(), ExecError> {
        if self.process.is_none() {
            return Err(ExecError::NotStarted);
        }
        if self.state.is_some() {
            return Err(ExecError::AlreadyWaited);
        }

        let mut guard = WaitGuard {
            span: Some(self.ctx.span()),
            next_span: None,
            closer: std::mem::take(&mut self.closer),
        };
        let next_start_err = match self.next.as_mut() {
            Some(next) => match next.start() {
                Ok(()) => {
                    guard.next_span = Some(next.ctx.span());
                    None
                }
                Err(err) => Some(err),
            },
            None => None,
        };

        let (state, mut result) = match self.process.as_mut() {
            Some(process) => process.wait().await,
            None => return Err(ExecError::NotStarted),
        };
        self.state = Some(state);

        if let Err(err) = &result {
            self.log_failure(err, &state);
        }
        if let Err(err) = guard.closer.close().await {
            warn!(target: "pipexec", path = %self.path, error = %err, "failed to close pipe");
        }

        let failed_stage = result.is_err().then(|| self.telemetry_stage());
        match (next_start_err, self.next.as_mut()) {
            (Some(start_err), _) => {
                if result.is_ok() {
                    result = Err(start_err);
                }
            }
            (None, Some(next)) => match (failed_stage, guard.next_span.take()) {
                (Some(stage), Some(next_span)) => {
                    next_span.set_status(Status::error(format!(
                        "`{stage}` exited with code {}",
                        state.exit_code()
                    )));
                    next_span.end();
                }
                _ => result = next.wait().await,
            },
            (None, None) => {}
        }

        if let Some(span) = guard.span.take() {
            span.set_attributes(vec![KeyValue::new(
                "exec.exit_code",
                i64::from(state.exit_code()),
            )]);
            match &result {
                Ok(()) => span.set_status(Status::Ok),
                Err(err) => {
                    span.record_error(err);
                    span.set_status(Status::error(err.to_string()));
                }
            }
            span.end();
        }

        result
    }

    fn log_failure(&self, err: &ExecError, state: &ProcessState) {
        let output = self.captured_stderr.contents();
        let output = output.trim_matches(['\r', '\n', ' ']);
        let fields = [
            ("exec.error", err.to_string()),
            ("exec.exit_code", state.exit_code().to_string()),
            ("exec.command", self.telemetry_stage()),
            ("exec.output", output.to_string()),
        ];
        self.logger.debug(
            self.ctx.span_context().as_ref(),
            &format!("failed to execute `{}`", self.base_name()),
            &fields,
        );
    }

    /// Arguments as attached to telemetry, after redaction.
    fn telemetry_args(&self) -> Vec<String> {
        match &self.args_redaction {
            Some(redact) => redact(&self.args),
            None => self.args.clone(),
        }
    }

    /// This stage alone rendered with redacted arguments.
    fn telemetry_stage(&self) -> String {
        render_stage(&self.path, &self.telemetry_args())
    }

    pub(crate) fn base_name(&self) -> String {
        Path::new(&self.path)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.clone())
    }

    /// Resolved executable path, or the name as given when resolution failed.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Argument list; element zero mirrors [`path`](Cmd::path).
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Environment entries as `KEY=VALUE`.
    pub fn env(&self) -> &[String] {
        &self.env
    }

    /// Deferred construction error. On a pipeline head this is the first
    /// error found anywhere in the chain.
    pub fn err(&self) -> Option<&NotFoundError> {
        self.err.as_ref()
    }

    /// The next stage, if any.
    pub fn next(&self) -> Option<&Cmd> {
        self.next.as_deref()
    }

    /// Mutable access to the next stage.
    pub fn next_mut(&mut self) -> Option<&mut Cmd> {
        self.next.as_deref_mut()
    }

    /// Iterate the chain from this stage to the tail.
    pub fn stages(&self) -> impl Iterator<Item = &Cmd> {
        std::iter::successors(Some(self), |cmd| cmd.next.as_deref())
    }

    /// OS process id once started.
    pub fn process_id(&self) -> Option<u32> {
        self.process.as_ref().and_then(Process::id)
    }

    /// Exit information once waited.
    pub fn process_state(&self) -> Option<&ProcessState> {
        self.state.as_ref()
    }

    /// Current context. After `start` it carries this stage's span.
    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// Everything the process wrote to stderr so far.
    pub fn captured_stderr(&self) -> String {
        self.captured_stderr.contents()
    }
}

/// Cleanup for a `wait` that is dropped before it completes.
///
/// Spans still held here are ended as abandoned, and dropping the closer
/// releases the pipe so the next stage sees end of input.
struct WaitGuard {
    span: Option<Arc<dyn Span>>,
    next_span: Option<Arc<dyn Span>>,
    closer: Closer,
}

impl Drop for WaitGuard {
    fn drop(&mut self) {
        for span in self.span.iter().chain(self.next_span.iter()) {
            span.set_status(Status::error(ABANDONED));
            span.end();
        }
    }
}

const ABANDONED: &str = "wait abandoned before the process exited";

fn render_stage(path: &str, args: &[String]) -> String {
    let rest = args.get(1..).unwrap_or_default();
    if rest.is_empty() {
        return path.to_string();
    }
    format!("{path} {}", quote::join(rest))
}

impl fmt::Display for Cmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&render_stage(&self.path, &self.args))?;
        if let Some(next) = &self.next {
            write!(f, " | {next}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Cmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cmd")
            .field("path", &self.path)
            .field("args", &self.args)
            .field("err", &self.err)
            .field("started", &self.process.is_some())
            .field("state", &self.state)
            .field("next", &self.next)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unresolved(name: &str) -> Cmd {
        Cmd::new(Context::background(), name)
    }

    #[test]
    fn unresolved_name_keeps_name_and_error() {
        let cmd = unresolved("definitely-not-a-real-binary-xyz");
        assert_eq!(cmd.path(), "definitely-not-a-real-binary-xyz");
        assert_eq!(cmd.args(), ["definitely-not-a-real-binary-xyz"]);
        assert!(cmd.err().is_some());
    }

    #[test]
    fn set_args_keeps_path_first() {
        let mut cmd = unresolved("nope-xyz");
        cmd.set_args(["a", "b"]);
        cmd.set_args(["c"]);
        assert_eq!(cmd.args(), ["nope-xyz", "c"]);
    }

    #[test]
    fn render_quotes_arguments_only() {
        let mut cmd = unresolved("nope-xyz");
        cmd.set_args(["hello world", "[:lower:]"]);
        assert_eq!(cmd.to_string(), "nope-xyz 'hello world' \\[:lower:]");
    }

    #[test]
    fn tail_walks_to_last_stage() {
        let mut head = unresolved("a-xyz");
        head.next = Some(Box::new(unresolved("b-xyz")));
        head.tail_mut().next = Some(Box::new(unresolved("c-xyz")));
        let names: Vec<_> = head.stages().map(Cmd::path).collect();
        assert_eq!(names, ["a-xyz", "b-xyz", "c-xyz"]);
    }

    #[test]
    fn start_on_unresolved_returns_not_found() {
        let mut cmd = unresolved("nope-xyz");
        let err = cmd.start().unwrap_err();
        assert!(err.is_not_found());
        assert!(cmd.process_id().is_none());
    }

    #[tokio::test]
    async fn wait_before_start_fails() {
        let mut cmd = unresolved("nope-xyz");
        let err = cmd.wait().await.unwrap_err();
        assert!(matches!(err, ExecError::NotStarted));
    }

    #[test]
    fn base_name_strips_directories() {
        let cmd = unresolved("/no/such/dir/tool");
        assert_eq!(cmd.base_name(), "tool");
    }
}
