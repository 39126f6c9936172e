// SPDX-License-Identifier: MIT OR Apache-2.0
//! Chained configuration of a command or pipeline, and the wiring pass that
//! turns it into a runnable [`Cmd`].

use std::fmt;
use std::sync::Arc;

use pipexec_telemetry::{Logger, Tracer};
use pipexec_which::NotFoundError;
use tracing::debug;

use crate::cmd::{ArgsRedaction, Cmd};
use crate::context::Context;
use crate::error::ExecError;
use crate::pipe::{Closer, pipe};
use crate::stdio::{Input, Output, SharedWriter};

/// Start configuring `name` with a background context.
pub fn command(name: &str) -> CmdBuilder {
    command_with_context(Context::background(), name)
}

/// Start configuring `name` under `ctx`.
///
/// Resolution happens immediately; a missing executable is kept as a deferred
/// error and reported by [`CmdBuilder::run`] or [`Cmd::start`].
pub fn command_with_context(ctx: Context, name: &str) -> CmdBuilder {
    CmdBuilder {
        cmd: Cmd::new(ctx, name),
    }
}

/// Builder for a [`Cmd`]. Setters apply to the head stage, in call order.
pub struct CmdBuilder {
    cmd: Cmd,
}

impl CmdBuilder {
    /// Replace the arguments. The path stays argument zero.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cmd.set_args(args);
        self
    }

    /// Append to the current arguments.
    pub fn append_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cmd.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Add one `KEY=VALUE` environment entry. Earlier entries for the same
    /// key are kept; the last one wins at spawn time.
    pub fn env(mut self, key: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        self.cmd
            .env
            .push(format!("{}={}", key.as_ref(), value.as_ref()));
        self
    }

    /// Add several environment entries.
    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in vars {
            self = self.env(key, value);
        }
        self
    }

    /// Bind standard input.
    pub fn stdin(mut self, input: Input) -> Self {
        self.cmd.stdin = input;
        self
    }

    /// Bind standard output. For a pipeline this is the tail's output.
    pub fn stdout(mut self, output: impl Into<Output>) -> Self {
        self.cmd.stdout = output.into();
        self
    }

    /// Bind standard error. Shared by every stage of a pipeline.
    pub fn stderr(mut self, output: impl Into<Output>) -> Self {
        self.cmd.stderr = output.into();
        self
    }

    /// Append a stage to the end of the pipeline.
    pub fn pipe<I, S>(mut self, name: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tail = self.cmd.tail_mut();
        let mut next = Cmd::new(tail.ctx.clone(), name);
        next.set_args(args);
        tail.next = Some(Box::new(next));
        self
    }

    /// Transform the arguments attached to spans and logs.
    pub fn args_redaction<F>(mut self, redact: F) -> Self
    where
        F: Fn(&[String]) -> Vec<String> + Send + Sync + 'static,
    {
        let redact: ArgsRedaction = Arc::new(redact);
        self.cmd.args_redaction = Some(redact);
        self
    }

    /// Use `tracer` for every stage.
    pub fn tracer<T: Tracer + 'static>(mut self, tracer: T) -> Self {
        self.cmd.tracer = Arc::new(tracer);
        self
    }

    /// Use `logger` for every stage.
    pub fn logger<L: Logger + 'static>(mut self, logger: L) -> Self {
        self.cmd.logger = Arc::new(logger);
        self
    }

    /// Wire the pipeline and return the head.
    pub fn build(self) -> Cmd {
        let mut cmd = self.cmd;
        cmd.err = wire(&mut cmd);
        cmd
    }

    /// Build, then run unless construction failed.
    ///
    /// The command is returned in both cases so it can still be inspected.
    pub async fn run(self) -> (Cmd, Result<(), ExecError>) {
        let mut cmd = self.build();
        if let Some(err) = cmd.err.clone() {
            cmd.logger
                .debug(cmd.ctx.span_context().as_ref(), &err.to_string(), &[]);
            return (cmd, Err(err.into()));
        }
        let result = cmd.run().await;
        (cmd, result)
    }
}

impl fmt::Debug for CmdBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CmdBuilder").field("cmd", &self.cmd).finish()
    }
}

/// Connect each stage to the next through an in-memory pipe and propagate
/// shared configuration down the chain.
///
/// A link is piped only when both ends resolved; unresolved stages surface
/// their error when started. Returns the first error in the chain.
fn wire(cmd: &mut Cmd) -> Option<NotFoundError> {
    if cmd.err.is_some() {
        cmd.logger.debug(
            cmd.ctx.span_context().as_ref(),
            &format!("{} not found", cmd.base_name()),
            &[],
        );
    }

    let own = cmd.err.clone();
    let Some(next) = cmd.next.as_deref_mut() else {
        return own;
    };

    next.tracer = Arc::clone(&cmd.tracer);
    next.logger = Arc::clone(&cmd.logger);
    if next.args_redaction.is_none() {
        next.args_redaction = cmd.args_redaction.clone();
    }

    if own.is_none() && next.err.is_none() {
        let (reader, writer) = pipe();
        let writer = SharedWriter::new(writer);
        next.stdout = std::mem::replace(&mut cmd.stdout, Output::Writer(writer.clone()));
        next.stdin = Input::reader(reader);
        next.stderr = cmd.stderr.clone();
        next.env = cmd.env.clone();
        cmd.closer = Closer::new(writer);
        debug!(target: "pipexec", from = %cmd.path, to = %next.path, "wired pipe");
    }

    let downstream = wire(next);
    own.or(downstream)
}
