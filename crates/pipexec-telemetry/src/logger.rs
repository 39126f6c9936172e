// SPDX-License-Identifier: MIT OR Apache-2.0
//! Structured debug logging contract and its implementations.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use crate::span::SpanContext;

/// Receives key-value debug events.
pub trait Logger: Send + Sync {
    /// Log `message` with `fields`, correlated with `span` when one is active.
    fn debug(&self, span: Option<&SpanContext>, message: &str, fields: &[(&str, String)]);
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLogger;

impl Logger for NoopLogger {
    fn debug(&self, _span: Option<&SpanContext>, _message: &str, _fields: &[(&str, String)]) {}
}

/// Forwards events to `tracing::debug!` under the `pipexec` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn debug(&self, span: Option<&SpanContext>, message: &str, fields: &[(&str, String)]) {
        let rendered = fields
            .iter()
            .map(|(k, v)| format!("{k}={v:?}"))
            .collect::<Vec<_>>()
            .join(" ");

        match span.filter(|ctx| ctx.is_valid()) {
            Some(ctx) => debug!(
                target: "pipexec",
                trace_id = %ctx.trace_id(),
                span_id = %ctx.span_id(),
                fields = %rendered,
                "{message}"
            ),
            None => debug!(target: "pipexec", fields = %rendered, "{message}"),
        }
    }
}

/// One event captured by [`RecordingLogger`].
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    /// Log message.
    pub message: String,
    /// Fields in call order.
    pub fields: Vec<(String, String)>,
    /// Span the event was correlated with.
    pub span: Option<SpanContext>,
}

impl LogEntry {
    /// Value of the first field named `key`.
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Logger that keeps every event in memory.
///
/// Clones share storage. `Display` renders one line per entry, handy for
/// dumping into test output.
#[derive(Debug, Clone, Default)]
pub struct RecordingLogger {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl RecordingLogger {
    /// Create an empty logger.
    pub fn new() -> Self {
        Self::default()
    }

    /// All entries logged so far.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Entries whose message equals `message`.
    pub fn find(&self, message: &str) -> Vec<LogEntry> {
        self.entries()
            .into_iter()
            .filter(|e| e.message == message)
            .collect()
    }
}

impl Logger for RecordingLogger {
    fn debug(&self, span: Option<&SpanContext>, message: &str, fields: &[(&str, String)]) {
        let entry = LogEntry {
            message: message.to_string(),
            fields: fields
                .iter()
                .map(|(k, v)| ((*k).to_string(), v.clone()))
                .collect(),
            span: span.copied(),
        };
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
    }
}

impl fmt::Display for RecordingLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in self.entries() {
            write!(f, "debug: {}", entry.message)?;
            for (k, v) in &entry.fields {
                write!(f, " {k}={v:?}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
