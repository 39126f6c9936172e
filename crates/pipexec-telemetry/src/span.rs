// SPDX-License-Identifier: MIT OR Apache-2.0
//! Span identity, attributes, status, and the [`Tracer`]/[`Span`] contracts.

use std::fmt;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// 128-bit trace identifier, rendered as 32 lowercase hex digits.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TraceId(u128);

impl TraceId {
    /// The all-zero, invalid trace id.
    pub const INVALID: Self = Self(0);

    /// Wrap a raw value.
    pub const fn from_u128(value: u128) -> Self {
        Self(value)
    }

    /// Generate a random, valid trace id.
    pub fn random() -> Self {
        loop {
            let value = uuid::Uuid::new_v4().as_u128();
            if value != 0 {
                return Self(value);
            }
        }
    }

    /// Returns `true` unless this is [`TraceId::INVALID`].
    pub fn is_valid(&self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

impl fmt::Debug for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TraceId({self})")
    }
}

/// 64-bit span identifier, rendered as 16 lowercase hex digits.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SpanId(u64);

impl SpanId {
    /// The all-zero, invalid span id.
    pub const INVALID: Self = Self(0);

    /// Wrap a raw value.
    pub const fn from_u64(value: u64) -> Self {
        Self(value)
    }

    /// Generate a random, valid span id.
    pub fn random() -> Self {
        loop {
            let value = uuid::Uuid::new_v4().as_u128() as u64;
            if value != 0 {
                return Self(value);
            }
        }
    }

    /// Returns `true` unless this is [`SpanId::INVALID`].
    pub fn is_valid(&self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl fmt::Debug for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SpanId({self})")
    }
}

/// The propagated identity of a span: which trace it belongs to and its own id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct SpanContext {
    trace_id: TraceId,
    span_id: SpanId,
}

impl SpanContext {
    /// A context with both ids invalid.
    pub const INVALID: Self = Self {
        trace_id: TraceId::INVALID,
        span_id: SpanId::INVALID,
    };

    /// Build a context from explicit ids.
    pub const fn new(trace_id: TraceId, span_id: SpanId) -> Self {
        Self { trace_id, span_id }
    }

    /// Start a new trace.
    pub fn root() -> Self {
        Self::new(TraceId::random(), SpanId::random())
    }

    /// A fresh span id inside `parent`'s trace, or a new trace when `parent`
    /// is invalid.
    pub fn child_of(parent: &SpanContext) -> Self {
        if parent.trace_id.is_valid() {
            Self::new(parent.trace_id, SpanId::random())
        } else {
            Self::root()
        }
    }

    /// Trace this span belongs to.
    pub fn trace_id(&self) -> TraceId {
        self.trace_id
    }

    /// This span's own id.
    pub fn span_id(&self) -> SpanId {
        self.span_id
    }

    /// Both ids are valid.
    pub fn is_valid(&self) -> bool {
        self.trace_id.is_valid() && self.span_id.is_valid()
    }
}

// ---------------------------------------------------------------------------
// Attributes and status
// ---------------------------------------------------------------------------

/// An attribute value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// A single string.
    String(String),
    /// An ordered list of strings.
    StringArray(Vec<String>),
    /// A signed integer.
    I64(i64),
    /// A boolean flag.
    Bool(bool),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => f.write_str(s),
            Value::StringArray(items) => write!(f, "{items:?}"),
            Value::I64(n) => write!(f, "{n}"),
            Value::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<Vec<String>> for Value {
    fn from(value: Vec<String>) -> Self {
        Value::StringArray(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::I64(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::I64(i64::from(value))
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

/// A named attribute.
#[derive(Clone, Debug, PartialEq)]
pub struct KeyValue {
    /// Attribute name, e.g. `exec.args`.
    pub key: String,
    /// Attribute value.
    pub value: Value,
}

impl KeyValue {
    /// Create an attribute.
    pub fn new(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Outcome recorded on a span. The last status set wins.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Status {
    /// Nothing recorded yet.
    #[default]
    Unset,
    /// The operation completed successfully.
    Ok,
    /// The operation failed.
    Error {
        /// Human-readable reason.
        description: String,
    },
}

impl Status {
    /// Shorthand for [`Status::Error`].
    pub fn error(description: impl Into<String>) -> Self {
        Status::Error {
            description: description.into(),
        }
    }

    /// Returns `true` for [`Status::Error`].
    pub fn is_error(&self) -> bool {
        matches!(self, Status::Error { .. })
    }
}

// ---------------------------------------------------------------------------
// Contracts
// ---------------------------------------------------------------------------

/// One timed, attributed operation.
///
/// Implementations ignore mutations after [`end`](Span::end), and `end` itself
/// is idempotent.
pub trait Span: Send + Sync {
    /// Identity of this span, used to parent child spans and to export ids to
    /// child processes.
    fn span_context(&self) -> SpanContext;

    /// Add attributes.
    fn set_attributes(&self, attributes: Vec<KeyValue>);

    /// Record an error event.
    fn record_error(&self, err: &dyn std::error::Error);

    /// Set the span status.
    fn set_status(&self, status: Status);

    /// Close the span.
    fn end(&self);
}

/// Opens spans.
pub trait Tracer: Send + Sync {
    /// Start a span named `name`, parented to `parent` when given.
    fn start(
        &self,
        name: &str,
        parent: Option<&SpanContext>,
        attributes: Vec<KeyValue>,
    ) -> Arc<dyn Span>;
}

// ---------------------------------------------------------------------------
// No-op implementation
// ---------------------------------------------------------------------------

/// A tracer that records nothing.
///
/// Its spans carry the parent's context (or an invalid one), so ids still flow
/// through a pipeline when the caller has its own trace.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTracer;

impl Tracer for NoopTracer {
    fn start(
        &self,
        _name: &str,
        parent: Option<&SpanContext>,
        _attributes: Vec<KeyValue>,
    ) -> Arc<dyn Span> {
        Arc::new(NoopSpan::new(parent.copied().unwrap_or(SpanContext::INVALID)))
    }
}

/// A span that records nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSpan {
    context: SpanContext,
}

impl NoopSpan {
    /// A no-op span reporting `context`.
    pub fn new(context: SpanContext) -> Self {
        Self { context }
    }
}

impl Span for NoopSpan {
    fn span_context(&self) -> SpanContext {
        self.context
    }

    fn set_attributes(&self, _attributes: Vec<KeyValue>) {}

    fn record_error(&self, _err: &dyn std::error::Error) {}

    fn set_status(&self, _status: Status) {}

    fn end(&self) {}
}
