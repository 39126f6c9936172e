// SPDX-License-Identifier: MIT OR Apache-2.0
//! pipexec-telemetry
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! The narrow telemetry surface consumed by `pipexec`: a [`Tracer`] that opens
//! [`Span`]s and a [`Logger`] that records key-value debug events.
//!
//! Three flavours of each are provided:
//!
//! - no-op ([`NoopTracer`], [`NoopLogger`]), the defaults;
//! - `tracing`-backed ([`TracingTracer`], [`TracingLogger`]), for binaries that
//!   already install a `tracing` subscriber;
//! - in-memory ([`RecordingTracer`], [`RecordingLogger`]), for assertions in
//!   tests.

pub mod logger;
pub mod recording;
pub mod span;
pub mod tracing_backend;

pub use logger::{LogEntry, Logger, NoopLogger, RecordingLogger, TracingLogger};
pub use recording::{RecordingTracer, SpanData};
pub use span::{
    KeyValue, NoopSpan, NoopTracer, Span, SpanContext, SpanId, Status, TraceId, Tracer, Value,
};
pub use tracing_backend::TracingTracer;
