// SPDX-License-Identifier: MIT OR Apache-2.0
//! In-memory tracer that keeps every span it opens, for assertions in tests.

use std::sync::{Arc, Mutex, PoisonError};

use crate::span::{KeyValue, Span, SpanContext, Status, Tracer, Value};

/// Snapshot of a span recorded by [`RecordingTracer`].
#[derive(Debug, Clone, PartialEq)]
pub struct SpanData {
    /// Span name.
    pub name: String,
    /// The span's own context.
    pub span_context: SpanContext,
    /// Parent context passed to [`Tracer::start`].
    pub parent: Option<SpanContext>,
    /// Attributes in the order they were set.
    pub attributes: Vec<KeyValue>,
    /// Final status.
    pub status: Status,
    /// Messages of every recorded error.
    pub errors: Vec<String>,
    /// How many times `end` was called.
    pub end_count: usize,
}

impl SpanData {
    fn new(name: &str, span_context: SpanContext, parent: Option<SpanContext>) -> Self {
        Self {
            name: name.to_string(),
            span_context,
            parent,
            attributes: Vec::new(),
            status: Status::Unset,
            errors: Vec::new(),
            end_count: 0,
        }
    }

    /// The most recent value set for `key`.
    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes
            .iter()
            .rev()
            .find(|kv| kv.key == key)
            .map(|kv| &kv.value)
    }

    /// Whether `end` has been called at least once.
    pub fn is_ended(&self) -> bool {
        self.end_count > 0
    }
}

/// Tracer that records spans in memory.
///
/// Clones share the same storage, so a clone can be handed to the code under
/// test while this handle is kept for inspection.
#[derive(Debug, Clone, Default)]
pub struct RecordingTracer {
    spans: Arc<Mutex<Vec<Arc<RecordingSpan>>>>,
}

impl RecordingTracer {
    /// Create an empty tracer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshots of all spans started so far, in start order.
    pub fn spans(&self) -> Vec<SpanData> {
        let spans = self.spans.lock().unwrap_or_else(PoisonError::into_inner);
        spans.iter().map(|s| s.snapshot()).collect()
    }

    /// Number of spans started so far.
    pub fn span_count(&self) -> usize {
        self.spans
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Forget every recorded span.
    pub fn clear(&self) {
        self.spans
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl Tracer for RecordingTracer {
    fn start(
        &self,
        name: &str,
        parent: Option<&SpanContext>,
        attributes: Vec<KeyValue>,
    ) -> Arc<dyn Span> {
        let context = match parent {
            Some(p) => SpanContext::child_of(p),
            None => SpanContext::root(),
        };
        let mut data = SpanData::new(name, context, parent.copied());
        data.attributes = attributes;

        let span = Arc::new(RecordingSpan {
            data: Mutex::new(data),
        });
        self.spans
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::clone(&span));
        span
    }
}

#[derive(Debug)]
struct RecordingSpan {
    data: Mutex<SpanData>,
}

impl RecordingSpan {
    fn snapshot(&self) -> SpanData {
        self.data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn update(&self, f: impl FnOnce(&mut SpanData)) {
        let mut data = self.data.lock().unwrap_or_else(PoisonError::into_inner);
        if !data.is_ended() {
            f(&mut data);
        }
    }
}

impl Span for RecordingSpan {
    fn span_context(&self) -> SpanContext {
        self.data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .span_context
    }

    fn set_attributes(&self, attributes: Vec<KeyValue>) {
        self.update(|d| d.attributes.extend(attributes));
    }

    fn record_error(&self, err: &dyn std::error::Error) {
        let message = err.to_string();
        self.update(|d| d.errors.push(message));
    }

    fn set_status(&self, status: Status) {
        self.update(|d| d.status = status);
    }

    fn end(&self) {
        self.data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .end_count += 1;
    }
}
