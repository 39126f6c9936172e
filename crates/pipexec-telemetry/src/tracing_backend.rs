// SPDX-License-Identifier: MIT OR Apache-2.0
//! [`Tracer`] backed by the `tracing` crate.
//!
//! Every started span becomes an `info`-level `tracing` span named `exec`
//! under target `pipexec`, with the logical span name in `otel.name` and the
//! generated ids in `trace_id`/`span_id`. Child spans are nested under their
//! parent's `tracing` span while the parent is still open. Attributes and
//! errors are emitted as events inside the span; the status lands in
//! `otel.status_code`/`otel.status_description`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::field::Empty;
use tracing::{debug, info_span, warn};

use crate::span::{KeyValue, Span, SpanContext, SpanId, Status, Tracer};

type LiveSpans = Arc<Mutex<HashMap<SpanId, tracing::Id>>>;

/// Tracer emitting `tracing` spans.
#[derive(Debug, Clone, Default)]
pub struct TracingTracer {
    live: LiveSpans,
}

impl TracingTracer {
    /// Create a tracer.
    pub fn new() -> Self {
        Self::default()
    }

    fn parent_id(&self, parent: Option<&SpanContext>) -> Option<tracing::Id> {
        let parent = parent?;
        self.live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&parent.span_id())
            .cloned()
    }
}

impl Tracer for TracingTracer {
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

        let span = match self.parent_id(parent) {
            Some(id) => info_span!(
                target: "pipexec",
                parent: id,
                "exec",
                otel.name = %name,
                trace_id = %context.trace_id(),
                span_id = %context.span_id(),
                otel.status_code = Empty,
                otel.status_description = Empty
            ),
            None => info_span!(
                target: "pipexec",
                "exec",
                otel.name = %name,
                trace_id = %context.trace_id(),
                span_id = %context.span_id(),
                otel.status_code = Empty,
                otel.status_description = Empty
            ),
        };

        if let Some(id) = span.id() {
            self.live
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(context.span_id(), id);
        }

        let span = TracingSpan {
            context,
            span: Mutex::new(Some(span)),
            live: Arc::clone(&self.live),
        };
        span.set_attributes(attributes);
        Arc::new(span)
    }
}

struct TracingSpan {
    context: SpanContext,
    span: Mutex<Option<tracing::Span>>,
    live: LiveSpans,
}

impl TracingSpan {
    fn with_span(&self, f: impl FnOnce(&tracing::Span)) {
        let guard = self.span.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(span) = guard.as_ref() {
            f(span);
        }
    }
}

impl Span for TracingSpan {
    fn span_context(&self) -> SpanContext {
        self.context
    }

    fn set_attributes(&self, attributes: Vec<KeyValue>) {
        self.with_span(|span| {
            for kv in &attributes {
                debug!(
                    target: "pipexec",
                    parent: span,
                    key = %kv.key,
                    value = %kv.value,
                    "span attribute"
                );
            }
        });
    }

    fn record_error(&self, err: &dyn std::error::Error) {
        self.with_span(|span| {
            warn!(target: "pipexec", parent: span, error = %err, "span error");
        });
    }

    fn set_status(&self, status: Status) {
        self.with_span(|span| match &status {
            Status::Unset => {}
            Status::Ok => {
                span.record("otel.status_code", "OK");
            }
            Status::Error { description } => {
                span.record("otel.status_code", "ERROR");
                span.record("otel.status_description", description.as_str());
            }
        });
    }

    fn end(&self) {
        let closed = self
            .span
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if closed.is_some() {
            self.live
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&self.context.span_id());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spans_get_fresh_ids_and_inherit_trace() {
        let tracer = TracingTracer::new();
        let parent = tracer.start("parent", None, vec![]);
        let parent_ctx = parent.span_context();
        let child = tracer.start("child", Some(&parent_ctx), vec![KeyValue::new("k", 1)]);

        assert!(parent_ctx.is_valid());
        assert_eq!(child.span_context().trace_id(), parent_ctx.trace_id());

        child.set_status(Status::error("failed"));
        child.end();
        child.end();
        parent.end();
        assert!(tracer.live.lock().unwrap().is_empty());
    }
}
