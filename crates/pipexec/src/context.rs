// SPDX-License-Identifier: MIT OR Apache-2.0
//! Execution context passed explicitly down a pipeline.

use std::fmt;
use std::sync::Arc;

use pipexec_telemetry::{NoopSpan, Span, SpanContext};

use crate::cancel::CancelToken;

/// Carries the current span (the parent for the next process span) and the
/// cancellation token governing spawn and termination.
#[derive(Clone, Default)]
pub struct Context {
    span: Option<Arc<dyn Span>>,
    cancel: CancelToken,
}

impl Context {
    /// An empty context: no span, never cancelled unless its token is.
    pub fn background() -> Self {
        Self::default()
    }

    /// A context governed by `cancel`.
    pub fn with_cancel(cancel: CancelToken) -> Self {
        Self { span: None, cancel }
    }

    /// A copy of this context whose current span is `span`.
    pub fn with_span(&self, span: Arc<dyn Span>) -> Self {
        Self {
            span: Some(span),
            cancel: self.cancel.clone(),
        }
    }

    /// The current span, or a no-op span when there is none.
    pub fn span(&self) -> Arc<dyn Span> {
        match &self.span {
            Some(span) => Arc::clone(span),
            None => Arc::new(NoopSpan::default()),
        }
    }

    /// Identity of the current span, if any.
    pub fn span_context(&self) -> Option<SpanContext> {
        self.span.as_ref().map(|span| span.span_context())
    }

    /// The cancellation token.
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Shorthand for `self.cancel_token().is_cancelled()`.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("span", &self.span_context())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipexec_telemetry::{RecordingTracer, Tracer};

    #[test]
    fn background_has_no_span() {
        let ctx = Context::background();
        assert!(ctx.span_context().is_none());
        assert!(!ctx.span().span_context().is_valid());
        assert!(!ctx.is_cancelled());
    }

    #[test]
    fn with_span_keeps_cancel_token() {
        let token = CancelToken::new();
        let ctx = Context::with_cancel(token.clone());
        let span = RecordingTracer::new().start("op", None, vec![]);
        let child = ctx.with_span(Arc::clone(&span));

        assert_eq!(child.span_context(), Some(span.span_context()));
        token.cancel();
        assert!(child.is_cancelled());
    }
}
