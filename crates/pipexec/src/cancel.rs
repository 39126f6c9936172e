// SPDX-License-Identifier: MIT OR Apache-2.0
//! Cancellation shared by every stage of a pipeline.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;
use tracing::debug;

/// Signal carried by a [`Context`](crate::Context).
///
/// A cancelled token makes [`Cmd::start`](crate::Cmd::start) fail with
/// [`ExecError::Cancelled`](crate::ExecError::Cancelled), and every process
/// already spawned under it is killed, whether or not anyone is waiting on it.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    fired: AtomicBool,
    notify: Notify,
}

impl CancelToken {
    /// A token that has not fired.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the token. Returns `true` for the call that actually fired it.
    pub fn cancel(&self) -> bool {
        let first = !self.inner.fired.swap(true, Ordering::AcqRel);
        if first {
            debug!(target: "pipexec", "cancellation requested");
            self.inner.notify.notify_waiters();
        }
        first
    }

    /// Whether the token has fired.
    pub fn is_cancelled(&self) -> bool {
        self.inner.fired.load(Ordering::Acquire)
    }

    /// Resolve once the token fires.
    pub async fn cancelled(&self) {
        let notified = self.inner.notify.notified();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }

    /// Drive `fut` to completion unless the token fires first, in which case
    /// `fut` is dropped and `None` is returned.
    pub async fn run_until_cancelled<F: Future>(&self, fut: F) -> Option<F::Output> {
        tokio::select! {
            biased;
            () = self.cancelled() => None,
            out = fut => Some(out),
        }
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
