//! Per-call context: deadline, cancellation and correlation id.

use std::{future, sync::Arc, time::Duration};

use tokio::{
    sync::watch,
    time::{sleep_until, Instant},
};

use crate::CloudApiError;

/// Cooperative cancellation signal shared between a caller and its calls.
///
/// Clones observe the same signal. Once cancelled it stays cancelled.
#[derive(Clone, Debug)]
pub struct CancelToken {
    sender: Arc<watch::Sender<bool>>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Cancels every call holding a clone of this token.
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }

    /// Resolves once [`CancelToken::cancel`] has been called.
    pub async fn cancelled(&self) {
        let mut receiver = self.sender.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = receiver.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Call-scoped values carried into the request executor.
#[derive(Clone, Debug, Default)]
pub struct RequestContext {
    deadline: Option<Instant>,
    cancel: Option<CancelToken>,
    request_id: Option<String>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a deadline `timeout` from now.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Sets an absolute deadline. An earlier existing deadline is kept.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(earliest(self.deadline, Some(deadline)).unwrap_or(deadline));
        self
    }

    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Correlation id sent as `X-Request-ID`.
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelToken::is_cancelled)
    }
}

/// Returns the earlier of two optional instants.
pub(crate) fn earliest(a: Option<Instant>, b: Option<Instant>) -> Option<Instant> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, None) => a,
        (None, b) => b,
    }
}

/// Cancellation state of one executor call: the caller's token plus the
/// effective deadline.
pub(crate) struct CallGuard<'a> {
    cancel: Option<&'a CancelToken>,
    deadline: Option<Instant>,
}

impl<'a> CallGuard<'a> {
    pub(crate) fn new(ctx: &'a RequestContext, timeout: Option<Duration>) -> Self {
        let bounded = timeout.map(|timeout| Instant::now() + timeout);
        Self {
            cancel: ctx.cancel.as_ref(),
            deadline: earliest(ctx.deadline, bounded),
        }
    }

    /// Returns the interruption error if the call must stop now.
    pub(crate) fn check(&self) -> Result<(), CloudApiError> {
        if self.cancel.is_some_and(CancelToken::is_cancelled) {
            return Err(CloudApiError::Cancelled);
        }
        if self.deadline.is_some_and(|deadline| deadline <= Instant::now()) {
            return Err(CloudApiError::DeadlineExceeded);
        }
        Ok(())
    }

    /// Resolves with the interruption error when the token fires or the
    /// deadline passes; pending forever when neither is set.
    pub(crate) async fn interrupted(&self) -> CloudApiError {
        let cancelled = async {
            match self.cancel {
                Some(token) => token.cancelled().await,
                None => future::pending().await,
            }
        };
        let expired = async {
            match self.deadline {
                Some(deadline) => sleep_until(deadline).await,
                None => future::pending().await,
            }
        };

        tokio::select! {
            biased;
            _ = cancelled => CloudApiError::Cancelled,
            _ = expired => CloudApiError::DeadlineExceeded,
        }
    }

    /// Runs `operation` unless the call is interrupted first.
    pub(crate) async fn run<F>(&self, operation: F) -> Result<F::Output, CloudApiError>
    where
        F: future::Future,
    {
        tokio::select! {
            biased;
            err = self.interrupted() => Err(err),
            output = operation => Ok(output),
        }
    }
}
