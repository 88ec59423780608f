//! Per-request execution context.
//!
//! The access recorder never acts on cancellation; it only asks the context for
//! its final state once the inner handler has returned. [`RequestContext`] is the
//! concrete carrier used by the tower integration, and anything implementing
//! [`ExecutionContext`] can be handed to [`AccessRecorder::observe`].
//!
//! [`AccessRecorder::observe`]: crate::AccessRecorder::observe

use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

/// Reason a context stopped being live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ContextError {
    /// The context was cancelled explicitly, or one of its parents was.
    #[error("context canceled")]
    Canceled,
    /// The context deadline passed.
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

/// Read side of a cancellation/deadline signal.
pub trait ExecutionContext {
    /// Returns `None` while the context is live, or the reason it ended.
    fn err(&self) -> Option<ContextError>;
}

impl<T: ExecutionContext + ?Sized> ExecutionContext for &T {
    fn err(&self) -> Option<ContextError> {
        (**self).err()
    }
}

impl<T: ExecutionContext + ?Sized> ExecutionContext for Arc<T> {
    fn err(&self) -> Option<ContextError> {
        (**self).err()
    }
}

/// Cloneable cancellation/deadline carrier for a single request.
///
/// Clones share state: cancelling one clone cancels all of them. The first
/// cause observed (explicit cancel, parent cancel, or deadline) is the one
/// reported from then on.
///
/// # Examples
///
/// ```rust
/// use accesslog::{ContextError, ExecutionContext, RequestContext};
///
/// let ctx = RequestContext::background();
/// assert_eq!(ctx.err(), None);
///
/// ctx.cancel();
/// assert_eq!(ctx.err(), Some(ContextError::Canceled));
/// ```
#[derive(Debug, Clone)]
pub struct RequestContext {
    token: CancellationToken,
    deadline: Option<Instant>,
    cause: Arc<OnceLock<ContextError>>,
    parent: Option<Box<RequestContext>>,
}

impl RequestContext {
    /// A context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
            cause: Arc::new(OnceLock::new()),
            parent: None,
        }
    }

    /// A context that reports [`ContextError::DeadlineExceeded`] once `deadline` has passed.
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            ..Self::background()
        }
    }

    /// Shorthand for [`RequestContext::with_deadline`] relative to now.
    ///
    /// A timeout too large to represent as an [`Instant`] leaves the context
    /// without a deadline.
    pub fn with_timeout(timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => Self::with_deadline(deadline),
            None => Self::background(),
        }
    }

    /// Derive a context that ends when this one ends, or earlier if it is
    /// cancelled on its own.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
            cause: Arc::new(OnceLock::new()),
            parent: Some(Box::new(self.clone())),
        }
    }

    /// Derive a child context with a tighter deadline. The parent's deadline
    /// still applies if it is earlier.
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        let deadline = match (self.deadline, Instant::now().checked_add(timeout)) {
            (Some(parent), Some(requested)) => Some(parent.min(requested)),
            (parent, requested) => parent.or(requested),
        };
        Self {
            deadline,
            ..self.child()
        }
    }

    /// Cancel this context and every child derived from it.
    ///
    /// A context whose deadline has already passed keeps reporting
    /// [`ContextError::DeadlineExceeded`].
    pub fn cancel(&self) {
        if self.expired() {
            let _ = self.cause.set(ContextError::DeadlineExceeded);
        }
        let _ = self.cause.set(ContextError::Canceled);
        self.token.cancel();
    }

    /// The deadline, if one was set.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Resolves once the context is cancelled or its deadline passes.
    pub async fn done(&self) {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.token.cancelled() => {}
                    _ = tokio::time::sleep_until(deadline.into()) => {}
                }
            }
            None => self.token.cancelled().await,
        }
    }

    fn expired(&self) -> bool {
        self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }

    fn resolve(&self) -> Option<ContextError> {
        if let Some(cause) = self.cause.get() {
            return Some(*cause);
        }
        if self.expired() {
            let cause = *self.cause.get_or_init(|| ContextError::DeadlineExceeded);
            self.token.cancel();
            return Some(cause);
        }
        if let Some(parent) = self.parent.as_deref() {
            if let Some(cause) = parent.resolve() {
                return Some(*self.cause.get_or_init(|| cause));
            }
        }
        if self.token.is_cancelled() {
            return Some(*self.cause.get_or_init(|| ContextError::Canceled));
        }
        None
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::background()
    }
}

impl ExecutionContext for RequestContext {
    fn err(&self) -> Option<ContextError> {
        self.resolve()
    }
}
