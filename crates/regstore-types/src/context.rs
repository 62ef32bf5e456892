use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

/// Why a request context is no longer live.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ContextError {
    #[error("request cancelled")]
    Cancelled,

    #[error("request deadline exceeded")]
    DeadlineExceeded,
}

/// Per-request context passed to every store and registry operation.
///
/// Carries the request namespace (an API server derives it from the
/// request path), a cancellation token, and an optional deadline. The store
/// never imposes a timeout of its own; callers attach one here.
#[derive(Clone, Debug, Default)]
pub struct RequestContext {
    namespace: Option<String>,
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl RequestContext {
    /// A context with no namespace, no deadline, and a fresh token.
    pub fn new() -> Self {
        Self::default()
    }

    /// A context scoped to `namespace`.
    pub fn with_namespace(namespace: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            ..Self::default()
        }
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Attach a deadline; an earlier existing deadline wins.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        self
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// A derived context: cancelling the parent cancels the child, not the
    /// other way round.
    pub fn child(&self) -> Self {
        Self {
            namespace: self.namespace.clone(),
            cancel: self.cancel.child_token(),
            deadline: self.deadline,
        }
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Fail if the context has been cancelled or its deadline has passed.
    pub fn check(&self) -> Result<(), ContextError> {
        if self.cancel.is_cancelled() {
            return Err(ContextError::Cancelled);
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(ContextError::DeadlineExceeded);
        }
        Ok(())
    }

    /// Resolve once the context is cancelled or its deadline passes.
    pub async fn done(&self) -> ContextError {
        match self.deadline {
            Some(deadline) => {
                let deadline = tokio::time::Instant::from_std(deadline);
                tokio::select! {
                    _ = self.cancel.cancelled() => ContextError::Cancelled,
                    _ = tokio::time::sleep_until(deadline) => ContextError::DeadlineExceeded,
                }
            }
            None => {
                self.cancel.cancelled().await;
                ContextError::Cancelled
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_context_is_live() {
        let ctx = RequestContext::with_namespace("default");
        assert_eq!(ctx.namespace(), Some("default"));
        assert!(ctx.check().is_ok());
    }

    #[test]
    fn cancel_propagates_to_children_only() {
        let parent = RequestContext::new();
        let child = parent.child();
        child.cancel();
        assert_eq!(child.check(), Err(ContextError::Cancelled));
        assert!(parent.check().is_ok());

        let child = parent.child();
        parent.cancel();
        assert_eq!(child.check(), Err(ContextError::Cancelled));
    }

    #[test]
    fn expired_deadline_fails_check() {
        let ctx = RequestContext::new().with_deadline(Instant::now() - Duration::from_millis(1));
        assert_eq!(ctx.check(), Err(ContextError::DeadlineExceeded));
    }

    #[test]
    fn earlier_deadline_wins() {
        let soon = Instant::now() + Duration::from_secs(1);
        let ctx = RequestContext::new()
            .with_deadline(soon)
            .with_timeout(Duration::from_secs(60));
        assert_eq!(ctx.deadline(), Some(soon));
    }

    #[tokio::test]
    async fn done_resolves_on_timeout() {
        let ctx = RequestContext::new().with_timeout(Duration::from_millis(10));
        assert_eq!(ctx.done().await, ContextError::DeadlineExceeded);
    }

    #[tokio::test]
    async fn done_resolves_on_cancel() {
        let ctx = RequestContext::new();
        let handle = ctx.clone();
        tokio::spawn(async move { handle.cancel() });
        assert_eq!(ctx.done().await, ContextError::Cancelled);
    }
}
