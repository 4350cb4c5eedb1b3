use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Deadline and cancellation for one tracking call.
///
/// The gateway builds one per request from its configured timeout; callers that
/// need to abort early cancel the token.
#[derive(Debug, Clone, Default)]
pub struct TrackContext {
    deadline: Option<Instant>,
    token: CancellationToken,
}

impl TrackContext {
    /// No deadline; only cancellation ends the wait.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Some(Instant::now() + timeout),
            token: CancellationToken::new(),
        }
    }

    pub fn with_token(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_done(&self) -> bool {
        self.token.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Resolves once the deadline passes or the token is cancelled.
    pub async fn done(&self) {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = tokio::time::sleep_until(deadline) => {}
                    _ = self.token.cancelled() => {}
                }
            }
            None => self.token.cancelled().await,
        }
    }
}
