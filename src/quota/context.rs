//! Quota Call Context
//!
//! Carries caller cancellation and an optional deadline into every reporter
//! and store call made on behalf of one quota operation.

use std::future::Future;
use std::time::Duration;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

use super::error::{QuotaError, QuotaResult};

/// Cancellation scope for a single quota operation
#[derive(Debug, Clone, Default)]
pub struct QuotaContext {
    token: CancellationToken,
    deadline: Option<Deadline>,
}

#[derive(Debug, Clone, Copy)]
struct Deadline {
    at: Instant,
    budget: Duration,
}

impl QuotaContext {
    /// Create a context with no deadline
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context that is cancelled through the given token
    pub fn with_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Return a copy of this context that expires after `budget`
    pub fn with_timeout(&self, budget: Duration) -> Self {
        Self {
            token: self.token.clone(),
            deadline: Some(Deadline {
                at: Instant::now() + budget,
                budget,
            }),
        }
    }

    /// Apply `budget` only if no deadline is set yet
    pub fn with_default_timeout(&self, budget: Option<Duration>) -> Self {
        match (self.deadline, budget) {
            (None, Some(budget)) => self.with_timeout(budget),
            _ => self.clone(),
        }
    }

    /// Derive a context whose cancellation does not propagate to the parent
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Cancel this context and all of its children
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Token observed by this context
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Time left before the deadline, if any
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.at.saturating_duration_since(Instant::now()))
    }

    /// Drive `future` until it completes, the context is cancelled or the
    /// deadline passes, whichever comes first.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use std::time::Duration;
    /// use quota_engine::quota::QuotaContext;
    ///
    /// #[tokio::main]
    /// async fn main() {
    ///     let ctx = QuotaContext::new().with_timeout(Duration::from_secs(5));
    ///     let result = ctx.run(async { Ok::<u32, _>(42) }).await;
    ///     assert_eq!(result.unwrap(), 42);
    /// }
    /// ```
    pub async fn run<F, T>(&self, future: F) -> QuotaResult<T>
    where
        F: Future<Output = QuotaResult<T>>,
    {
        if self.token.is_cancelled() {
            return Err(QuotaError::Cancelled);
        }

        let deadline = self.deadline;
        let expiry = async move {
            match deadline {
                Some(d) => time::sleep_until(d.at).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(QuotaError::Cancelled),
            _ = expiry => Err(QuotaError::Timeout(
                deadline.map(|d| d.budget).unwrap_or_default(),
            )),
            result = future => result,
        }
    }
}
