//! Per-call cancellation and deadline handling.
//!
//! Every I/O suspension point in the crate runs through [`CallContext::run`],
//! so a caller that cancels or whose deadline passes stops the work at the
//! next store, cache or publish call.

use crate::errors::{IdentityError, IdentityResult};
use std::future::Future;
use std::time::Duration;
use tokio::time::{Instant, timeout_at};
use tokio_util::sync::CancellationToken;

/// Default budget for a single request (10 seconds)
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Caller-supplied cancellation signal and optional deadline.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl CallContext {
    /// Context with no deadline that is only cancelled explicitly.
    pub fn new() -> Self {
        Self::default()
    }

    /// Context that expires `budget` from now.
    pub fn with_timeout(budget: Duration) -> Self {
        Self {
            cancel: CancellationToken::new(),
            deadline: Some(Instant::now() + budget),
        }
    }

    /// Context bound to an externally owned cancellation token.
    pub fn with_cancellation(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            deadline: None,
        }
    }

    /// Same cancellation signal, with a deadline added.
    pub fn deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Cancel every operation running under this context (and its clones).
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Run one I/O step, honouring cancellation and the deadline.
    ///
    /// # Errors
    ///
    /// * `IdentityError::Cancelled` - The token was cancelled first
    /// * `IdentityError::DeadlineExceeded` - The deadline passed first
    /// * Any error produced by the step itself
    pub async fn run<F, T, E>(&self, step: F) -> IdentityResult<T>
    where
        F: Future<Output = Result<T, E>>,
        E: Into<IdentityError>,
    {
        if self.cancel.is_cancelled() {
            return Err(IdentityError::Cancelled);
        }

        let bounded = async {
            match self.deadline {
                Some(deadline) => match timeout_at(deadline, step).await {
                    Ok(result) => result.map_err(Into::into),
                    Err(_) => Err(IdentityError::DeadlineExceeded),
                },
                None => step.await.map_err(Into::into),
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(IdentityError::Cancelled),
            result = bounded => result,
        }
    }
}
