//! Wall-clock budget shared by every suspension point of a run

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

use crate::error::Result;

/// Stand-in deadline for budgets too large to represent
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

#[derive(Debug, Clone, Copy)]
pub(crate) struct Budget {
    deadline: Instant,
}

impl Budget {
    pub(crate) fn new(start: Instant, timeout: Duration) -> Self {
        let deadline = start
            .checked_add(timeout)
            .unwrap_or_else(|| start + FAR_FUTURE);
        Self { deadline }
    }

    pub(crate) fn deadline(&self) -> Instant {
        self.deadline
    }

    pub(crate) fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub(crate) fn is_exhausted(&self) -> bool {
        self.remaining().is_zero()
    }

    /// Run `fut` until the deadline; expiry yields `Timeout`
    pub(crate) async fn bound<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout_at(self.deadline, fut).await?
    }
}
