//! Permit pool bounding simultaneous outbound tile fetches.

use tokio::sync::{Semaphore, SemaphorePermit};

use crate::error::TileError;

/// Default number of concurrent network fetches.
pub const DEFAULT_PARALLELISM: usize = 4;

/// Counting permit pool for network fetches.
///
/// Only fetches that go to the network hold a permit; persisted-store hits
/// never touch the limiter. Permits are returned when the [`FetchPermit`] is
/// dropped, so a failing fetch cannot leak one.
#[derive(Debug)]
pub struct ConcurrencyLimiter {
    semaphore: Semaphore,
    parallelism: usize,
}

/// A held fetch permit. Dropping it releases the permit.
#[derive(Debug)]
pub struct FetchPermit<'a> {
    _permit: SemaphorePermit<'a>,
}

impl ConcurrencyLimiter {
    /// Create a limiter with `parallelism` permits.
    ///
    /// A parallelism of zero is treated as one.
    pub fn new(parallelism: usize) -> Self {
        let parallelism = parallelism.max(1);
        Self {
            semaphore: Semaphore::new(parallelism),
            parallelism,
        }
    }

    /// Wait until a permit is available.
    ///
    /// Suspends without a deadline. Fails only after [`close`](Self::close).
    pub async fn acquire(&self) -> Result<FetchPermit<'_>, TileError> {
        let permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| TileError::Shutdown)?;
        Ok(FetchPermit { _permit: permit })
    }

    /// Stop handing out permits. Current and future waiters fail with
    /// [`TileError::Shutdown`]; permits already held stay valid until dropped.
    pub fn close(&self) {
        self.semaphore.close();
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.semaphore.is_closed()
    }

    /// Permits not currently held.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Configured number of permits.
    pub fn parallelism(&self) -> usize {
        self.parallelism
    }
}

impl Default for ConcurrencyLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_PARALLELISM)
    }
}
