//! Concurrency limiter for CPU-bound tile work.
//!
//! Compositing and PNG encoding are CPU-bound and must not run on the async
//! worker threads. The limiter moves them to the blocking pool and bounds
//! how many run at once, so a burst of blend requests cannot starve the
//! blocking pool.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinError;
use tracing::trace;

/// Bounded gate in front of `spawn_blocking`.
#[derive(Debug)]
pub struct RenderLimiter {
    semaphore: Arc<Semaphore>,
    max_concurrent: usize,
    in_flight: Arc<AtomicUsize>,
    label: String,
}

impl RenderLimiter {
    /// Creates a limiter allowing `max_concurrent` jobs at once (at least 1).
    pub fn new(max_concurrent: usize, label: impl Into<String>) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
            in_flight: Arc::new(AtomicUsize::new(0)),
            label: label.into(),
        }
    }

    /// Limiter sized to the number of available CPUs.
    pub fn with_cpu_count(label: impl Into<String>) -> Self {
        Self::new(default_concurrency(), label)
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Relaxed)
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Runs `job` on the blocking pool once a slot is free.
    ///
    /// # Errors
    ///
    /// Returns the join error if the job panicked.
    pub async fn run<F, T>(&self, job: F) -> Result<T, JoinError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        // The semaphore is never closed
        let _permit = self.semaphore.acquire().await.ok();
        self.in_flight.fetch_add(1, Ordering::Relaxed);
        trace!(label = %self.label, in_flight = self.in_flight(), "CPU job started");

        let result = tokio::task::spawn_blocking(job).await;

        self.in_flight.fetch_sub(1, Ordering::Relaxed);
        result
    }
}

/// Number of CPUs, falling back to 4 when it cannot be determined.
pub fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}
