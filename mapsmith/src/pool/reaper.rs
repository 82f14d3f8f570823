//! Idle renderer reaper.
//!
//! A single background task that periodically sweeps every keyed pool,
//! destroying renderers that have sat idle longer than the configured
//! timeout and dropping pools left empty.
//!
//! # Example
//!
//! ```ignore
//! use mapsmith::pool::{PoolManager, PoolReaper};
//!
//! let reaper = PoolReaper::new(Arc::clone(&pool));
//! tokio::spawn(reaper.run(shutdown_token));
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::manager::{Poolable, PoolManager};

/// Background task destroying idle pooled renderers.
pub struct PoolReaper<R: ?Sized> {
    pool: Arc<PoolManager<R>>,
    interval: Duration,
}

impl<R: ?Sized + Poolable> PoolReaper<R> {
    /// Creates a reaper using the pool's configured reap interval.
    pub fn new(pool: Arc<PoolManager<R>>) -> Self {
        let interval = pool.config().reap_interval;
        Self { pool, interval }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Runs until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_ms = self.interval.as_millis() as u64,
            idle_timeout_secs = self.pool.config().idle_timeout.as_secs(),
            "Pool reaper starting"
        );

        let mut interval = tokio::time::interval(self.interval);
        // Skip the first immediate tick
        interval.tick().await;

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("Pool reaper shutting down");
                    break;
                }

                _ = interval.tick() => {
                    let destroyed = self.pool.reap();
                    if destroyed > 0 {
                        debug!(destroyed, pools = self.pool.pool_count(), "Reaper sweep complete");
                    }
                }
            }
        }
    }
}
