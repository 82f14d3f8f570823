//! Keyed resource pools.
//!
//! One [`KeyedPool`] exists per [`PoolKey`]. Each holds a stack of idle
//! resources and a semaphore whose permits bound how many resources of that
//! key may be checked out at once. A checked-out resource is represented by
//! a [`Pooled`] guard; dropping the guard releases the resource back to its
//! pool.
//!
//! # Coordination with the reaper
//!
//! Acquirers register themselves in `waiting` while holding the map shard
//! lock, and move from `waiting` to `in_use` before leaving the wait. The
//! reaper only removes a pool under the same shard lock and only when it has
//! no idle resources, nothing in use and nobody waiting, so an acquirer can
//! never end up holding a pool that has been dropped from the map.

use std::future::Future;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::key::PoolKey;
use crate::error::{MapError, Result};

/// Default maximum number of resources per key.
pub const DEFAULT_MAX_PER_KEY: usize = 4;

/// Default idle time after which the reaper destroys a resource.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Default interval between reaper scans.
pub const DEFAULT_REAP_INTERVAL: Duration = Duration::from_secs(5);

/// Default time an acquirer waits for a resource before giving up.
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// A resource that can live in a pool.
pub trait Poolable: Send + Sync + 'static {
    /// Releases whatever the resource holds. Called exactly once, by the pool.
    fn close(&self);
}

/// Pool sizing and timing.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_per_key: usize,
    pub idle_timeout: Duration,
    pub reap_interval: Duration,
    /// Zero means fail immediately when no resource is free.
    pub acquire_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_per_key: DEFAULT_MAX_PER_KEY,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            reap_interval: DEFAULT_REAP_INTERVAL,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
        }
    }
}

/// Point-in-time counters for one pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct PoolStats {
    /// Live resources, idle or checked out.
    pub count: usize,
    /// Idle resources.
    pub unused: usize,
    /// Acquirers waiting for a resource.
    pub waiting: usize,
}

struct IdleResource<R: ?Sized> {
    resource: Arc<R>,
    last_used: Instant,
}

/// Pool of resources sharing one key.
pub struct KeyedPool<R: ?Sized> {
    key: PoolKey,
    idle: Mutex<Vec<IdleResource<R>>>,
    permits: Arc<Semaphore>,
    created: AtomicUsize,
    in_use: AtomicUsize,
    waiting: AtomicUsize,
    invalidated: AtomicBool,
}

impl<R: ?Sized + Poolable> KeyedPool<R> {
    fn new(key: PoolKey, max: usize) -> Self {
        Self {
            key,
            idle: Mutex::new(Vec::new()),
            permits: Arc::new(Semaphore::new(max.max(1))),
            created: AtomicUsize::new(0),
            in_use: AtomicUsize::new(0),
            waiting: AtomicUsize::new(0),
            invalidated: AtomicBool::new(false),
        }
    }

    fn stats(&self) -> PoolStats {
        PoolStats {
            count: self.created.load(Ordering::Acquire),
            unused: self.idle.lock().len(),
            waiting: self.waiting.load(Ordering::Acquire),
        }
    }

    fn is_vacant(&self) -> bool {
        self.in_use.load(Ordering::Acquire) == 0
            && self.waiting.load(Ordering::Acquire) == 0
            && self.idle.lock().is_empty()
    }

    fn release(&self, resource: Arc<R>) {
        if self.invalidated.load(Ordering::Acquire) {
            resource.close();
            self.created.fetch_sub(1, Ordering::AcqRel);
            debug!(key = %self.key, "Closed renderer released after pool reset");
        } else {
            self.idle.lock().push(IdleResource {
                resource,
                last_used: Instant::now(),
            });
        }
        self.in_use.fetch_sub(1, Ordering::AcqRel);
    }

    /// Destroys idle resources unused for longer than `idle_timeout`.
    fn reap(&self, idle_timeout: Duration) -> usize {
        let expired: Vec<Arc<R>> = {
            let mut idle = self.idle.lock();
            let (keep, expired): (Vec<_>, Vec<_>) = idle
                .drain(..)
                .partition(|r| r.last_used.elapsed() < idle_timeout);
            *idle = keep;
            expired.into_iter().map(|r| r.resource).collect()
        };

        for resource in &expired {
            resource.close();
        }
        self.created.fetch_sub(expired.len(), Ordering::AcqRel);
        expired.len()
    }

    /// Marks the pool stale and closes its idle resources. Resources still
    /// checked out are closed when they come back.
    fn invalidate(&self) -> usize {
        self.invalidated.store(true, Ordering::Release);
        self.permits.close();

        let drained: Vec<_> = self.idle.lock().drain(..).collect();
        for idle in &drained {
            idle.resource.close();
        }
        self.created.fetch_sub(drained.len(), Ordering::AcqRel);
        drained.len()
    }
}

/// A checked-out resource. Dropping it returns the resource to its pool.
pub struct Pooled<R: ?Sized + Poolable> {
    resource: Arc<R>,
    pool: Arc<KeyedPool<R>>,
    _permit: OwnedSemaphorePermit,
}

impl<R: ?Sized + Poolable> Pooled<R> {
    pub fn key(&self) -> &PoolKey {
        &self.pool.key
    }

    /// Counters of the pool this resource belongs to.
    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// The shared resource handle, for identity comparisons.
    pub fn resource(&self) -> &Arc<R> {
        &self.resource
    }

    /// Explicitly returns the resource to its pool.
    pub fn release(self) {
        drop(self);
    }
}

impl<R: ?Sized + Poolable> Deref for Pooled<R> {
    type Target = R;

    fn deref(&self) -> &R {
        &self.resource
    }
}

impl<R: ?Sized + Poolable> Drop for Pooled<R> {
    fn drop(&mut self) {
        self.pool.release(Arc::clone(&self.resource));
    }
}

/// Owner of every keyed pool.
pub struct PoolManager<R: ?Sized> {
    pools: DashMap<PoolKey, Arc<KeyedPool<R>>>,
    config: PoolConfig,
}

impl<R: ?Sized + Poolable> PoolManager<R> {
    pub fn new(config: PoolConfig) -> Self {
        info!(
            max_per_key = config.max_per_key,
            idle_timeout_secs = config.idle_timeout.as_secs(),
            reap_interval_secs = config.reap_interval.as_secs(),
            "Created renderer pool manager"
        );
        Self {
            pools: DashMap::new(),
            config,
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Checks out a resource for `key`, creating one with `create` when the
    /// pool has nothing idle and is below its maximum.
    ///
    /// # Errors
    ///
    /// - The error returned by `create`, unchanged and without retry.
    /// - `MapError::PoolExhausted` when no resource frees up within the
    ///   acquire timeout.
    pub async fn acquire<F, Fut>(&self, key: &PoolKey, create: F) -> Result<Pooled<R>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Arc<R>>>,
    {
        let (pool, permit) = loop {
            let pool = {
                let entry = self.pools.entry(key.clone()).or_insert_with(|| {
                    debug!(key = %key, "Creating keyed pool");
                    Arc::new(KeyedPool::new(key.clone(), self.config.max_per_key))
                });
                entry.waiting.fetch_add(1, Ordering::AcqRel);
                Arc::clone(entry.value())
            };

            match self.wait_for_permit(&pool).await {
                Ok(permit) => break (pool, permit),
                Err(WaitError::Closed) => {
                    // Pool was reset while waiting; retry against a fresh one
                    pool.waiting.fetch_sub(1, Ordering::AcqRel);
                    continue;
                }
                Err(WaitError::TimedOut) => {
                    pool.waiting.fetch_sub(1, Ordering::AcqRel);
                    let in_use = pool.in_use.load(Ordering::Acquire);
                    warn!(key = %key, in_use, "Renderer pool exhausted");
                    return Err(MapError::PoolExhausted {
                        key: key.to_string(),
                        in_use,
                    });
                }
            }
        };

        pool.in_use.fetch_add(1, Ordering::AcqRel);
        pool.waiting.fetch_sub(1, Ordering::AcqRel);

        let reused = pool.idle.lock().pop().map(|idle| idle.resource);
        let resource = match reused {
            Some(resource) => resource,
            None => match create().await {
                Ok(resource) => {
                    pool.created.fetch_add(1, Ordering::AcqRel);
                    debug!(key = %key, "Created pooled renderer");
                    resource
                }
                Err(e) => {
                    pool.in_use.fetch_sub(1, Ordering::AcqRel);
                    return Err(e);
                }
            },
        };

        Ok(Pooled {
            resource,
            pool,
            _permit: permit,
        })
    }

    async fn wait_for_permit(
        &self,
        pool: &KeyedPool<R>,
    ) -> std::result::Result<OwnedSemaphorePermit, WaitError> {
        let semaphore = Arc::clone(&pool.permits);
        if self.config.acquire_timeout.is_zero() {
            return semaphore.try_acquire_owned().map_err(|e| match e {
                tokio::sync::TryAcquireError::Closed => WaitError::Closed,
                tokio::sync::TryAcquireError::NoPermits => WaitError::TimedOut,
            });
        }
        match tokio::time::timeout(self.config.acquire_timeout, semaphore.acquire_owned()).await {
            Ok(Ok(permit)) => Ok(permit),
            Ok(Err(_)) => Err(WaitError::Closed),
            Err(_) => Err(WaitError::TimedOut),
        }
    }

    /// One reaper pass: destroys expired idle resources and drops pools
    /// that are left empty. Returns the number of resources destroyed.
    pub fn reap(&self) -> usize {
        let pools: Vec<Arc<KeyedPool<R>>> =
            self.pools.iter().map(|e| Arc::clone(e.value())).collect();

        let mut destroyed = 0;
        for pool in pools {
            destroyed += pool.reap(self.config.idle_timeout);
            self.pools.remove_if(&pool.key, |_, p| p.is_vacant());
        }

        if destroyed > 0 {
            debug!(destroyed, pools = self.pools.len(), "Reaped idle renderers");
        }
        destroyed
    }

    /// Destroys every pool whose key matches `predicate`.
    ///
    /// Used after a style change so stale renderers are never served again.
    /// Returns the number of pools reset.
    pub fn reset<P>(&self, predicate: P) -> usize
    where
        P: Fn(&PoolKey) -> bool,
    {
        let keys: Vec<PoolKey> = self
            .pools
            .iter()
            .filter(|e| predicate(e.key()))
            .map(|e| e.key().clone())
            .collect();

        let mut reset = 0;
        for key in keys {
            if let Some((_, pool)) = self.pools.remove(&key) {
                let closed = pool.invalidate();
                debug!(key = %key, closed, "Reset renderer pool");
                reset += 1;
            }
        }
        if reset > 0 {
            info!(pools = reset, "Reset renderer pools");
        }
        reset
    }

    /// Closes every pool. Checked-out resources close on release.
    pub fn shutdown(&self) {
        let reset = self.reset(|_| true);
        info!(pools = reset, "Renderer pool manager shut down");
    }

    pub fn stats(&self, key: &PoolKey) -> Option<PoolStats> {
        self.pools.get(key).map(|p| p.stats())
    }

    /// Counters summed over every pool.
    pub fn total_stats(&self) -> PoolStats {
        self.pools.iter().fold(PoolStats::default(), |mut acc, p| {
            let s = p.stats();
            acc.count += s.count;
            acc.unused += s.unused;
            acc.waiting += s.waiting;
            acc
        })
    }

    pub fn pool_count(&self) -> usize {
        self.pools.len()
    }
}

enum WaitError {
    Closed,
    TimedOut,
}
