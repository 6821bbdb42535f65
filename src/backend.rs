//! Worker pool backend.
//!
//! This module defines the thread pool that executes dispatched batch-row
//! partitions. Unlike a process-global singleton, a [`WorkerPool`] is an
//! explicit resource: construct it once, wrap it in an [`Arc`](std::sync::Arc)
//! and hand it to every [`Network`](crate::network::Network) that should share it.
//!
//! # Lifecycle
//!
//! - [`WorkerPool::new`] starts `n` OS threads (backed by a `rayon` pool).
//! - [`WorkerPool::resize`] performs a full shutdown followed by a fresh startup.
//! - [`WorkerPool::shutdown`] stops the threads; later dispatches fail with
//!   [`Error::PoolStopped`].
//!
//! A dispatch holds a shared guard on the pool for its whole duration and a
//! resize or shutdown takes the guard exclusively, so the pool is never torn
//! down underneath running partitions.
//!
//! # Single-threaded execution
//!
//! A pool of size `0` or `1` never starts worker threads: every dispatch runs
//! synchronously on the caller, which makes test runs deterministic.

use std::sync::{PoisonError, RwLock};

use log::{debug, warn};
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::error::{Error, Result};

/// Worker count used when nothing else is configured.
pub const DEFAULT_THREADS: usize = 2;

enum PoolState {
    Running { threads: ThreadPool, size: usize },
    Inline { size: usize },
    Stopped,
}

impl PoolState {
    fn start(size: usize) -> Result<Self> {
        if size <= 1 {
            return Ok(Self::Inline { size });
        }
        let threads = ThreadPoolBuilder::new()
            .num_threads(size)
            .thread_name(|i| format!("minicnn-worker-{i}"))
            .build()?;
        Ok(Self::Running { threads, size })
    }

    const fn size(&self) -> usize {
        match self {
            Self::Running { size, .. } | Self::Inline { size } => *size,
            Self::Stopped => 0,
        }
    }
}

/// Fixed-size pool of worker threads used by the dispatcher.
pub struct WorkerPool {
    state: RwLock<PoolState>,
}

impl WorkerPool {
    /// Starts a pool with `size` worker threads.
    ///
    /// # Errors
    /// Fails if the operating system refuses to spawn the threads.
    pub fn new(size: usize) -> Result<Self> {
        debug!("starting worker pool with {size} threads");
        Ok(Self {
            state: RwLock::new(PoolState::start(size)?),
        })
    }

    /// A pool that runs every dispatch on the calling thread.
    #[must_use]
    pub const fn single_threaded() -> Self {
        Self {
            state: RwLock::new(PoolState::Inline { size: 1 }),
        }
    }

    /// Number of worker threads; `0` once shut down.
    pub fn size(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .size()
    }

    /// Whether [`WorkerPool::shutdown`] has been called.
    pub fn is_stopped(&self) -> bool {
        matches!(
            *self.state.read().unwrap_or_else(PoisonError::into_inner),
            PoolState::Stopped
        )
    }

    /// Restarts the pool with `size` threads and returns the resulting size.
    ///
    /// Does nothing when the size is unchanged. Otherwise the current threads
    /// are drained and dropped before the new ones start. Waits for in-flight
    /// dispatches to finish first.
    ///
    /// # Errors
    /// Fails if the new threads cannot be spawned; the pool is then stopped.
    pub fn resize(&self, size: usize) -> Result<usize> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if !matches!(*state, PoolState::Stopped) && state.size() == size {
            return Ok(size);
        }
        debug!("resizing worker pool from {} to {size} threads", state.size());
        *state = PoolState::Stopped;
        *state = PoolState::start(size)?;
        Ok(state.size())
    }

    /// Stops all worker threads. Subsequent dispatches fail.
    pub fn shutdown(&self) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        debug!("shutting down worker pool");
        *state = PoolState::Stopped;
    }

    /// Runs `op` while holding the pool, passing the thread pool when there
    /// is one (`None` means run inline).
    pub(crate) fn run<R>(&self, op: impl FnOnce(Option<&ThreadPool>) -> R) -> Result<R> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        match &*state {
            PoolState::Running { threads, .. } => Ok(op(Some(threads))),
            PoolState::Inline { .. } => Ok(op(None)),
            PoolState::Stopped => {
                warn!("dispatch attempted on a stopped worker pool");
                Err(Error::PoolStopped)
            }
        }
    }
}

impl core::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("size", &self.size())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}
