//! Named mutual-exclusion queue
//!
//! Serializes access to scarce external resources (the LibreOffice converter
//! and the OCR binary both clobber fixed working-directory filenames, so a
//! concurrent second invocation corrupts the first one's output). At most one
//! holder exists per lock name at any instant.
//!
//! `wait` blocks the calling task until it is the sole holder or a bounded
//! wait expires. A lock whose holder has kept it longer than `max_hold` is
//! treated as abandoned (the holding request may have panicked or been
//! killed) and is force-acquired by the next waiter. Release is guaranteed
//! on all exit paths: the returned [`LockGuard`] releases on `Drop`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::config::QueueConfig;
use crate::error::{AppError, Result};

/// Lock name guarding the scarce single-instance external binaries.
pub const BINARY_LOCK: &str = "binary";

/// How often a blocked waiter re-checks for a stale holder.
const STALE_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug)]
struct LockState {
    held: bool,
    acquired_at: Option<Instant>,
    /// Incremented on every acquisition so a stale guard dropped after a
    /// force-acquire cannot release the new holder's lock.
    generation: u64,
}

#[derive(Debug)]
struct NamedLock {
    state: Mutex<LockState>,
    notify: Notify,
}

impl NamedLock {
    fn new() -> Self {
        Self {
            state: Mutex::new(LockState {
                held: false,
                acquired_at: None,
                generation: 0,
            }),
            notify: Notify::new(),
        }
    }
}

/// Named-lock coordinator. Cheap to clone; all clones share the same locks.
#[derive(Clone, Debug)]
pub struct LockQueue {
    inner: Arc<QueueInner>,
}

#[derive(Debug)]
struct QueueInner {
    locks: Mutex<HashMap<String, Arc<NamedLock>>>,
    wait_timeout: Duration,
    max_hold: Duration,
}

impl LockQueue {
    pub fn new(config: &QueueConfig) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                locks: Mutex::new(HashMap::new()),
                wait_timeout: Duration::from_secs(config.wait_timeout_secs),
                max_hold: Duration::from_secs(config.max_hold_secs),
            }),
        }
    }

    fn entry(&self, name: &str) -> Arc<NamedLock> {
        let mut locks = self.inner.locks.lock();
        locks
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(NamedLock::new()))
            .clone()
    }

    /// Block until the caller is the sole holder of `name`.
    ///
    /// Fails with a retryable [`AppError::LockContention`] if the lock does
    /// not become free within the configured wait timeout.
    pub async fn wait(&self, name: &str) -> Result<LockGuard> {
        let lock = self.entry(name);
        let deadline = Instant::now() + self.inner.wait_timeout;

        loop {
            {
                let mut state = lock.state.lock();
                if !state.held {
                    state.held = true;
                    state.acquired_at = Some(Instant::now());
                    state.generation += 1;
                    return Ok(LockGuard {
                        lock: lock.clone(),
                        name: name.to_string(),
                        generation: state.generation,
                    });
                }
                if let Some(acquired_at) = state.acquired_at {
                    if acquired_at.elapsed() > self.inner.max_hold {
                        tracing::warn!(
                            lock = name,
                            held_secs = acquired_at.elapsed().as_secs(),
                            "force-acquiring stale lock"
                        );
                        state.acquired_at = Some(Instant::now());
                        state.generation += 1;
                        return Ok(LockGuard {
                            lock: lock.clone(),
                            name: name.to_string(),
                            generation: state.generation,
                        });
                    }
                }
            }

            let remaining = match deadline.checked_duration_since(Instant::now()) {
                Some(d) if !d.is_zero() => d,
                _ => {
                    return Err(AppError::LockContention(format!(
                        "lock '{}' not released within {}s",
                        name,
                        self.inner.wait_timeout.as_secs()
                    )))
                }
            };

            // Wake on release, or after a short interval to re-check for a
            // stale holder.
            let _ = tokio::time::timeout(remaining.min(STALE_POLL_INTERVAL), lock.notify.notified())
                .await;
        }
    }

    /// Release a lock by name regardless of guard ownership. Used at
    /// explicit reset points; normal callers rely on guard drop.
    pub fn release(&self, name: &str) {
        let lock = self.entry(name);
        let mut state = lock.state.lock();
        if state.held {
            state.held = false;
            state.acquired_at = None;
            drop(state);
            lock.notify.notify_one();
        }
    }
}

/// Scoped acquisition of a named lock. Dropping the guard releases the lock
/// and wakes exactly one waiter.
#[derive(Debug)]
pub struct LockGuard {
    lock: Arc<NamedLock>,
    name: String,
    generation: u64,
}

impl LockGuard {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let mut state = self.lock.state.lock();
        // A stale guard whose lock was force-acquired must not release the
        // new holder.
        if state.held && state.generation == self.generation {
            state.held = false;
            state.acquired_at = None;
            drop(state);
            self.lock.notify.notify_one();
        }
    }
}
