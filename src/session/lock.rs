// src/session/lock.rs

//! Striped per-session mutual exclusion.
//!
//! A fixed pool of async mutexes indexed by `hash(session_id) % n`. Two
//! sessions may share a stripe and then wait on each other; the same
//! session can never run twice at once.

use std::collections::hash_map::DefaultHasher;
use std::future::Future;
use std::hash::{Hash, Hasher};

use tokio::sync::{Mutex, MutexGuard};
use tracing::trace;

#[derive(Debug)]
pub struct StripedLocks {
    stripes: Vec<Mutex<()>>,
}

impl StripedLocks {
    /// A pool of `stripes` locks (at least one).
    pub fn new(stripes: usize) -> Self {
        let n = stripes.max(1);
        Self {
            stripes: (0..n).map(|_| Mutex::new(())).collect(),
        }
    }

    pub fn stripe_count(&self) -> usize {
        self.stripes.len()
    }

    /// Stable stripe index for `session_id`.
    pub fn stripe_for(&self, session_id: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        session_id.hash(&mut hasher);
        (hasher.finish() % self.stripes.len() as u64) as usize
    }

    /// Wait for the session's stripe. Released when the guard drops.
    pub async fn lock(&self, session_id: &str) -> MutexGuard<'_, ()> {
        let stripe = self.stripe_for(session_id);
        trace!(session = %session_id, stripe, "waiting for session lock");
        self.stripes[stripe].lock().await
    }

    /// Run `f` while holding the session's stripe.
    ///
    /// The guard lives in this frame, so the lock is released on return,
    /// on error and when the future is dropped mid-flight.
    pub async fn with_session_lock<F, Fut, T>(&self, session_id: &str, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _guard = self.lock(session_id).await;
        f().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_stripes_is_clamped_to_one() {
        let locks = StripedLocks::new(0);
        assert_eq!(locks.stripe_count(), 1);
        assert_eq!(locks.stripe_for("anything"), 0);
    }

    #[test]
    fn stripe_is_stable_for_a_session() {
        let locks = StripedLocks::new(1024);
        assert_eq!(locks.stripe_for("s1"), locks.stripe_for("s1"));
        assert!(locks.stripe_for("s1") < 1024);
    }

    #[tokio::test]
    async fn lock_is_released_after_error() {
        let locks = StripedLocks::new(4);
        let res: Result<(), &str> = locks.with_session_lock("s1", || async { Err("boom") }).await;
        assert!(res.is_err());
        // Would hang if the stripe were still held.
        let _guard = locks.lock("s1").await;
    }
}
