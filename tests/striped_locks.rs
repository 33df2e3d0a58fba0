// tests/striped_locks.rs

mod common;
use crate::common::{init_tracing, with_timeout};

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use renderkit::session::StripedLocks;

/// Two session ids that land on different stripes.
fn distinct_pair(locks: &StripedLocks) -> (String, String) {
    let first = "session-0".to_string();
    let stripe = locks.stripe_for(&first);
    let second = (1..)
        .map(|i| format!("session-{i}"))
        .find(|id| locks.stripe_for(id) != stripe)
        .unwrap();
    (first, second)
}

#[tokio::test]
async fn same_session_runs_one_at_a_time() {
    init_tracing();
    let locks = Arc::new(StripedLocks::new(16));
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let locks = Arc::clone(&locks);
        let active = Arc::clone(&active);
        let peak = Arc::clone(&peak);
        handles.push(tokio::spawn(async move {
            locks
                .with_session_lock("s1", || async {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                })
                .await
        }));
    }
    for h in handles {
        h.await.unwrap();
    }

    assert_eq!(peak.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn different_stripes_do_not_block_each_other() {
    init_tracing();
    let locks = StripedLocks::new(1024);
    let (a, b) = distinct_pair(&locks);

    let _held = locks.lock(&a).await;
    // Would time out if `b` waited for `a`.
    with_timeout(locks.with_session_lock(&b, || async {})).await;
}

#[tokio::test]
async fn shared_stripe_only_causes_waiting() {
    init_tracing();
    let locks = Arc::new(StripedLocks::new(1));
    let guard = locks.lock("a").await;

    let waiter = {
        let locks = Arc::clone(&locks);
        tokio::spawn(async move { locks.with_session_lock("b", || async { 42 }).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!waiter.is_finished());

    drop(guard);
    assert_eq!(with_timeout(waiter).await.unwrap(), 42);
}
