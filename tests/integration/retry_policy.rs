//! Integration tests for the retry combinator
//!
//! Uses the paused tokio clock so the exponential schedule runs instantly
//! while remaining observable through `tokio::time::Instant`.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use storbatch::error::RemoteError;
use storbatch::retry::{retry, RetryPolicy};

fn no_jitter_policy() -> RetryPolicy {
    RetryPolicy {
        jitter_factor: 0.0,
        ..RetryPolicy::default()
    }
}

/// Operation that fails with the scripted errors, then succeeds.
struct Scripted {
    errors: Mutex<VecDeque<RemoteError>>,
    calls: AtomicUsize,
}

impl Scripted {
    fn new(errors: Vec<RemoteError>) -> Self {
        Self {
            errors: Mutex::new(errors.into()),
            calls: AtomicUsize::new(0),
        }
    }

    async fn call(&self) -> Result<u32, RemoteError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.errors.lock().pop_front() {
            Some(err) => Err(err),
            None => Ok(42),
        }
    }
}

#[tokio::test(start_paused = true)]
async fn succeeds_on_the_final_allowed_attempt() {
    let op = Scripted::new(vec![RemoteError::throttled("429"); 4]);
    let result = retry(&no_jitter_policy(), "test_op", || op.call()).await;

    assert_eq!(result.unwrap(), 42);
    assert_eq!(op.calls.load(Ordering::SeqCst), 5);
}

#[tokio::test(start_paused = true)]
async fn exhaustion_returns_the_last_error() {
    let op = Scripted::new(vec![RemoteError::throttled("429"); 10]);
    let result = retry(&no_jitter_policy(), "test_op", || op.call()).await;

    assert!(matches!(result, Err(RemoteError::Throttled { .. })));
    assert_eq!(op.calls.load(Ordering::SeqCst), 5);
}

#[tokio::test(start_paused = true)]
async fn non_retryable_errors_fail_on_the_first_attempt() {
    for err in [
        RemoteError::Conflict("taken".into()),
        RemoteError::Fatal("quota".into()),
    ] {
        let op = Scripted::new(vec![err]);
        let result = retry(&no_jitter_policy(), "test_op", || op.call()).await;
        assert!(result.is_err());
        assert_eq!(op.calls.load(Ordering::SeqCst), 1);
    }
}

#[tokio::test(start_paused = true)]
async fn transient_errors_are_retried_like_throttling() {
    let op = Scripted::new(vec![RemoteError::Transient("503".into())]);
    let result = retry(&no_jitter_policy(), "test_op", || op.call()).await;

    assert_eq!(result.unwrap(), 42);
    assert_eq!(op.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn server_retry_after_hint_drives_the_delay() {
    let op = Scripted::new(vec![RemoteError::Throttled {
        message: "429".into(),
        retry_after: Some(Duration::from_secs(7)),
    }]);

    let started = tokio::time::Instant::now();
    let result = retry(&no_jitter_policy(), "test_op", || op.call()).await;

    assert_eq!(result.unwrap(), 42);
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(7), "waited only {elapsed:?}");
    assert!(elapsed < Duration::from_secs(8), "waited {elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn backoff_grows_exponentially() {
    // 1s + 2s + 4s + 8s between the five attempts.
    let op = Scripted::new(vec![RemoteError::throttled("429"); 4]);

    let started = tokio::time::Instant::now();
    retry(&no_jitter_policy(), "test_op", || op.call())
        .await
        .unwrap();

    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(15), "waited only {elapsed:?}");
    assert!(elapsed < Duration::from_secs(16), "waited {elapsed:?}");
}
