//! Throttled Action (component E): at-most-one execution per window,
//! call-coalescing, error-invalidating.
//!
//! Implemented as a struct holding `(window_start, shared future)`
//! behind a `tokio::sync::Mutex`, per the "Throttled shared future"
//! design note. The wrapped action always runs on its own `tokio::spawn`
//! task so that a caller walking away mid-`.await` never starves the
//! in-flight work another caller is still observing.

use crate::domain::error::EngineError;
use futures::future::{FutureExt, Shared};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// The throttle's result type: errors are `Arc`-wrapped so the shared
/// future's output can be `Clone`, which `futures::future::Shared`
/// requires.
pub type ThrottleResult<T> = Result<T, Arc<EngineError>>;

type BoxFuture<T> = Pin<Box<dyn Future<Output = ThrottleResult<T>> + Send>>;
type SharedFuture<T> = Shared<BoxFuture<T>>;

struct ThrottleState<T> {
    window_start: Option<Instant>,
    shared: Option<SharedFuture<T>>,
}

pub struct Throttle<T> {
    window: Duration,
    state: Mutex<ThrottleState<T>>,
}

impl<T> Throttle<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            state: Mutex::new(ThrottleState {
                window_start: None,
                shared: None,
            }),
        }
    }

    /// Run `action` at most once per window. Concurrent callers within
    /// the window await the same in-flight (or just-completed) result.
    /// A failed attempt invalidates the window immediately so the next
    /// call re-attempts rather than replaying the cached error forever.
    pub async fn call<F, Fut>(&self, action: F) -> ThrottleResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, EngineError>> + Send + 'static,
    {
        let mut guard = self.state.lock().await;

        let expired = match guard.window_start {
            None => true,
            Some(start) => Instant::now().duration_since(start) >= self.window,
        };

        let shared = if expired || guard.shared.is_none() {
            let handle = tokio::spawn(action());
            let fut: BoxFuture<T> = Box::pin(async move {
                match handle.await {
                    Ok(Ok(value)) => Ok(value),
                    Ok(Err(e)) => Err(Arc::new(e)),
                    Err(join_err) => Err(Arc::new(EngineError::Provider(
                        crate::domain::error::ProviderError::Transient(format!(
                            "throttled action panicked: {join_err}"
                        )),
                    ))),
                }
            });
            let shared = fut.shared();
            guard.window_start = Some(Instant::now());
            guard.shared = Some(shared.clone());
            shared
        } else {
            guard.shared.clone().unwrap()
        };
        drop(guard);

        let result = shared.await;
        if result.is_err() {
            let mut guard = self.state.lock().await;
            guard.shared = None;
            guard.window_start = None;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn s3_coalesces_concurrent_calls_within_window() {
        let throttle = Throttle::<u32>::new(Duration::from_millis(200));
        let calls = Arc::new(AtomicUsize::new(0));

        let make_action = |calls: Arc<AtomicUsize>| {
            move || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    Ok::<u32, EngineError>(42)
                }
            }
        };

        let (a, b) = tokio::join!(
            throttle.call(make_action(calls.clone())),
            throttle.call(make_action(calls.clone())),
        );
        assert_eq!(*a.unwrap(), 42);
        assert_eq!(*b.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_attempt_invalidates_window_for_next_call() {
        let throttle = Throttle::<u32>::new(Duration::from_secs(900));
        let attempt = Arc::new(AtomicUsize::new(0));

        let attempt1 = attempt.clone();
        let first = throttle
            .call(move || {
                let attempt = attempt1.clone();
                async move {
                    attempt.fetch_add(1, Ordering::SeqCst);
                    Err::<u32, EngineError>(EngineError::Provider(
                        crate::domain::error::ProviderError::Transient("boom".into()),
                    ))
                }
            })
            .await;
        assert!(first.is_err());

        let attempt2 = attempt.clone();
        let second = throttle
            .call(move || {
                let attempt = attempt2.clone();
                async move {
                    attempt.fetch_add(1, Ordering::SeqCst);
                    Ok::<u32, EngineError>(7)
                }
            })
            .await;
        assert_eq!(*second.unwrap(), 7);
        assert_eq!(attempt.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn cancelling_one_caller_does_not_stop_the_shared_action() {
        let throttle = Arc::new(Throttle::<u32>::new(Duration::from_secs(900)));
        let calls = Arc::new(AtomicUsize::new(0));

        let t1 = throttle.clone();
        let calls1 = calls.clone();
        let first = tokio::spawn(async move {
            t1.call(move || {
                let calls = calls1.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok::<u32, EngineError>(99)
                }
            })
            .await
        });

        // give the first call a chance to register the in-flight action
        tokio::time::sleep(Duration::from_millis(5)).await;
        first.abort();

        let second = throttle
            .call(|| async { Ok::<u32, EngineError>(0) })
            .await;
        assert_eq!(*second.unwrap(), 99);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
