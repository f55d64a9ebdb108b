//! Leaf requestor constructors.
//!
//! These exist purely so the operators in [`crate::parallel`],
//! [`crate::race`], [`crate::sequence`] and [`crate::fallback`] are reachable
//! and testable without every caller hand-writing [`Requestor`] impls. They
//! are policy-free (no retry, no backoff, no I/O beyond `tokio::time::sleep`)
//! and carry no dependency on any particular collaborator — see SPEC_FULL.md
//! §4.10.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::outcome::Outcome;
use crate::reason::Reason;
use crate::requestor::{CancelToken, Cancellor, Requestor, RequestorFuture};

struct FromFn<F> {
    f: F,
}

impl<M, V, F> Requestor<M, V> for FromFn<F>
where
    F: Fn(M) -> Outcome<V> + Send + Sync + 'static,
    M: Send + 'static,
    V: Send + 'static,
{
    fn start(&self, message: M, _cancel: CancelToken) -> (RequestorFuture<V>, Option<Cancellor>) {
        let outcome = (self.f)(message);
        (Box::pin(async move { outcome }), None)
    }
}

/// Wrap a synchronous total function as a requestor.
///
/// Used throughout the test suite to express the `map(f)` requestors from
/// SPEC_FULL.md §8 (e.g. `sequence([map(|x| x + 1), map(|x| x * 2)])`).
pub fn from_fn<M, V, F>(f: F) -> Arc<dyn Requestor<M, V>>
where
    F: Fn(M) -> Outcome<V> + Send + Sync + 'static,
    M: Send + 'static,
    V: Send + 'static,
{
    Arc::new(FromFn { f })
}

struct FromAsyncFn<F> {
    f: F,
}

impl<M, V, F, Fut> Requestor<M, V> for FromAsyncFn<F>
where
    F: Fn(M) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Outcome<V>> + Send + 'static,
    M: Send + 'static,
    V: Send + 'static,
{
    fn start(&self, message: M, _cancel: CancelToken) -> (RequestorFuture<V>, Option<Cancellor>) {
        (Box::pin((self.f)(message)), None)
    }
}

/// Wrap an asynchronous total function as a requestor.
pub fn from_async_fn<M, V, F, Fut>(f: F) -> Arc<dyn Requestor<M, V>>
where
    F: Fn(M) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Outcome<V>> + Send + 'static,
    M: Send + 'static,
    V: Send + 'static,
{
    Arc::new(FromAsyncFn { f })
}

struct Delay<V> {
    value: V,
    duration: Duration,
}

impl<M, V> Requestor<M, V> for Delay<V>
where
    M: Send + 'static,
    V: Clone + Send + 'static,
{
    fn start(&self, _message: M, cancel: CancelToken) -> (RequestorFuture<V>, Option<Cancellor>) {
        let value = self.value.clone();
        let duration = self.duration;
        let fut = Box::pin(async move {
            tokio::select! {
                _ = tokio::time::sleep(duration) => Outcome::Value(value),
                _ = cancel.cancelled() => {
                    // The engine aborts our task outright on cancellation, so this
                    // branch only matters if a caller awaits us directly without
                    // going through an engine (i.e. uses us as a bare requestor).
                    Outcome::Failure(Reason::new(crate::reason::FactoryName::Sequence, "cancelled").with_evidence(
                        crate::reason::Evidence::Message("delay cancelled before elapsing".into()),
                    ))
                }
            }
        });
        (fut, None)
    }
}

/// The synthetic `D(k)` requestor from SPEC_FULL.md §8: resolves to `value`
/// after `duration`, and is abortable while sleeping.
pub fn delay<M, V>(value: V, duration: Duration) -> Arc<dyn Requestor<M, V>>
where
    M: Send + 'static,
    V: Clone + Send + 'static,
{
    Arc::new(Delay { value, duration })
}

struct Failing {
    reason: Reason,
}

impl<M, V> Requestor<M, V> for Failing
where
    M: Send + 'static,
    V: Send + 'static,
{
    fn start(&self, _message: M, _cancel: CancelToken) -> (RequestorFuture<V>, Option<Cancellor>) {
        let reason = self.reason.clone();
        (Box::pin(async move { Outcome::Failure(reason) }), None)
    }
}

/// A requestor that always fails immediately with `reason`.
///
/// Used for the `fail("A")`, `fail("B")` requestors in the `fallback` law
/// test from SPEC_FULL.md §8.
pub fn failing<M, V>(reason: Reason) -> Arc<dyn Requestor<M, V>>
where
    M: Send + 'static,
    V: Send + 'static,
{
    Arc::new(Failing { reason })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reason::FactoryName;

    #[tokio::test]
    async fn from_fn_resolves_to_the_wrapped_function_result() {
        let requestor: Arc<dyn Requestor<i32, i32>> = from_fn(|x| Outcome::Value(x + 1));
        let (fut, cancellor) = requestor.start(41, CancelToken::new());
        assert!(cancellor.is_none());
        assert_eq!(fut.await.as_value(), Some(&42));
    }

    #[tokio::test]
    async fn from_async_fn_awaits_the_wrapped_future() {
        let requestor: Arc<dyn Requestor<i32, i32>> =
            from_async_fn(|x| async move { Outcome::Value(x * 2) });
        let (fut, _) = requestor.start(21, CancelToken::new());
        assert_eq!(fut.await.as_value(), Some(&42));
    }

    #[tokio::test(start_paused = true)]
    async fn delay_resolves_after_its_duration() {
        let requestor: Arc<dyn Requestor<(), &'static str>> =
            delay("done", std::time::Duration::from_millis(100));
        let (fut, _) = requestor.start((), CancelToken::new());
        tokio::time::advance(std::time::Duration::from_millis(100)).await;
        assert_eq!(fut.await.as_value(), Some(&"done"));
    }

    #[tokio::test]
    async fn failing_resolves_to_the_given_reason_immediately() {
        let reason = Reason::new(FactoryName::Fallback, "nope");
        let requestor: Arc<dyn Requestor<(), i32>> = failing(reason);
        let (fut, _) = requestor.start((), CancelToken::new());
        let outcome = fut.await;
        assert_eq!(outcome.as_failure().unwrap().excuse, "nope");
    }
}
