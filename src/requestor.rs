//! The requestor contract consumed and produced by every composition operator.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::outcome::Outcome;
use crate::reason::Reason;

/// A cooperative cancellation handle threaded into every requestor call.
///
/// A requestor that resolves instantly (e.g. [`crate::primitives::from_fn`])
/// can ignore it entirely. A requestor that suspends should `select!` on
/// [`CancelToken::cancelled`] so that dropping its future is not the only way
/// to observe cancellation; the engine backstops this regardless by aborting
/// the child's task outright (see SPEC_FULL.md §4.1, contract 7).
pub type CancelToken = tokio_util::sync::CancellationToken;

/// The future a requestor hands back from [`Requestor::start`].
pub type RequestorFuture<V> = Pin<Box<dyn Future<Output = Outcome<V>> + Send>>;

/// An idempotent, possibly-absent callable a requestor can hand back alongside
/// its in-flight future, for work it cannot abort merely by having that
/// future dropped (see SPEC_FULL.md §3, "CancelToken / Cancellor").
///
/// Calling it more than once, or after the requestor has already completed,
/// MUST be a safe no-op. Every cancellor vended by this crate upholds that by
/// construction (an `AtomicBool` latch — see [`crate::engine::EngineState`]).
pub type Cancellor = Arc<dyn Fn(Option<Reason>) + Send + Sync>;

/// A requestor performs exactly one unit of work and resolves to exactly one
/// [`Outcome`].
///
/// `start` mirrors the source callback shape directly: it returns
/// *synchronously*, optionally handing back a [`Cancellor`] immediately (not
/// once the work finishes), alongside a future that will resolve to the
/// requestor's single [`Outcome`] later. This is what lets a long-running
/// requestor be cancelled while it is still in flight, the same way the
/// source's `requestor(receiver, message)` call returns its cancellor before
/// `receiver` is ever invoked.
///
/// Implemented directly by the composite requestors returned from
/// [`crate::parallel`], [`crate::race`], [`crate::sequence`] and
/// [`crate::fallback`], and by the leaf constructors in
/// [`crate::primitives`]. External collaborators (HTTP calls, timers,
/// promise adapters) implement it the same way; the engine does not care.
pub trait Requestor<M, V>: Send + Sync
where
    M: Send + 'static,
    V: Send + 'static,
{
    /// Begin this requestor's work.
    ///
    /// `cancel` is cancelled by the engine exactly once, at most, if the
    /// composite this requestor is a child of is cancelled or times out
    /// before the returned future resolves.
    fn start(&self, message: M, cancel: CancelToken) -> (RequestorFuture<V>, Option<Cancellor>);
}

impl<M, V, T> Requestor<M, V> for Arc<T>
where
    T: Requestor<M, V> + ?Sized,
    M: Send + 'static,
    V: Send + 'static,
{
    fn start(&self, message: M, cancel: CancelToken) -> (RequestorFuture<V>, Option<Cancellor>) {
        (**self).start(message, cancel)
    }
}

/// Convenience alias for the trait-object form every operator accepts and
/// returns.
pub type DynRequestor<M, V> = Arc<dyn Requestor<M, V>>;
