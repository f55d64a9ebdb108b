//! The shared run engine that drives every composition operator.
//!
//! This module is the "hard part" described in SPEC_FULL.md §1: it owns
//! launching children, enforcing the at-most-once completion contract,
//! throttle, time limits and cancellation. The four operators in
//! [`crate::parallel`], [`crate::race`], [`crate::sequence`] and
//! [`crate::fallback`] are thin policy layers on top of [`run`].
//!
//! Grounded on the launch/replenish loop in
//! `kube_runtime::controller::runner::Runner` (poll-driven throttled
//! scheduling) and on `CancelableJoinHandle` from `kube_runtime::utils` for
//! the "cancelling means aborting the task" idiom — adapted here to an
//! explicit mpsc-driven driving loop instead of a hand-rolled `Stream`, since
//! the engine needs to race child completions against a single timeout
//! future rather than expose a `Stream` of its own.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::outcome::Outcome;
use crate::reason::{FactoryName, Reason};
use crate::requestor::{CancelToken, Cancellor, DynRequestor};

/// One child requestor's completion, tagged with its original index so that
/// callers can preserve input order regardless of arrival order (SPEC_FULL.md
/// §5, "Ordering guarantees").
pub struct ChildCompletion<V> {
    pub index: usize,
    pub outcome: Outcome<V>,
}

/// What the driving loop should do after `action` or `on_timeout` runs.
pub enum Directive<Out> {
    /// Keep driving; launch the next queued child, if any.
    Continue,
    /// The composite is done; stop launching new children.
    Finish(Outcome<Out>),
}

/// Per-composite mutable record shared between the driving loop and the
/// [`Cancellor`] handed back to the caller.
///
/// Owned exclusively by the task that calls [`run`] (SPEC_FULL.md §5,
/// "single-writer discipline"); the `Cancellor` closure only ever reaches it
/// through the `parking_lot::Mutex`-guarded slots below, which is the one
/// piece of state genuinely touched from more than one place.
pub struct EngineState {
    factory: FactoryName,
    fired: AtomicBool,
    token: CancelToken,
    handles: Mutex<Vec<Option<JoinHandle<()>>>>,
    child_cancellors: Mutex<Vec<Option<Cancellor>>>,
}

impl EngineState {
    /// Build a fresh engine state whose cancellation is a child of `parent` —
    /// so that cancelling an outer composite (one this composite is itself a
    /// requestor inside) cancels this one too, without either side needing to
    /// know about the other's `Cancellor`.
    pub fn new(factory: FactoryName, child_count: usize, parent: &CancelToken) -> Arc<Self> {
        Arc::new(EngineState {
            factory,
            fired: AtomicBool::new(false),
            token: parent.child_token(),
            handles: Mutex::new((0..child_count).map(|_| None).collect()),
            child_cancellors: Mutex::new((0..child_count).map(|_| None).collect()),
        })
    }

    /// Build the idempotent [`Cancellor`] for this engine run.
    pub fn cancellor(self: &Arc<Self>) -> Cancellor {
        let state = Arc::clone(self);
        Arc::new(move |reason: Option<Reason>| state.cancel(reason))
    }

    /// Cancel every still-pending child, exactly once. Safe to call any
    /// number of times and from within the driving loop itself (necessity
    /// failure, race winner, normal completion all route through this).
    pub fn cancel(&self, reason: Option<Reason>) {
        if self.fired.swap(true, Ordering::SeqCst) {
            return;
        }
        self.token.cancel();
        let handles = std::mem::take(&mut *self.handles.lock());
        for handle in handles.into_iter().flatten() {
            handle.abort();
        }
        let cancellors = std::mem::take(&mut *self.child_cancellors.lock());
        for cancellor in cancellors.into_iter().flatten() {
            let reason = reason.clone();
            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| cancellor(reason)));
            if outcome.is_err() {
                tracing::warn!(factory = %self.factory, "child cancellor panicked; ignoring");
            }
        }
    }

    fn clear_slot(&self, index: usize) {
        if let Some(slot) = self.handles.lock().get_mut(index) {
            *slot = None;
        }
        if let Some(slot) = self.child_cancellors.lock().get_mut(index) {
            *slot = None;
        }
    }

    fn store_handle(&self, index: usize, handle: JoinHandle<()>) {
        if let Some(slot) = self.handles.lock().get_mut(index) {
            *slot = Some(handle);
        }
    }

    fn store_cancellor(&self, index: usize, cancellor: Cancellor) {
        if let Some(slot) = self.child_cancellors.lock().get_mut(index) {
            *slot = Some(cancellor);
        }
    }
}

fn spawn_child<M, V>(
    state: &Arc<EngineState>,
    requestor: DynRequestor<M, V>,
    message: M,
    index: usize,
    tx: mpsc::UnboundedSender<ChildCompletion<V>>,
) where
    M: Send + 'static,
    V: Send + 'static,
{
    let child_token = state.token.child_token();
    let state_for_task = Arc::clone(state);
    let factory = state.factory;
    let handle = tokio::spawn(async move {
        if child_token.is_cancelled() {
            return;
        }
        let (fut, cancellor) = requestor.start(message, child_token);
        if let Some(cancellor) = cancellor {
            state_for_task.store_cancellor(index, cancellor);
        }
        // A panicking requestor must still report a completion, or the
        // driving loop would wait on a channel message that never arrives.
        let outcome = match std::panic::AssertUnwindSafe(fut).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(payload) => Outcome::Failure(Reason::child_panicked(factory, index, payload.as_ref())),
        };
        let _ = tx.send(ChildCompletion { index, outcome });
    });
    state.store_handle(index, handle);
}

fn timeout_future(time_limit: Option<Duration>) -> Pin<Box<dyn Future<Output = ()> + Send>> {
    match time_limit {
        Some(limit) if limit > Duration::ZERO => Box::pin(tokio::time::sleep(limit)),
        _ => Box::pin(std::future::pending()),
    }
}

/// Drive `requestors` to completion under `throttle` concurrency, routing
/// each completion through `action` and, if `time_limit` elapses first,
/// through `on_timeout`.
///
/// `next_message` is called once per child, in launch order, immediately
/// before that child is spawned — this is the single knob the operators use
/// to either broadcast the same message to every child (`parallel`, `race`,
/// `fallback`) or thread the previous child's success value into the next
/// (`sequence`); see SPEC_FULL.md §4.1, contract 6.
///
/// `action` and `on_timeout` are handed the [`EngineState`] so they can call
/// [`EngineState::cancel`] themselves as their policy dictates (SPEC_FULL.md
/// §4.2–§4.5); `run` additionally calls it once more after the loop exits, as
/// a backstop, which is a no-op if policy code already did so.
pub async fn run<M, V, Out>(
    state: Arc<EngineState>,
    requestors: Vec<DynRequestor<M, V>>,
    mut next_message: impl FnMut(usize) -> M + Send,
    throttle: usize,
    time_limit: Option<Duration>,
    mut action: impl FnMut(&Arc<EngineState>, ChildCompletion<V>) -> Directive<Out> + Send,
    mut on_timeout: impl FnMut(&Arc<EngineState>) -> Option<Outcome<Out>> + Send,
) -> Outcome<Out>
where
    M: Send + 'static,
    V: Send + 'static,
    Out: Send + 'static,
{
    let total = requestors.len();
    debug_assert!(total > 0, "run() must not be called with an empty requestor list");
    let effective_throttle = if throttle == 0 { total } else { throttle };

    let (tx, mut rx) = mpsc::unbounded_channel::<ChildCompletion<V>>();
    let mut requestors: Vec<Option<DynRequestor<M, V>>> = requestors.into_iter().map(Some).collect();
    let mut next_to_launch = 0usize;

    let span = tracing::debug_span!("engine", factory = %state.factory_name(), children = total);
    let driving = async {
        let launch_count = effective_throttle.min(total);
        for _ in 0..launch_count {
            let requestor = requestors[next_to_launch].take().expect("requestor already launched");
            let message = next_message(next_to_launch);
            spawn_child(&state, requestor, message, next_to_launch, tx.clone());
            next_to_launch += 1;
        }

        let timeout_fut = timeout_future(time_limit);
        tokio::pin!(timeout_fut);
        let mut timed_out = false;

        loop {
            tokio::select! {
                biased;

                _ = &mut timeout_fut, if !timed_out => {
                    timed_out = true;
                    tracing::warn!(factory = %state.factory_name(), "time limit elapsed");
                    if let Some(outcome) = on_timeout(&state) {
                        break outcome;
                    }
                }

                completion = rx.recv() => {
                    match completion {
                        Some(completion) => {
                            let index = completion.index;
                            state.clear_slot(index);
                            match completion.outcome {
                                Outcome::Value(_) => tracing::debug!(index, "child completed"),
                                Outcome::Failure(ref reason) => tracing::debug!(index, %reason, "child failed"),
                            }
                            match action(&state, completion) {
                                Directive::Finish(outcome) => break outcome,
                                Directive::Continue => {
                                    if next_to_launch < total {
                                        let requestor = requestors[next_to_launch]
                                            .take()
                                            .expect("requestor already launched");
                                        let message = next_message(next_to_launch);
                                        spawn_child(&state, requestor, message, next_to_launch, tx.clone());
                                        next_to_launch += 1;
                                    }
                                }
                            }
                        }
                        None => {
                            break Outcome::Failure(
                                Reason::new(state.factory_name(), "engine channel closed with children still pending"),
                            );
                        }
                    }
                }
            }
        }
    };

    use tracing::Instrument;
    let result = driving.instrument(span).await;

    state.cancel(None);
    result
}

impl EngineState {
    fn factory_name(&self) -> FactoryName {
        self.factory
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives;
    use crate::requestor::Requestor;
    use std::sync::atomic::AtomicUsize;
    use tracing::Level;
    use tracing_subscriber::util::SubscriberInitExt;

    fn setup_tracing() -> tracing::dispatcher::DefaultGuard {
        tracing_subscriber::fmt().with_max_level(Level::TRACE).with_test_writer().finish().set_default()
    }

    fn collect_all<V: Send + 'static>(
        total: usize,
    ) -> impl FnMut(&Arc<EngineState>, ChildCompletion<V>) -> Directive<Vec<Outcome<V>>> {
        let slots: Arc<Mutex<Vec<Option<Outcome<V>>>>> = Arc::new(Mutex::new((0..total).map(|_| None).collect()));
        let mut remaining = total;
        move |_state, completion| {
            slots.lock()[completion.index] = Some(completion.outcome);
            remaining -= 1;
            if remaining == 0 {
                let results = std::mem::take(&mut *slots.lock()).into_iter().map(|o| o.unwrap()).collect();
                Directive::Finish(Outcome::Value(results))
            } else {
                Directive::Continue
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn throttle_caps_in_flight_children() {
        let _tracing = setup_tracing();
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_observed = Arc::new(AtomicUsize::new(0));

        let requestors: Vec<DynRequestor<(), ()>> = (0..5)
            .map(|_| {
                let in_flight = Arc::clone(&in_flight);
                let max_observed = Arc::clone(&max_observed);
                primitives::from_async_fn(move |_: ()| {
                    let in_flight = Arc::clone(&in_flight);
                    let max_observed = Arc::clone(&max_observed);
                    async move {
                        let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                        max_observed.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                        Outcome::Value(())
                    }
                }) as DynRequestor<(), ()>
            })
            .collect();

        let state = EngineState::new(FactoryName::Parallel, requestors.len(), &CancelToken::new());
        let action = collect_all::<()>(requestors.len());
        let outcome = run(state, requestors, |_| (), 2, None, action, |_| None).await;

        assert!(outcome.is_value());
        assert_eq!(max_observed.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn a_panicking_child_is_reported_as_a_failure_not_a_hang() {
        let requestors: Vec<DynRequestor<(), ()>> = vec![
            primitives::from_async_fn(|_: ()| async { panic!("boom") }),
            primitives::from_fn(|_: ()| Outcome::Value(())),
        ];
        let state = EngineState::new(FactoryName::Parallel, requestors.len(), &CancelToken::new());
        let action = collect_all::<()>(requestors.len());
        let outcome = run(state, requestors, |_| (), 0, None, action, |_| None).await;

        let results = match outcome {
            Outcome::Value(results) => results,
            Outcome::Failure(_) => panic!("expected both children to be collected"),
        };
        assert!(results[0].is_failure());
        assert!(results[1].is_value());
    }

    #[tokio::test]
    async fn cancellor_is_idempotent_and_aborts_still_pending_children() {
        let requestor: DynRequestor<(), ()> = primitives::delay((), Duration::from_secs(10));
        let requestors = vec![requestor];
        let state = EngineState::new(FactoryName::Race, 1, &CancelToken::new());
        let cancellor = state.cancellor();

        cancellor(None);
        cancellor(None);
        cancellor(Some(Reason::new(FactoryName::Race, "second call, still a no-op")));

        assert!(state.token.is_cancelled());
        let _ = requestors;
    }
}
