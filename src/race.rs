//! `race`: run many requestors concurrently, succeed on the first success.
//!
//! [`fallback`](crate::fallback) reuses [`build`] with `throttle` fixed at 1,
//! since "run one at a time, first success wins" is exactly `race` under a
//! concurrency cap of one child.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::config::RaceConfig;
use crate::engine::{self, Directive, EngineState};
use crate::error::CompositionError;
use crate::outcome::Outcome;
use crate::reason::{FactoryName, Reason};
use crate::requestor::{CancelToken, Cancellor, DynRequestor, Requestor, RequestorFuture};

struct RaceLike<M, V> {
    factory: FactoryName,
    requestors: Vec<DynRequestor<M, V>>,
    time_limit: Option<Duration>,
    throttle: usize,
}

impl<M, V> Requestor<M, V> for RaceLike<M, V>
where
    M: Clone + Send + Sync + 'static,
    V: Send + 'static,
{
    fn start(&self, message: M, cancel: CancelToken) -> (RequestorFuture<V>, Option<Cancellor>) {
        let factory = self.factory;
        let total = self.requestors.len();
        let state = EngineState::new(factory, total, &cancel);
        let cancellor = state.cancellor();

        let pending = Arc::new(Mutex::new(total));
        let last_reason: Arc<Mutex<Option<Reason>>> = Arc::new(Mutex::new(None));

        let action_pending = Arc::clone(&pending);
        let action_last_reason = Arc::clone(&last_reason);
        let action = move |engine_state: &Arc<EngineState>, completion: engine::ChildCompletion<V>| match completion
            .outcome
        {
            Outcome::Value(value) => {
                engine_state.cancel(Some(Reason::loser(factory)));
                Directive::Finish(Outcome::Value(value))
            }
            Outcome::Failure(reason) => {
                let mut pending = action_pending.lock();
                *pending -= 1;
                *action_last_reason.lock() = Some(reason.clone());
                if *pending == 0 {
                    Directive::Finish(Outcome::Failure(reason))
                } else {
                    Directive::Continue
                }
            }
        };

        let time_limit = self.time_limit;
        let on_timeout = move |engine_state: &Arc<EngineState>| -> Option<Outcome<V>> {
            let reason = Reason::timeout(factory, time_limit.unwrap_or_default());
            engine_state.cancel(Some(reason.clone()));
            Some(Outcome::Failure(reason))
        };

        let requestors: Vec<DynRequestor<M, V>> = self.requestors.clone();
        let throttle = self.throttle;
        let future = Box::pin(async move {
            engine::run(state, requestors, move |_index| message.clone(), throttle, time_limit, action, on_timeout)
                .await
        });

        (future, Some(cancellor))
    }
}

/// Run `requestors` concurrently; the composite succeeds with the first
/// `Outcome::Value` observed, cancelling every other still-pending sibling
/// with a `"loser"` reason. Fails only once every requestor has failed.
///
/// `requestors` must be non-empty — an empty list is a `CompositionError`,
/// since there is no possible winner.
pub fn race<M, V>(
    requestors: Vec<Arc<dyn Requestor<M, V>>>,
    config: RaceConfig,
) -> Result<Arc<dyn Requestor<M, V>>, CompositionError>
where
    M: Clone + Send + Sync + 'static,
    V: Send + 'static,
{
    build(FactoryName::Race, requestors, config.time_limit, config.throttle)
}

pub(crate) fn build<M, V>(
    factory: FactoryName,
    requestors: Vec<Arc<dyn Requestor<M, V>>>,
    time_limit: Option<Duration>,
    throttle: usize,
) -> Result<Arc<dyn Requestor<M, V>>, CompositionError>
where
    M: Clone + Send + Sync + 'static,
    V: Send + 'static,
{
    if requestors.is_empty() {
        return Err(CompositionError::config(format!("{factory} requires at least one requestor")));
    }
    Ok(Arc::new(RaceLike { factory, requestors, time_limit, throttle }))
}
