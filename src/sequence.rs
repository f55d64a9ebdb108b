//! `sequence`: run requestors strictly one at a time, threading each success
//! into the next.
//!
//! A specialisation of the run engine with `throttle = 1` and no optionals —
//! the only operator where a child's message is not the broadcast initial
//! message but the previous child's success value (SPEC_FULL.md §4.4). That
//! threading is expressed entirely through the engine's `next_message`
//! callback; the engine itself stays agnostic to which operator is driving
//! it.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::config::SequenceConfig;
use crate::engine::{self, Directive, EngineState};
use crate::error::CompositionError;
use crate::outcome::Outcome;
use crate::reason::FactoryName;
use crate::requestor::{CancelToken, Cancellor, DynRequestor, Requestor, RequestorFuture};

const FACTORY: FactoryName = FactoryName::Sequence;

struct SequenceRequestor<T> {
    requestors: Vec<DynRequestor<T, T>>,
    time_limit: Option<Duration>,
}

impl<T> Requestor<T, T> for SequenceRequestor<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn start(&self, message: T, cancel: CancelToken) -> (RequestorFuture<T>, Option<Cancellor>) {
        let total = self.requestors.len();
        if total == 0 {
            return (Box::pin(async move { Outcome::Value(message) }), None);
        }
        let state = EngineState::new(FACTORY, total, &cancel);
        let cancellor = state.cancellor();

        let last_success: Arc<Mutex<Option<T>>> = Arc::new(Mutex::new(None));

        let next_message_cell = Arc::clone(&last_success);
        let initial = message.clone();
        let next_message = move |index: usize| -> T {
            if index == 0 {
                initial.clone()
            } else {
                next_message_cell
                    .lock()
                    .clone()
                    .expect("sequence threads a value before launching the next child")
            }
        };

        let action_last_success = Arc::clone(&last_success);
        let action = move |engine_state: &Arc<EngineState>, completion: engine::ChildCompletion<T>| {
            match completion.outcome {
                Outcome::Value(value) => {
                    if completion.index + 1 == total {
                        engine_state.cancel(None);
                        Directive::Finish(Outcome::Value(value))
                    } else {
                        *action_last_success.lock() = Some(value);
                        Directive::Continue
                    }
                }
                Outcome::Failure(reason) => {
                    engine_state.cancel(Some(reason.clone()));
                    Directive::Finish(Outcome::Failure(reason))
                }
            }
        };

        let time_limit = self.time_limit;
        let on_timeout = move |engine_state: &Arc<EngineState>| -> Option<Outcome<T>> {
            let reason = crate::reason::Reason::timeout(FACTORY, time_limit.unwrap_or_default());
            engine_state.cancel(Some(reason.clone()));
            Some(Outcome::Failure(reason))
        };

        let requestors: Vec<DynRequestor<T, T>> = self.requestors.clone();
        let future =
            Box::pin(async move { engine::run(state, requestors, next_message, 1, time_limit, action, on_timeout).await });

        (future, Some(cancellor))
    }
}

/// Run `requestors` strictly one at a time; each child's success value
/// becomes the next child's message. The composite's result is the last
/// child's success value. The first failure fails the composite immediately
/// and no further child is ever started.
///
/// `requestors` is allowed to be empty (the engine never runs and the
/// message is echoed back unchanged — see DESIGN.md for why this differs
/// from `race`/`fallback`'s "empty is a configuration error").
pub fn sequence<T>(
    requestors: Vec<Arc<dyn Requestor<T, T>>>,
    config: SequenceConfig,
) -> Result<Arc<dyn Requestor<T, T>>, CompositionError>
where
    T: Clone + Send + Sync + 'static,
{
    Ok(Arc::new(SequenceRequestor { requestors, time_limit: config.time_limit }))
}
