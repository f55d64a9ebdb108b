//! `parallel`: run many requestors concurrently and collect all results.
//!
//! Grounded on `kube_runtime::controller::runner::Runner`'s throttled
//! fan-out, generalised from "reconcile every object in the scheduler queue"
//! to "run every necessity and optional requestor, honoring a closed
//! [`TimeOption`] policy once a time limit elapses".

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::config::{ParallelConfig, TimeOption};
use crate::engine::{self, Directive, EngineState};
use crate::error::CompositionError;
use crate::outcome::Outcome;
use crate::reason::{FactoryName, Reason};
use crate::requestor::{CancelToken, Cancellor, DynRequestor, Requestor, RequestorFuture};

const FACTORY: FactoryName = FactoryName::Parallel;

struct Tally<V> {
    results: Vec<Option<Outcome<V>>>,
    pending: usize,
    pending_necessities: usize,
    time_option: TimeOption,
}

struct ParallelRequestor<M, V> {
    necessities: Vec<DynRequestor<M, V>>,
    optionals: Vec<DynRequestor<M, V>>,
    time_limit: Option<Duration>,
    time_option: TimeOption,
    throttle: usize,
}

impl<M, V> Requestor<M, Vec<Outcome<V>>> for ParallelRequestor<M, V>
where
    M: Clone + Send + Sync + 'static,
    V: Send + 'static,
{
    fn start(
        &self,
        message: M,
        cancel: CancelToken,
    ) -> (RequestorFuture<Vec<Outcome<V>>>, Option<Cancellor>) {
        let necessities_len = self.necessities.len();
        let total = necessities_len + self.optionals.len();

        if total == 0 {
            return (Box::pin(async { Outcome::Value(Vec::new()) }), None);
        }

        let mut requestors = Vec::with_capacity(total);
        requestors.extend(self.necessities.iter().cloned());
        requestors.extend(self.optionals.iter().cloned());

        let state = EngineState::new(FACTORY, total, &cancel);
        let cancellor = state.cancellor();

        let tally = Arc::new(Mutex::new(Tally {
            results: (0..total).map(|_| None).collect(),
            pending: total,
            pending_necessities: necessities_len,
            time_option: self.time_option,
        }));

        let action_tally = Arc::clone(&tally);
        let action = move |engine_state: &Arc<EngineState>, completion: engine::ChildCompletion<V>| {
            let index = completion.index;
            let mut tally = action_tally.lock();
            tally.results[index] = Some(completion.outcome);
            tally.pending -= 1;
            let is_necessity = index < necessities_len;
            if is_necessity {
                tally.pending_necessities -= 1;
            }

            if is_necessity {
                if let Some(Outcome::Failure(reason)) = &tally.results[index] {
                    let reason = reason.clone();
                    engine_state.cancel(Some(reason.clone()));
                    return Directive::Finish(Outcome::Failure(reason));
                }
            }

            let finished_everything = tally.pending == 0;
            let necessities_done_and_skip =
                tally.pending_necessities == 0 && tally.time_option == TimeOption::SkipOptionalsIfTimeRemains;

            if finished_everything || necessities_done_and_skip {
                engine_state.cancel(None);
                let assembled = assemble(&mut tally.results);
                Directive::Finish(Outcome::Value(assembled))
            } else {
                Directive::Continue
            }
        };

        let timeout_tally = Arc::clone(&tally);
        let time_limit = self.time_limit;
        let on_timeout = move |engine_state: &Arc<EngineState>| -> Option<Outcome<Vec<Outcome<V>>>> {
            let mut tally = timeout_tally.lock();
            let reason = Reason::timeout(FACTORY, time_limit.unwrap_or_default());
            match tally.time_option {
                TimeOption::SkipOptionalsIfTimeRemains => {
                    engine_state.cancel(Some(reason.clone()));
                    Some(Outcome::Failure(reason))
                }
                TimeOption::TryOptionalsIfTimeRemains => {
                    engine_state.cancel(Some(reason.clone()));
                    if tally.pending_necessities == 0 {
                        Some(Outcome::Value(assemble(&mut tally.results)))
                    } else {
                        Some(Outcome::Failure(reason))
                    }
                }
                TimeOption::RequireNecessities => {
                    tally.time_option = TimeOption::SkipOptionalsIfTimeRemains;
                    if tally.pending_necessities == 0 {
                        engine_state.cancel(None);
                        Some(Outcome::Value(assemble(&mut tally.results)))
                    } else {
                        // Necessities keep running uncapped; the next time a
                        // necessity completes, the action above will observe
                        // the now-upgraded policy and finish normally.
                        None
                    }
                }
            }
        };

        let throttle = self.throttle;
        let future = Box::pin(async move {
            engine::run(
                state,
                requestors,
                move |_index| message.clone(),
                throttle,
                time_limit,
                action,
                on_timeout,
            )
            .await
        });

        (future, Some(cancellor))
    }
}

fn assemble<V>(results: &mut [Option<Outcome<V>>]) -> Vec<Outcome<V>> {
    results
        .iter_mut()
        .enumerate()
        .map(|(index, slot)| slot.take().unwrap_or_else(|| Outcome::Failure(Reason::not_completed(FACTORY, index))))
        .collect()
}

/// Run `necessities` (and `config.optionals`) concurrently, collecting every
/// outcome.
///
/// - Empty necessities and empty optionals: succeeds immediately with an
///   empty result vector.
/// - Empty necessities, non-empty optionals: the optionals become the whole
///   set and `config.time_option` is forced to `TryOptionalsIfTimeRemains`.
/// - Non-empty necessities, empty optionals: `config.time_option` is forced
///   to `SkipOptionalsIfTimeRemains` (vacuously, since there is nothing to
///   skip).
/// - A single necessity failing cancels everything and fails the composite
///   with that necessity's reason; an optional failing never does.
pub fn parallel<M, V>(
    necessities: Vec<Arc<dyn Requestor<M, V>>>,
    mut config: ParallelConfig<M, V>,
) -> Result<Arc<dyn Requestor<M, Vec<Outcome<V>>>>, CompositionError>
where
    M: Clone + Send + Sync + 'static,
    V: Send + 'static,
{
    let has_necessities = !necessities.is_empty();
    let has_optionals = !config.optionals.is_empty();

    if !has_necessities && has_optionals {
        config.time_option = TimeOption::TryOptionalsIfTimeRemains;
    } else if has_necessities && !has_optionals {
        config.time_option = TimeOption::SkipOptionalsIfTimeRemains;
    }

    Ok(Arc::new(ParallelRequestor {
        necessities,
        optionals: config.optionals,
        time_limit: config.time_limit,
        time_option: config.time_option,
        throttle: config.throttle,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives;
    use std::time::Duration;

    async fn start<M, V>(requestor: &Arc<dyn Requestor<M, V>>, message: M) -> Outcome<V>
    where
        M: Send + 'static,
        V: Send + 'static,
    {
        let (fut, _cancellor) = requestor.start(message, CancelToken::new());
        fut.await
    }

    #[tokio::test]
    async fn empty_necessities_and_optionals_succeed_immediately_with_empty_results() {
        let composite = parallel::<(), i32>(vec![], ParallelConfig::default()).unwrap();
        let outcome = start(&composite, ()).await;
        assert_eq!(outcome.as_value(), Some(&Vec::new()));
    }

    #[tokio::test]
    async fn results_preserve_input_order_regardless_of_completion_order() {
        let necessities: Vec<Arc<dyn Requestor<(), i32>>> = vec![
            primitives::delay(1, Duration::from_millis(30)),
            primitives::delay(2, Duration::from_millis(10)),
            primitives::delay(3, Duration::from_millis(20)),
        ];
        let composite = parallel(necessities, ParallelConfig::default()).unwrap();
        let outcome = start(&composite, ()).await;
        let results = outcome.into_result().unwrap();
        let values: Vec<i32> = results.into_iter().map(|o| *o.as_value().unwrap()).collect();
        assert_eq!(values, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn a_failing_necessity_short_circuits_immediately() {
        let necessities: Vec<Arc<dyn Requestor<(), i32>>> = vec![
            primitives::failing(Reason::new(FACTORY, "boom")),
            primitives::delay(2, Duration::from_secs(10)),
        ];
        let composite = parallel(necessities, ParallelConfig::default()).unwrap();
        let outcome = start(&composite, ()).await;
        assert_eq!(outcome.as_failure().unwrap().excuse, "boom");
    }

    #[tokio::test(start_paused = true)]
    async fn skip_optionals_if_time_remains_cancels_slow_optionals_once_necessities_finish() {
        let necessities: Vec<Arc<dyn Requestor<(), i32>>> =
            vec![primitives::delay(50, Duration::from_millis(50)), primitives::delay(100, Duration::from_millis(100))];
        let config = ParallelConfig {
            optionals: vec![primitives::delay(1000, Duration::from_millis(1000))],
            time_option: TimeOption::SkipOptionalsIfTimeRemains,
            ..ParallelConfig::default()
        };
        let composite = parallel(necessities, config).unwrap();

        let started = tokio::time::Instant::now();
        let outcome = start(&composite, ()).await;
        let elapsed = started.elapsed();

        assert!(elapsed >= Duration::from_millis(100) && elapsed < Duration::from_millis(200));
        let results = outcome.into_result().unwrap();
        assert_eq!(results[0].as_value(), Some(&50));
        assert_eq!(results[1].as_value(), Some(&100));
        assert!(results[2].is_failure());
    }

    #[tokio::test(start_paused = true)]
    async fn try_optionals_if_time_remains_fails_if_a_necessity_is_still_pending_at_timeout() {
        // A lone optional keeps the normalisation override (§4.2, "N > 0 and
        // M_ == 0") from clobbering the configured `TryOptionalsIfTimeRemains`.
        let necessities: Vec<Arc<dyn Requestor<(), i32>>> = vec![primitives::delay(1, Duration::from_millis(200))];
        let config = ParallelConfig {
            optionals: vec![primitives::delay(2, Duration::from_millis(5))],
            time_limit: Some(Duration::from_millis(50)),
            time_option: TimeOption::TryOptionalsIfTimeRemains,
            ..ParallelConfig::default()
        };
        let composite = parallel(necessities, config).unwrap();
        let outcome = start(&composite, ()).await;
        assert!(outcome.is_failure());
    }

    #[tokio::test(start_paused = true)]
    async fn require_necessities_lets_a_slow_necessity_outrun_the_time_limit() {
        // A lone optional keeps `parallel`'s normalisation from forcing
        // `SkipOptionalsIfTimeRemains` (that override only applies when there
        // are no optionals at all), so `RequireNecessities` actually governs.
        let necessities: Vec<Arc<dyn Requestor<(), i32>>> = vec![primitives::delay(7, Duration::from_millis(200))];
        let config = ParallelConfig {
            optionals: vec![primitives::delay(99, Duration::from_millis(5))],
            time_limit: Some(Duration::from_millis(10)),
            time_option: TimeOption::RequireNecessities,
            ..ParallelConfig::default()
        };
        let composite = parallel(necessities, config).unwrap();
        let outcome = start(&composite, ()).await;
        let results = outcome.into_result().unwrap();
        assert_eq!(results[0].as_value(), Some(&7));
        assert_eq!(results[1].as_value(), Some(&99));
    }
}
