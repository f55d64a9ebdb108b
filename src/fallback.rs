//! `fallback`: run requestors one at a time, succeed on the first success.
//!
//! A specialisation of [`race`](crate::race) with `throttle` fixed at 1:
//! children run strictly in order, and a later child is only ever launched
//! once the previous one has failed. The initial message is cloned and
//! broadcast to every child — unlike [`sequence`](crate::sequence), `fallback`
//! never threads a prior result into the next message.

use std::sync::Arc;

use crate::config::FallbackConfig;
use crate::error::CompositionError;
use crate::race;
use crate::reason::FactoryName;
use crate::requestor::Requestor;

/// Run `requestors` one at a time, in order; the composite succeeds with the
/// first `Outcome::Value` and never starts the remaining requestors. Fails
/// only once every requestor has failed.
///
/// `requestors` must be non-empty — an empty list is a `CompositionError`.
pub fn fallback<M, V>(
    requestors: Vec<Arc<dyn Requestor<M, V>>>,
    config: FallbackConfig,
) -> Result<Arc<dyn Requestor<M, V>>, CompositionError>
where
    M: Clone + Send + Sync + 'static,
    V: Send + 'static,
{
    race::build(FactoryName::Fallback, requestors, config.time_limit, 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::Outcome;
    use crate::primitives;
    use crate::reason::Reason;
    use crate::requestor::CancelToken;
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
    async fn empty_requestors_is_a_configuration_error() {
        let err = fallback::<(), i32>(vec![], FallbackConfig::default()).unwrap_err();
        assert!(matches!(err, CompositionError::Config(_)));
    }

    #[tokio::test]
    async fn fallback_of_one_behaves_like_that_requestor() {
        let requestors: Vec<Arc<dyn Requestor<(), i32>>> = vec![primitives::from_fn(|_| Outcome::Value(9))];
        let composite = fallback(requestors, FallbackConfig::default()).unwrap();
        let outcome = start(&composite, ()).await;
        assert_eq!(outcome.as_value(), Some(&9));
    }

    #[tokio::test]
    async fn earlier_failures_fall_through_to_the_first_success() {
        let requestors: Vec<Arc<dyn Requestor<(), i32>>> = vec![
            primitives::failing(Reason::new(FactoryName::Fallback, "A")),
            primitives::failing(Reason::new(FactoryName::Fallback, "B")),
            primitives::delay(10, Duration::from_millis(10)),
        ];
        let composite = fallback(requestors, FallbackConfig::default()).unwrap();
        let outcome = start(&composite, ()).await;
        assert_eq!(outcome.as_value(), Some(&10));
    }

    #[tokio::test]
    async fn fails_only_once_every_child_has_failed() {
        let requestors: Vec<Arc<dyn Requestor<(), i32>>> = vec![
            primitives::failing(Reason::new(FactoryName::Fallback, "A")),
            primitives::failing(Reason::new(FactoryName::Fallback, "B")),
        ];
        let composite = fallback(requestors, FallbackConfig::default()).unwrap();
        let outcome = start(&composite, ()).await;
        assert_eq!(outcome.as_failure().unwrap().excuse, "B");
    }
}
