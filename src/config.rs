//! Operator configuration structs.
//!
//! Grounded on the teacher's plain config structs (`controller::Action`,
//! `watcher::Config`) rather than a dynamic, stringly-typed spec object: each
//! operator takes an explicit struct with a sensible `Default`.

use std::sync::Arc;
use std::time::Duration;

use crate::requestor::Requestor;

/// Governs how [`crate::parallel`] treats still-running optionals once its
/// time limit elapses. Closed by design — see DESIGN.md for why this stays
/// an enum rather than a bitset of independent toggles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeOption {
    /// Finish as soon as every necessity completes; cancel any still-running
    /// optionals. Fails if the time limit elapses before necessities finish.
    #[default]
    SkipOptionalsIfTimeRemains,
    /// Necessities and optionals share the same time limit; optionals may
    /// run until it elapses.
    TryOptionalsIfTimeRemains,
    /// The time limit applies only to optionals; necessities run
    /// uncapped. Once they finish, behave as `SkipOptionalsIfTimeRemains`
    /// for whatever remains.
    RequireNecessities,
}

/// Configuration for [`crate::parallel`].
pub struct ParallelConfig<M, V> {
    /// Requestors run alongside the necessities but whose failure does not
    /// fail the composite.
    pub optionals: Vec<Arc<dyn Requestor<M, V>>>,
    pub time_limit: Option<Duration>,
    pub time_option: TimeOption,
    /// `0` means unbounded concurrency.
    pub throttle: usize,
}

impl<M, V> Default for ParallelConfig<M, V> {
    fn default() -> Self {
        ParallelConfig {
            optionals: Vec::new(),
            time_limit: None,
            time_option: TimeOption::default(),
            throttle: 0,
        }
    }
}

/// Configuration for [`crate::race`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RaceConfig {
    pub time_limit: Option<Duration>,
    /// `0` means unbounded concurrency.
    pub throttle: usize,
}

/// Configuration for [`crate::sequence`]. No `throttle` or `time_option`
/// knob: both are fixed by the specialisation (throttle 1, necessities-only).
#[derive(Debug, Clone, Copy, Default)]
pub struct SequenceConfig {
    pub time_limit: Option<Duration>,
}

/// Configuration for [`crate::fallback`]. No `throttle` knob: fixed at 1.
#[derive(Debug, Clone, Copy, Default)]
pub struct FallbackConfig {
    pub time_limit: Option<Duration>,
}
