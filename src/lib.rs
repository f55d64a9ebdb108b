//! An asynchronous task composition core.
//!
//! A [`Requestor`] performs exactly one unit of work and resolves to exactly
//! one [`Outcome`]. Four composition operators combine requestors into new
//! ones with well-defined concurrency, ordering, cancellation, timeout and
//! throttling semantics:
//!
//! - [`parallel`] — run many requestors concurrently; collect every result.
//! - [`race`] — run many concurrently; succeed on the first success.
//! - [`sequence`] — run strictly one at a time; thread each success into the
//!   next.
//! - [`fallback`] — run one at a time; succeed on the first success.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use parsec_core::{primitives, race, CancelToken, RaceConfig, Requestor};
//!
//! #[tokio::main]
//! async fn main() {
//!     let requestors: Vec<Arc<dyn Requestor<(), i32>>> = vec![
//!         primitives::delay(1, Duration::from_millis(50)),
//!         primitives::delay(2, Duration::from_millis(10)),
//!     ];
//!     let winner = race(requestors, RaceConfig::default()).unwrap();
//!     let (future, _cancellor) = winner.start((), CancelToken::new());
//!     let outcome = future.await;
//!     assert!(outcome.is_value());
//! }
//! ```

mod config;
mod engine;
mod error;
mod fallback;
mod outcome;
mod parallel;
pub mod primitives;
mod race;
mod reason;
mod requestor;
mod sequence;

pub use config::{FallbackConfig, ParallelConfig, RaceConfig, SequenceConfig, TimeOption};
pub use error::CompositionError;
pub use fallback::fallback;
pub use outcome::Outcome;
pub use parallel::parallel;
pub use race::race;
pub use reason::{Evidence, FactoryName, Reason};
pub use requestor::{CancelToken, Cancellor, DynRequestor, Requestor, RequestorFuture};
pub use sequence::sequence;
