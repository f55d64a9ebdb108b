//! Synchronous configuration errors surfaced at operator-construction time.

/// Returned by an operator constructor (`parallel`, `race`, `sequence`,
/// `fallback`) when its inputs are malformed, before any requestor has run.
///
/// Distinct from [`crate::Reason`]: a `CompositionError` is a Rust
/// `Result::Err` on the call that *builds* a composite; a `Reason` is the
/// failure payload carried by a composite that is already running. See
/// SPEC_FULL.md §4.7.
#[derive(Debug, thiserror::Error)]
pub enum CompositionError {
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl CompositionError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        CompositionError::Config(message.into())
    }
}
