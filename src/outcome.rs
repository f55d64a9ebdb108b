//! The value-or-reason result carried by every requestor.

use crate::reason::Reason;

/// The result of running a single requestor to completion.
///
/// `Outcome` is deliberately shaped like [`std::result::Result`] but kept as its
/// own type: composites build `Outcome<Vec<Outcome<V>>>` (see [`crate::parallel`]),
/// and spelling that out as `Result<Vec<Result<V, Reason>>, Reason>` at every call
/// site reads worse than it needs to.
#[derive(Debug, Clone)]
pub enum Outcome<V> {
    /// The requestor succeeded with `V`.
    Value(V),
    /// The requestor failed with a structured [`Reason`].
    Failure(Reason),
}

impl<V> Outcome<V> {
    /// True if this is [`Outcome::Value`].
    pub fn is_value(&self) -> bool {
        matches!(self, Outcome::Value(_))
    }

    /// True if this is [`Outcome::Failure`].
    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failure(_))
    }

    /// Borrow the success value, if present.
    pub fn as_value(&self) -> Option<&V> {
        match self {
            Outcome::Value(v) => Some(v),
            Outcome::Failure(_) => None,
        }
    }

    /// Borrow the failure reason, if present.
    pub fn as_failure(&self) -> Option<&Reason> {
        match self {
            Outcome::Value(_) => None,
            Outcome::Failure(r) => Some(r),
        }
    }

    /// Convert to a plain [`std::result::Result`].
    pub fn into_result(self) -> Result<V, Reason> {
        match self {
            Outcome::Value(v) => Ok(v),
            Outcome::Failure(r) => Err(r),
        }
    }

    /// Build an `Outcome` from a plain [`std::result::Result`].
    pub fn from_result(result: Result<V, Reason>) -> Self {
        match result {
            Ok(v) => Outcome::Value(v),
            Err(r) => Outcome::Failure(r),
        }
    }
}
