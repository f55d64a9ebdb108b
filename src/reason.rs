//! Structured failure description carried inside a failing [`crate::Outcome`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Identifies which composition operator produced a [`Reason`].
///
/// Carried purely for diagnostics: nothing in the engine branches on this value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FactoryName {
    Parallel,
    Race,
    Sequence,
    Fallback,
}

impl fmt::Display for FactoryName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FactoryName::Parallel => "parallel",
            FactoryName::Race => "race",
            FactoryName::Sequence => "sequence",
            FactoryName::Fallback => "fallback",
        };
        f.write_str(name)
    }
}

/// Diagnostic payload attached to a [`Reason`].
///
/// Kept as a closed set rather than `Box<dyn Any>`: every evidence shape the
/// engine itself produces is one of these three, and callers building their own
/// `Reason`s (e.g. [`crate::primitives::failing`]) rarely need more than `Message`.
#[derive(Debug, Clone)]
pub enum Evidence {
    /// The index of the child requestor this reason concerns.
    RequestorIndex(usize),
    /// The time limit that elapsed.
    TimeLimit(Duration),
    /// A free-form note, e.g. from a user-constructed failing requestor.
    Message(String),
}

/// A structured failure: which operator produced it, a short human excuse,
/// optional diagnostic evidence, and an optional underlying cause.
///
/// `cause` is reference-counted rather than boxed so that `Reason` stays
/// `Clone`, which the engine relies on to hand the same cancellation reason to
/// every still-pending child.
#[derive(Debug, Clone)]
pub struct Reason {
    pub factory: FactoryName,
    pub excuse: String,
    pub evidence: Option<Evidence>,
    pub cause: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl Reason {
    /// Build a bare reason with no evidence or cause.
    pub fn new(factory: FactoryName, excuse: impl Into<String>) -> Self {
        Reason {
            factory,
            excuse: excuse.into(),
            evidence: None,
            cause: None,
        }
    }

    #[must_use]
    pub fn with_evidence(mut self, evidence: Evidence) -> Self {
        self.evidence = Some(evidence);
        self
    }

    #[must_use]
    pub fn with_cause(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Arc::new(cause));
        self
    }

    /// The reason attached to a child's results slot when it was cancelled
    /// before it ever completed (e.g. a `parallel` optional that lost the
    /// race against its necessities). See SPEC_FULL.md §4.2 "Result shape".
    pub fn not_completed(factory: FactoryName, index: usize) -> Self {
        Reason::new(factory, "requestor did not complete before the composite finished")
            .with_evidence(Evidence::RequestorIndex(index))
    }

    /// The reason a losing `race`/`fallback` sibling is cancelled with.
    pub fn loser(factory: FactoryName) -> Self {
        Reason::new(factory, "loser")
    }

    /// The reason used when the engine's own time limit elapses.
    pub fn timeout(factory: FactoryName, limit: Duration) -> Self {
        Reason::new(factory, "time limit elapsed").with_evidence(Evidence::TimeLimit(limit))
    }

    /// The reason used when a child's spawned task panics before reporting
    /// an outcome.
    pub fn child_panicked(factory: FactoryName, index: usize, payload: &(dyn std::any::Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "requestor panicked".to_string()
        };
        Reason::new(factory, format!("requestor panicked: {message}"))
            .with_evidence(Evidence::RequestorIndex(index))
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.factory, self.excuse)
    }
}

impl std::error::Error for Reason {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause.as_ref().map(|c| c.as_ref() as &(dyn std::error::Error + 'static))
    }
}
