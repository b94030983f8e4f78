use async_trait::async_trait;

use crate::address::Address;
use crate::digest::Digest;
use crate::view::View;

/// Failure reason returned when a join request reaches a node that is not
/// the current coordinator.
pub const NOT_COORDINATOR: &str = "not coordinator";

/// Outcome of a join attempt, built once by the coordinator and never
/// mutated. The two variants make "exactly one outcome" impossible to
/// violate by construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinRsp {
    /// The candidate was admitted: the view it now belongs to and the
    /// digest it resumes delivery from, handed over as one atomic bundle.
    Success {
        /// View including the candidate.
        view: View,
        /// Digest covering exactly that view's members.
        digest: Digest,
    },
    /// The candidate was not admitted; no state was created anywhere.
    Rejected {
        /// Why the coordinator (or its policy) declined.
        reason: String,
    },
}

impl JoinRsp {
    /// Builds a successful response.
    #[must_use]
    pub const fn success(view: View, digest: Digest) -> Self {
        Self::Success { view, digest }
    }

    /// Builds a rejection carrying the failure reason.
    #[must_use]
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected {
            reason: reason.into(),
        }
    }

    /// Returns `true` for an admission.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// View handed to the candidate, if admitted.
    #[must_use]
    pub const fn view(&self) -> Option<&View> {
        match self {
            Self::Success { view, .. } => Some(view),
            Self::Rejected { .. } => None,
        }
    }

    /// Digest handed to the candidate, if admitted.
    #[must_use]
    pub const fn digest(&self) -> Option<&Digest> {
        match self {
            Self::Success { digest, .. } => Some(digest),
            Self::Rejected { .. } => None,
        }
    }

    /// Failure reason, if rejected.
    #[must_use]
    pub fn fail_reason(&self) -> Option<&str> {
        match self {
            Self::Success { .. } => None,
            Self::Rejected { reason } => Some(reason),
        }
    }
}

/// Admission control consulted by the coordinator before admitting a
/// candidate. Implementations typically wrap an authentication
/// collaborator; the engine only consumes the accept/reason outcome.
#[async_trait]
pub trait JoinPolicy: Send + Sync {
    /// Returns `Err(reason)` to reject the candidate.
    async fn validate(&self, candidate: &Address) -> Result<(), String>;
}

/// Policy admitting every candidate.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

#[async_trait]
impl JoinPolicy for AcceptAll {
    async fn validate(&self, _candidate: &Address) -> Result<(), String> {
        Ok(())
    }
}
