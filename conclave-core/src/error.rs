use thiserror::Error;

use crate::address::Address;
use crate::view::ViewId;
use crate::wire::WireError;

/// Errors surfaced by the membership engine.
///
/// Everything here is recoverable at the node level: rejecting one bad
/// view, join, or merge attempt never crashes the node or corrupts its
/// installed view. Only [`Wire`](GroupError::Wire) and
/// [`InconsistentDigestScope`](GroupError::InconsistentDigestScope) abort
/// their operation outright; the rest are expected outcomes of an
/// asynchronous, partition-tolerant protocol.
#[derive(Debug, Error)]
pub enum GroupError {
    /// A wire form failed to decode; nothing was applied.
    #[error("malformed wire data: {0}")]
    Wire(#[from] WireError),

    /// A join or view-change request reached a node that is not the current
    /// coordinator.
    #[error("request reached {local}, current coordinator is {coordinator}")]
    NotCoordinator {
        /// Node that received the request.
        local: Address,
        /// Coordinator of the receiver's installed view.
        coordinator: Address,
    },

    /// The join policy declined the candidate; no partial state exists.
    #[error("join rejected: {0}")]
    JoinRejected(String),

    /// An announced view is not strictly newer than the installed one.
    /// Expected under concurrent announcements and handled by discarding.
    #[error("view {offered} is not newer than installed {installed}")]
    StaleView {
        /// Id of the discarded announcement.
        offered: ViewId,
        /// Id currently installed locally.
        installed: ViewId,
    },

    /// An announced view does not include the local node; installing it
    /// would detach the node from its own group.
    #[error("view {0} does not include the local node")]
    NotInView(ViewId),

    /// A merge round expired before enough sub-group state arrived. The
    /// pre-merge view is retained unchanged.
    #[error("merge timed out with {collected} of {expected} sub-group states")]
    MergeTimeout {
        /// Sub-group states that did arrive in time.
        collected: usize,
        /// Sub-group coordinators the round asked.
        expected: usize,
    },

    /// A digest's member coverage does not match its paired view. Fatal to
    /// that install only; proceeding would risk message loss or
    /// duplication.
    #[error("digest does not cover its view ({missing} missing, {unexpected} unexpected)")]
    InconsistentDigestScope {
        /// View members without a digest entry.
        missing: usize,
        /// Digest entries for non-members.
        unexpected: usize,
    },

    /// Merge-leader election ran over an empty candidate set.
    #[error("merge requires at least one candidate coordinator")]
    NoMergeCandidates,

    /// A bounded wait elapsed without a response.
    #[error("timed out waiting for {waiting_for}")]
    Timeout {
        /// What the caller was waiting on.
        waiting_for: &'static str,
    },

    /// Underlying transport I/O failure.
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),

    /// The engine loop is gone; the node is shutting down.
    #[error("engine channel closed")]
    ChannelClosed,
}
