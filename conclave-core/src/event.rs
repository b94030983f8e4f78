use std::fmt;

use crate::address::Address;
use crate::digest::Digest;
use crate::join::JoinRsp;
use crate::view::View;

/// Correlates the messages of one merge round.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MergeId {
    /// Leader that opened the round.
    pub leader: Address,
    /// Round counter, unique within the leader's lifetime.
    pub seq: u64,
}

impl fmt::Display for MergeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.leader, self.seq)
    }
}

/// Protocol messages exchanged between group members.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupMessage {
    /// Request to be admitted, sent to the current coordinator.
    JoinReq {
        /// Node asking to join.
        candidate: Address,
    },
    /// Coordinator's response to a join request.
    JoinRsp(JoinRsp),
    /// Graceful departure request sent to the coordinator.
    LeaveReq {
        /// Member that wants out.
        member: Address,
    },
    /// Coordinator's acknowledgement of a leave request.
    LeaveAck,
    /// Installation order for a new view and its accompanying digest.
    ViewAnnounce {
        /// View to install.
        view: View,
        /// Digest covering exactly that view's members.
        digest: Digest,
    },
    /// Names candidate coordinators whose views should be merged.
    MergeTrigger {
        /// Candidate coordinators of the overlapping sub-groups.
        coords: Vec<Address>,
    },
    /// Leader's request for a sub-group coordinator's current state.
    MergeStateReq {
        /// Round this request belongs to.
        merge_id: MergeId,
    },
    /// Sub-group state returned to the merge leader.
    MergeStateRsp {
        /// Round this state answers.
        merge_id: MergeId,
        /// Responder's installed view.
        view: View,
        /// Responder's installed digest.
        digest: Digest,
    },
}

/// Upward notifications published when local state changes.
#[derive(Debug, Clone)]
pub enum GroupEvent {
    /// A new view replaced the installed one wholesale.
    ViewInstalled(View),
    /// The local delivery digest changed.
    DigestUpdated(Digest),
}
