use std::collections::BTreeMap;

use tokio::time::Instant;

use crate::address::Address;
use crate::digest::Digest;
use crate::error::GroupError;
use crate::event::MergeId;
use crate::membership::Membership;
use crate::view::{View, ViewId};

/// Phase of the local merge state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergePhase {
    /// No merge in progress.
    #[default]
    Stable,
    /// A trigger arrived; leader election is about to run.
    MergePending,
    /// Leader gathering sub-group states.
    Collecting,
    /// Leader computing the unified view.
    LeaderComputing,
    /// Non-leader holding membership changes until the leader's view (or a
    /// timeout) arrives.
    LeaderWaiting,
    /// Unified view being broadcast to the union of members.
    Installing,
}

/// One sub-group's contribution to a merge: its coordinator's installed
/// view and digest.
#[derive(Debug, Clone)]
pub struct SubGroupState {
    /// Sub-group coordinator's installed view.
    pub view: View,
    /// Digest covering exactly that view's members.
    pub digest: Digest,
}

/// Leader-side bookkeeping for one merge round.
#[derive(Debug)]
pub struct MergeRound {
    id: MergeId,
    expected: Vec<Address>,
    collected: BTreeMap<Address, SubGroupState>,
    deadline: Instant,
}

impl MergeRound {
    /// Opens a round asking the given candidate coordinators for state.
    #[must_use]
    pub const fn new(id: MergeId, expected: Vec<Address>, deadline: Instant) -> Self {
        Self {
            id,
            expected,
            collected: BTreeMap::new(),
            deadline,
        }
    }

    /// Round identifier.
    #[must_use]
    pub const fn id(&self) -> &MergeId {
        &self.id
    }

    /// Instant at which collection gives up on missing responders.
    #[must_use]
    pub const fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Records a coordinator's state. Returns `false` for coordinators the
    /// round never asked or that already answered; the first answer wins.
    pub fn record(&mut self, coordinator: Address, state: SubGroupState) -> bool {
        if !self.expected.contains(&coordinator) || self.collected.contains_key(&coordinator) {
            return false;
        }
        self.collected.insert(coordinator, state);
        true
    }

    /// Returns `true` once every asked coordinator has answered.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.collected.len() == self.expected.len()
    }

    /// Sub-group states collected so far.
    #[must_use]
    pub fn collected(&self) -> usize {
        self.collected.len()
    }

    /// Coordinators the round asked.
    #[must_use]
    pub fn expected(&self) -> usize {
        self.expected.len()
    }

    /// Computes the unified view and digest from whatever was collected.
    pub fn compute(self, leader: &Address) -> Result<(View, Digest), GroupError> {
        unify(leader, &self.collected)
    }
}

/// Computes the unified merge view from sub-group states keyed by their
/// coordinator.
///
/// The map's ascending address order fixes the concatenation order: each
/// sub-view keeps its internal member order, a member appearing in several
/// overlapping sub-views keeps its first position, the new id takes the
/// highest collected lamport plus one with the leader as creator, and the
/// digests fold into one covering exactly the union.
pub fn unify(
    leader: &Address,
    states: &BTreeMap<Address, SubGroupState>,
) -> Result<(View, Digest), GroupError> {
    let mut members = Membership::new();
    let mut subviews: Vec<ViewId> = Vec::with_capacity(states.len());
    let mut max_lamport: Option<i64> = None;
    for state in states.values() {
        let id = state.view.id();
        max_lamport = Some(max_lamport.map_or(id.lamport(), |seen| seen.max(id.lamport())));
        subviews.push(id.clone());
        members.merge(state.view.members().iter().cloned());
    }
    let Some(max_lamport) = max_lamport else {
        return Err(GroupError::NoMergeCandidates);
    };

    let id = ViewId::new(leader.clone(), max_lamport + 1);
    let view = View::merged(id, members.into_members(), subviews);
    let digest = Digest::merge_all(states.values().map(|state| &state.digest));
    digest.covers_exactly(&view)?;
    Ok((view, digest))
}

/// Returns `true` when two distinct views share at least one member, the
/// signature of a healed partition that needs a merge.
#[must_use]
pub fn views_overlap(a: &View, b: &View) -> bool {
    a.id() != b.id() && a.members().iter().any(|member| b.contains(member))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::digest::Seqnos;
    use uuid::Uuid;

    fn addr(byte: u8) -> Address {
        Address::from_parts(Uuid::from_bytes([byte; 16]), None)
    }

    fn state(coordinator: &Address, lamport: i64, members: Vec<Address>) -> SubGroupState {
        let mut digest = Digest::new();
        for member in &members {
            digest.insert_new(member.clone());
        }
        SubGroupState {
            view: View::new(ViewId::new(coordinator.clone(), lamport), members),
            digest,
        }
    }

    #[test]
    fn unify_builds_the_exact_union_in_coordinator_order() {
        let (a, b, c) = (addr(1), addr(2), addr(3));
        let mut states = BTreeMap::new();
        states.insert(a.clone(), state(&a, 0, vec![a.clone(), b.clone(), c.clone()]));
        states.insert(b.clone(), state(&b, 10, vec![b.clone(), c.clone()]));

        let (view, digest) = unify(&a, &states).unwrap();
        assert_eq!(view.members(), &[a.clone(), b.clone(), c.clone()]);
        assert_eq!(view.id().lamport(), 11);
        assert_eq!(view.id().creator(), &a);
        assert_eq!(view.subviews().len(), 2);
        assert!(digest.covers_exactly(&view).is_ok());
    }

    #[test]
    fn unify_keeps_subview_member_order_when_the_lower_coordinator_leads() {
        let (a, b, c) = (addr(1), addr(2), addr(3));
        // Sub-group led by the lowest address lists only {A}; the other
        // lists {B, C}. The union starts with A's ordering.
        let mut states = BTreeMap::new();
        states.insert(a.clone(), state(&a, 4, vec![a.clone()]));
        states.insert(b.clone(), state(&b, 2, vec![b.clone(), c.clone()]));

        let (view, _) = unify(&a, &states).unwrap();
        assert_eq!(view.members(), &[a, b, c]);
        assert_eq!(view.id().lamport(), 5);
    }

    #[test]
    fn unify_merges_watermarks_per_member() {
        let (a, b) = (addr(1), addr(2));
        let mut left = state(&a, 0, vec![a.clone(), b.clone()]);
        left.digest.set(b.clone(), Seqnos::new(0, 3, 3));
        let mut right = state(&b, 1, vec![b.clone()]);
        right.digest.set(b.clone(), Seqnos::new(0, 7, 9));

        let mut states = BTreeMap::new();
        states.insert(a.clone(), left);
        states.insert(b.clone(), right);

        let (_, digest) = unify(&a, &states).unwrap();
        assert_eq!(digest.get(&b), Some(Seqnos::new(0, 7, 9)));
    }

    #[test]
    fn unify_of_nothing_is_an_error() {
        let states = BTreeMap::new();
        assert!(matches!(
            unify(&addr(1), &states),
            Err(GroupError::NoMergeCandidates)
        ));
    }

    #[test]
    fn round_ignores_unexpected_and_duplicate_answers() {
        let (a, b, c) = (addr(1), addr(2), addr(3));
        let id = MergeId {
            leader: a.clone(),
            seq: 1,
        };
        let mut round = MergeRound::new(id, vec![a.clone(), b.clone()], Instant::now());
        assert!(round.record(a.clone(), state(&a, 0, vec![a.clone()])));
        assert!(!round.is_complete());
        assert!(!round.record(c.clone(), state(&c, 0, vec![c.clone()])), "not asked");
        assert!(round.record(b.clone(), state(&b, 1, vec![b.clone()])));
        assert!(!round.record(b.clone(), state(&b, 2, vec![b.clone()])), "first answer wins");
        assert!(round.is_complete());
        assert_eq!(round.collected(), 2);
    }

    #[test]
    fn overlap_requires_a_shared_member_and_distinct_ids() {
        let (a, b, c, d) = (addr(1), addr(2), addr(3), addr(4));
        let whole = View::new(ViewId::new(a.clone(), 0), vec![a.clone(), b.clone(), c.clone()]);
        let split = View::new(ViewId::new(b.clone(), 10), vec![b, c]);
        let disjoint = View::new(ViewId::new(d.clone(), 1), vec![d]);

        assert!(views_overlap(&whole, &split));
        assert!(!views_overlap(&whole, &disjoint));
        assert!(!views_overlap(&whole, &whole.clone()), "same id never merges");
    }
}
