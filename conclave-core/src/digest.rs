use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::error::GroupError;
use crate::view::View;

/// Per-member message-sequence watermarks.
///
/// Semantics belong to the transport layer; this crate only splices them
/// across view changes so delivery resumes without gaps or duplicates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Seqnos {
    /// Lowest sequence number not yet garbage-collected for the member.
    pub lowest_unseen: i64,
    /// Highest sequence number delivered to the application in order.
    pub highest_delivered: i64,
    /// Highest sequence number seen from the member, delivered or not.
    pub highest_seen: i64,
}

impl Seqnos {
    /// Creates a watermark triple.
    #[must_use]
    pub const fn new(lowest_unseen: i64, highest_delivered: i64, highest_seen: i64) -> Self {
        Self {
            lowest_unseen,
            highest_delivered,
            highest_seen,
        }
    }

    /// Combines two observations of the same member. Delivery watermarks
    /// never regress; the garbage-collection floor takes the lower bound.
    #[must_use]
    pub fn combine(self, other: Self) -> Self {
        Self {
            lowest_unseen: self.lowest_unseen.min(other.lowest_unseen),
            highest_delivered: self.highest_delivered.max(other.highest_delivered),
            highest_seen: self.highest_seen.max(other.highest_seen),
        }
    }
}

/// How [`Digest::reconcile`] treats local entries for members absent from
/// the incoming digest. The caller always chooses; a silent default here
/// has historically hidden delivery bugs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VanishedPolicy {
    /// Keep the local entry so delivery state survives a re-merge.
    Retain,
    /// Drop the local entry with the member.
    Discard,
}

/// Per-member delivery bookkeeping accompanying a view.
///
/// A digest paired with a view must cover exactly that view's members, so a
/// joining or merging node can resume delivery without gaps or duplicate
/// acceptance. Entries iterate in address order, keeping every derived
/// computation deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Digest {
    entries: BTreeMap<Address, Seqnos>,
}

impl Digest {
    /// Creates an empty digest.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Adds a zero-initialized entry for a new member. Returns `false` when
    /// the member already had one; the existing entry is kept.
    pub fn insert_new(&mut self, member: Address) -> bool {
        match self.entries.entry(member) {
            std::collections::btree_map::Entry::Occupied(_) => false,
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(Seqnos::default());
                true
            }
        }
    }

    /// Sets a member's watermarks, replacing any existing entry.
    pub fn set(&mut self, member: Address, seqnos: Seqnos) {
        self.entries.insert(member, seqnos);
    }

    /// Watermarks recorded for the member.
    #[must_use]
    pub fn get(&self, member: &Address) -> Option<Seqnos> {
        self.entries.get(member).copied()
    }

    /// Returns `true` when the member has an entry.
    #[must_use]
    pub fn contains(&self, member: &Address) -> bool {
        self.entries.contains_key(member)
    }

    /// Drops the member's entry. Returns `true` when it existed.
    pub fn remove(&mut self, member: &Address) -> bool {
        self.entries.remove(member).is_some()
    }

    /// Number of members covered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when no members are covered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates covered members in address order.
    pub fn members(&self) -> impl Iterator<Item = &Address> {
        self.entries.keys()
    }

    /// Iterates entries in address order.
    pub fn entries(&self) -> impl Iterator<Item = (&Address, &Seqnos)> {
        self.entries.iter()
    }

    /// Verifies that this digest covers exactly the view's members, no
    /// more and no less. A mismatch makes the (view, digest) pairing
    /// unusable: installing it anyway risks message loss or duplication.
    pub fn covers_exactly(&self, view: &View) -> Result<(), GroupError> {
        let missing = view
            .members()
            .iter()
            .filter(|member| !self.contains(member))
            .count();
        let unexpected = self
            .entries
            .keys()
            .filter(|member| !view.contains(member))
            .count();
        if missing == 0 && unexpected == 0 {
            Ok(())
        } else {
            Err(GroupError::InconsistentDigestScope {
                missing,
                unexpected,
            })
        }
    }

    /// Reconciles the local digest with an incoming one during a view
    /// install. Members present in both keep the combined watermarks (never
    /// regressing), members only in the incoming digest are adopted
    /// verbatim, and members that vanished are retained or dropped per the
    /// caller-selected policy.
    pub fn reconcile(&mut self, incoming: &Self, policy: VanishedPolicy) {
        if policy == VanishedPolicy::Discard {
            self.entries.retain(|member, _| incoming.contains(member));
        }
        for (member, &seqnos) in &incoming.entries {
            self.entries
                .entry(member.clone())
                .and_modify(|existing| *existing = existing.combine(seqnos))
                .or_insert(seqnos);
        }
    }

    /// Folds several digests into one covering the union of their members,
    /// combining watermarks per member. Used by a merge leader over the
    /// collected sub-group digests.
    #[must_use]
    pub fn merge_all<'a>(digests: impl IntoIterator<Item = &'a Self>) -> Self {
        let mut merged = Self::new();
        for digest in digests {
            for (member, &seqnos) in &digest.entries {
                merged
                    .entries
                    .entry(member.clone())
                    .and_modify(|existing| *existing = existing.combine(seqnos))
                    .or_insert(seqnos);
            }
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::ViewId;
    use uuid::Uuid;

    fn addr(byte: u8) -> Address {
        Address::from_parts(Uuid::from_bytes([byte; 16]), None)
    }

    #[test]
    fn insert_new_is_idempotent() {
        let mut digest = Digest::new();
        assert!(digest.insert_new(addr(1)));
        digest.set(addr(1), Seqnos::new(0, 5, 7));
        assert!(!digest.insert_new(addr(1)));
        assert_eq!(digest.get(&addr(1)), Some(Seqnos::new(0, 5, 7)));
    }

    #[test]
    fn covers_exactly_detects_both_directions() {
        let view = View::new(ViewId::new(addr(1), 0), vec![addr(1), addr(2)]);
        let mut digest = Digest::new();
        digest.insert_new(addr(1));
        assert!(matches!(
            digest.covers_exactly(&view),
            Err(GroupError::InconsistentDigestScope {
                missing: 1,
                unexpected: 0
            })
        ));

        digest.insert_new(addr(2));
        digest.insert_new(addr(3));
        assert!(matches!(
            digest.covers_exactly(&view),
            Err(GroupError::InconsistentDigestScope {
                missing: 0,
                unexpected: 1
            })
        ));

        digest.remove(&addr(3));
        assert!(digest.covers_exactly(&view).is_ok());
    }

    #[test]
    fn reconcile_never_regresses_watermarks() {
        let mut local = Digest::new();
        local.set(addr(1), Seqnos::new(2, 10, 12));
        local.set(addr(2), Seqnos::new(0, 3, 3));

        let mut incoming = Digest::new();
        incoming.set(addr(1), Seqnos::new(1, 8, 15));
        incoming.set(addr(3), Seqnos::new(0, 1, 1));

        local.reconcile(&incoming, VanishedPolicy::Retain);
        assert_eq!(local.get(&addr(1)), Some(Seqnos::new(1, 10, 15)));
        assert_eq!(local.get(&addr(2)), Some(Seqnos::new(0, 3, 3)), "retained");
        assert_eq!(local.get(&addr(3)), Some(Seqnos::new(0, 1, 1)), "adopted");
    }

    #[test]
    fn reconcile_discard_drops_vanished_members() {
        let mut local = Digest::new();
        local.set(addr(1), Seqnos::new(0, 4, 4));
        local.set(addr(2), Seqnos::new(0, 9, 9));

        let mut incoming = Digest::new();
        incoming.set(addr(1), Seqnos::new(0, 5, 6));

        local.reconcile(&incoming, VanishedPolicy::Discard);
        assert_eq!(local.get(&addr(1)), Some(Seqnos::new(0, 5, 6)));
        assert!(!local.contains(&addr(2)));
    }

    #[test]
    fn merge_all_covers_the_union() {
        let mut left = Digest::new();
        left.set(addr(1), Seqnos::new(0, 7, 9));
        left.set(addr(2), Seqnos::new(0, 2, 2));

        let mut right = Digest::new();
        right.set(addr(2), Seqnos::new(0, 4, 4));
        right.set(addr(3), Seqnos::new(0, 1, 1));

        let merged = Digest::merge_all([&left, &right]);
        assert_eq!(merged.len(), 3);
        assert_eq!(merged.get(&addr(2)), Some(Seqnos::new(0, 4, 4)));
    }
}
