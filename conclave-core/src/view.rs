use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::address::Address;

/// Identifier totally ordering view instances: the authoring node plus a
/// Lamport timestamp.
///
/// Ids compare by `lamport` first, ties broken by creator address, so every
/// node derives the same order over concurrently announced views. A node
/// that has not installed any view yet holds `Option<ViewId>::None`, which
/// orders below every real id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ViewId {
    creator: Address,
    lamport: i64,
}

impl ViewId {
    /// Creates an id from its creator and Lamport timestamp.
    #[must_use]
    pub const fn new(creator: Address, lamport: i64) -> Self {
        Self { creator, lamport }
    }

    /// Node that authored the view.
    #[must_use]
    pub const fn creator(&self) -> &Address {
        &self.creator
    }

    /// Lamport timestamp of the view.
    #[must_use]
    pub const fn lamport(&self) -> i64 {
        self.lamport
    }

    /// Id a creator assigns to the view succeeding this one.
    #[must_use]
    pub fn next(&self, creator: Address) -> Self {
        Self::new(creator, self.lamport + 1)
    }
}

impl PartialOrd for ViewId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ViewId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.lamport
            .cmp(&other.lamport)
            .then_with(|| self.creator.cmp(&other.creator))
    }
}

impl fmt::Display for ViewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}|{}]", self.creator, self.lamport)
    }
}

/// Discriminates regular membership changes from partition-merge results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewKind {
    /// View issued by a coordinator for a join, leave, or exclusion.
    Plain,
    /// Result of collapsing overlapping sub-group views after a partition
    /// healed; records which sub-views were merged so receivers can
    /// validate the merge and reconcile their digests.
    Merge {
        /// Ids of the constituent sub-views, in merge order.
        subviews: Vec<ViewId>,
    },
}

/// Immutable snapshot of group membership.
///
/// The member list is ordered: the first member is the coordinator and the
/// second takes over if the coordinator disappears. Once installed on a
/// node, a view is the sole authoritative description of the group until
/// replaced wholesale; there is no in-place mutation, callers needing a
/// different membership construct a new view.
#[derive(Debug, Clone)]
pub struct View {
    id: ViewId,
    members: Vec<Address>,
    kind: ViewKind,
}

impl View {
    /// Creates a plain view from its id and ordered member list.
    #[must_use]
    pub const fn new(id: ViewId, members: Vec<Address>) -> Self {
        Self {
            id,
            members,
            kind: ViewKind::Plain,
        }
    }

    /// Creates a merge-result view recording its constituent sub-views.
    #[must_use]
    pub const fn merged(id: ViewId, members: Vec<Address>, subviews: Vec<ViewId>) -> Self {
        Self {
            id,
            members,
            kind: ViewKind::Merge { subviews },
        }
    }

    /// Id uniquely identifying this view.
    #[must_use]
    pub const fn id(&self) -> &ViewId {
        &self.id
    }

    /// Read-only ordered member list.
    #[must_use]
    pub fn members(&self) -> &[Address] {
        &self.members
    }

    /// Current coordinator: the first member, if any.
    #[must_use]
    pub fn coordinator(&self) -> Option<&Address> {
        self.members.first()
    }

    /// Returns `true` when the view contains the member.
    #[must_use]
    pub fn contains(&self, member: &Address) -> bool {
        self.members.contains(member)
    }

    /// Number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Returns `true` for the (transient) empty view.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Plain or merge-result discriminant.
    #[must_use]
    pub const fn kind(&self) -> &ViewKind {
        &self.kind
    }

    /// Returns `true` when this view is the result of a merge.
    #[must_use]
    pub const fn is_merge(&self) -> bool {
        matches!(self.kind, ViewKind::Merge { .. })
    }

    /// Ids of the merged sub-views; empty for a plain view.
    #[must_use]
    pub fn subviews(&self) -> &[ViewId] {
        match &self.kind {
            ViewKind::Plain => &[],
            ViewKind::Merge { subviews } => subviews,
        }
    }
}

/// Views are equal iff their ids are equal: a creator never reissues an id
/// with a different member list, so the list needs no re-checking.
impl PartialEq for View {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for View {}

impl Hash for View {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (", self.id)?;
        for (idx, member) in self.members.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{member}")?;
        }
        write!(f, ")")
    }
}

impl<'a> IntoIterator for &'a View {
    type Item = &'a Address;
    type IntoIter = std::slice::Iter<'a, Address>;

    fn into_iter(self) -> Self::IntoIter {
        self.members.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(byte: u8) -> Address {
        Address::from_parts(uuid::Uuid::from_bytes([byte; 16]), None)
    }

    #[test]
    fn ids_order_by_lamport_then_creator() {
        let low = ViewId::new(addr(9), 1);
        let high = ViewId::new(addr(1), 2);
        assert!(low < high, "lamport dominates creator order");

        let left = ViewId::new(addr(1), 5);
        let right = ViewId::new(addr(2), 5);
        assert!(left < right, "creator breaks lamport ties");
    }

    #[test]
    fn none_orders_below_any_real_id() {
        let id = Some(ViewId::new(addr(0), i64::MIN));
        assert!(None < id);
    }

    #[test]
    fn first_member_is_coordinator() {
        let members = vec![addr(3), addr(1), addr(2)];
        let view = View::new(ViewId::new(addr(3), 0), members);
        assert_eq!(view.coordinator(), Some(&addr(3)));
        assert!(view.contains(&addr(2)));
        assert!(!view.contains(&addr(7)));
        assert_eq!(view.len(), 3);
    }

    #[test]
    fn equality_is_by_id() {
        let id = ViewId::new(addr(1), 4);
        let a = View::new(id.clone(), vec![addr(1), addr(2)]);
        let b = View::new(id, vec![addr(1), addr(2)]);
        assert_eq!(a, b);
        assert_ne!(a, View::new(ViewId::new(addr(1), 5), vec![addr(1), addr(2)]));
    }

    #[test]
    fn merge_views_record_their_subviews() {
        let sub_a = ViewId::new(addr(1), 0);
        let sub_b = ViewId::new(addr(2), 10);
        let view = View::merged(
            ViewId::new(addr(1), 11),
            vec![addr(1), addr(2)],
            vec![sub_a.clone(), sub_b.clone()],
        );
        assert!(view.is_merge());
        assert_eq!(view.subviews(), &[sub_a, sub_b]);

        let plain = View::new(ViewId::new(addr(1), 0), vec![addr(1)]);
        assert!(!plain.is_merge());
        assert!(plain.subviews().is_empty());
    }
}
