#![allow(missing_docs)]
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::{BTreeMap, BTreeSet};

use bytes::{Bytes, BytesMut};
use conclave_core::merge::{self, SubGroupState};
use conclave_core::{Address, Digest, Seqnos, VanishedPolicy, View, ViewId, elect_merge_leader, wire};
use proptest::prelude::*;
use proptest::sample::subsequence;
use uuid::Uuid;

fn pool() -> Vec<Address> {
    (1u8..=8)
        .map(|byte| Address::from_parts(Uuid::from_bytes([byte; 16]), None))
        .collect()
}

fn arb_members() -> impl Strategy<Value = Vec<Address>> {
    subsequence(pool(), 1..=5)
}

fn arb_seqnos() -> impl Strategy<Value = Seqnos> {
    (0..100i64, 0..1_000i64, 0..1_000i64)
        .prop_map(|(low, delivered, seen)| Seqnos::new(low, delivered, seen.max(delivered)))
}

fn arb_digest() -> impl Strategy<Value = Vec<(Address, Seqnos)>> {
    (arb_members(), proptest::collection::vec(arb_seqnos(), 5))
        .prop_map(|(members, seqnos)| members.into_iter().zip(seqnos).collect())
}

proptest! {
    #[test]
    fn leader_election_is_permutation_invariant(members in arb_members()) {
        let expected = members.iter().min().cloned().unwrap();
        let forward = elect_merge_leader(members.iter().cloned()).unwrap();
        let backward = elect_merge_leader(members.iter().rev().cloned()).unwrap();
        prop_assert_eq!(&forward, &expected);
        prop_assert_eq!(&backward, &expected);
    }

    #[test]
    fn merged_views_are_the_exact_union(groups in proptest::collection::vec(arb_members(), 1..=4), lamports in proptest::collection::vec(0..1_000i64, 4)) {
        let mut states = BTreeMap::new();
        for (group, lamport) in groups.into_iter().zip(lamports) {
            let coordinator = group[0].clone();
            let mut digest = Digest::new();
            for member in &group {
                digest.insert_new(member.clone());
            }
            let view = View::new(ViewId::new(coordinator.clone(), lamport), group);
            states.insert(coordinator, SubGroupState { view, digest });
        }
        let leader = states.keys().min().cloned().unwrap();
        let (view, digest) = merge::unify(&leader, &states).unwrap();

        let expected: BTreeSet<_> = states
            .values()
            .flat_map(|state| state.view.members().iter().cloned())
            .collect();
        let produced: BTreeSet<_> = view.members().iter().cloned().collect();
        prop_assert_eq!(produced.len(), view.members().len(), "no duplicates");
        prop_assert_eq!(produced, expected, "member set is the exact union");

        let max_lamport = states
            .values()
            .map(|state| state.view.id().lamport())
            .max()
            .unwrap();
        prop_assert_eq!(view.id().lamport(), max_lamport + 1);
        prop_assert_eq!(view.id().creator(), &leader);
        prop_assert!(digest.covers_exactly(&view).is_ok());
    }

    #[test]
    fn reconciliation_never_regresses_watermarks(
        local_entries in arb_digest(),
        incoming_entries in arb_digest(),
        retain in any::<bool>(),
    ) {
        let mut local = Digest::new();
        for (member, seqnos) in &local_entries {
            local.set(member.clone(), *seqnos);
        }
        let snapshot = local.clone();
        let mut incoming = Digest::new();
        for (member, seqnos) in &incoming_entries {
            incoming.set(member.clone(), *seqnos);
        }

        let policy = if retain { VanishedPolicy::Retain } else { VanishedPolicy::Discard };
        local.reconcile(&incoming, policy);

        for (member, incoming_seqnos) in incoming.entries() {
            let merged = local.get(member).unwrap();
            prop_assert!(merged.highest_delivered >= incoming_seqnos.highest_delivered);
            prop_assert!(merged.highest_seen >= incoming_seqnos.highest_seen);
            if let Some(previous) = snapshot.get(member) {
                prop_assert!(merged.highest_delivered >= previous.highest_delivered);
                prop_assert!(merged.highest_seen >= previous.highest_seen);
                prop_assert!(merged.lowest_unseen <= previous.lowest_unseen);
            }
        }
        for member in snapshot.members() {
            let kept = local.contains(member);
            if retain {
                prop_assert!(kept, "retain keeps vanished members");
            } else {
                prop_assert_eq!(kept, incoming.contains(member));
            }
        }
    }

    #[test]
    fn views_roundtrip_through_the_wire(
        members in subsequence(pool(), 0..=6),
        lamport in any::<i64>(),
        with_payload in any::<bool>(),
        merged in any::<bool>(),
    ) {
        let creator = if with_payload {
            Address::from_parts(Uuid::from_bytes([0xaa; 16]), Some(Bytes::from_static(b"blob")))
        } else {
            Address::from_parts(Uuid::from_bytes([0xaa; 16]), None)
        };
        let id = ViewId::new(creator.clone(), lamport);
        let view = if merged {
            View::merged(id, members, vec![ViewId::new(creator, lamport.saturating_sub(1))])
        } else {
            View::new(id, members)
        };

        let mut buf = BytesMut::new();
        wire::put_view(&mut buf, &view);
        let decoded = wire::get_view(&mut buf.freeze()).unwrap();
        prop_assert_eq!(decoded.id(), view.id());
        prop_assert_eq!(decoded.members(), view.members());
        prop_assert_eq!(decoded.subviews(), view.subviews());
        prop_assert_eq!(decoded.id().creator().payload(), view.id().creator().payload());
    }
}
