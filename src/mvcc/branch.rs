//! Chain branch selection.
//!
//! When neither in-place slot is visible, the reader must decide which of
//! the two locator offsets to start the chain walk from. The decision is a
//! pure function of the locator words and the snapshot, kept apart from the
//! walk so it can be tested on its own.
//!
//! | left | right | snapshot sees `xid_bound` | result            |
//! |------|-------|---------------------------|-------------------|
//! | 0    | 0     | -                         | `None`            |
//! | -    | -     | yes                       | `None`            |
//! | > 0  | 0     | no                        | `Left`            |
//! | 0    | > 0   | no                        | `Right`           |
//! | > 0  | > 0   | no                        | larger offset     |
//!
//! A snapshot that sees `xid_bound` finds its version in place or nowhere,
//! so it never walks. `xid_bound` equal to the snapshot horizon counts as
//! not seen.

use super::slot::Side;
use crate::txn::{Snapshot, TxnId};

pub fn choose_branch(
    left_offset: u64,
    right_offset: u64,
    xid_bound: TxnId,
    snapshot: &Snapshot<'_>,
) -> Option<Side> {
    if !snapshot.is_mvcc() || (left_offset == 0 && right_offset == 0) {
        return None;
    }
    if xid_bound < snapshot.horizon() && snapshot.sees_xid(xid_bound) {
        return None;
    }
    if left_offset >= right_offset {
        Some(Side::Left)
    } else {
        Some(Side::Right)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::txn::snapshot::tests::ScriptedOracle;
    use crate::txn::{SnapshotKind, TxnState};
    use proptest::prelude::*;
    use smallvec::SmallVec;

    fn snapshot(oracle: &ScriptedOracle, kind: SnapshotKind, horizon: TxnId) -> Snapshot<'_> {
        Snapshot::new(kind, 100, 0, horizon, horizon, SmallVec::new(), oracle)
    }

    #[test]
    fn no_offsets_means_no_walk() {
        let oracle = ScriptedOracle::with(&[(5, TxnState::Committed)]);
        let snap = snapshot(&oracle, SnapshotKind::Mvcc, 4);
        assert_eq!(choose_branch(0, 0, 5, &snap), None);
    }

    #[test]
    fn single_offset_wins() {
        let oracle = ScriptedOracle::with(&[(5, TxnState::Committed)]);
        let snap = snapshot(&oracle, SnapshotKind::Mvcc, 4);
        assert_eq!(choose_branch(70, 0, 5, &snap), Some(Side::Left));
        assert_eq!(choose_branch(0, 70, 5, &snap), Some(Side::Right));
    }

    #[test]
    fn newest_offset_wins_when_both_set() {
        let oracle = ScriptedOracle::with(&[(5, TxnState::Committed)]);
        let snap = snapshot(&oracle, SnapshotKind::Mvcc, 4);
        assert_eq!(choose_branch(70, 90, 5, &snap), Some(Side::Right));
        assert_eq!(choose_branch(90, 70, 5, &snap), Some(Side::Left));
    }

    #[test]
    fn seen_bound_stays_in_place() {
        let oracle = ScriptedOracle::with(&[(5, TxnState::Committed)]);
        let snap = snapshot(&oracle, SnapshotKind::Mvcc, 10);
        assert_eq!(choose_branch(70, 90, 5, &snap), None);
    }

    #[test]
    fn bound_at_horizon_walks() {
        let oracle = ScriptedOracle::with(&[(10, TxnState::Committed)]);
        let snap = snapshot(&oracle, SnapshotKind::Mvcc, 10);
        assert_eq!(choose_branch(70, 0, 10, &snap), Some(Side::Left));
    }

    #[test]
    fn non_mvcc_snapshots_never_walk() {
        let oracle = ScriptedOracle::default();
        for kind in [SnapshotKind::Dirty, SnapshotKind::Any] {
            let snap = snapshot(&oracle, kind, 4);
            assert_eq!(choose_branch(70, 90, 5, &snap), None);
        }
    }

    proptest! {
        #[test]
        fn choice_is_deterministic_and_names_a_nonzero_offset(
            left in 0u64..1 << 24,
            right in 0u64..1 << 24,
            bound in 2u64..64,
            horizon in 2u64..64,
            committed in any::<bool>(),
        ) {
            let state = if committed { TxnState::Committed } else { TxnState::Active };
            let oracle = ScriptedOracle::with(&[(bound, state)]);
            let snap = snapshot(&oracle, SnapshotKind::Mvcc, horizon);

            let first = choose_branch(left, right, bound, &snap);
            prop_assert_eq!(first, choose_branch(left, right, bound, &snap));
            match first {
                Some(side) => {
                    let picked = if side == Side::Left { left } else { right };
                    prop_assert!(picked != 0);
                    prop_assert_eq!(picked, left.max(right));
                    prop_assert!(!(committed && bound < horizon));
                }
                None => prop_assert!((left == 0 && right == 0) || (committed && bound < horizon)),
            }
        }
    }
}
