//! Property tests for the ranking engine.

use proptest::prelude::*;
use refcontest_core::{SqliteStore, UserId};

/// Builds a store where referrer `i + 1` has `scores[i]` credited invitees.
/// Invitee ids start at 10 000 and carry no score of their own.
fn store_with_scores(scores: &[u8]) -> SqliteStore {
    let store = SqliteStore::in_memory().unwrap();
    let mut next_invitee: UserId = 10_000;
    for (i, &score) in scores.iter().enumerate() {
        let referrer = i as UserId + 1;
        store.register_or_touch(referrer, "", "", None).unwrap();
        for _ in 0..score {
            store
                .register_or_touch(next_invitee, "", "", Some(referrer))
                .unwrap();
            store.record_referral(next_invitee, referrer).unwrap();
            store.set_verified(next_invitee, true).unwrap();
            store.credit_if_eligible(next_invitee).unwrap();
            next_invitee += 1;
        }
    }
    store
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn higher_score_never_ranks_below(scores in prop::collection::vec(0u8..6, 1..8)) {
        let store = store_with_scores(&scores);
        let ranks: Vec<u64> = (1..=scores.len())
            .map(|id| store.rank(id as UserId).unwrap().unwrap())
            .collect();

        for a in 0..scores.len() {
            for b in 0..scores.len() {
                if scores[a] > scores[b] {
                    prop_assert!(ranks[a] < ranks[b]);
                }
                if scores[a] == scores[b] {
                    prop_assert_eq!(ranks[a], ranks[b]);
                }
            }
        }
    }

    #[test]
    fn ranks_are_dense(scores in prop::collection::vec(0u8..6, 1..8)) {
        let store = store_with_scores(&scores);

        // Invitees score 0, so 0 is a distinct score whenever any exist.
        let mut distinct: Vec<u8> = scores.clone();
        if scores.iter().any(|&s| s > 0) {
            distinct.push(0);
        }
        distinct.sort_unstable();
        distinct.dedup();

        for (i, &score) in scores.iter().enumerate() {
            let above = distinct.iter().filter(|&&s| s > score).count() as u64;
            prop_assert_eq!(store.rank(i as UserId + 1).unwrap(), Some(above + 1));
        }
    }

    #[test]
    fn top_listing_is_sorted_by_score(scores in prop::collection::vec(0u8..6, 1..8)) {
        let store = store_with_scores(&scores);
        let top = store.top(u32::MAX).unwrap();
        prop_assert!(top.windows(2).all(|w| w[0].score >= w[1].score));
        prop_assert_eq!(
            store.top_score().unwrap(),
            u64::from(*scores.iter().max().unwrap())
        );
    }
}
