//! Exactly-once crediting across independent store handles.
//!
//! Each worker thread opens its own connection to the same database file,
//! so serialization comes from the database write lock and not from the
//! in-process connection mutex.

use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use refcontest_core::{SqliteStore, UserId};

const REFERRER: UserId = 1;

fn seed(store: &SqliteStore, invitees: std::ops::RangeInclusive<UserId>) {
    store.register_or_touch(REFERRER, "ref", "Referrer", None).unwrap();
    for id in invitees {
        store.register_or_touch(id, "", "", Some(REFERRER)).unwrap();
        assert!(store.record_referral(id, REFERRER).unwrap());
        store.set_verified(id, true).unwrap();
    }
}

#[test]
fn concurrent_credit_attempts_credit_once_per_invitee() {
    const WORKERS: usize = 6;
    const INVITEES: UserId = 20;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("contest.db");
    seed(&SqliteStore::open(&path).unwrap(), 2..=INVITEES + 1);

    let barrier = Arc::new(Barrier::new(WORKERS));
    let handles: Vec<_> = (0..WORKERS)
        .map(|_| {
            let path = path.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let store = SqliteStore::open_with_timeout(&path, Duration::from_secs(30)).unwrap();
                barrier.wait();
                (2..=INVITEES + 1)
                    .filter_map(|id| store.credit_if_eligible(id).unwrap())
                    .count()
            })
        })
        .collect();

    let wins: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(wins, INVITEES as usize);

    let store = SqliteStore::open(&path).unwrap();
    let stats = store.stats_for_user(REFERRER).unwrap();
    assert_eq!(stats.total_invited, INVITEES as u64);
    assert_eq!(stats.score, INVITEES as u64);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_async_attempts_on_one_invitee() {
    let store = SqliteStore::in_memory().unwrap();
    seed(&store, 2..=2);

    let attempts: Vec<_> = (0..16)
        .map(|_| {
            let store = store.clone();
            tokio::spawn(async move { store.run_blocking(|s| s.credit_if_eligible(2)).await })
        })
        .collect();

    let mut credited = Vec::new();
    for attempt in attempts {
        if let Some(referrer) = attempt.await.unwrap().unwrap() {
            credited.push(referrer);
        }
    }
    assert_eq!(credited, [REFERRER]);
    assert_eq!(store.stats_for_user(REFERRER).unwrap().score, 1);
}

#[test]
fn stats_scenario_referrer_and_one_invitee() {
    let store = SqliteStore::in_memory().unwrap();
    store.register_or_touch(1, "", "One", None).unwrap();
    store.register_or_touch(2, "", "Two", Some(1)).unwrap();
    store.record_referral(2, 1).unwrap();
    store.set_verified(2, true).unwrap();

    assert_eq!(store.credit_if_eligible(2).unwrap(), Some(1));
    let stats = store.stats_for_user(1).unwrap();
    assert_eq!(
        (stats.total_invited, stats.credited_invited, stats.score),
        (1, 1, 1)
    );

    assert_eq!(store.credit_if_eligible(2).unwrap(), None);
    assert_eq!(store.stats_for_user(1).unwrap(), stats);
}

#[test]
fn unverifying_does_not_revoke_a_credit() {
    let store = SqliteStore::in_memory().unwrap();
    seed(&store, 2..=2);
    assert_eq!(store.credit_if_eligible(2).unwrap(), Some(REFERRER));

    store.set_verified(2, false).unwrap();
    assert!(store.user(2).unwrap().unwrap().verified_at_ns.is_none());
    assert!(store.referral(2).unwrap().unwrap().credited);

    store.set_verified(2, true).unwrap();
    assert_eq!(store.credit_if_eligible(2).unwrap(), None);
    assert_eq!(store.stats_for_user(REFERRER).unwrap().score, 1);
}

#[test]
fn first_referrer_wins_across_calls() {
    let store = SqliteStore::in_memory().unwrap();
    store.register_or_touch(10, "", "", Some(7)).unwrap();
    store.record_referral(10, 7).unwrap();

    store.register_or_touch(10, "", "renamed", Some(8)).unwrap();
    assert!(!store.record_referral(10, 8).unwrap());
    assert!(!store.record_referral(10, 7).unwrap());

    let user = store.user(10).unwrap().unwrap();
    assert_eq!(user.referrer_id, Some(7));
    assert_eq!(user.display_name, "renamed");
    assert_eq!(store.referral(10).unwrap().unwrap().referrer_id, 7);
}
