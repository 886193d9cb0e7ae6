//! End-to-end contest flows through [`ContestService`].
//!
//! The chat platform is replaced by in-test membership and delivery fakes.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use refcontest_core::{
    BroadcastReport, BroadcastSource, Confirmation, ContestConfig, ContestService, ContestState,
    DeliveryError, FinishOptions, MembershipError, MembershipProvider, MembershipStatus,
    MessageRef, Messenger, ServiceError, SqliteStore, UserId,
};

const ADMIN: UserId = 900;

/// Member of `@a`, error on `@b`, member of everything else.
struct PlatformChannels;

#[async_trait]
impl MembershipProvider for PlatformChannels {
    async fn membership_status(
        &self,
        channel: &str,
        _user_id: UserId,
    ) -> Result<MembershipStatus, MembershipError> {
        match channel {
            "@b" => Err(MembershipError::Query("Bad Request: member list is inaccessible".into())),
            _ => Ok(MembershipStatus::Member),
        }
    }
}

/// Delivers to everyone except `blocked`.
#[derive(Default)]
struct Platform {
    blocked: HashSet<UserId>,
    delivered: AtomicU64,
}

#[async_trait]
impl Messenger for Platform {
    async fn send_message(&self, user_id: UserId, _text: &str) -> Result<(), DeliveryError> {
        if self.blocked.contains(&user_id) {
            return Err(DeliveryError::Blocked);
        }
        self.delivered.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn copy_message(
        &self,
        user_id: UserId,
        _source: &MessageRef,
        _caption: Option<&str>,
    ) -> Result<(), DeliveryError> {
        self.send_message(user_id, "").await
    }
}

fn config() -> ContestConfig {
    let mut config = ContestConfig::from_toml(
        r#"
        bot_username = "@contest_bot"

        [broadcast]
        batch_size = 25
        batch_pause_ms = 1
        "#,
    )
    .unwrap();
    config.merge_admin_ids(&ADMIN.to_string());
    config
}

fn service(messenger: Arc<Platform>) -> ContestService {
    ContestService::new(
        &config(),
        SqliteStore::in_memory().unwrap(),
        Arc::new(PlatformChannels),
        messenger,
    )
}

#[tokio::test]
async fn failing_channel_query_is_reported_missing() {
    let svc = service(Arc::new(Platform::default()));
    svc.add_channel(ADMIN, "@a").await.unwrap();
    svc.add_channel(ADMIN, "@b").await.unwrap();
    svc.register(5, "", "", None).await.unwrap();

    let check = svc.check_subscriptions(5).await.unwrap();
    assert!(!check.all_satisfied());
    assert_eq!(check.missing, ["@b"]);
}

#[tokio::test]
async fn no_channels_means_verified_on_confirm() {
    let svc = service(Arc::new(Platform::default()));
    svc.register(1, "", "", None).await.unwrap();
    svc.register(2, "", "", Some("ref1")).await.unwrap();

    let check = svc.check_subscriptions(2).await.unwrap();
    assert!(check.all_satisfied());

    let confirmation = svc.confirm_subscription(2).await.unwrap();
    assert!(matches!(
        confirmation,
        Confirmation::Verified {
            newly_verified: true,
            credited: Some((1, _)),
            ..
        }
    ));
}

#[tokio::test]
async fn stopped_contest_gates_every_user_entry_point() {
    let svc = service(Arc::new(Platform::default()));
    svc.register(3, "", "", None).await.unwrap();
    svc.set_contest_state(ADMIN, ContestState::Stopped)
        .await
        .unwrap();

    assert!(matches!(
        svc.register(4, "", "", Some("3")).await,
        Err(ServiceError::ContestClosed)
    ));
    assert!(matches!(
        svc.confirm_subscription(3).await,
        Err(ServiceError::ContestClosed)
    ));
    assert!(matches!(svc.my_stats(3).await, Err(ServiceError::ContestClosed)));
    assert!(matches!(svc.leaderboard(3).await, Err(ServiceError::ContestClosed)));
    assert!(svc.store().user(4).unwrap().is_none());
    assert!(!svc.store().is_verified(3).unwrap());

    // The same operations run for an admin.
    svc.register(ADMIN, "", "", None).await.unwrap();
    svc.confirm_subscription(ADMIN).await.unwrap();
    assert!(svc.store().is_verified(ADMIN).unwrap());
    assert_eq!(svc.leaderboard(ADMIN).await.unwrap().len(), 2);

    svc.set_contest_state(ADMIN, ContestState::Active)
        .await
        .unwrap();
    svc.register(4, "", "", Some("3")).await.unwrap();
}

#[tokio::test]
async fn finish_purges_participants_and_keeps_prizes_and_configured_admins() {
    let svc = service(Arc::new(Platform::default()));
    svc.add_prize(ADMIN, 1, "Phone", "").await.unwrap();
    svc.register(1, "", "", None).await.unwrap();
    svc.register(2, "", "", Some("1")).await.unwrap();
    svc.confirm_subscription(2).await.unwrap();
    assert_eq!(svc.leaderboard(1).await.unwrap()[0].score, 1);

    svc.finish_contest(ADMIN, FinishOptions::default())
        .await
        .unwrap();

    let store = svc.store();
    assert!(!store.is_active().unwrap());
    assert_eq!(store.user_count().unwrap(), 0);
    assert!(store.referral(2).unwrap().is_none());
    assert!(store.top(10).unwrap().is_empty());
    assert_eq!(store.prizes().unwrap().len(), 1);
    assert!(svc.admins().is_admin(ADMIN).unwrap());
}

#[tokio::test]
async fn broadcast_isolates_blocked_recipients() {
    let platform = Arc::new(Platform {
        blocked: [2, 30].into_iter().collect(),
        ..Platform::default()
    });
    let svc = service(Arc::clone(&platform));
    for id in 1..=60 {
        svc.register(id, "", "", None).await.unwrap();
    }

    let report = svc
        .broadcast(ADMIN, &BroadcastSource::Text("Results soon".into()), "Heads up")
        .await
        .unwrap();
    assert_eq!(report, BroadcastReport { sent: 58, failed: 2 });
    assert_eq!(platform.delivered.load(Ordering::SeqCst), 58);

    assert!(matches!(
        svc.broadcast(1, &BroadcastSource::Text("x".into()), "").await,
        Err(ServiceError::NotAdmin(1))
    ));
}

#[tokio::test]
async fn broadcast_ignores_contest_state() {
    let platform = Arc::new(Platform::default());
    let svc = service(Arc::clone(&platform));
    svc.register(1, "", "", None).await.unwrap();
    svc.set_contest_state(ADMIN, ContestState::Stopped)
        .await
        .unwrap();

    let report = svc
        .broadcast(ADMIN, &BroadcastSource::Text("Closed".into()), "")
        .await
        .unwrap();
    assert_eq!(report.sent, 1);
}
