//! # refcontest-core
//!
//! Referral attribution, crediting, and leaderboard engine for invite
//! contests run on a chat platform.
//!
//! Users arrive through personal invite links. The first referrer attached
//! to a user is final. A referrer earns one point per invitee, once, and
//! only after the invitee has joined every required channel. Rankings are
//! derived on demand from the credited referral rows.
//!
//! ## Components
//!
//! - [`store`]: `SQLite` store shared by every ledger
//! - [`identity`]: user records and first-referrer-wins linkage
//! - [`referral`]: referral rows and exactly-once crediting
//! - [`ranking`]: top-N listing, dense rank, and standing
//! - [`contest`]: contest lifecycle, resets, and the admin set
//! - [`settings`]: key/value settings and the ad footer cache
//! - [`catalog`]: prizes and required channels
//! - [`verifier`]: bounded-concurrency subscription check
//! - [`broadcast`]: paced fan-out of one message to every user
//! - [`service`]: gated entry points for a chat front door
//!
//! ## Example
//!
//! ```rust
//! use refcontest_core::SqliteStore;
//!
//! let store = SqliteStore::in_memory()?;
//! store.register_or_touch(1, "alice", "Alice", None)?;
//! store.register_or_touch(2, "bob", "Bob", Some(1))?;
//! store.record_referral(2, 1)?;
//!
//! // Nothing is credited until the invitee is verified.
//! assert_eq!(store.credit_if_eligible(2)?, None);
//! store.set_verified(2, true)?;
//! assert_eq!(store.credit_if_eligible(2)?, Some(1));
//! assert_eq!(store.credit_if_eligible(2)?, None);
//!
//! assert_eq!(store.stats_for_user(1)?.score, 1);
//! assert_eq!(store.rank(1)?, Some(1));
//! # Ok::<(), refcontest_core::StoreError>(())
//! ```

pub mod broadcast;
pub mod catalog;
pub mod config;
pub mod contest;
pub mod identity;
pub mod ranking;
pub mod referral;
pub mod service;
pub mod settings;
pub mod stats;
pub mod store;
pub mod verifier;

pub use broadcast::{
    BroadcastDispatcher, BroadcastReport, BroadcastSource, DeliveryError, MessageRef, Messenger,
};
pub use catalog::Prize;
pub use config::{ConfigError, ContestConfig};
pub use contest::{AdminError, AdminRegistry, ContestState, FinishOptions, ResetOptions};
pub use identity::{User, parse_referral_code, referral_link};
pub use ranking::{LeaderboardEntry, Standing, StandingTier};
pub use referral::{Referral, ReferralStats};
pub use service::{Confirmation, ContestService, MyStats, Registration, ServiceError};
pub use settings::{AdButton, AdFooterCache, SettingKey, merge_with_ad};
pub use stats::AdminStats;
pub use store::{SqliteStore, StoreError, UserId};
pub use verifier::{
    MembershipError, MembershipProvider, MembershipStatus, SubscriptionCheck,
    SubscriptionVerifier,
};
