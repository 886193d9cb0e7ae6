//! User- and admin-facing entry points.
//!
//! [`ContestService`] is what a chat front door calls. Every user-facing
//! method passes the contest gate first; admin methods check the admin set
//! instead and ignore the contest state. Store calls run on the blocking
//! pool so the service can be shared across async tasks.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use crate::broadcast::{BroadcastDispatcher, BroadcastReport, BroadcastSource, Messenger};
use crate::catalog::Prize;
use crate::config::ContestConfig;
use crate::contest::{AdminError, AdminRegistry, ContestState, FinishOptions, ResetOptions};
use crate::identity::{parse_referral_code, referral_link};
use crate::ranking::{LeaderboardEntry, Standing};
use crate::referral::ReferralStats;
use crate::settings::{AdButton, AdFooterCache};
use crate::stats::AdminStats;
use crate::store::{SqliteStore, StoreError, UserId};
use crate::verifier::{MembershipProvider, SubscriptionCheck, SubscriptionVerifier};

/// Length of the user-facing leaderboard.
pub const LEADERBOARD_SIZE: u32 = 10;

/// Errors surfaced to the front door.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ServiceError {
    /// The contest is stopped and the caller is not an admin.
    #[error("contest is closed")]
    ContestClosed,

    /// An admin-only operation was called by a non-admin.
    #[error("user {0} is not an admin")]
    NotAdmin(UserId),

    /// The user has never been seen.
    #[error("user {0} is not registered")]
    NotRegistered(UserId),

    /// Admin set maintenance failed.
    #[error(transparent)]
    Admin(#[from] AdminError),

    /// Storage failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ServiceError {
    /// Text safe to show the end user. Storage failures never leak detail.
    #[must_use]
    pub const fn user_message(&self) -> &'static str {
        match self {
            Self::ContestClosed => "The contest is closed at the moment.",
            Self::NotAdmin(_) => "This command is only available to administrators.",
            Self::NotRegistered(_) => "Press /start first.",
            Self::Admin(AdminError::StaticAdmin(_)) => {
                "This admin is set in the configuration and cannot be removed."
            },
            Self::Admin(_) | Self::Store(_) => "Something went wrong. Please try again later.",
        }
    }
}

/// Outcome of a first contact or re-contact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    /// The referrer linked to the user after this call, if any.
    pub referrer_id: Option<UserId>,
    /// Whether this call created the referral record.
    pub referral_recorded: bool,
}

/// Outcome of a "confirm my subscription" action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Confirmation {
    /// Some required channels are not satisfied; nothing changed.
    Missing(Vec<String>),
    /// Every channel is satisfied.
    Verified {
        /// Whether the user became verified during this call.
        newly_verified: bool,
        /// The referrer credited by this call, with its fresh standing.
        credited: Option<(UserId, Standing)>,
        /// The user's own invite link.
        link: String,
    },
}

/// A user's personal results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MyStats {
    /// Invite counts and score.
    pub stats: ReferralStats,
    /// Dense rank by score.
    pub rank: Option<u64>,
    /// The user's own invite link.
    pub link: String,
}

/// Contest front door over one store.
pub struct ContestService {
    store: SqliteStore,
    admins: AdminRegistry,
    ads: Arc<AdFooterCache>,
    verifier: SubscriptionVerifier,
    dispatcher: BroadcastDispatcher,
    bot_username: String,
}

impl std::fmt::Debug for ContestService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContestService")
            .field("store", &self.store)
            .field("bot_username", &self.bot_username)
            .field("verifier", &self.verifier)
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}

impl ContestService {
    /// Builds a service from configuration and the two platform
    /// collaborators.
    #[must_use]
    pub fn new(
        config: &ContestConfig,
        store: SqliteStore,
        provider: Arc<dyn MembershipProvider>,
        messenger: Arc<dyn Messenger>,
    ) -> Self {
        let verifier = SubscriptionVerifier::new(provider)
            .with_max_in_flight(config.verifier.max_in_flight)
            .with_query_timeout(config.verifier.query_timeout());
        let dispatcher = BroadcastDispatcher::new(messenger)
            .with_batch_size(config.broadcast.batch_size)
            .with_batch_pause(config.broadcast.batch_pause())
            .with_send_timeout(config.broadcast.send_timeout());

        Self {
            admins: AdminRegistry::new(store.clone(), config.static_admins()),
            ads: Arc::new(AdFooterCache::new(config.ads.cache_ttl())),
            store,
            verifier,
            dispatcher,
            bot_username: config.bot_username.clone(),
        }
    }

    /// The underlying store.
    #[must_use]
    pub const fn store(&self) -> &SqliteStore {
        &self.store
    }

    /// The admin set.
    #[must_use]
    pub const fn admins(&self) -> &AdminRegistry {
        &self.admins
    }

    /// Invite link for `user_id`.
    #[must_use]
    pub fn link_for(&self, user_id: UserId) -> String {
        referral_link(&self.bot_username, user_id)
    }

    /// Lets admins through always and everyone else only while the contest
    /// is active. The flag is read from the store on every call.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::ContestClosed`] for a non-admin while the
    /// contest is stopped.
    pub async fn gate(&self, user_id: UserId) -> Result<(), ServiceError> {
        let admins = self.admins.clone();
        let allowed = self
            .store
            .run_blocking(move |store| Ok(store.is_active()? || admins.is_admin(user_id)?))
            .await?;
        if allowed {
            Ok(())
        } else {
            debug!(user_id, "rejected by contest gate");
            Err(ServiceError::ContestClosed)
        }
    }

    async fn require_admin(&self, user_id: UserId) -> Result<(), ServiceError> {
        let admins = self.admins.clone();
        let is_admin = self
            .store
            .run_blocking(move |_| admins.is_admin(user_id))
            .await?;
        if is_admin {
            Ok(())
        } else {
            Err(ServiceError::NotAdmin(user_id))
        }
    }

    /// Handles a user's first or repeated contact.
    ///
    /// `start_payload` is the argument of the start command. When it names
    /// another user, that user becomes the referrer unless one was already
    /// attached, and the referral is recorded once.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::ContestClosed`] or a storage error.
    pub async fn register(
        &self,
        user_id: UserId,
        handle: &str,
        display_name: &str,
        start_payload: Option<&str>,
    ) -> Result<Registration, ServiceError> {
        self.gate(user_id).await?;

        let offered = start_payload.and_then(parse_referral_code);
        let handle = handle.to_string();
        let display_name = display_name.to_string();
        let registration = self
            .store
            .run_blocking(move |store| {
                store.register_or_touch(user_id, &handle, &display_name, offered)?;
                let referrer_id = store.user(user_id)?.and_then(|u| u.referrer_id);
                let referral_recorded = match referrer_id {
                    Some(referrer) if offered.is_some() => {
                        store.record_referral(user_id, referrer)?
                    },
                    _ => false,
                };
                Ok(Registration {
                    referrer_id,
                    referral_recorded,
                })
            })
            .await?;
        Ok(registration)
    }

    /// Checks the user against the current channel list.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::ContestClosed`] or a storage error. Membership
    /// query failures are reported as missing channels, never as errors.
    pub async fn check_subscriptions(
        &self,
        user_id: UserId,
    ) -> Result<SubscriptionCheck, ServiceError> {
        self.gate(user_id).await?;
        self.check_channels(user_id).await
    }

    async fn check_channels(&self, user_id: UserId) -> Result<SubscriptionCheck, ServiceError> {
        let channels = self.store.run_blocking(SqliteStore::channels).await?;
        Ok(self.verifier.check(user_id, &channels).await)
    }

    /// Verifies the user and credits their referrer.
    ///
    /// A user is marked verified only the first time every channel is
    /// satisfied; only that transition may credit a referrer.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::ContestClosed`] or a storage error.
    pub async fn confirm_subscription(
        &self,
        user_id: UserId,
    ) -> Result<Confirmation, ServiceError> {
        self.gate(user_id).await?;

        let check = self.check_channels(user_id).await?;
        if !check.all_satisfied() {
            return Ok(Confirmation::Missing(check.missing));
        }

        let (newly_verified, credited) = self
            .store
            .run_blocking(move |store| {
                if store.is_verified(user_id)? {
                    return Ok((false, None));
                }
                store.set_verified(user_id, true)?;
                let credited = match store.credit_if_eligible(user_id)? {
                    Some(referrer) => Some((referrer, store.standing(referrer)?)),
                    None => None,
                };
                Ok((true, credited))
            })
            .await?;

        if newly_verified {
            info!(user_id, referrer = ?credited.as_ref().map(|(r, _)| *r), "user verified");
        }
        Ok(Confirmation::Verified {
            newly_verified,
            credited,
            link: self.link_for(user_id),
        })
    }

    /// The caller's invite counts and rank.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::ContestClosed`],
    /// [`ServiceError::NotRegistered`] for unknown users, or a storage error.
    pub async fn my_stats(&self, user_id: UserId) -> Result<MyStats, ServiceError> {
        self.gate(user_id).await?;

        let found = self
            .store
            .run_blocking(move |store| {
                if store.user(user_id)?.is_none() {
                    return Ok(None);
                }
                Ok(Some((store.stats_for_user(user_id)?, store.rank(user_id)?)))
            })
            .await?;
        let (stats, rank) = found.ok_or(ServiceError::NotRegistered(user_id))?;
        Ok(MyStats {
            stats,
            rank,
            link: self.link_for(user_id),
        })
    }

    /// The public leaderboard.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::ContestClosed`] or a storage error.
    pub async fn leaderboard(&self, user_id: UserId) -> Result<Vec<LeaderboardEntry>, ServiceError> {
        self.gate(user_id).await?;
        Ok(self
            .store
            .run_blocking(|store| store.top(LEADERBOARD_SIZE))
            .await?)
    }

    /// The prize list.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::ContestClosed`] or a storage error.
    pub async fn prizes(&self, user_id: UserId) -> Result<Vec<Prize>, ServiceError> {
        self.gate(user_id).await?;
        Ok(self.store.run_blocking(SqliteStore::prizes).await?)
    }

    /// Appends the ad footer to an outbound text.
    ///
    /// # Errors
    ///
    /// Returns an error if the footer cannot be read.
    pub async fn with_ad(&self, text: &str) -> Result<String, ServiceError> {
        let ads = Arc::clone(&self.ads);
        let text = text.to_string();
        Ok(self
            .store
            .run_blocking(move |store| ads.merge(store, &text))
            .await?)
    }

    /// The ad button, when both parts are set.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings cannot be read.
    pub async fn ad_button(&self) -> Result<Option<AdButton>, ServiceError> {
        Ok(self.store.run_blocking(SqliteStore::ad_button).await?)
    }

    /// Store-wide counters.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotAdmin`] or a storage error.
    pub async fn admin_stats(&self, actor: UserId) -> Result<AdminStats, ServiceError> {
        self.require_admin(actor).await?;
        Ok(self.store.run_blocking(SqliteStore::admin_stats).await?)
    }

    /// Leaderboard of arbitrary length, ungated.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotAdmin`] or a storage error.
    pub async fn admin_top(
        &self,
        actor: UserId,
        limit: u32,
    ) -> Result<Vec<LeaderboardEntry>, ServiceError> {
        self.require_admin(actor).await?;
        Ok(self.store.run_blocking(move |store| store.top(limit)).await?)
    }

    /// Stops or restarts the contest.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotAdmin`] or a storage error.
    pub async fn set_contest_state(
        &self,
        actor: UserId,
        state: ContestState,
    ) -> Result<(), ServiceError> {
        self.require_admin(actor).await?;
        self.store
            .run_blocking(move |store| match state {
                ContestState::Active => store.start_contest(),
                ContestState::Stopped => store.stop_contest(),
            })
            .await?;
        Ok(())
    }

    /// Stops the contest and purges participants.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotAdmin`] or a storage error.
    pub async fn finish_contest(
        &self,
        actor: UserId,
        options: FinishOptions,
    ) -> Result<(), ServiceError> {
        self.require_admin(actor).await?;
        self.store
            .run_blocking(move |store| store.finish_contest(options))
            .await?;
        self.ads.invalidate();
        Ok(())
    }

    /// Deletes the selected data.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotAdmin`] or a storage error.
    pub async fn reset_all(&self, actor: UserId, options: ResetOptions) -> Result<(), ServiceError> {
        self.require_admin(actor).await?;
        self.store
            .run_blocking(move |store| store.reset_all(options))
            .await?;
        self.ads.invalidate();
        Ok(())
    }

    /// Grants admin rights.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotAdmin`] or a storage error.
    pub async fn add_admin(&self, actor: UserId, user_id: UserId) -> Result<(), ServiceError> {
        self.require_admin(actor).await?;
        let admins = self.admins.clone();
        self.store.run_blocking(move |_| admins.add(user_id)).await?;
        Ok(())
    }

    /// Revokes admin rights.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotAdmin`], [`AdminError::StaticAdmin`] for a
    /// configured admin, or a storage error.
    pub async fn remove_admin(&self, actor: UserId, user_id: UserId) -> Result<(), ServiceError> {
        self.require_admin(actor).await?;
        let admins = self.admins.clone();
        let removed = self
            .store
            .run_blocking(move |_| Ok(admins.remove(user_id)))
            .await?;
        removed.map_err(ServiceError::from)
    }

    /// Every admin id.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotAdmin`] or a storage error.
    pub async fn list_admins(&self, actor: UserId) -> Result<Vec<UserId>, ServiceError> {
        self.require_admin(actor).await?;
        let admins = self.admins.clone();
        Ok(self.store.run_blocking(move |_| admins.list()).await?)
    }

    /// Adds a prize and returns its id.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotAdmin`] or a storage error.
    pub async fn add_prize(
        &self,
        actor: UserId,
        place: i64,
        title: &str,
        description: &str,
    ) -> Result<i64, ServiceError> {
        self.require_admin(actor).await?;
        let (title, description) = (title.to_string(), description.to_string());
        Ok(self
            .store
            .run_blocking(move |store| store.add_prize(place, &title, &description))
            .await?)
    }

    /// Removes a prize; returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotAdmin`] or a storage error.
    pub async fn remove_prize(&self, actor: UserId, id: i64) -> Result<bool, ServiceError> {
        self.require_admin(actor).await?;
        Ok(self.store.run_blocking(move |store| store.remove_prize(id)).await?)
    }

    /// Adds a required channel; returns whether it was new.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotAdmin`] or a storage error.
    pub async fn add_channel(&self, actor: UserId, channel: &str) -> Result<bool, ServiceError> {
        self.require_admin(actor).await?;
        let channel = channel.to_string();
        Ok(self
            .store
            .run_blocking(move |store| store.add_channel(&channel))
            .await?)
    }

    /// Removes a required channel; returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotAdmin`] or a storage error.
    pub async fn remove_channel(&self, actor: UserId, channel: &str) -> Result<bool, ServiceError> {
        self.require_admin(actor).await?;
        let channel = channel.to_string();
        Ok(self
            .store
            .run_blocking(move |store| store.remove_channel(&channel))
            .await?)
    }

    /// Replaces the ad footer; an empty text removes it.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotAdmin`] or a storage error.
    pub async fn set_ad_footer(&self, actor: UserId, footer: &str) -> Result<(), ServiceError> {
        self.require_admin(actor).await?;
        let ads = Arc::clone(&self.ads);
        let footer = footer.to_string();
        self.store
            .run_blocking(move |store| ads.set_footer(store, &footer))
            .await?;
        Ok(())
    }

    /// Replaces the ad button; empty parts disable it.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotAdmin`] or a storage error.
    pub async fn set_ad_button(
        &self,
        actor: UserId,
        text: &str,
        url: &str,
    ) -> Result<(), ServiceError> {
        self.require_admin(actor).await?;
        let (text, url) = (text.to_string(), url.to_string());
        self.store
            .run_blocking(move |store| store.set_ad_button(&text, &url))
            .await?;
        Ok(())
    }

    /// Sends `source` to every known user. Not gated by contest state.
    ///
    /// The recipient list is snapshotted before the first send.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotAdmin`] or a storage error raised before
    /// sending starts. Delivery failures are counted in the report.
    pub async fn broadcast(
        &self,
        actor: UserId,
        source: &BroadcastSource,
        extra: &str,
    ) -> Result<BroadcastReport, ServiceError> {
        self.require_admin(actor).await?;
        let ads = Arc::clone(&self.ads);
        let (recipients, footer) = self
            .store
            .run_blocking(move |store| Ok((store.all_user_ids()?, ads.footer(store)?)))
            .await?;
        info!(actor, recipients = recipients.len(), "broadcast started");
        Ok(self
            .dispatcher
            .dispatch(source, extra, &footer, &recipients)
            .await)
    }
}
