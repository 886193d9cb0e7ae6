//! Subscription verifier.
//!
//! Decides whether a user satisfies every required channel by querying an
//! external [`MembershipProvider`] once per channel. Queries run
//! concurrently but never more than `max_in_flight` at a time. The check is
//! fail-closed: a query error, a timeout, or any status outside the
//! member/administrator/creator set marks the channel as missing.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::store::UserId;

/// Default limit on concurrently outstanding membership queries.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 10;

/// Default bound on a single membership query.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Membership status reported by the chat platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipStatus {
    /// Owner of the channel.
    Creator,
    /// Channel administrator.
    Administrator,
    /// Ordinary member.
    Member,
    /// Member with restrictions.
    Restricted,
    /// Not a member.
    Left,
    /// Banned from the channel.
    Kicked,
}

impl MembershipStatus {
    /// Whether this status satisfies a channel requirement.
    #[must_use]
    pub const fn satisfies(self) -> bool {
        matches!(self, Self::Creator | Self::Administrator | Self::Member)
    }
}

/// Failure of a single membership query.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum MembershipError {
    /// The channel does not exist or the bot cannot see it.
    #[error("channel not accessible: {0}")]
    ChannelUnavailable(String),

    /// The platform rejected or failed the request.
    #[error("membership query failed: {0}")]
    Query(String),
}

/// External capability answering channel membership questions.
#[async_trait]
pub trait MembershipProvider: Send + Sync {
    /// Returns `user_id`'s status in `channel`.
    async fn membership_status(
        &self,
        channel: &str,
        user_id: UserId,
    ) -> Result<MembershipStatus, MembershipError>;
}

/// Result of a subscription check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SubscriptionCheck {
    /// Channels the user is not (verifiably) subscribed to, sorted and
    /// deduplicated.
    pub missing: Vec<String>,
}

impl SubscriptionCheck {
    /// True when no channel is missing.
    #[must_use]
    pub fn all_satisfied(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Bounded-concurrency fan-out over the required channels.
#[derive(Clone)]
pub struct SubscriptionVerifier {
    provider: Arc<dyn MembershipProvider>,
    max_in_flight: usize,
    query_timeout: Duration,
}

impl std::fmt::Debug for SubscriptionVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionVerifier")
            .field("max_in_flight", &self.max_in_flight)
            .field("query_timeout", &self.query_timeout)
            .finish_non_exhaustive()
    }
}

impl SubscriptionVerifier {
    /// Creates a verifier with the default limits.
    #[must_use]
    pub fn new(provider: Arc<dyn MembershipProvider>) -> Self {
        Self {
            provider,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }

    /// Sets the concurrency bound. Zero is treated as one.
    #[must_use]
    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight.max(1);
        self
    }

    /// Sets the per-query timeout.
    #[must_use]
    pub const fn with_query_timeout(mut self, query_timeout: Duration) -> Self {
        self.query_timeout = query_timeout;
        self
    }

    /// Checks `user_id` against every channel in `channels`.
    ///
    /// Blank entries are skipped. An empty channel set is satisfied without
    /// any external call. Returns only after every query has finished.
    pub async fn check(&self, user_id: UserId, channels: &[String]) -> SubscriptionCheck {
        let channels: Vec<&str> = channels
            .iter()
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
            .collect();
        if channels.is_empty() {
            return SubscriptionCheck::default();
        }

        let permits = Semaphore::new(self.max_in_flight);
        let results = join_all(channels.iter().map(|channel| {
            let permits = &permits;
            async move {
                let satisfied = match permits.acquire().await {
                    Ok(_permit) => self.query(channel, user_id).await,
                    Err(_) => false,
                };
                (*channel, satisfied)
            }
        }))
        .await;

        let missing: BTreeSet<String> = results
            .into_iter()
            .filter(|(_, satisfied)| !satisfied)
            .map(|(channel, _)| channel.to_string())
            .collect();

        debug!(
            user_id,
            channels = channels.len(),
            missing = missing.len(),
            "subscription check finished"
        );
        SubscriptionCheck {
            missing: missing.into_iter().collect(),
        }
    }

    async fn query(&self, channel: &str, user_id: UserId) -> bool {
        match tokio::time::timeout(
            self.query_timeout,
            self.provider.membership_status(channel, user_id),
        )
        .await
        {
            Ok(Ok(status)) => status.satisfies(),
            Ok(Err(error)) => {
                warn!(channel, user_id, %error, "membership query failed");
                false
            },
            Err(_) => {
                warn!(channel, user_id, timeout = ?self.query_timeout, "membership query timed out");
                false
            },
        }
    }
}
