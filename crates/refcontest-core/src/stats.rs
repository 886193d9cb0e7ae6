//! Aggregate counters for administrators.

use chrono::{DateTime, Utc};
use rusqlite::params;
use serde::Serialize;

use crate::contest::ContestState;
use crate::store::{SqliteStore, StoreError, count};

/// Snapshot of store-wide counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdminStats {
    /// Whether the contest is running.
    pub contest_state: ContestState,
    /// Known users.
    pub users_total: u64,
    /// Users that passed the subscription check.
    pub users_verified: u64,
    /// Users that have not.
    pub users_unverified: u64,
    /// Recorded referrals.
    pub referrals_total: u64,
    /// Referrals counted toward a score.
    pub referrals_credited: u64,
    /// Referrals still waiting on verification.
    pub referrals_uncredited: u64,
    /// Users whose first contact was today (UTC).
    pub users_today: u64,
    /// Referrals recorded today (UTC).
    pub referrals_today: u64,
    /// Users that joined today and are already verified.
    pub verified_joined_today: u64,
    /// Prize entries.
    pub prizes: u64,
    /// Required channels.
    pub channels: u64,
}

/// Start of the UTC day containing `now`, in nanoseconds since the epoch.
fn start_of_day_ns(now: DateTime<Utc>) -> i64 {
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .and_then(|midnight| midnight.and_utc().timestamp_nanos_opt())
        .unwrap_or(0)
}

impl SqliteStore {
    /// Collects [`AdminStats`] relative to the current UTC day.
    ///
    /// # Errors
    ///
    /// Returns an error if any query fails.
    pub fn admin_stats(&self) -> Result<AdminStats, StoreError> {
        self.admin_stats_at(Utc::now())
    }

    /// Collects [`AdminStats`] with "today" taken from `now`.
    ///
    /// # Errors
    ///
    /// Returns an error if any query fails.
    pub fn admin_stats_at(&self, now: DateTime<Utc>) -> Result<AdminStats, StoreError> {
        let contest_state = self.contest_state()?;
        let since = start_of_day_ns(now);

        let conn = self.conn()?;
        let users_total = count(&conn, "SELECT COUNT(*) FROM users", [])?;
        let users_verified = count(&conn, "SELECT COUNT(*) FROM users WHERE verified = 1", [])?;
        let referrals_total = count(&conn, "SELECT COUNT(*) FROM referrals", [])?;
        let referrals_credited =
            count(&conn, "SELECT COUNT(*) FROM referrals WHERE credited = 1", [])?;

        Ok(AdminStats {
            contest_state,
            users_total,
            users_verified,
            users_unverified: users_total - users_verified,
            referrals_total,
            referrals_credited,
            referrals_uncredited: referrals_total - referrals_credited,
            users_today: count(
                &conn,
                "SELECT COUNT(*) FROM users WHERE created_at_ns >= ?1",
                params![since],
            )?,
            referrals_today: count(
                &conn,
                "SELECT COUNT(*) FROM referrals WHERE created_at_ns >= ?1",
                params![since],
            )?,
            verified_joined_today: count(
                &conn,
                "SELECT COUNT(*) FROM users WHERE verified = 1 AND created_at_ns >= ?1",
                params![since],
            )?,
            prizes: count(&conn, "SELECT COUNT(*) FROM prizes", [])?,
            channels: count(&conn, "SELECT COUNT(*) FROM channels", [])?,
        })
    }
}
