//! Ranking engine.
//!
//! Scores are derived on every query from credited referral rows joined
//! against the user table; nothing is cached. Two orderings are in use:
//!
//! - [`SqliteStore::top`] orders by score descending, then by join time, so
//!   the bounded listing is stable.
//! - [`SqliteStore::rank`] is a dense rank over score alone. Users with
//!   equal scores share a rank regardless of when they joined.

#![allow(clippy::cast_sign_loss)]

use rusqlite::{OptionalExtension, params};
use serde::Serialize;

use crate::store::{SqliteStore, StoreError, UserId};

/// Per-user score over credited referrals. Users without any score 0.
const SCORES_CTE: &str = "
    WITH scores AS (
        SELECT u.user_id AS user_id,
               u.handle AS handle,
               u.display_name AS display_name,
               u.created_at_ns AS created_at_ns,
               u.seq AS seq,
               COUNT(r.invited_user_id) AS score
        FROM users u
        LEFT JOIN referrals r
          ON r.referrer_id = u.user_id AND r.credited = 1
        GROUP BY u.user_id
    )";

/// Distance from first place at which a user counts as close to it.
pub const CLOSE_TO_LEADER_GAP: u64 = 5;

/// Size of the headline leaderboard.
pub const TOP_TEN: u64 = 10;

/// A row of the leaderboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeaderboardEntry {
    /// The ranked user.
    pub user_id: UserId,
    /// Display name as last seen.
    pub display_name: String,
    /// Platform handle, possibly empty.
    pub handle: String,
    /// Credited referrals.
    pub score: u64,
}

/// Where a user stands relative to the leader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Standing {
    /// The user's score.
    pub score: u64,
    /// Dense rank, or `None` for unknown users.
    pub rank: Option<u64>,
    /// Highest score of any user.
    pub top_score: u64,
    /// Points needed to reach the top score.
    pub gap_to_first: u64,
}

/// Coarse position used to pick a motivational message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "tier", rename_all = "snake_case")]
pub enum StandingTier {
    /// Rank 1.
    Leader,
    /// Within [`CLOSE_TO_LEADER_GAP`] points of a non-zero top score.
    CloseToLeader {
        /// Points behind first place.
        gap: u64,
    },
    /// Rank 10 or better.
    TopTen,
    /// Everyone else.
    Climbing {
        /// Points still needed to reach ten.
        needed_for_top_ten: u64,
    },
}

impl Standing {
    /// Classifies the standing, checking the tiers in order.
    #[must_use]
    pub const fn tier(&self) -> StandingTier {
        if matches!(self.rank, Some(1)) {
            return StandingTier::Leader;
        }
        if self.gap_to_first <= CLOSE_TO_LEADER_GAP && self.top_score > 0 {
            return StandingTier::CloseToLeader {
                gap: self.gap_to_first,
            };
        }
        if let Some(rank) = self.rank {
            if rank <= TOP_TEN {
                return StandingTier::TopTen;
            }
        }
        StandingTier::Climbing {
            needed_for_top_ten: TOP_TEN.saturating_sub(self.score),
        }
    }
}

impl SqliteStore {
    /// The `limit` highest-scoring users, earlier joiners first on ties.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn top(&self, limit: u32) -> Result<Vec<LeaderboardEntry>, StoreError> {
        let conn = self.conn()?;
        let sql = format!(
            "{SCORES_CTE}
            SELECT user_id, display_name, handle, score
            FROM scores
            ORDER BY score DESC, created_at_ns ASC, seq ASC
            LIMIT ?1"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![limit], |row| {
                Ok(LeaderboardEntry {
                    user_id: row.get(0)?,
                    display_name: row.get(1)?,
                    handle: row.get(2)?,
                    score: row.get::<_, i64>(3)? as u64,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Dense rank of `user_id` by score, or `None` for unknown users.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn rank(&self, user_id: UserId) -> Result<Option<u64>, StoreError> {
        let conn = self.conn()?;
        let sql = format!(
            "{SCORES_CTE},
            ranked AS (
                SELECT user_id, DENSE_RANK() OVER (ORDER BY score DESC) AS rnk
                FROM scores
            )
            SELECT rnk FROM ranked WHERE user_id = ?1"
        );
        let rank: Option<i64> = conn
            .query_row(&sql, params![user_id], |row| row.get(0))
            .optional()?;
        Ok(rank.map(|r| r as u64))
    }

    /// Highest score of any user, or 0 when there are no users.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn top_score(&self) -> Result<u64, StoreError> {
        let conn = self.conn()?;
        let sql = format!("{SCORES_CTE} SELECT COALESCE(MAX(score), 0) FROM scores");
        let top: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(top as u64)
    }

    /// Score, rank, and distance to first place for `user_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if any underlying query fails.
    pub fn standing(&self, user_id: UserId) -> Result<Standing, StoreError> {
        let score = self.stats_for_user(user_id)?.score;
        let rank = self.rank(user_id)?;
        let top_score = self.top_score()?;
        Ok(Standing {
            score,
            rank,
            top_score,
            gap_to_first: top_score.saturating_sub(score),
        })
    }
}
