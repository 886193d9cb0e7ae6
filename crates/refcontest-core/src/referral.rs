//! Referral ledger and crediting engine.
//!
//! There is at most one referral row per invitee, created on first sight
//! of a valid, distinct referrer and never reparented. The `credited` flag
//! only moves from false to true, and only while the invitee is verified.
//!
//! Scores are never stored. A referrer's score is the number of credited
//! rows naming it, so crediting needs no lock on the referrer.

use rusqlite::{OptionalExtension, params};
use serde::Serialize;
use tracing::{debug, info};

use crate::store::{SqliteStore, StoreError, UserId, count, now_ns};

/// One invitee's referral record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Referral {
    /// The invited user; unique across the ledger.
    pub invited_user_id: UserId,
    /// The user credited when the invitee verifies.
    pub referrer_id: UserId,
    /// Whether this referral already counted toward the referrer's score.
    pub credited: bool,
    /// When the referral was recorded.
    pub created_at_ns: i64,
}

/// Referral counts for one referrer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReferralStats {
    /// Every invitee recorded under the referrer.
    pub total_invited: u64,
    /// Invitees whose referral has been credited.
    pub credited_invited: u64,
    /// Contest score; equal to `credited_invited`.
    pub score: u64,
}

impl SqliteStore {
    /// Records `invited_id` as invited by `referrer_id`.
    ///
    /// Self-referrals are ignored. If the invitee already has a referral
    /// row the call is a no-op, whichever referrer it names. Returns
    /// whether a row was inserted.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    pub fn record_referral(
        &self,
        invited_id: UserId,
        referrer_id: UserId,
    ) -> Result<bool, StoreError> {
        if invited_id == referrer_id {
            return Ok(false);
        }
        let conn = self.conn()?;
        let inserted = conn.execute(
            "INSERT INTO referrals (invited_user_id, referrer_id, credited, created_at_ns)
             VALUES (?1, ?2, 0, ?3)
             ON CONFLICT (invited_user_id) DO NOTHING",
            params![invited_id, referrer_id, now_ns()],
        )?;
        if inserted > 0 {
            debug!(invited_id, referrer_id, "recorded referral");
        }
        Ok(inserted > 0)
    }

    /// Credits the invitee's referrer if the invitee is verified and the
    /// referral has not been credited yet.
    ///
    /// Returns the credited referrer, or `None` when the invitee is not
    /// verified, has no referral row, or was already credited. The check
    /// and the flip run in one write-locked transaction, so of any number
    /// of concurrent calls for the same invitee exactly one returns
    /// `Some`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable; nothing is credited
    /// in that case.
    pub fn credit_if_eligible(&self, invited_id: UserId) -> Result<Option<UserId>, StoreError> {
        let credited = self.with_write_tx(|tx| {
            let verified: Option<bool> = tx
                .query_row(
                    "SELECT verified FROM users WHERE user_id = ?1",
                    params![invited_id],
                    |row| row.get(0),
                )
                .optional()?;
            if verified != Some(true) {
                return Ok(None);
            }

            let row: Option<(UserId, bool)> = tx
                .query_row(
                    "SELECT referrer_id, credited FROM referrals WHERE invited_user_id = ?1",
                    params![invited_id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            let Some((referrer_id, false)) = row else {
                return Ok(None);
            };

            tx.execute(
                "UPDATE referrals SET credited = 1 WHERE invited_user_id = ?1 AND credited = 0",
                params![invited_id],
            )?;
            Ok(Some(referrer_id))
        })?;

        if let Some(referrer_id) = credited {
            info!(invited_id, referrer_id, "credited referral");
        }
        Ok(credited)
    }

    /// Looks up the referral row of an invitee.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn referral(&self, invited_id: UserId) -> Result<Option<Referral>, StoreError> {
        let conn = self.conn()?;
        let referral = conn
            .query_row(
                "SELECT invited_user_id, referrer_id, credited, created_at_ns
                 FROM referrals WHERE invited_user_id = ?1",
                params![invited_id],
                |row| {
                    Ok(Referral {
                        invited_user_id: row.get(0)?,
                        referrer_id: row.get(1)?,
                        credited: row.get(2)?,
                        created_at_ns: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(referral)
    }

    /// Invited, credited, and score counts for `user_id` as a referrer.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn stats_for_user(&self, user_id: UserId) -> Result<ReferralStats, StoreError> {
        let conn = self.conn()?;
        let total_invited = count(
            &conn,
            "SELECT COUNT(*) FROM referrals WHERE referrer_id = ?1",
            params![user_id],
        )?;
        let credited_invited = count(
            &conn,
            "SELECT COUNT(*) FROM referrals WHERE referrer_id = ?1 AND credited = 1",
            params![user_id],
        )?;
        Ok(ReferralStats {
            total_invited,
            credited_invited,
            score: credited_invited,
        })
    }
}
