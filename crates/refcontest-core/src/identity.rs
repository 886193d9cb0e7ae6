//! Identity ledger: user records and first-referrer-wins linkage.
//!
//! A user row is created on first contact. Later contacts refresh display
//! metadata and may attach a referrer exactly once, only while no referrer
//! has ever been recorded. A user can never be its own referrer.

use rusqlite::{OptionalExtension, Row, params};
use serde::Serialize;
use tracing::debug;

use crate::store::{SqliteStore, StoreError, UserId, now_ns};

/// A contest participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    /// Platform-assigned identifier.
    pub user_id: UserId,
    /// Platform handle, empty when the user has none.
    pub handle: String,
    /// Display name as last seen.
    pub display_name: String,
    /// The user who invited this one. Set at most once.
    pub referrer_id: Option<UserId>,
    /// Whether the user has passed the subscription check.
    pub verified: bool,
    /// When the user was last marked verified.
    pub verified_at_ns: Option<i64>,
    /// First contact time; never changes.
    pub created_at_ns: i64,
}

impl User {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            user_id: row.get(0)?,
            handle: row.get(1)?,
            display_name: row.get(2)?,
            referrer_id: row.get(3)?,
            verified: row.get(4)?,
            verified_at_ns: row.get(5)?,
            created_at_ns: row.get(6)?,
        })
    }
}

impl SqliteStore {
    /// Creates the user on first contact or refreshes it on re-contact.
    ///
    /// A `referrer_id` equal to `user_id` is treated as absent. An existing
    /// user only gains a referrer when it never had one; an attached
    /// referrer is never overwritten. Repeating an identical call is a
    /// no-op apart from the metadata refresh.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    pub fn register_or_touch(
        &self,
        user_id: UserId,
        handle: &str,
        display_name: &str,
        referrer_id: Option<UserId>,
    ) -> Result<(), StoreError> {
        let referrer_id = referrer_id.filter(|r| *r != user_id);

        self.with_write_tx(|tx| {
            let existing: Option<Option<UserId>> = tx
                .query_row(
                    "SELECT referrer_id FROM users WHERE user_id = ?1",
                    params![user_id],
                    |row| row.get(0),
                )
                .optional()?;

            match (existing, referrer_id) {
                (None, _) => {
                    tx.execute(
                        "INSERT INTO users (user_id, handle, display_name, referrer_id, verified, created_at_ns)
                         VALUES (?1, ?2, ?3, ?4, 0, ?5)",
                        params![user_id, handle, display_name, referrer_id, now_ns()],
                    )?;
                    debug!(user_id, ?referrer_id, "registered user");
                },
                (Some(None), Some(referrer)) => {
                    tx.execute(
                        "UPDATE users SET referrer_id = ?1, handle = ?2, display_name = ?3
                         WHERE user_id = ?4",
                        params![referrer, handle, display_name, user_id],
                    )?;
                    debug!(user_id, referrer, "attached first referrer");
                },
                (Some(_), _) => {
                    tx.execute(
                        "UPDATE users SET handle = ?1, display_name = ?2 WHERE user_id = ?3",
                        params![handle, display_name, user_id],
                    )?;
                },
            }
            Ok(())
        })
    }

    /// Looks up a user.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn user(&self, user_id: UserId) -> Result<Option<User>, StoreError> {
        let conn = self.conn()?;
        let user = conn
            .query_row(
                "SELECT user_id, handle, display_name, referrer_id, verified, verified_at_ns, created_at_ns
                 FROM users WHERE user_id = ?1",
                params![user_id],
                User::from_row,
            )
            .optional()?;
        Ok(user)
    }

    /// Sets or clears the verification flag.
    ///
    /// Marking verified stamps `verified_at`; clearing it erases the stamp.
    /// Unknown users are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn set_verified(&self, user_id: UserId, verified: bool) -> Result<(), StoreError> {
        let conn = self.conn()?;
        if verified {
            conn.execute(
                "UPDATE users SET verified = 1, verified_at_ns = ?1 WHERE user_id = ?2",
                params![now_ns(), user_id],
            )?;
        } else {
            conn.execute(
                "UPDATE users SET verified = 0, verified_at_ns = NULL WHERE user_id = ?1",
                params![user_id],
            )?;
        }
        Ok(())
    }

    /// Returns whether the user is verified. Unknown users are not.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn is_verified(&self, user_id: UserId) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let verified: Option<bool> = conn
            .query_row(
                "SELECT verified FROM users WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(verified.unwrap_or(false))
    }

    /// Snapshot of every known user id, in join order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn all_user_ids(&self) -> Result<Vec<UserId>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT user_id FROM users ORDER BY seq ASC")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    /// Number of known users.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn user_count(&self) -> Result<u64, StoreError> {
        let conn = self.conn()?;
        crate::store::count(&conn, "SELECT COUNT(*) FROM users", [])
    }
}

/// Extracts a referrer id from a start-link payload.
///
/// Accepts a bare decimal id (`"12345"`) or a `ref`-prefixed one
/// (`"ref12345"`). Anything else carries no referrer.
#[must_use]
pub fn parse_referral_code(code: &str) -> Option<UserId> {
    let code = code.trim();
    let digits = code.strip_prefix("ref").unwrap_or(code);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Builds the personal invite link for `user_id`.
#[must_use]
pub fn referral_link(bot_username: &str, user_id: UserId) -> String {
    format!(
        "https://t.me/{}?start={user_id}",
        bot_username.trim().trim_start_matches('@')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_contact_creates_unverified_user() {
        let store = SqliteStore::in_memory().unwrap();
        store.register_or_touch(10, "bob", "Bob", Some(3)).unwrap();

        let user = store.user(10).unwrap().unwrap();
        assert_eq!(user.referrer_id, Some(3));
        assert!(!user.verified);
        assert!(user.verified_at_ns.is_none());
        assert_eq!(user.handle, "bob");
    }

    #[test]
    fn self_referral_is_dropped() {
        let store = SqliteStore::in_memory().unwrap();
        store.register_or_touch(10, "", "Bob", Some(10)).unwrap();
        assert_eq!(store.user(10).unwrap().unwrap().referrer_id, None);
    }

    #[test]
    fn returning_user_without_referrer_gets_first_one() {
        let store = SqliteStore::in_memory().unwrap();
        store.register_or_touch(10, "", "Bob", None).unwrap();
        store.register_or_touch(10, "", "Bob", Some(4)).unwrap();
        store.register_or_touch(10, "", "Bob", Some(5)).unwrap();
        assert_eq!(store.user(10).unwrap().unwrap().referrer_id, Some(4));
    }

    #[test]
    fn touch_refreshes_metadata_but_not_creation_time() {
        let store = SqliteStore::in_memory().unwrap();
        store.register_or_touch(10, "old", "Old", Some(2)).unwrap();
        let before = store.user(10).unwrap().unwrap();

        store.register_or_touch(10, "new", "New", None).unwrap();
        let after = store.user(10).unwrap().unwrap();
        assert_eq!(after.handle, "new");
        assert_eq!(after.display_name, "New");
        assert_eq!(after.referrer_id, Some(2));
        assert_eq!(after.created_at_ns, before.created_at_ns);
    }

    #[test]
    fn verification_flag_round_trip() {
        let store = SqliteStore::in_memory().unwrap();
        assert!(!store.is_verified(1).unwrap());

        store.register_or_touch(1, "", "A", None).unwrap();
        store.set_verified(1, true).unwrap();
        let user = store.user(1).unwrap().unwrap();
        assert!(user.verified);
        assert!(user.verified_at_ns.is_some());

        store.set_verified(1, false).unwrap();
        let user = store.user(1).unwrap().unwrap();
        assert!(!user.verified);
        assert!(user.verified_at_ns.is_none());
    }

    #[test]
    fn user_ids_are_listed_in_join_order() {
        let store = SqliteStore::in_memory().unwrap();
        for id in [30, 10, 20] {
            store.register_or_touch(id, "", "", None).unwrap();
        }
        store.register_or_touch(10, "x", "X", None).unwrap();
        assert_eq!(store.all_user_ids().unwrap(), vec![30, 10, 20]);
        assert_eq!(store.user_count().unwrap(), 3);
    }

    #[test]
    fn referral_codes() {
        assert_eq!(parse_referral_code("12345"), Some(12345));
        assert_eq!(parse_referral_code(" ref77 "), Some(77));
        assert_eq!(parse_referral_code("ref"), None);
        assert_eq!(parse_referral_code("abc"), None);
        assert_eq!(parse_referral_code("-5"), None);
        assert_eq!(parse_referral_code(""), None);
        assert_eq!(parse_referral_code("99999999999999999999999"), None);
    }

    #[test]
    fn referral_link_strips_at_sign() {
        assert_eq!(
            referral_link("@contest_bot", 42),
            "https://t.me/contest_bot?start=42"
        );
    }
}
