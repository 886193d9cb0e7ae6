//! Contest lifecycle, administrative resets, and the admin set.
//!
//! The contest state is a single settings flag. It is read from the store on
//! every gate check and never cached.

use std::collections::BTreeSet;
use std::fmt;

use rusqlite::params;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::settings::SettingKey;
use crate::store::{SqliteStore, StoreError, UserId, insert_default_settings, now_ns};

/// Whether the contest accepts user actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContestState {
    /// User-facing operations run.
    Active,
    /// Only administrators may act.
    Stopped,
}

impl fmt::Display for ContestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => f.write_str("ACTIVE"),
            Self::Stopped => f.write_str("STOPPED"),
        }
    }
}

/// What a reset removes. Every field defaults to keeping data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct ResetOptions {
    /// Delete all users.
    pub users: bool,
    /// Delete all referral rows.
    pub referrals: bool,
    /// Delete all prizes.
    pub prizes: bool,
    /// Delete dynamically added admins. Static admins are unaffected.
    pub admins: bool,
    /// Restore every setting to its default.
    pub settings: bool,
}

impl ResetOptions {
    /// Users and referrals only.
    #[must_use]
    pub const fn participants() -> Self {
        Self {
            users: true,
            referrals: true,
            prizes: false,
            admins: false,
            settings: false,
        }
    }
}

/// Extra data removed by [`SqliteStore::finish_contest`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FinishOptions {
    /// Also delete prizes.
    pub clear_prizes: bool,
    /// Also delete dynamically added admins.
    pub clear_admins: bool,
}

impl SqliteStore {
    /// Current contest state.
    ///
    /// # Errors
    ///
    /// Returns an error if the flag cannot be read.
    pub fn contest_state(&self) -> Result<ContestState, StoreError> {
        Ok(if self.setting(SettingKey::ContestActive)? == "1" {
            ContestState::Active
        } else {
            ContestState::Stopped
        })
    }

    /// Whether user-facing operations may run.
    ///
    /// # Errors
    ///
    /// Returns an error if the flag cannot be read.
    pub fn is_active(&self) -> Result<bool, StoreError> {
        Ok(self.contest_state()? == ContestState::Active)
    }

    /// Moves the contest to `STOPPED`.
    ///
    /// # Errors
    ///
    /// Returns an error if the flag cannot be written.
    pub fn stop_contest(&self) -> Result<(), StoreError> {
        self.set_setting(SettingKey::ContestActive, "0")?;
        info!(state = %ContestState::Stopped, "contest stopped");
        Ok(())
    }

    /// Moves the contest to `ACTIVE`.
    ///
    /// # Errors
    ///
    /// Returns an error if the flag cannot be written.
    pub fn start_contest(&self) -> Result<(), StoreError> {
        self.set_setting(SettingKey::ContestActive, "1")?;
        info!(state = %ContestState::Active, "contest started");
        Ok(())
    }

    /// Stops the contest, then purges users and referrals.
    ///
    /// Prizes and dynamic admins survive unless `options` says otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if either step fails. The contest stays stopped
    /// if the purge fails.
    pub fn finish_contest(&self, options: FinishOptions) -> Result<(), StoreError> {
        self.stop_contest()?;
        self.reset_all(ResetOptions {
            prizes: options.clear_prizes,
            admins: options.clear_admins,
            ..ResetOptions::participants()
        })?;
        info!(?options, "contest finished");
        Ok(())
    }

    /// Deletes the selected data in one transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if any delete fails; nothing is removed then.
    pub fn reset_all(&self, options: ResetOptions) -> Result<(), StoreError> {
        self.with_write_tx(|tx| {
            if options.referrals {
                tx.execute("DELETE FROM referrals", [])?;
            }
            if options.users {
                tx.execute("DELETE FROM users", [])?;
            }
            if options.prizes {
                tx.execute("DELETE FROM prizes", [])?;
                tx.execute("DELETE FROM sqlite_sequence WHERE name = 'prizes'", [])?;
            }
            if options.admins {
                tx.execute("DELETE FROM admins", [])?;
            }
            if options.settings {
                tx.execute("DELETE FROM settings", [])?;
                insert_default_settings(tx)?;
            }
            Ok(())
        })?;
        info!(?options, "store reset");
        Ok(())
    }
}

/// Errors from admin set maintenance.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AdminError {
    /// Static admins come from configuration and cannot be removed.
    #[error("admin {0} is configured statically and cannot be removed")]
    StaticAdmin(UserId),

    /// Store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Union of configured (immutable) and stored (mutable) admins.
#[derive(Debug, Clone)]
pub struct AdminRegistry {
    static_ids: BTreeSet<UserId>,
    store: SqliteStore,
}

impl AdminRegistry {
    /// Creates a registry over `store` with the given static admins.
    #[must_use]
    pub fn new(store: SqliteStore, static_ids: impl IntoIterator<Item = UserId>) -> Self {
        Self {
            static_ids: static_ids.into_iter().collect(),
            store,
        }
    }

    /// Whether `user_id` is a static admin.
    #[must_use]
    pub fn is_static(&self, user_id: UserId) -> bool {
        self.static_ids.contains(&user_id)
    }

    /// Whether `user_id` holds admin rights.
    ///
    /// # Errors
    ///
    /// Returns an error if the dynamic set cannot be read.
    pub fn is_admin(&self, user_id: UserId) -> Result<bool, StoreError> {
        if self.is_static(user_id) {
            return Ok(true);
        }
        let conn = self.store.conn()?;
        let n = crate::store::count(
            &conn,
            "SELECT COUNT(*) FROM admins WHERE user_id = ?1",
            params![user_id],
        )?;
        Ok(n > 0)
    }

    /// Adds a dynamic admin. Adding an existing admin is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn add(&self, user_id: UserId) -> Result<(), StoreError> {
        let conn = self.store.conn()?;
        conn.execute(
            "INSERT OR IGNORE INTO admins (user_id, created_at_ns) VALUES (?1, ?2)",
            params![user_id, now_ns()],
        )?;
        info!(user_id, "admin added");
        Ok(())
    }

    /// Removes a dynamic admin.
    ///
    /// # Errors
    ///
    /// Returns [`AdminError::StaticAdmin`] for configured admins, or a
    /// store error if the delete fails.
    pub fn remove(&self, user_id: UserId) -> Result<(), AdminError> {
        if self.is_static(user_id) {
            return Err(AdminError::StaticAdmin(user_id));
        }
        let conn = self.store.conn()?;
        conn.execute("DELETE FROM admins WHERE user_id = ?1", params![user_id])
            .map_err(StoreError::from)?;
        info!(user_id, "admin removed");
        Ok(())
    }

    /// Every admin: static ones first (ascending), then dynamic ones in the
    /// order they were added.
    ///
    /// # Errors
    ///
    /// Returns an error if the dynamic set cannot be read.
    pub fn list(&self) -> Result<Vec<UserId>, StoreError> {
        let conn = self.store.conn()?;
        let mut stmt = conn.prepare("SELECT user_id FROM admins ORDER BY created_at_ns ASC, user_id ASC")?;
        let dynamic = stmt
            .query_map([], |row| row.get::<_, UserId>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut all: Vec<UserId> = self.static_ids.iter().copied().collect();
        all.extend(dynamic.into_iter().filter(|id| !self.is_static(*id)));
        Ok(all)
    }
}
