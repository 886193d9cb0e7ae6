//! Durable key/value settings and the ad footer cache.
//!
//! Settings are read on every user-facing operation (contest gate) and every
//! outbound message (ad merge). The contest flag is always read straight from
//! the store. Only the ad footer goes through [`AdFooterCache`], and every
//! write path that changes the footer invalidates it.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use rusqlite::{OptionalExtension, params};
use serde::Serialize;

use crate::store::{SqliteStore, StoreError};

/// Keys of the settings table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingKey {
    /// `"1"` while the contest accepts user actions, `"0"` when stopped.
    ContestActive,
    /// Text appended to every outbound message.
    AdFooter,
    /// Label of the optional ad button.
    AdButtonText,
    /// Target URL of the optional ad button.
    AdButtonUrl,
}

impl SettingKey {
    /// Every known key, in schema order.
    pub const ALL: [Self; 4] = [
        Self::ContestActive,
        Self::AdFooter,
        Self::AdButtonText,
        Self::AdButtonUrl,
    ];

    /// Column value used in the settings table.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ContestActive => "contest_active",
            Self::AdFooter => "ad_footer",
            Self::AdButtonText => "ad_btn_text",
            Self::AdButtonUrl => "ad_btn_url",
        }
    }

    /// Value seeded on first open and restored by a settings reset.
    #[must_use]
    pub const fn default_value(self) -> &'static str {
        match self {
            Self::ContestActive => "1",
            Self::AdFooter | Self::AdButtonText | Self::AdButtonUrl => "",
        }
    }
}

/// An ad button, present only when both label and URL are set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdButton {
    /// Button label.
    pub text: String,
    /// Button target.
    pub url: String,
}

impl SqliteStore {
    /// Reads a setting, falling back to its default when absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn setting(&self, key: SettingKey) -> Result<String, StoreError> {
        let conn = self.conn()?;
        let value: Option<String> = conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![key.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value.unwrap_or_else(|| key.default_value().to_string()))
    }

    /// Writes a setting (last writer wins).
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn set_setting(&self, key: SettingKey, value: &str) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO settings (key, value) VALUES (?1, ?2)
             ON CONFLICT (key) DO UPDATE SET value = excluded.value",
            params![key.as_str(), value],
        )?;
        Ok(())
    }

    /// Returns the ad button if both label and URL are non-empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn ad_button(&self) -> Result<Option<AdButton>, StoreError> {
        let text = self.setting(SettingKey::AdButtonText)?.trim().to_string();
        let url = self.setting(SettingKey::AdButtonUrl)?.trim().to_string();
        if text.is_empty() || url.is_empty() {
            return Ok(None);
        }
        Ok(Some(AdButton { text, url }))
    }

    /// Sets or clears the ad button. Empty strings clear it.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn set_ad_button(&self, text: &str, url: &str) -> Result<(), StoreError> {
        self.with_tx(|tx| {
            for (key, value) in [
                (SettingKey::AdButtonText, text.trim()),
                (SettingKey::AdButtonUrl, url.trim()),
            ] {
                tx.execute(
                    "INSERT INTO settings (key, value) VALUES (?1, ?2)
                     ON CONFLICT (key) DO UPDATE SET value = excluded.value",
                    params![key.as_str(), value],
                )?;
            }
            Ok(())
        })
    }
}

/// Short-TTL in-process cache of the ad footer.
#[derive(Debug)]
pub struct AdFooterCache {
    ttl: Duration,
    slot: Mutex<Option<(String, Instant)>>,
}

impl AdFooterCache {
    /// Creates an empty cache whose entries live for `ttl`.
    #[must_use]
    pub const fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slot: Mutex::new(None),
        }
    }

    /// Returns the trimmed footer, reading the store when the cached copy
    /// has expired.
    ///
    /// # Errors
    ///
    /// Returns an error if the store read fails.
    pub fn footer(&self, store: &SqliteStore) -> Result<String, StoreError> {
        if let Some(cached) = self.cached() {
            return Ok(cached);
        }
        let footer = store.setting(SettingKey::AdFooter)?.trim().to_string();
        if let Ok(mut slot) = self.slot.lock() {
            *slot = Some((footer.clone(), Instant::now() + self.ttl));
        }
        Ok(footer)
    }

    /// Writes a new footer and drops the cached copy.
    ///
    /// # Errors
    ///
    /// Returns an error if the store write fails.
    pub fn set_footer(&self, store: &SqliteStore, footer: &str) -> Result<(), StoreError> {
        store.set_setting(SettingKey::AdFooter, footer.trim())?;
        self.invalidate();
        Ok(())
    }

    /// Drops the cached footer.
    pub fn invalidate(&self) {
        if let Ok(mut slot) = self.slot.lock() {
            *slot = None;
        }
    }

    /// Appends the footer to `text` after a blank line.
    ///
    /// # Errors
    ///
    /// Returns an error if the footer cannot be read.
    pub fn merge(&self, store: &SqliteStore, text: &str) -> Result<String, StoreError> {
        Ok(merge_with_ad(text, &self.footer(store)?))
    }

    fn cached(&self) -> Option<String> {
        let slot = self.slot.lock().ok()?;
        match slot.as_ref() {
            Some((value, expires)) if Instant::now() < *expires => Some(value.clone()),
            _ => None,
        }
    }
}

/// Joins `text` and `footer`; a blank `text` yields the footer alone.
#[must_use]
pub fn merge_with_ad(text: &str, footer: &str) -> String {
    if footer.is_empty() {
        return text.to_string();
    }
    if text.trim().is_empty() {
        return footer.to_string();
    }
    format!("{text}\n\n{footer}")
}
