//! Configuration parsing.
//!
//! The contest is configured from a TOML file. Every section is optional and
//! falls back to defaults; the static admin list may be extended from the
//! `REFCONTEST_ADMIN_IDS` environment variable.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::UserId;

/// Environment variable holding extra static admin ids.
pub const ADMIN_IDS_ENV: &str = "REFCONTEST_ADMIN_IDS";

/// Configuration errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// I/O error reading the file.
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parse error.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A value is out of range.
    #[error("invalid config: {0}")]
    Validation(String),
}

/// Top-level contest configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ContestConfig {
    /// Bot username used in invite links, with or without `@`.
    pub bot_username: String,
    /// Database settings.
    pub store: StoreConfig,
    /// Static admins.
    pub admins: AdminsConfig,
    /// Subscription verifier limits.
    pub verifier: VerifierConfig,
    /// Broadcast pacing.
    pub broadcast: BroadcastConfig,
    /// Ad footer cache.
    pub ads: AdsConfig,
}

/// Database settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Path of the `SQLite` database file.
    pub path: PathBuf,
    /// How long a writer waits for the database lock.
    pub busy_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("contest.db"),
            busy_timeout_ms: 5_000,
        }
    }
}

/// Admins that exist independently of the store and cannot be removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AdminsConfig {
    /// Static admin ids.
    pub ids: Vec<UserId>,
}

/// Subscription verifier limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VerifierConfig {
    /// Maximum concurrently outstanding membership queries.
    pub max_in_flight: usize,
    /// Timeout of a single membership query.
    pub query_timeout_ms: u64,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            max_in_flight: crate::verifier::DEFAULT_MAX_IN_FLIGHT,
            query_timeout_ms: 10_000,
        }
    }
}

/// Broadcast pacing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BroadcastConfig {
    /// Sends between pauses.
    pub batch_size: usize,
    /// Pause after each batch.
    pub batch_pause_ms: u64,
    /// Timeout of a single delivery.
    pub send_timeout_ms: u64,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            batch_size: crate::broadcast::DEFAULT_BATCH_SIZE,
            batch_pause_ms: 200,
            send_timeout_ms: 15_000,
        }
    }
}

/// Ad footer cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AdsConfig {
    /// Lifetime of a cached footer.
    pub cache_ttl_secs: u64,
}

impl Default for AdsConfig {
    fn default() -> Self {
        Self { cache_ttl_secs: 60 }
    }
}

impl ContestConfig {
    /// Loads and validates configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parses and validates configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or a value is out of range.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Serializes configuration to TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] describing the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store.path.as_os_str().is_empty() {
            return Err(ConfigError::Validation("store.path must not be empty".into()));
        }
        if self.verifier.max_in_flight == 0 {
            return Err(ConfigError::Validation(
                "verifier.max_in_flight must be at least 1".into(),
            ));
        }
        if self.broadcast.batch_size == 0 {
            return Err(ConfigError::Validation(
                "broadcast.batch_size must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Adds the ids from a `REFCONTEST_ADMIN_IDS`-style value to the static
    /// admins. Entries that are not plain decimal ids are skipped.
    pub fn merge_admin_ids(&mut self, raw: &str) {
        let extra = raw.split(',').map(str::trim).filter_map(|s| {
            if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) {
                s.parse::<UserId>().ok()
            } else {
                None
            }
        });
        self.admins.ids.extend(extra);
    }

    /// Applies `REFCONTEST_ADMIN_IDS` when set.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(raw) = std::env::var(ADMIN_IDS_ENV) {
            self.merge_admin_ids(&raw);
        }
        self
    }

    /// The deduplicated static admin set.
    #[must_use]
    pub fn static_admins(&self) -> BTreeSet<UserId> {
        self.admins.ids.iter().copied().collect()
    }
}

impl StoreConfig {
    /// Busy timeout as a [`Duration`].
    #[must_use]
    pub const fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

impl VerifierConfig {
    /// Query timeout as a [`Duration`].
    #[must_use]
    pub const fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }
}

impl BroadcastConfig {
    /// Batch pause as a [`Duration`].
    #[must_use]
    pub const fn batch_pause(&self) -> Duration {
        Duration::from_millis(self.batch_pause_ms)
    }

    /// Send timeout as a [`Duration`].
    #[must_use]
    pub const fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

impl AdsConfig {
    /// Cache lifetime as a [`Duration`].
    #[must_use]
    pub const fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = ContestConfig::from_toml("").unwrap();
        assert_eq!(config.store.path, PathBuf::from("contest.db"));
        assert_eq!(config.verifier.max_in_flight, 10);
        assert_eq!(config.broadcast.batch_size, 25);
        assert_eq!(config.broadcast.batch_pause(), Duration::from_millis(200));
        assert_eq!(config.ads.cache_ttl(), Duration::from_secs(60));
        assert!(config.admins.ids.is_empty());
    }

    #[test]
    fn sections_override_defaults() {
        let config = ContestConfig::from_toml(
            r#"
            bot_username = "@contest_bot"

            [store]
            path = "/var/lib/contest/db.sqlite"

            [admins]
            ids = [1, 2, 2]

            [verifier]
            max_in_flight = 4
            "#,
        )
        .unwrap();
        assert_eq!(config.bot_username, "@contest_bot");
        assert_eq!(config.store.busy_timeout(), Duration::from_secs(5));
        assert_eq!(config.verifier.max_in_flight, 4);
        assert_eq!(config.static_admins().len(), 2);
    }

    #[test]
    fn zero_limits_are_rejected() {
        let err = ContestConfig::from_toml("[verifier]\nmax_in_flight = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));

        let err = ContestConfig::from_toml("[broadcast]\nbatch_size = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));

        let err = ContestConfig::from_toml("[store]\npath = \"\"").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = ContestConfig::from_toml("[store]\nurl = \"x\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn admin_ids_from_env_value_skip_garbage() {
        let mut config = ContestConfig::default();
        config.admins.ids.push(5);
        config.merge_admin_ids(" 7, abc, ,-3, 9 ");
        assert_eq!(config.static_admins().into_iter().collect::<Vec<_>>(), [5, 7, 9]);
    }

    #[test]
    fn shipped_example_parses_to_defaults() {
        let config =
            ContestConfig::from_toml(include_str!("../../../contest.example.toml")).unwrap();
        let expected = ContestConfig {
            bot_username: "@my_contest_bot".into(),
            ..ContestConfig::default()
        };
        assert_eq!(config, expected);
    }

    #[test]
    fn round_trips_through_toml() {
        let config = ContestConfig::default();
        let text = config.to_toml().unwrap();
        assert_eq!(ContestConfig::from_toml(&text).unwrap(), config);
    }
}
