//! Command implementations.

use anyhow::Result;
use refcontest_core::{AdminRegistry, ContestConfig, SqliteStore};
use serde::Serialize;

pub mod admin;
pub mod catalog;
pub mod contest;
pub mod report;

/// Everything a command needs.
#[derive(Debug)]
pub struct Context {
    /// Open contest store.
    pub store: SqliteStore,
    /// Effective configuration.
    pub config: ContestConfig,
    /// Print JSON instead of text.
    pub json: bool,
}

impl Context {
    /// Admin set over the store and the configured static admins.
    pub fn admins(&self) -> AdminRegistry {
        AdminRegistry::new(self.store.clone(), self.config.static_admins())
    }

    /// Prints `value` as pretty JSON, or runs `text` to print it for humans.
    pub fn emit<T: Serialize>(&self, value: &T, text: impl FnOnce(&T)) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            text(value);
        }
        Ok(())
    }
}

/// Acknowledgement printed by mutating commands.
#[derive(Debug, Serialize)]
pub struct Done<'a> {
    /// What happened.
    pub action: &'a str,
    /// Whether anything changed.
    pub changed: bool,
}

impl Context {
    /// Reports the outcome of a mutating command.
    pub fn done(&self, action: &str, changed: bool) -> Result<()> {
        self.emit(&Done { action, changed }, |d| {
            if d.changed {
                println!("{}", d.action);
            } else {
                println!("{} (no change)", d.action);
            }
        })
    }
}
