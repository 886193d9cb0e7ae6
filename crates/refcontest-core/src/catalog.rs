//! Prize announcements and required channels.

use rusqlite::params;
use serde::Serialize;

use crate::store::{SqliteStore, StoreError, now_ns};

/// A prize announcement entry. Places need not be unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Prize {
    /// Row identifier, used for removal.
    pub id: i64,
    /// Placement the prize is awarded for.
    pub place: i64,
    /// Short title.
    pub title: String,
    /// Optional longer text; empty when absent.
    pub description: String,
}

impl SqliteStore {
    /// Adds a prize and returns its id. Text is trimmed.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn add_prize(&self, place: i64, title: &str, description: &str) -> Result<i64, StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO prizes (place, title, description, created_at_ns) VALUES (?1, ?2, ?3, ?4)",
            params![place, title.trim(), description.trim(), now_ns()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Removes a prize. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn remove_prize(&self, id: i64) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        Ok(conn.execute("DELETE FROM prizes WHERE id = ?1", params![id])? > 0)
    }

    /// All prizes ordered by place, then insertion.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn prizes(&self) -> Result<Vec<Prize>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, place, title, description FROM prizes ORDER BY place ASC, id ASC",
        )?;
        let prizes = stmt
            .query_map([], |row| {
                Ok(Prize {
                    id: row.get(0)?,
                    place: row.get(1)?,
                    title: row.get(2)?,
                    description: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(prizes)
    }

    /// Adds a required channel (handle or invite link).
    ///
    /// Blank references and duplicates are ignored. Returns whether the
    /// channel was added.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn add_channel(&self, channel_ref: &str) -> Result<bool, StoreError> {
        let channel_ref = channel_ref.trim();
        if channel_ref.is_empty() {
            return Ok(false);
        }
        let conn = self.conn()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO channels (channel_ref, created_at_ns) VALUES (?1, ?2)",
            params![channel_ref, now_ns()],
        )?;
        Ok(inserted > 0)
    }

    /// Removes a required channel. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn remove_channel(&self, channel_ref: &str) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let removed = conn.execute(
            "DELETE FROM channels WHERE channel_ref = ?1",
            params![channel_ref.trim()],
        )?;
        Ok(removed > 0)
    }

    /// Required channels in insertion order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn channels(&self) -> Result<Vec<String>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT channel_ref FROM channels ORDER BY id ASC")?;
        let channels = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(channels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prizes_order_by_place_then_insertion() {
        let store = SqliteStore::in_memory().unwrap();
        store.add_prize(2, "Headphones", "").unwrap();
        let first = store.add_prize(1, " Phone ", " 128 GB ").unwrap();
        store.add_prize(1, "Watch", "").unwrap();

        let prizes = store.prizes().unwrap();
        let titles: Vec<_> = prizes.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, ["Phone", "Watch", "Headphones"]);
        assert_eq!(prizes[0].id, first);
        assert_eq!(prizes[0].description, "128 GB");
    }

    #[test]
    fn removing_prizes() {
        let store = SqliteStore::in_memory().unwrap();
        let id = store.add_prize(1, "Phone", "").unwrap();
        assert!(store.remove_prize(id).unwrap());
        assert!(!store.remove_prize(id).unwrap());
        assert!(store.prizes().unwrap().is_empty());
    }

    #[test]
    fn channels_keep_insertion_order_and_skip_duplicates() {
        let store = SqliteStore::in_memory().unwrap();
        assert!(store.add_channel(" @b ").unwrap());
        assert!(store.add_channel("@a").unwrap());
        assert!(!store.add_channel("@b").unwrap());
        assert!(!store.add_channel("   ").unwrap());
        assert_eq!(store.channels().unwrap(), ["@b", "@a"]);

        assert!(store.remove_channel("@b ").unwrap());
        assert_eq!(store.channels().unwrap(), ["@a"]);
    }
}
