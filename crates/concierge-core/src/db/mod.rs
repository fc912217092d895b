// ============================================================================
// SnapshotStore — Embedded Database (redb)
// ============================================================================
// Durable local storage for session snapshots (turns + stage state).
// Default path: ~/.concierge/snapshots.redb (override via CONCIERGE_DB_PATH)
// ============================================================================

pub mod types;

pub use types::{SessionSnapshot, SnapshotStats};

use anyhow::{anyhow, Result};
use redb::{Database, TableDefinition};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

// Table definitions
const SESSIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("sessions");

/// Embedded database holding persisted session snapshots
pub struct SnapshotStore {
    db: Database,
    path: PathBuf,
}

impl SnapshotStore {
    /// Open (or create) the database at the given path.
    /// If `path` is None, uses CONCIERGE_DB_PATH env var or
    /// ~/.concierge/snapshots.redb
    pub fn open(path: Option<&Path>) -> Result<Self> {
        let db_path = if let Some(p) = path {
            p.to_path_buf()
        } else if let Ok(env_path) = std::env::var("CONCIERGE_DB_PATH") {
            PathBuf::from(env_path)
        } else {
            let home = dirs::home_dir().ok_or_else(|| anyhow!("Cannot determine home directory"))?;
            let concierge_dir = home.join(".concierge");
            std::fs::create_dir_all(&concierge_dir)
                .map_err(|e| anyhow!("Failed to create .concierge directory: {}", e))?;
            concierge_dir.join("snapshots.redb")
        };

        debug!("Opening snapshot store at: {}", db_path.display());

        let db = Database::create(&db_path)
            .map_err(|e| anyhow!("Failed to open snapshot store: {}", e))?;

        // Ensure the table exists by doing a write transaction
        let write_txn = db
            .begin_write()
            .map_err(|e| anyhow!("Failed to begin write: {}", e))?;
        {
            let _ = write_txn
                .open_table(SESSIONS)
                .map_err(|e| anyhow!("Failed to create sessions table: {}", e))?;
        }
        write_txn
            .commit()
            .map_err(|e| anyhow!("Failed to commit init: {}", e))?;

        Ok(Self { db, path: db_path })
    }

    /// Get the database file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Store (or replace) a session snapshot
    pub fn store_session(&self, snapshot: &SessionSnapshot) -> Result<()> {
        let key = format!("sessions:{}", snapshot.session_id);
        let value = serde_json::to_vec(snapshot)
            .map_err(|e| anyhow!("Failed to serialize snapshot: {}", e))?;

        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| anyhow!("Failed to begin write: {}", e))?;
        {
            let mut table = write_txn
                .open_table(SESSIONS)
                .map_err(|e| anyhow!("Failed to open sessions table: {}", e))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(|e| anyhow!("Failed to insert snapshot: {}", e))?;
        }
        write_txn
            .commit()
            .map_err(|e| anyhow!("Failed to commit: {}", e))?;

        debug!(
            "Stored snapshot for session {} ({} turns)",
            snapshot.session_id,
            snapshot.turns.len()
        );
        Ok(())
    }

    /// Fetch a session snapshot. An absent key is `Ok(None)` — "no prior
    /// session", not an error. A present but undecodable value is an error.
    pub fn get_session(&self, session_id: &str) -> Result<Option<SessionSnapshot>> {
        let key = format!("sessions:{}", session_id);

        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| anyhow!("Failed to begin read: {}", e))?;
        let table = read_txn
            .open_table(SESSIONS)
            .map_err(|e| anyhow!("Failed to open sessions table: {}", e))?;

        match table
            .get(key.as_str())
            .map_err(|e| anyhow!("Failed to get snapshot: {}", e))?
        {
            Some(value) => {
                let snapshot: SessionSnapshot = serde_json::from_slice(value.value())
                    .map_err(|e| anyhow!("Failed to deserialize snapshot: {}", e))?;
                Ok(Some(snapshot))
            }
            None => Ok(None),
        }
    }

    /// List all stored session snapshots
    pub fn list_sessions(&self) -> Result<Vec<SessionSnapshot>> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| anyhow!("Failed to begin read: {}", e))?;
        let table = read_txn
            .open_table(SESSIONS)
            .map_err(|e| anyhow!("Failed to open sessions table: {}", e))?;

        let mut results = Vec::new();
        let iter = table
            .range::<&str>(..)
            .map_err(|e| anyhow!("Failed to iterate sessions: {}", e))?;
        for entry in iter {
            let (_key, value) = entry.map_err(|e| anyhow!("Failed to read entry: {}", e))?;
            let snapshot: SessionSnapshot = serde_json::from_slice(value.value())
                .map_err(|e| anyhow!("Failed to deserialize snapshot: {}", e))?;
            results.push(snapshot);
        }
        Ok(results)
    }

    /// Delete a session snapshot; returns whether a record was removed
    pub fn delete_session(&self, session_id: &str) -> Result<bool> {
        let key = format!("sessions:{}", session_id);

        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| anyhow!("Failed to begin write: {}", e))?;
        let removed;
        {
            let mut table = write_txn
                .open_table(SESSIONS)
                .map_err(|e| anyhow!("Failed to open sessions table: {}", e))?;
            removed = table
                .remove(key.as_str())
                .map_err(|e| anyhow!("Failed to remove snapshot: {}", e))?
                .is_some();
        }
        write_txn
            .commit()
            .map_err(|e| anyhow!("Failed to commit delete: {}", e))?;

        if removed {
            debug!("Deleted snapshot for session: {}", session_id);
        }
        Ok(removed)
    }

    /// Prune snapshots whose stage state has been inactive longer than the
    /// given number of days. Returns the number of snapshots deleted.
    pub fn prune_stale_sessions(&self, older_than_days: i64) -> Result<usize> {
        let cutoff = chrono::Utc::now().timestamp() - (older_than_days * 86400);
        let sessions = self.list_sessions()?;

        let mut deleted = 0;
        for snapshot in &sessions {
            if snapshot.stage.last_active < cutoff && self.delete_session(&snapshot.session_id)? {
                deleted += 1;
            }
        }

        if deleted > 0 {
            info!(
                "Pruned {} session snapshots older than {} days",
                deleted, older_than_days
            );
        }
        Ok(deleted)
    }

    /// Store statistics
    pub fn stats(&self) -> Result<SnapshotStats> {
        let sessions = self.list_sessions()?;
        let total_turns = sessions.iter().map(|s| s.turns.len()).sum();

        Ok(SnapshotStats {
            total_sessions: sessions.len(),
            total_turns,
        })
    }
}
