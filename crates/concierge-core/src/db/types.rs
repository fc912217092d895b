//! ============================================================================
//! Snapshot Types - Serializable records for redb storage
//! ============================================================================

use serde::{Deserialize, Serialize};

use crate::memory::TurnRecord;
use crate::stage::SessionState;

/// Durable snapshot of one session: retained turns plus stage state.
/// Stored keyed by session id; one record per session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    /// Retained turns, oldest-first, with digests and embeddings
    pub turns: Vec<TurnRecord>,
    pub stage: SessionState,
    /// Unix timestamp when the snapshot was written
    pub saved_at: i64,
}

impl SessionSnapshot {
    pub fn new(session_id: impl Into<String>, turns: Vec<TurnRecord>, stage: SessionState) -> Self {
        Self {
            session_id: session_id.into(),
            turns,
            stage,
            saved_at: chrono::Utc::now().timestamp(),
        }
    }
}

/// Snapshot store statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotStats {
    pub total_sessions: usize,
    pub total_turns: usize,
}
