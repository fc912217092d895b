//! ============================================================================
//! Memory Types - Turn records and retrieval results
//! ============================================================================
//! The turn record is the atomic unit of memory: one user-input/response
//! exchange with its tool invocations, digest, and optional embedding.
//! ============================================================================

use serde::{Deserialize, Serialize};

use crate::types::ToolCall;

/// A single completed conversation turn, immutable once recorded
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TurnRecord {
    /// Monotonic index within the session; strictly increasing, survives
    /// eviction of older turns
    pub turn_index: u64,
    /// Unix timestamp when the turn was recorded
    pub timestamp: i64,
    pub user_input: String,
    pub agent_response: String,
    /// Tool invocations made while producing the response, in order
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    /// Bounded-length digest used for context injection
    pub summary: String,
    /// Vector embedding of the turn (omitted from outward JSON when absent)
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub embedding: Option<Vec<f32>>,
}

impl TurnRecord {
    /// Create a turn record; the digest is filled in by the facade before
    /// the record is appended.
    pub fn new(
        turn_index: u64,
        user_input: String,
        agent_response: String,
        tool_calls: Vec<ToolCall>,
    ) -> Self {
        Self {
            turn_index,
            timestamp: chrono::Utc::now().timestamp(),
            user_input,
            agent_response,
            tool_calls,
            summary: String::new(),
            embedding: None,
        }
    }

    /// Attach a pre-computed embedding
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Names of the tools invoked during this turn, in call order
    pub fn tool_names(&self) -> Vec<&str> {
        self.tool_calls.iter().map(|c| c.name.as_str()).collect()
    }

    /// Combined input+response length in bytes, used by the threshold
    /// summary trigger
    pub fn text_len(&self) -> usize {
        self.user_input.len() + self.agent_response.len()
    }
}

/// One retrieval hit: a turn reference with its relevance to the query.
/// Recomputed per query, never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredTurn {
    pub turn_index: u64,
    pub summary: String,
    /// Cosine similarity in similarity mode; recency rank (0 = most recent)
    /// mapped to a descending score in recent mode
    pub score: f32,
}
