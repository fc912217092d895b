//! ============================================================================
//! Memory Module - Session memory and retrieval for Concierge
//! ============================================================================
//! Retains prior turns, decides which are relevant to the current turn, and
//! compresses long histories into bounded-size digests.
//!
//! ## Features
//! - Append-only retention store with strict FIFO eviction
//! - Optional in-process similarity index for relevance-ranked retrieval
//! - Rule-based and model-assisted digest strategies with mandatory fallback
//! - Durable session snapshots (turns + stage state)
//!
//! ## Architecture
//! ```text
//! Current Input → MemoryManager → [recent window | similarity ranking]
//!                                              ↓
//!                              formatted digest block for the prompt
//!                                              ↓
//!                 caller reasons externally, reports the completed turn
//!                                              ↓
//!                    Summarizer digest → RetentionStore (+ index)
//! ```
//!
//! ## Usage
//! ```rust,ignore
//! use concierge_core::config::MemoryConfig;
//! use concierge_core::memory::MemoryManager;
//!
//! let config = MemoryConfig::load()?;
//! let mut memory = MemoryManager::new(config, "session-1", None, None)?;
//!
//! let context = memory.context_for_query("any wireless headphones?").await;
//! // ... run reasoning externally, then report the turn back:
//! memory.record_turn("any wireless headphones?", "Found three.", vec![]).await;
//! ```
//! ============================================================================

mod index;
mod manager;
mod store;
mod summarizer;
mod types;

// Re-export public types
pub use index::{cosine_similarity, SimilarityIndex};
pub use manager::MemoryManager;
pub use store::RetentionStore;
pub use summarizer::{
    format_digest, ModelAssistedSummarizer, RuleBasedSummarizer, SummaryPolicy, Summarizer,
};
pub use types::{ScoredTurn, TurnRecord};
