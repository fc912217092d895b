//! ============================================================================
//! CONCIERGE-CORE: The Assistant's Memory
//! ============================================================================
//! This crate implements the memory-and-retrieval engine for the Concierge
//! shopping assistant:
//! - Bounded session memory with rule-based and model-assisted digests
//! - Recency and similarity retrieval behind one configurable facade
//! - Conversation-stage state machine driving prompt/behavior selection
//! - Durable session snapshots via an embedded redb store
//! ============================================================================

pub mod capabilities;
pub mod config;
pub mod context;
pub mod db;
pub mod memory;
pub mod stage;
pub mod types;

// Re-export main types for convenience
pub use capabilities::{SharedEmbedder, SharedGenerator, TextEmbedder, TextGenerator};
pub use config::MemoryConfig;
pub use context::{AssembledContext, ContextAssembler};
pub use db::{SessionSnapshot, SnapshotStore};
pub use memory::{MemoryManager, TurnRecord};
pub use stage::{ConversationStage, SessionState, StageTracker};
pub use types::{MemoryError, ToolCall};
