//! ============================================================================
//! Stage Module - Conversation-phase state machine
//! ============================================================================
//! Infers the current conversation phase from tool-call names and input
//! keywords; consumed by prompt construction to select prompt variants and
//! memory verbosity. One tracker per session.
//! ============================================================================

mod tracker;
mod types;

// Re-export public types
pub use tracker::StageTracker;
pub use types::{
    ConversationStage, SessionState, UserContext, MAX_INTENT_HISTORY, MAX_VIEWED_ITEMS,
};
