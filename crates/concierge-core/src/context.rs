//! ============================================================================
//! Context Assembler - Per-turn entry point for prompt construction
//! ============================================================================
//! Given the current input, returns the conversation stage and a formatted
//! memory digest to inject into the next prompt. The caller runs reasoning
//! externally and reports the completed turn back, which feeds both the
//! memory facade and the stage tracker.
//! ============================================================================

use std::path::Path;
use tracing::debug;

use crate::capabilities::{SharedEmbedder, SharedGenerator};
use crate::config::MemoryConfig;
use crate::memory::MemoryManager;
use crate::stage::{ConversationStage, StageTracker};
use crate::types::{MemoryError, ToolCall};

/// Everything prompt construction needs for the next reasoning step
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledContext {
    pub stage: ConversationStage,
    /// Formatted digest block, empty when there is no history
    pub memory_context: String,
    /// One-line stage/user-context summary
    pub state_summary: String,
}

/// Session-scoped assembler owning the memory facade and stage tracker
pub struct ContextAssembler {
    memory: MemoryManager,
    tracker: StageTracker,
}

impl ContextAssembler {
    pub fn new(
        config: MemoryConfig,
        session_id: impl Into<String>,
        generator: Option<SharedGenerator>,
        embedder: Option<SharedEmbedder>,
    ) -> Result<Self, MemoryError> {
        let session_id = session_id.into();
        let tracker = StageTracker::new(session_id.clone(), config.session.clone());
        let memory = MemoryManager::new(config, session_id, generator, embedder)?;

        Ok(Self { memory, tracker })
    }

    pub fn session_id(&self) -> &str {
        self.memory.session_id()
    }

    pub fn stage(&self) -> ConversationStage {
        self.tracker.stage()
    }

    pub fn memory(&self) -> &MemoryManager {
        &self.memory
    }

    pub fn tracker(&self) -> &StageTracker {
        &self.tracker
    }

    /// Build the context for the turn about to be reasoned over. The
    /// in-flight turn is not yet recorded, so it can never appear in its
    /// own retrieved context.
    pub async fn assemble(&mut self, current_input: &str) -> AssembledContext {
        self.tracker.check_timeout();

        let memory_context = self.memory.context_for_query(current_input).await;
        debug!(
            "Assembled context: stage={}, memory={}B (session={})",
            self.tracker.stage(),
            memory_context.len(),
            self.session_id()
        );

        AssembledContext {
            stage: self.tracker.stage(),
            memory_context,
            state_summary: self.tracker.context_summary(),
        }
    }

    /// Report a completed turn: the stage tracker sees it first, then the
    /// memory facade records it.
    pub async fn complete_turn(
        &mut self,
        user_input: &str,
        agent_response: &str,
        tool_calls: Vec<ToolCall>,
    ) {
        self.tracker.observe_turn(user_input, &tool_calls);
        self.memory
            .record_turn(user_input, agent_response, tool_calls)
            .await;
    }

    /// Persist the session (turns + stage state) to the snapshot store
    pub fn save(&self, path: Option<&Path>) -> Result<(), MemoryError> {
        self.memory.save(path, self.tracker.state())
    }

    /// Restore the session from the snapshot store. Returns false when no
    /// prior session exists; on decode errors current state is untouched.
    pub fn load(&mut self, path: Option<&Path>) -> Result<bool, MemoryError> {
        match self.memory.load(path)? {
            Some(stage) => {
                self.tracker.set_state(stage);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Drop all history and reset the stage machine to Greeting
    pub fn clear(&mut self) {
        self.memory.clear();
        self.tracker.reset();
    }
}
