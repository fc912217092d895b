//! ============================================================================
//! Stage Types - Conversation phases and per-session user context
//! ============================================================================
//! The stage enumeration is terminal-free: the machine never halts, it
//! idles. Stage state is mutated after every completed turn and never
//! rolled back.
//! ============================================================================

use serde::{Deserialize, Serialize};
use tracing::info;

/// Bounded length of the inferred-intent history
pub const MAX_INTENT_HISTORY: usize = 10;

/// Bounded length of the viewed-items list
pub const MAX_VIEWED_ITEMS: usize = 5;

/// Inferred phase of a shopping conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStage {
    /// Initial greeting; the stage every session starts in
    #[default]
    Greeting,
    /// Browsing the catalog
    Browsing,
    /// Examining a specific item
    Selecting,
    /// Cart management
    Cart,
    /// Placing an order
    Checkout,
    /// Order and shipment tracking
    Tracking,
    /// After-sales service
    Service,
    /// Inactive; reached only via farewell keywords or timeout
    Idle,
}

impl ConversationStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationStage::Greeting => "greeting",
            ConversationStage::Browsing => "browsing",
            ConversationStage::Selecting => "selecting",
            ConversationStage::Cart => "cart",
            ConversationStage::Checkout => "checkout",
            ConversationStage::Tracking => "tracking",
            ConversationStage::Service => "service",
            ConversationStage::Idle => "idle",
        }
    }
}

impl std::fmt::Display for ConversationStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ConversationStage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "greeting" => Ok(ConversationStage::Greeting),
            "browsing" => Ok(ConversationStage::Browsing),
            "selecting" => Ok(ConversationStage::Selecting),
            "cart" => Ok(ConversationStage::Cart),
            "checkout" => Ok(ConversationStage::Checkout),
            "tracking" => Ok(ConversationStage::Tracking),
            "service" => Ok(ConversationStage::Service),
            "idle" => Ok(ConversationStage::Idle),
            _ => Err(format!("Unknown conversation stage: {}", s)),
        }
    }
}

/// Opportunistically extracted facts about the user, updated from tool
/// outputs as the conversation progresses
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserContext {
    pub is_priority_customer: bool,
    /// Item count of the active cart, from the last cart view
    pub cart_item_count: usize,
    /// The item most recently examined in detail
    pub last_viewed_item: Option<String>,
    /// Recently viewed items, most recent last
    #[serde(default)]
    pub viewed_items: Vec<String>,
    /// The most recently created order
    pub recent_order_id: Option<String>,
}

/// Per-session stage state; one instance per session, owned by the tracker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: String,
    pub stage: ConversationStage,
    pub user_context: UserContext,
    /// Item currently under discussion
    pub current_item: Option<String>,
    /// Order currently under discussion
    pub current_order: Option<String>,
    /// Inferred intents, most recent last, bounded
    #[serde(default)]
    pub intent_history: Vec<String>,
    pub created_at: i64,
    pub last_active: i64,
}

impl SessionState {
    pub fn new(session_id: impl Into<String>) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            session_id: session_id.into(),
            stage: ConversationStage::Greeting,
            user_context: UserContext::default(),
            current_item: None,
            current_order: None,
            intent_history: Vec::new(),
            created_at: now,
            last_active: now,
        }
    }

    /// Transition to a new stage, logging the change
    pub fn update_stage(&mut self, new_stage: ConversationStage, reason: &str) {
        let old_stage = self.stage;
        self.stage = new_stage;
        self.touch();
        info!(
            "Stage change: {} -> {} (session={}, reason={})",
            old_stage, new_stage, self.session_id, reason
        );
    }

    /// Record an inferred intent, keeping only the most recent entries
    pub fn add_intent(&mut self, intent: impl Into<String>) {
        self.intent_history.push(intent.into());
        if self.intent_history.len() > MAX_INTENT_HISTORY {
            let excess = self.intent_history.len() - MAX_INTENT_HISTORY;
            self.intent_history.drain(..excess);
        }
        self.touch();
    }

    /// Record a viewed item in the user context, deduplicated and bounded
    pub fn add_viewed_item(&mut self, item: impl Into<String>) {
        let item = item.into();
        if !self.user_context.viewed_items.contains(&item) {
            self.user_context.viewed_items.push(item.clone());
            if self.user_context.viewed_items.len() > MAX_VIEWED_ITEMS {
                let excess = self.user_context.viewed_items.len() - MAX_VIEWED_ITEMS;
                self.user_context.viewed_items.drain(..excess);
            }
        }
        self.user_context.last_viewed_item = Some(item.clone());
        self.current_item = Some(item);
    }

    pub fn touch(&mut self) {
        self.last_active = chrono::Utc::now().timestamp();
    }
}
