//! ============================================================================
//! Stage Tracker - Conversation-phase inference
//! ============================================================================
//! Evaluated after each completed turn, in priority order: tool-call
//! category mapping first, keyword sets second, otherwise hold the current
//! stage. A tool match beats a conflicting keyword match. The inference is
//! approximate by design; misclassification is acceptable noise.
//! ============================================================================

use once_cell::sync::Lazy;
use serde_json::Value;
use tracing::debug;

use super::types::{ConversationStage, SessionState};
use crate::config::SessionConfig;
use crate::types::ToolCall;

/// Keyword sets per stage, checked in this order over the lowercased input.
/// Farewells come first so "thanks, bye" wins over incidental matches.
static STAGE_KEYWORDS: Lazy<Vec<(ConversationStage, Vec<&'static str>)>> = Lazy::new(|| {
    vec![
        (
            ConversationStage::Idle,
            vec!["goodbye", "bye", "that's all", "see you", "talk later"],
        ),
        (
            ConversationStage::Browsing,
            vec!["search", "find", "looking for", "recommend", "show me", "browse", "what do you have"],
        ),
        (
            ConversationStage::Cart,
            vec!["cart", "basket"],
        ),
        (
            ConversationStage::Checkout,
            vec!["buy", "purchase", "checkout", "place an order", "place the order", "pay"],
        ),
        (
            ConversationStage::Tracking,
            vec!["order status", "shipping", "delivery", "track", "package", "where is my order"],
        ),
        (
            ConversationStage::Service,
            vec!["return", "refund", "exchange", "complaint", "support", "customer service"],
        ),
    ]
});

/// Map a tool name to its stage category
fn stage_for_tool(name: &str) -> Option<ConversationStage> {
    if name.contains("search_products") {
        Some(ConversationStage::Browsing)
    } else if name.contains("get_product_detail") {
        Some(ConversationStage::Selecting)
    } else if matches!(name, "add_to_cart" | "view_cart" | "remove_from_cart" | "update_cart_item") {
        Some(ConversationStage::Cart)
    } else if name.contains("create_order") {
        Some(ConversationStage::Checkout)
    } else if matches!(name, "process_payment" | "get_order_detail" | "track_shipment") {
        Some(ConversationStage::Tracking)
    } else if matches!(name, "create_support_ticket" | "process_return") {
        Some(ConversationStage::Service)
    } else {
        None
    }
}

/// Per-session conversation-phase tracker
pub struct StageTracker {
    state: SessionState,
    session: SessionConfig,
}

impl StageTracker {
    pub fn new(session_id: impl Into<String>, session: SessionConfig) -> Self {
        Self {
            state: SessionState::new(session_id),
            session,
        }
    }

    pub fn stage(&self) -> ConversationStage {
        self.state.stage
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Replace the tracked state wholesale (snapshot restore)
    pub fn set_state(&mut self, state: SessionState) {
        self.state = state;
    }

    /// Reset to a fresh greeting-stage session with the same id
    pub fn reset(&mut self) {
        self.state = SessionState::new(self.state.session_id.clone());
    }

    pub fn mark_priority_customer(&mut self, is_priority: bool) {
        self.state.user_context.is_priority_customer = is_priority;
    }

    /// Process a completed turn: infer the stage, record the intent, and
    /// opportunistically update the user context from tool outputs.
    pub fn observe_turn(&mut self, user_input: &str, tool_calls: &[ToolCall]) {
        let (inferred, reason) = self.infer_stage(user_input, tool_calls);

        if inferred != self.state.stage {
            self.state.update_stage(inferred, reason);
        } else {
            self.state.touch();
        }
        self.state.add_intent(inferred.as_str());

        self.extract_user_context(tool_calls);
    }

    /// Priority order: tool categories, then keywords, then hold. Never
    /// regresses to Idle just because a turn was ambiguous.
    fn infer_stage(
        &self,
        user_input: &str,
        tool_calls: &[ToolCall],
    ) -> (ConversationStage, &'static str) {
        for call in tool_calls {
            if let Some(stage) = stage_for_tool(&call.name) {
                return (stage, "tool category");
            }
        }

        let input_lower = user_input.to_lowercase();
        for (stage, keywords) in STAGE_KEYWORDS.iter() {
            if keywords.iter().any(|kw| input_lower.contains(kw)) {
                return (*stage, "keyword match");
            }
        }

        (self.state.stage, "no signal, holding stage")
    }

    /// Pull user-context facts out of tool outputs. Unparsable outputs are
    /// skipped; the affected fields keep their previous values.
    fn extract_user_context(&mut self, tool_calls: &[ToolCall]) {
        for call in tool_calls {
            match call.name.as_str() {
                "view_cart" => {
                    if let Some(count) = serde_json::from_str::<Value>(&call.output)
                        .ok()
                        .as_ref()
                        .and_then(|v| v.get("items"))
                        .and_then(|items| items.as_array())
                        .map(|items| items.len())
                    {
                        self.state.user_context.cart_item_count = count;
                        debug!("Cart count updated to {}", count);
                    }
                }
                "create_order" => {
                    if let Some(order_id) = serde_json::from_str::<Value>(&call.output)
                        .ok()
                        .as_ref()
                        .and_then(|v| v.get("order"))
                        .and_then(|order| order.get("order_id"))
                        .and_then(value_to_id)
                    {
                        debug!("Recent order updated to {}", order_id);
                        self.state.current_order = Some(order_id.clone());
                        self.state.user_context.recent_order_id = Some(order_id);
                    }
                }
                "get_product_detail" => {
                    if let Some(product_id) = call.input.get("product_id").and_then(value_to_id) {
                        self.state.add_viewed_item(product_id);
                    }
                }
                _ => {}
            }
        }
    }

    /// Caller-triggered timeout check: with a nonzero `session.timeout`,
    /// inactivity beyond it drops the stage to Idle. Returns whether the
    /// transition happened.
    pub fn check_timeout(&mut self) -> bool {
        if self.session.timeout == 0 || self.state.stage == ConversationStage::Idle {
            return false;
        }

        let elapsed = chrono::Utc::now().timestamp() - self.state.last_active;
        if elapsed > self.session.timeout as i64 {
            self.state
                .update_stage(ConversationStage::Idle, "session timeout");
            return true;
        }
        false
    }

    /// One-line summary of the current state for prompt injection
    pub fn context_summary(&self) -> String {
        let mut parts = vec![format!("stage: {}", self.state.stage)];

        if self.state.user_context.is_priority_customer {
            parts.push("priority customer".to_string());
        }
        if self.state.user_context.cart_item_count > 0 {
            parts.push(format!("cart: {} items", self.state.user_context.cart_item_count));
        }
        if let Some(order) = &self.state.current_order {
            parts.push(format!("order #{}", order));
        }
        if !self.state.user_context.viewed_items.is_empty() {
            parts.push(format!(
                "viewed: {} items",
                self.state.user_context.viewed_items.len()
            ));
        }

        parts.join(" | ")
    }
}

/// Accept order/product ids as either JSON strings or numbers
fn value_to_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tracker() -> StageTracker {
        StageTracker::new("session-1", SessionConfig::default())
    }

    #[test]
    fn test_tool_call_drives_stage() {
        let mut tracker = tracker();
        assert_eq!(tracker.stage(), ConversationStage::Greeting);

        tracker.observe_turn("anything nice?", &[ToolCall::named("search_products")]);
        assert_eq!(tracker.stage(), ConversationStage::Browsing);
    }

    #[test]
    fn test_ambiguous_turn_holds_stage() {
        let mut tracker = tracker();
        tracker.observe_turn("", &[ToolCall::named("search_products")]);
        assert_eq!(tracker.stage(), ConversationStage::Browsing);

        // No tool, no keyword: stays in browsing, no regression to idle
        tracker.observe_turn("hmm, interesting", &[]);
        assert_eq!(tracker.stage(), ConversationStage::Browsing);
    }

    #[test]
    fn test_tool_match_beats_conflicting_keyword() {
        let mut tracker = tracker();
        // Input says "return" (service) but the tool is a cart mutation
        tracker.observe_turn(
            "actually, return that to my cart",
            &[ToolCall::named("add_to_cart")],
        );
        assert_eq!(tracker.stage(), ConversationStage::Cart);
    }

    #[test]
    fn test_keyword_transitions() {
        let mut tracker = tracker();

        tracker.observe_turn("I'm looking for running shoes", &[]);
        assert_eq!(tracker.stage(), ConversationStage::Browsing);

        tracker.observe_turn("put it in my cart", &[]);
        assert_eq!(tracker.stage(), ConversationStage::Cart);

        tracker.observe_turn("I want to pay now", &[]);
        assert_eq!(tracker.stage(), ConversationStage::Checkout);

        tracker.observe_turn("when is the delivery?", &[]);
        assert_eq!(tracker.stage(), ConversationStage::Tracking);

        tracker.observe_turn("I'd like a refund", &[]);
        assert_eq!(tracker.stage(), ConversationStage::Service);
    }

    #[test]
    fn test_farewell_reaches_idle() {
        let mut tracker = tracker();
        tracker.observe_turn("show me headphones", &[]);
        tracker.observe_turn("thanks, bye!", &[]);
        assert_eq!(tracker.stage(), ConversationStage::Idle);
    }

    #[test]
    fn test_intent_history_records_inferred_stages() {
        let mut tracker = tracker();
        tracker.observe_turn("show me shoes", &[]);
        tracker.observe_turn("hmm", &[]);

        assert_eq!(tracker.state().intent_history, vec!["browsing", "browsing"]);
    }

    #[test]
    fn test_user_context_extraction() {
        let mut tracker = tracker();

        let calls = vec![
            ToolCall::new(
                "get_product_detail",
                json!({"product_id": 42}),
                r#"{"product": {"name": "grinder"}}"#,
            ),
            ToolCall::new(
                "view_cart",
                Value::Null,
                r#"{"items": [{"id": 1}, {"id": 2}]}"#,
            ),
            ToolCall::new(
                "create_order",
                Value::Null,
                r#"{"order": {"order_id": "ORD-20260807-001"}}"#,
            ),
        ];
        tracker.observe_turn("buy it", &calls);

        let state = tracker.state();
        assert_eq!(state.user_context.cart_item_count, 2);
        assert_eq!(state.user_context.last_viewed_item.as_deref(), Some("42"));
        assert_eq!(
            state.user_context.recent_order_id.as_deref(),
            Some("ORD-20260807-001")
        );
        assert_eq!(state.current_order.as_deref(), Some("ORD-20260807-001"));
    }

    #[test]
    fn test_junk_tool_output_is_non_fatal() {
        let mut tracker = tracker();
        tracker.observe_turn(
            "checking my cart",
            &[ToolCall::new("view_cart", Value::Null, "<html>502 Bad Gateway</html>")],
        );

        // Field unchanged, stage still inferred from the tool name
        assert_eq!(tracker.state().user_context.cart_item_count, 0);
        assert_eq!(tracker.stage(), ConversationStage::Cart);
    }

    #[test]
    fn test_timeout_drops_to_idle() {
        let mut tracker = StageTracker::new(
            "s",
            SessionConfig {
                timeout: 60,
                ..SessionConfig::default()
            },
        );
        tracker.observe_turn("show me shoes", &[]);

        // Fresh activity: no timeout
        assert!(!tracker.check_timeout());

        tracker.state.last_active = chrono::Utc::now().timestamp() - 3600;
        assert!(tracker.check_timeout());
        assert_eq!(tracker.stage(), ConversationStage::Idle);

        // Already idle: no repeated transition
        assert!(!tracker.check_timeout());
    }

    #[test]
    fn test_zero_timeout_never_idles() {
        let mut tracker = tracker();
        tracker.state.last_active = 0;
        assert!(!tracker.check_timeout());
        assert_eq!(tracker.stage(), ConversationStage::Greeting);
    }

    #[test]
    fn test_context_summary() {
        let mut tracker = tracker();
        tracker.mark_priority_customer(true);
        tracker.observe_turn(
            "order it",
            &[ToolCall::new(
                "create_order",
                Value::Null,
                r#"{"order": {"order_id": 1007}}"#,
            )],
        );

        let summary = tracker.context_summary();
        assert!(summary.starts_with("stage: checkout"));
        assert!(summary.contains("priority customer"));
        assert!(summary.contains("order #1007"));
    }
}
