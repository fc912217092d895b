//! ============================================================================
//! Summarizer - Turn digests for context injection
//! ============================================================================
//! Two interchangeable strategies behind one capability trait:
//! - rule-based: deterministic one-liner, no external calls, cannot fail
//! - model-assisted: compresses the turn via the injected text generator,
//!   falling back to the rule-based line on timeout, error, or empty output
//!
//! The fallback is mandatory: a recorded turn always ends up with a digest.
//! ============================================================================

use async_trait::async_trait;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

use super::types::TurnRecord;
use crate::capabilities::SharedGenerator;
use crate::config::{SummaryConfig, SummaryTrigger};

/// Characters of user input carried into the rule-based digest
const INPUT_PREFIX_CHARS: usize = 100;

/// Characters of agent response carried into the rule-based digest
const RESPONSE_PREFIX_CHARS: usize = 50;

/// Upper bound on a model-assisted summarization call
const MODEL_SUMMARY_TIMEOUT: Duration = Duration::from_secs(10);

/// Digest strategy contract. `summarize` is infallible: strategies degrade
/// internally rather than propagate.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, turn: &TurnRecord) -> String;
}

/// Deterministic digest from the turn's input prefix, invoked tool names,
/// and response prefix.
pub struct RuleBasedSummarizer;

impl RuleBasedSummarizer {
    /// Pure digest function, usable without an async context.
    /// Shape: `user: <input-prefix>, tools: <t1, t2> -> <response-prefix>`;
    /// the tools segment is omitted for turns without tool calls.
    pub fn digest(turn: &TurnRecord) -> String {
        let input = char_prefix(&turn.user_input, INPUT_PREFIX_CHARS);

        let tools = if turn.tool_calls.is_empty() {
            String::new()
        } else {
            format!(", tools: {}", turn.tool_names().join(", "))
        };

        let mut response = char_prefix(&turn.agent_response, RESPONSE_PREFIX_CHARS);
        if turn.agent_response.chars().count() > RESPONSE_PREFIX_CHARS {
            response.push_str("...");
        }

        format!("user: {}{} -> {}", input, tools, response)
    }
}

#[async_trait]
impl Summarizer for RuleBasedSummarizer {
    async fn summarize(&self, turn: &TurnRecord) -> String {
        Self::digest(turn)
    }
}

/// Digest via the injected text generator, bounded by a timeout and a
/// character budget, with the rule-based line as the mandatory fallback.
pub struct ModelAssistedSummarizer {
    generator: SharedGenerator,
    max_chars: usize,
}

impl ModelAssistedSummarizer {
    pub fn new(generator: SharedGenerator, max_chars: usize) -> Self {
        Self {
            generator,
            max_chars,
        }
    }

    fn build_prompt(&self, turn: &TurnRecord) -> String {
        format!(
            "Compress the following exchange into a single-line summary of at \
             most {} characters. Keep product names, order ids, and decisions.\n\n\
             User: {}\nAssistant: {}\n\nSummary:",
            self.max_chars, turn.user_input, turn.agent_response
        )
    }
}

#[async_trait]
impl Summarizer for ModelAssistedSummarizer {
    async fn summarize(&self, turn: &TurnRecord) -> String {
        let prompt = self.build_prompt(turn);

        match timeout(MODEL_SUMMARY_TIMEOUT, self.generator.generate(&prompt)).await {
            Ok(Ok(text)) => {
                let text = text.trim();
                if text.is_empty() {
                    warn!(
                        "Model summary for turn #{} came back empty, using rule-based digest",
                        turn.turn_index
                    );
                    return RuleBasedSummarizer::digest(turn);
                }
                debug!("Model summary for turn #{}: {} chars", turn.turn_index, text.len());
                char_prefix(text, self.max_chars)
            }
            Ok(Err(e)) => {
                warn!(
                    "Model summary for turn #{} failed ({}), using rule-based digest",
                    turn.turn_index, e
                );
                RuleBasedSummarizer::digest(turn)
            }
            Err(_) => {
                warn!(
                    "Model summary for turn #{} timed out after {:?}, using rule-based digest",
                    turn.turn_index, MODEL_SUMMARY_TIMEOUT
                );
                RuleBasedSummarizer::digest(turn)
            }
        }
    }
}

/// Format an ordered digest list into the block injected into the prompt.
/// At most the `limit` most recent entries are included.
pub fn format_digest(digests: &[String], limit: usize) -> String {
    if digests.is_empty() || limit == 0 {
        return String::new();
    }

    let skip = digests.len().saturating_sub(limit);
    let mut lines = vec!["# Conversation history".to_string()];
    for (i, digest) in digests.iter().skip(skip).enumerate() {
        lines.push(format!("{}. {}", i + 1, digest));
    }

    lines.join("\n")
}

/// Tracks when the model-assisted path should run. The rule-based digest is
/// always computed at record time; this policy only gates the expensive
/// strategy.
#[derive(Debug)]
pub struct SummaryPolicy {
    config: SummaryConfig,
    turns_since_summary: usize,
    text_since_summary: usize,
}

impl SummaryPolicy {
    pub fn new(config: SummaryConfig) -> Self {
        Self {
            config,
            turns_since_summary: 0,
            text_since_summary: 0,
        }
    }

    /// Observe a turn about to be recorded and decide whether the model
    /// path should run for it. Counters reset when the policy fires.
    pub fn should_summarize(&mut self, turn: &TurnRecord) -> bool {
        match self.config.trigger {
            SummaryTrigger::Always => true,
            SummaryTrigger::Manual => false,
            SummaryTrigger::Threshold => {
                self.turns_since_summary += 1;
                self.text_since_summary += turn.text_len();

                let fire = self.turns_since_summary >= self.config.turns_threshold
                    || self.text_since_summary >= self.config.text_length_threshold;
                if fire {
                    self.turns_since_summary = 0;
                    self.text_since_summary = 0;
                }
                fire
            }
        }
    }

    pub fn reset(&mut self) {
        self.turns_since_summary = 0;
        self.text_since_summary = 0;
    }
}

/// Char-boundary-safe prefix
fn char_prefix(s: &str, n: usize) -> String {
    s.chars().take(n).collect()
}
