//! ============================================================================
//! Core Types for the Concierge Memory Engine
//! ============================================================================
//! Defines the tool-call record shared by the memory and stage modules, and
//! the public error taxonomy for the memory subsystem.
//! ============================================================================

use serde::{Deserialize, Serialize};

/// A single tool invocation made while producing a turn's response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    /// Tool name as invoked (e.g. "search_products", "create_order")
    pub name: String,
    /// Structured input the tool was called with
    #[serde(default)]
    pub input: serde_json::Value,
    /// Raw tool output (observation), usually JSON text
    #[serde(default)]
    pub output: String,
}

impl ToolCall {
    /// Create a tool call with no input payload
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            input: serde_json::Value::Null,
            output: String::new(),
        }
    }

    /// Create a tool call with input and output attached
    pub fn new(name: impl Into<String>, input: serde_json::Value, output: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            input,
            output: output.into(),
        }
    }
}

/// Error types for the memory subsystem.
///
/// Conversation-facing operations (`record_turn`, context retrieval) never
/// return these; failures there degrade to a simpler strategy instead.
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
pub enum MemoryError {
    /// Malformed or conflicting configuration. Fatal at construction.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An external capability (embedding, text generation) is missing or
    /// erroring. Recovered internally by degrading; logged, not surfaced.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// A snapshot could not be read, written, or decoded.
    #[error("persistence error: {0}")]
    Persistence(String),
}
