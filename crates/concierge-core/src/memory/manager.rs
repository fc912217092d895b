//! ============================================================================
//! Memory Manager - Unified facade over retention and similarity backends
//! ============================================================================
//! Owns one session's turn history. The backend and retrieval strategy are
//! resolved once at construction from configuration; switching modes means
//! constructing a new manager. External-capability failures degrade to the
//! simpler strategy and are never surfaced through the recording or
//! retrieval paths.
//! ============================================================================

use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, warn};

use super::index::SimilarityIndex;
use super::store::RetentionStore;
use super::summarizer::{
    format_digest, ModelAssistedSummarizer, RuleBasedSummarizer, SummaryPolicy, Summarizer,
};
use super::types::{ScoredTurn, TurnRecord};
use crate::capabilities::{SharedEmbedder, SharedGenerator};
use crate::config::{BackendKind, MemoryConfig, RetrievalMode};
use crate::db::{SessionSnapshot, SnapshotStore};
use crate::stage::SessionState;
use crate::types::{MemoryError, ToolCall};

/// Storage backend resolved at construction
enum Backend {
    /// Retention store only
    Basic,
    /// Retention store plus similarity index
    Vector(SimilarityIndex),
}

/// Per-session memory facade
pub struct MemoryManager {
    config: MemoryConfig,
    session_id: String,
    store: RetentionStore,
    backend: Backend,
    model_summarizer: Option<ModelAssistedSummarizer>,
    summary_policy: SummaryPolicy,
    context_cache: HashMap<String, String>,
    created_at: i64,
    last_active_at: i64,
}

impl MemoryManager {
    /// Construct a manager for one session. Configuration is validated here;
    /// a vector backend without an embedding capability degrades to basic
    /// retention (logged once, never retried per query).
    pub fn new(
        config: MemoryConfig,
        session_id: impl Into<String>,
        generator: Option<SharedGenerator>,
        embedder: Option<SharedEmbedder>,
    ) -> Result<Self, MemoryError> {
        config.validate()?;
        let session_id = session_id.into();

        let backend = match config.backend {
            BackendKind::Vector => match embedder {
                Some(embedder) => {
                    debug!("Memory backend: vector (similarity index enabled)");
                    Backend::Vector(SimilarityIndex::new(embedder))
                }
                None => {
                    warn!(
                        "Vector backend configured but no embedding capability provided, \
                         degrading to basic retention (session={})",
                        session_id
                    );
                    Backend::Basic
                }
            },
            BackendKind::Basic => Backend::Basic,
        };

        let model_summarizer = if config.enable_llm_summary {
            match generator {
                Some(generator) => Some(ModelAssistedSummarizer::new(
                    generator,
                    config.summary.max_summary_length,
                )),
                None => {
                    warn!(
                        "LLM summaries enabled but no text-generation capability provided, \
                         using rule-based digests (session={})",
                        session_id
                    );
                    None
                }
            }
        } else {
            None
        };

        let now = chrono::Utc::now().timestamp();
        info!(
            "Memory initialized: session={}, max_history={}, mode={:?}",
            session_id, config.max_history, config.retrieval_mode
        );

        Ok(Self {
            store: RetentionStore::new(config.max_history),
            summary_policy: SummaryPolicy::new(config.summary.clone()),
            config,
            session_id,
            backend,
            model_summarizer,
            context_cache: HashMap::new(),
            created_at: now,
            last_active_at: now,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn created_at(&self) -> i64 {
        self.created_at
    }

    pub fn last_active_at(&self) -> i64 {
        self.last_active_at
    }

    pub fn turn_count(&self) -> usize {
        self.store.len()
    }

    /// Record a completed turn. Always succeeds from the caller's point of
    /// view: summarization degrades to the rule-based digest and embedding
    /// failures store the turn without an embedding.
    ///
    /// Callers must report each logical turn exactly once; duplicates are
    /// not detected.
    pub async fn record_turn(
        &mut self,
        user_input: &str,
        agent_response: &str,
        tool_calls: Vec<ToolCall>,
    ) {
        if !self.config.enabled {
            debug!("Memory disabled, discarding turn (session={})", self.session_id);
            return;
        }

        let mut turn = TurnRecord::new(
            self.store.next_index(),
            user_input.to_string(),
            agent_response.to_string(),
            tool_calls,
        );

        // Rule-based digest is always available; the model-assisted path
        // replaces it when the trigger policy fires (and falls back
        // internally on any failure).
        let fire = self.summary_policy.should_summarize(&turn);
        turn.summary = match (&self.model_summarizer, fire) {
            (Some(summarizer), true) => summarizer.summarize(&turn).await,
            _ => RuleBasedSummarizer::digest(&turn),
        };

        if let Backend::Vector(index) = &mut self.backend {
            let text = format!("{}\n{}", turn.user_input, turn.agent_response);
            match index.embed(&text).await {
                Ok(embedding) => {
                    index.index(turn.turn_index, embedding.clone());
                    turn.embedding = Some(embedding);
                }
                Err(e) => {
                    warn!(
                        "Embedding failed for turn #{} ({}), stored without embedding",
                        turn.turn_index, e
                    );
                }
            }
        }

        let index = self.store.append(turn);

        // Keep the similarity index aligned with retention eviction
        if let (Backend::Vector(sim), Some(oldest)) = (&mut self.backend, self.store.oldest_index())
        {
            sim.remove_below(oldest);
        }

        self.last_active_at = chrono::Utc::now().timestamp();
        self.context_cache.clear();

        info!(
            "Recorded turn #{}: input={}B, response={}B, tools={} (session={})",
            index,
            user_input.len(),
            agent_response.len(),
            self.store.latest().map(|t| t.tool_calls.len()).unwrap_or(0),
            self.session_id
        );
    }

    /// Retrieve the turns relevant to `query` as scored references.
    /// Similarity mode embeds the query and ranks; an embedding failure (or
    /// an empty query) degrades that call to the recency window. Recomputed
    /// per call, never persisted.
    pub async fn retrieve(&self, query: &str) -> Vec<ScoredTurn> {
        if !self.config.enabled || self.store.is_empty() {
            return Vec::new();
        }

        if self.config.retrieval_mode == RetrievalMode::Similarity && !query.is_empty() {
            if let Backend::Vector(index) = &self.backend {
                match index
                    .query(
                        query,
                        self.config.max_similarity_results,
                        self.config.similarity_threshold,
                    )
                    .await
                {
                    Ok(hits) => {
                        return hits
                            .into_iter()
                            .filter_map(|(turn_index, score)| {
                                self.store.get(turn_index).map(|turn| ScoredTurn {
                                    turn_index,
                                    summary: turn.summary.clone(),
                                    score,
                                })
                            })
                            .collect();
                    }
                    Err(e) => {
                        warn!("Similarity query failed ({}), serving recency window", e);
                    }
                }
            }
        }

        self.recent_scored()
    }

    /// Recency window as scored turns, oldest-first; the score encodes the
    /// recency weight so more recent turns score higher.
    fn recent_scored(&self) -> Vec<ScoredTurn> {
        let window: Vec<&TurnRecord> = self.store.recent(self.config.max_recent_turns).collect();
        let n = window.len() as f32;
        window
            .into_iter()
            .enumerate()
            .map(|(i, turn)| ScoredTurn {
                turn_index: turn.turn_index,
                summary: turn.summary.clone(),
                score: (i as f32 + 1.0) / n,
            })
            .collect()
    }

    /// Formatted digest block for prompt injection, or an empty string when
    /// there is no history. Uses the recency window.
    pub async fn context_for_prompt(&mut self) -> String {
        self.context_for_query("").await
    }

    /// Formatted digest block relevant to `query` (similarity mode ranks
    /// against it; recent mode ignores it). Results are cached until the
    /// next mutation when the cache is enabled.
    pub async fn context_for_query(&mut self, query: &str) -> String {
        if !self.config.enabled {
            return String::new();
        }

        let cache_enabled = self.config.performance.enable_cache;
        if cache_enabled {
            if let Some(hit) = self.context_cache.get(query) {
                debug!("Context cache hit (session={})", self.session_id);
                return hit.clone();
            }
        }

        let scored = self.retrieve(query).await;
        let digests: Vec<String> = scored.into_iter().map(|s| s.summary).collect();
        let limit = match self.config.retrieval_mode {
            RetrievalMode::Recent => self.config.max_recent_turns,
            RetrievalMode::Similarity => self.config.max_similarity_results,
        };
        let block = format_digest(&digests, limit);

        if cache_enabled {
            if self.context_cache.len() >= self.config.performance.cache_size {
                self.context_cache.clear();
            }
            self.context_cache.insert(query.to_string(), block.clone());
        }

        block
    }

    /// Read-only view of the retained turns, oldest-first
    pub fn full_history(&self) -> Vec<TurnRecord> {
        self.store.all().cloned().collect()
    }

    /// Recompute the digest of the most recent turn (the manual trigger
    /// path). Uses the model-assisted strategy when available.
    pub async fn resummarize_latest(&mut self) {
        let Some(turn) = self.store.latest().cloned() else {
            return;
        };

        let digest = match &self.model_summarizer {
            Some(summarizer) => summarizer.summarize(&turn).await,
            None => RuleBasedSummarizer::digest(&turn),
        };
        self.store.set_latest_summary(digest);
        self.context_cache.clear();
    }

    /// Drop all retained turns and cached context. Turn indices keep
    /// increasing for the lifetime of the session.
    pub fn clear(&mut self) {
        self.store.clear();
        if let Backend::Vector(index) = &mut self.backend {
            index.clear();
        }
        self.context_cache.clear();
        self.summary_policy.reset();
        info!("Cleared memory (session={})", self.session_id);
    }

    /// Persist the session (turns plus the given stage state) to the
    /// snapshot store at `path` (None = default store location).
    pub fn save(&self, path: Option<&Path>, stage: &SessionState) -> Result<(), MemoryError> {
        let store = SnapshotStore::open(path).map_err(|e| MemoryError::Persistence(e.to_string()))?;
        let snapshot =
            SessionSnapshot::new(self.session_id.clone(), self.full_history(), stage.clone());
        store
            .store_session(&snapshot)
            .map_err(|e| MemoryError::Persistence(e.to_string()))?;

        info!(
            "Saved session {} ({} turns) to {}",
            self.session_id,
            snapshot.turns.len(),
            store.path().display()
        );
        Ok(())
    }

    /// Load this session's snapshot from `path`, fully replacing in-memory
    /// state. Returns the restored stage state for the caller's tracker, or
    /// `None` when no prior session exists. On any persistence or decode
    /// error the in-memory state is left untouched.
    pub fn load(&mut self, path: Option<&Path>) -> Result<Option<SessionState>, MemoryError> {
        let store = SnapshotStore::open(path).map_err(|e| MemoryError::Persistence(e.to_string()))?;
        let snapshot = store
            .get_session(&self.session_id)
            .map_err(|e| MemoryError::Persistence(e.to_string()))?;

        let Some(snapshot) = snapshot else {
            info!("No prior session snapshot for {}", self.session_id);
            return Ok(None);
        };

        // Decode succeeded: replace state wholesale
        if let Backend::Vector(index) = &mut self.backend {
            index.clear();
            for turn in &snapshot.turns {
                if let Some(embedding) = &turn.embedding {
                    index.index(turn.turn_index, embedding.clone());
                }
            }
        }
        self.store.restore(snapshot.turns);
        self.context_cache.clear();
        self.summary_policy.reset();
        self.last_active_at = chrono::Utc::now().timestamp();

        info!(
            "Loaded session {} ({} turns) from {}",
            self.session_id,
            self.store.len(),
            store.path().display()
        );
        Ok(Some(snapshot.stage))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::{TextEmbedder, TextGenerator};
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Deterministic embedder: maps known phrases to fixed unit vectors,
    /// everything else to a far-off direction. Optionally fails on demand.
    struct StubEmbedder {
        calls: AtomicUsize,
        fail: AtomicBool,
    }

    impl StubEmbedder {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl TextEmbedder for StubEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(anyhow!("embedding provider down"));
            }
            let v = if text.contains("headphones") {
                vec![1.0, 0.0, 0.0]
            } else if text.contains("toaster") {
                vec![0.0, 1.0, 0.0]
            } else {
                vec![0.0, 0.0, 1.0]
            };
            Ok(v)
        }
    }

    struct TimeoutGenerator;

    #[async_trait]
    impl TextGenerator for TimeoutGenerator {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            Err(anyhow!("request timed out"))
        }
    }

    fn basic_config(max_history: usize) -> MemoryConfig {
        MemoryConfig {
            max_history,
            ..MemoryConfig::default()
        }
    }

    fn vector_config() -> MemoryConfig {
        MemoryConfig {
            backend: BackendKind::Vector,
            retrieval_mode: RetrievalMode::Similarity,
            similarity_threshold: 0.5,
            ..MemoryConfig::default()
        }
    }

    async fn record_n(manager: &mut MemoryManager, n: usize) {
        for i in 1..=n {
            manager
                .record_turn(&format!("input {}", i), &format!("response {}", i), vec![])
                .await;
        }
    }

    #[tokio::test]
    async fn test_retention_window_property() {
        let mut manager = MemoryManager::new(basic_config(3), "s", None, None).unwrap();
        record_n(&mut manager, 4).await;

        let history = manager.full_history();
        assert_eq!(history.len(), 3);
        let inputs: Vec<&str> = history.iter().map(|t| t.user_input.as_str()).collect();
        assert_eq!(inputs, vec!["input 2", "input 3", "input 4"]);

        let indices: Vec<u64> = history.iter().map(|t| t.turn_index).collect();
        assert_eq!(indices, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_context_contains_digests_of_completed_turns() {
        let mut manager = MemoryManager::new(basic_config(10), "s", None, None).unwrap();
        assert_eq!(manager.context_for_prompt().await, "");

        manager
            .record_turn("any headphones?", "Three options found.", vec![])
            .await;

        let context = manager.context_for_prompt().await;
        assert!(context.starts_with("# Conversation history"));
        assert!(context.contains("any headphones?"));
    }

    #[tokio::test]
    async fn test_similarity_self_query_returns_matching_turn_first() {
        let embedder = Arc::new(StubEmbedder::new());
        let mut manager =
            MemoryManager::new(vector_config(), "s", None, Some(embedder.clone())).unwrap();

        manager
            .record_turn("show me headphones", "Found two headphones.", vec![])
            .await;
        manager
            .record_turn("I need a toaster", "Here is a toaster.", vec![])
            .await;

        let hits = manager.retrieve("more headphones please").await;
        assert!(!hits.is_empty());
        assert_eq!(hits[0].turn_index, 0);
        assert!(hits[0].score > 0.9);
        // The orthogonal toaster turn falls below the 0.5 threshold
        assert!(hits.iter().all(|h| h.turn_index != 1));
    }

    #[tokio::test]
    async fn test_missing_embedder_degrades_to_recent_silently() {
        // Vector + similarity configured, but no embedding capability
        let mut manager = MemoryManager::new(vector_config(), "s", None, None).unwrap();
        record_n(&mut manager, 3).await;

        let hits = manager.retrieve("input 1").await;
        // Recency window, oldest-first, not similarity-ranked
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].turn_index, 0);
        assert_eq!(hits[2].turn_index, 2);
    }

    #[tokio::test]
    async fn test_query_time_embed_failure_degrades_per_call() {
        let embedder = Arc::new(StubEmbedder::new());
        let mut manager =
            MemoryManager::new(vector_config(), "s", None, Some(embedder.clone())).unwrap();
        record_n(&mut manager, 2).await;

        embedder.fail.store(true, Ordering::SeqCst);
        let hits = manager.retrieve("input 1").await;

        // Degrades to the recency window without surfacing the error
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].turn_index, 0);
    }

    #[tokio::test]
    async fn test_llm_summary_failure_yields_rule_based_digest() {
        let config = MemoryConfig {
            enable_llm_summary: true,
            summary: crate::config::SummaryConfig {
                trigger: crate::config::SummaryTrigger::Always,
                ..Default::default()
            },
            ..MemoryConfig::default()
        };
        let mut manager =
            MemoryManager::new(config, "s", Some(Arc::new(TimeoutGenerator)), None).unwrap();

        manager.record_turn("hello", "hi there", vec![]).await;

        let history = manager.full_history();
        assert_eq!(history[0].summary, "user: hello -> hi there");
    }

    #[tokio::test]
    async fn test_disabled_facade_is_a_no_op() {
        let config = MemoryConfig {
            enabled: false,
            ..MemoryConfig::default()
        };
        let mut manager = MemoryManager::new(config, "s", None, None).unwrap();

        manager.record_turn("hello", "hi", vec![]).await;
        assert!(manager.full_history().is_empty());
        assert_eq!(manager.context_for_prompt().await, "");
    }

    #[tokio::test]
    async fn test_context_cache_avoids_re_embedding() {
        let embedder = Arc::new(StubEmbedder::new());
        let mut manager =
            MemoryManager::new(vector_config(), "s", None, Some(embedder.clone())).unwrap();
        manager.record_turn("show me headphones", "ok", vec![]).await;

        let calls_before = embedder.calls.load(Ordering::SeqCst);
        let first = manager.context_for_query("headphones again").await;
        let second = manager.context_for_query("headphones again").await;

        assert_eq!(first, second);
        // One embed for the first query, none for the cached second
        assert_eq!(embedder.calls.load(Ordering::SeqCst), calls_before + 1);
    }

    #[tokio::test]
    async fn test_save_clear_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("snapshots.redb");

        let mut manager = MemoryManager::new(basic_config(10), "session-1", None, None).unwrap();
        record_n(&mut manager, 3).await;
        let before = manager.full_history();

        let mut stage = SessionState::new("session-1");
        stage.update_stage(crate::stage::ConversationStage::Cart, "test");
        stage.user_context.cart_item_count = 2;

        manager.save(Some(&db_path), &stage).unwrap();
        manager.clear();
        assert!(manager.full_history().is_empty());

        let restored = manager.load(Some(&db_path)).unwrap().expect("prior session");
        assert_eq!(manager.full_history(), before);
        assert_eq!(restored.stage, crate::stage::ConversationStage::Cart);
        assert_eq!(restored.user_context.cart_item_count, 2);

        // Indices continue above the restored history
        manager.record_turn("next", "ok", vec![]).await;
        assert_eq!(manager.full_history().last().unwrap().turn_index, 3);
    }

    #[tokio::test]
    async fn test_load_unknown_session_is_no_prior_session() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("snapshots.redb");

        let mut manager = MemoryManager::new(basic_config(10), "fresh", None, None).unwrap();
        assert!(manager.load(Some(&db_path)).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_load_corrupt_snapshot_leaves_state_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("snapshots.redb");
        std::fs::write(&db_path, b"definitely not a database").unwrap();

        let mut manager = MemoryManager::new(basic_config(10), "s", None, None).unwrap();
        record_n(&mut manager, 2).await;

        let err = manager.load(Some(&db_path)).unwrap_err();
        assert!(matches!(err, MemoryError::Persistence(_)));
        assert_eq!(manager.full_history().len(), 2);
    }

    #[tokio::test]
    async fn test_vector_round_trip_restores_index_without_embedder_calls() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("snapshots.redb");
        let embedder = Arc::new(StubEmbedder::new());

        let mut manager =
            MemoryManager::new(vector_config(), "s", None, Some(embedder.clone())).unwrap();
        manager.record_turn("show me headphones", "ok", vec![]).await;
        manager
            .save(Some(&db_path), &SessionState::new("s"))
            .unwrap();
        manager.clear();

        let calls_before_load = embedder.calls.load(Ordering::SeqCst);
        manager.load(Some(&db_path)).unwrap();
        assert_eq!(embedder.calls.load(Ordering::SeqCst), calls_before_load);

        // The restored index still answers similarity queries
        let hits = manager.retrieve("headphones?").await;
        assert_eq!(hits[0].turn_index, 0);
    }

    #[tokio::test]
    async fn test_manual_resummarize_latest() {
        let mut manager = MemoryManager::new(basic_config(10), "s", None, None).unwrap();
        manager.record_turn("hello", "hi", vec![]).await;

        manager.store.set_latest_summary("stale digest".into());
        manager.resummarize_latest().await;

        assert_eq!(manager.full_history()[0].summary, "user: hello -> hi");
    }
}
