//! ============================================================================
//! Memory Configuration - Strategy selection for the memory engine
//! ============================================================================
//! Resolution order per key: environment variable > TOML file > compiled
//! default. The file path comes from CONCIERGE_CONFIG (default:
//! ./concierge.toml); options live under its [memory] table.
//!
//! A config object is constructed once and passed into the facade and the
//! stage tracker; reloading means constructing a new instance.
//! ============================================================================

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

use crate::types::MemoryError;

/// Which storage backend the facade selects at construction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Retention store only (recency retrieval)
    #[default]
    Basic,
    /// Retention store plus the in-process similarity index
    Vector,
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "basic" => Ok(BackendKind::Basic),
            "vector" => Ok(BackendKind::Vector),
            _ => Err(format!("Unknown backend: {}", s)),
        }
    }
}

/// How stored turns are selected for context injection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalMode {
    /// Most recent turns, oldest-first
    #[default]
    Recent,
    /// Relevance-ranked turns via embedding similarity
    Similarity,
}

impl std::str::FromStr for RetrievalMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "recent" => Ok(RetrievalMode::Recent),
            "similarity" => Ok(RetrievalMode::Similarity),
            _ => Err(format!("Unknown retrieval mode: {}", s)),
        }
    }
}

/// When a new model-assisted summary is (re)computed rather than reused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SummaryTrigger {
    /// Every recorded turn
    Always,
    /// Turn count or accumulated text length since the last summary
    #[default]
    Threshold,
    /// Only when the caller asks for it
    Manual,
}

impl std::str::FromStr for SummaryTrigger {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "always" => Ok(SummaryTrigger::Always),
            "threshold" => Ok(SummaryTrigger::Threshold),
            "manual" => Ok(SummaryTrigger::Manual),
            _ => Err(format!("Unknown summary trigger: {}", s)),
        }
    }
}

/// Summary generation policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SummaryConfig {
    pub trigger: SummaryTrigger,
    /// Turns since the last model summary before a new one is attempted
    pub turns_threshold: usize,
    /// Accumulated input+response bytes before a new summary is attempted
    pub text_length_threshold: usize,
    /// Character budget for a model-assisted digest
    pub max_summary_length: usize,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            trigger: SummaryTrigger::Threshold,
            turns_threshold: 5,
            text_length_threshold: 500,
            max_summary_length: 200,
        }
    }
}

/// Session lifecycle options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Prefix for generated session identifiers
    pub default_session_prefix: String,
    /// Seconds of inactivity before the stage falls to Idle (0 = never)
    pub timeout: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_session_prefix: "session".into(),
            timeout: 0,
        }
    }
}

impl SessionConfig {
    /// Generate a fresh session identifier with the configured prefix
    pub fn new_session_id(&self) -> String {
        format!("{}-{}", self.default_session_prefix, uuid::Uuid::new_v4())
    }
}

/// Performance options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    pub enable_cache: bool,
    pub cache_size: usize,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            enable_cache: true,
            cache_size: 100,
        }
    }
}

/// Complete memory engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Master switch: when false the facade accepts turns and discards them
    pub enabled: bool,
    pub backend: BackendKind,
    pub retrieval_mode: RetrievalMode,
    /// Retention bound: turns kept before oldest-first eviction
    pub max_history: usize,
    /// Recency window returned by context queries in recent mode
    pub max_recent_turns: usize,
    pub max_similarity_results: usize,
    /// Minimum cosine similarity for a turn to be retrieved
    pub similarity_threshold: f32,
    pub enable_llm_summary: bool,
    pub summary: SummaryConfig,
    pub session: SessionConfig,
    pub performance: PerformanceConfig,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: BackendKind::Basic,
            retrieval_mode: RetrievalMode::Recent,
            max_history: 10,
            max_recent_turns: 10,
            max_similarity_results: 5,
            similarity_threshold: 0.5,
            enable_llm_summary: false,
            summary: SummaryConfig::default(),
            session: SessionConfig::default(),
            performance: PerformanceConfig::default(),
        }
    }
}

/// Top-level shape of the configuration file
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    memory: MemoryConfig,
}

impl MemoryConfig {
    /// Load configuration: compiled defaults, overlaid by the TOML file (if
    /// present), overlaid by environment variables, then validated.
    pub fn load() -> Result<Self, MemoryError> {
        let path = std::env::var("CONCIERGE_CONFIG").unwrap_or_else(|_| "concierge.toml".into());
        let mut config = if Path::new(&path).exists() {
            Self::from_file(&path)?
        } else {
            debug!("No config file at {}, using compiled defaults", path);
            Self::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse the `[memory]` table of a TOML file. A malformed file is a
    /// configuration error, not a fallback to defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, MemoryError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            MemoryError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;

        let file: ConfigFile = toml::from_str(&raw).map_err(|e| {
            MemoryError::Configuration(format!("cannot parse {}: {}", path.display(), e))
        })?;

        debug!("Loaded memory config from {}", path.display());
        Ok(file.memory)
    }

    /// Overlay recognized environment variables. Unparsable values are
    /// ignored with a warning, matching the tolerant env handling of the
    /// file-less deployment path.
    pub fn apply_env_overrides(&mut self) {
        if let Some(v) = env_bool("MEMORY_ENABLED") {
            self.enabled = v;
        }
        if let Some(v) = env_parse::<BackendKind>("MEMORY_BACKEND") {
            self.backend = v;
        }
        if let Some(v) = env_parse::<RetrievalMode>("MEMORY_RETRIEVAL_MODE") {
            self.retrieval_mode = v;
        }
        if let Some(v) = env_parse::<usize>("MEMORY_MAX_HISTORY") {
            self.max_history = v;
        }
        if let Some(v) = env_parse::<usize>("MEMORY_MAX_TURNS") {
            self.max_recent_turns = v;
        }
        if let Some(v) = env_parse::<usize>("MEMORY_MAX_SIMILARITY_RESULTS") {
            self.max_similarity_results = v;
        }
        if let Some(v) = env_parse::<f32>("MEMORY_SIMILARITY_THRESHOLD") {
            self.similarity_threshold = v;
        }
        if let Some(v) = env_bool("MEMORY_LLM_SUMMARY") {
            self.enable_llm_summary = v;
        }
        if let Some(v) = env_parse::<SummaryTrigger>("MEMORY_SUMMARY_TRIGGER") {
            self.summary.trigger = v;
        }
        if let Some(v) = env_parse::<u64>("MEMORY_SESSION_TIMEOUT") {
            self.session.timeout = v;
        }
    }

    /// Reject malformed or conflicting option values.
    pub fn validate(&self) -> Result<(), MemoryError> {
        if self.max_history == 0 {
            return Err(MemoryError::Configuration(
                "max_history must be at least 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(MemoryError::Configuration(format!(
                "similarity_threshold must be within [0, 1], got {}",
                self.similarity_threshold
            )));
        }
        if self.retrieval_mode == RetrievalMode::Similarity && self.backend == BackendKind::Basic {
            return Err(MemoryError::Configuration(
                "retrieval_mode=similarity requires backend=vector".into(),
            ));
        }
        if self.summary.max_summary_length == 0 {
            return Err(MemoryError::Configuration(
                "summary.max_summary_length must be at least 1".into(),
            ));
        }
        if self.performance.enable_cache && self.performance.cache_size == 0 {
            return Err(MemoryError::Configuration(
                "performance.cache_size must be at least 1 when the cache is enabled".into(),
            ));
        }
        Ok(())
    }
}

fn env_bool(key: &str) -> Option<bool> {
    let raw = std::env::var(key).ok()?;
    Some(matches!(raw.to_lowercase().as_str(), "true" | "1" | "yes"))
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!("Ignoring unparsable env override {}={}", key, raw);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_validate() {
        let config = MemoryConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_history, 10);
        assert_eq!(config.retrieval_mode, RetrievalMode::Recent);
        assert_eq!(config.summary.trigger, SummaryTrigger::Threshold);
    }

    #[test]
    fn test_partial_toml_overlays_defaults() {
        let raw = r#"
            [memory]
            backend = "vector"
            retrieval_mode = "similarity"
            max_history = 20

            [memory.summary]
            trigger = "always"
        "#;
        let file: ConfigFile = toml::from_str(raw).unwrap();
        let config = file.memory;

        assert_eq!(config.backend, BackendKind::Vector);
        assert_eq!(config.retrieval_mode, RetrievalMode::Similarity);
        assert_eq!(config.max_history, 20);
        assert_eq!(config.summary.trigger, SummaryTrigger::Always);
        // Untouched keys keep their defaults
        assert_eq!(config.max_recent_turns, 10);
        assert_eq!(config.summary.turns_threshold, 5);
    }

    #[test]
    fn test_malformed_file_is_fatal() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[memory]\nmax_history = \"many\"").unwrap();

        let err = MemoryConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, MemoryError::Configuration(_)));
    }

    #[test]
    fn test_validation_rejects_conflicts() {
        let mut config = MemoryConfig::default();
        config.similarity_threshold = 1.5;
        assert!(matches!(
            config.validate(),
            Err(MemoryError::Configuration(_))
        ));

        let mut config = MemoryConfig::default();
        config.retrieval_mode = RetrievalMode::Similarity;
        config.backend = BackendKind::Basic;
        assert!(matches!(
            config.validate(),
            Err(MemoryError::Configuration(_))
        ));

        let mut config = MemoryConfig::default();
        config.max_history = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_overrides_take_precedence() {
        // Env handling lives in one test: vars are process-global.
        std::env::set_var("MEMORY_MAX_HISTORY", "42");
        std::env::set_var("MEMORY_BACKEND", "vector");
        std::env::set_var("MEMORY_ENABLED", "no");
        std::env::set_var("MEMORY_SIMILARITY_THRESHOLD", "not-a-number");

        let mut config = MemoryConfig::default();
        config.apply_env_overrides();

        assert_eq!(config.max_history, 42);
        assert_eq!(config.backend, BackendKind::Vector);
        assert!(!config.enabled);
        // Unparsable override ignored, default kept
        assert!((config.similarity_threshold - 0.5).abs() < f32::EPSILON);

        std::env::remove_var("MEMORY_MAX_HISTORY");
        std::env::remove_var("MEMORY_BACKEND");
        std::env::remove_var("MEMORY_ENABLED");
        std::env::remove_var("MEMORY_SIMILARITY_THRESHOLD");
    }

    #[test]
    fn test_generated_session_ids_are_unique() {
        let session = SessionConfig::default();
        let a = session.new_session_id();
        let b = session.new_session_id();

        assert!(a.starts_with("session-"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_trigger_parsing() {
        assert_eq!("always".parse::<SummaryTrigger>().unwrap(), SummaryTrigger::Always);
        assert_eq!("threshold".parse::<SummaryTrigger>().unwrap(), SummaryTrigger::Threshold);
        assert_eq!("manual".parse::<SummaryTrigger>().unwrap(), SummaryTrigger::Manual);
        assert!("sometimes".parse::<SummaryTrigger>().is_err());
    }
}
