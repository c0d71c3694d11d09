//! Complexity Analyzer — scores a transcript window
//!
//! Pure function of its input: no shared state, safe to call from any number
//! of threads at once.
//!
//! # Signals
//!
//! ```text
//! technical_depth  = 100 × turns with a technical keyword / turns
//! creativity_level = 100 × turns with a creative keyword  / turns
//! cognitive_load   = Σ turn_words × sentence_factor / normalization   (clamped)
//! overall          = w_tech·technical + w_cog·cognitive + w_creat·creative (clamped)
//! ```

pub mod keywords;
pub mod sentence;

pub use keywords::KeywordMatcher;
pub use sentence::{
    split_sentences, HeuristicSentenceScorer, SentenceScorer, SentenceWeights,
    DEFAULT_CONNECTIVES,
};

use crate::error::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Speaker of a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
            Self::System => write!(f, "system"),
        }
    }
}

/// One message of the conversation, as received from the gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Complexity estimate for a transcript window. Every field is in `[0, 100]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ComplexityScore {
    pub overall: f64,
    pub cognitive_load: f64,
    pub technical_depth: f64,
    pub creativity_level: f64,
}

impl ComplexityScore {
    pub fn zero() -> Self {
        Self::default()
    }

    /// Compact summary for logging
    pub fn summary(&self) -> String {
        format!(
            "overall={:.1} cognitive={:.1} technical={:.1} creative={:.1}",
            self.overall, self.cognitive_load, self.technical_depth, self.creativity_level
        )
    }
}

/// Weights of the composite score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DomainWeights {
    pub technical: f64,
    pub cognitive: f64,
    pub creative: f64,
}

impl Default for DomainWeights {
    fn default() -> Self {
        Self {
            technical: 0.4,
            cognitive: 0.3,
            creative: 0.3,
        }
    }
}

impl DomainWeights {
    pub fn validate(&self) -> ConfigResult<()> {
        let weights = [self.technical, self.cognitive, self.creative];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(ConfigError::InvalidAnalyzer(format!(
                "domain weights must be finite and non-negative, got {:?}",
                self
            )));
        }
        if weights.iter().sum::<f64>() <= 0.0 {
            return Err(ConfigError::InvalidAnalyzer(
                "domain weights must not all be zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Analyzer configuration (the `[analyzer]` table)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Most recent N turns to analyze; `None` analyzes the full history
    pub window: Option<usize>,
    pub technical_keywords: Vec<String>,
    pub creative_keywords: Vec<String>,
    pub domain_weights: DomainWeights,
    pub sentence_weights: SentenceWeights,
    /// Subordinate-clause markers (single words or short phrases)
    pub connectives: Vec<String>,
    /// Divisor applied to `words × sentence_factor` per turn
    pub cognitive_normalization: f64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            window: Some(8),
            technical_keywords: [
                "algorithm",
                "architecture",
                "api",
                "asynchronous",
                "benchmark",
                "compiler",
                "concurrency",
                "database",
                "debug",
                "deploy",
                "distributed",
                "encryption",
                "kubernetes",
                "latency",
                "machine learning",
                "microservice",
                "neural network",
                "optimization",
                "protocol",
                "refactor",
                "regression",
                "schema",
                "stack trace",
                "throughput",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            creative_keywords: [
                "brainstorm",
                "character",
                "creative",
                "fiction",
                "imagine",
                "lyrics",
                "metaphor",
                "narrative",
                "novel",
                "plot",
                "poem",
                "slogan",
                "story",
                "worldbuilding",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            domain_weights: DomainWeights::default(),
            sentence_weights: SentenceWeights::default(),
            connectives: DEFAULT_CONNECTIVES.iter().map(|s| s.to_string()).collect(),
            cognitive_normalization: 4.0,
        }
    }
}

impl AnalyzerConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        self.domain_weights.validate()?;
        if !self.sentence_weights.is_valid() {
            return Err(ConfigError::InvalidAnalyzer(format!(
                "sentence weights must be finite and non-negative, got {:?}",
                self.sentence_weights
            )));
        }
        if !self.cognitive_normalization.is_finite() || self.cognitive_normalization <= 0.0 {
            return Err(ConfigError::InvalidAnalyzer(format!(
                "cognitive_normalization must be positive, got {}",
                self.cognitive_normalization
            )));
        }
        if self.window == Some(0) {
            return Err(ConfigError::InvalidAnalyzer(
                "window must be at least 1 turn (omit it for full history)".to_string(),
            ));
        }
        Ok(())
    }
}

/// Stateless transcript scorer built once from configuration
#[derive(Clone)]
pub struct ComplexityAnalyzer {
    technical: KeywordMatcher,
    creative: KeywordMatcher,
    scorer: Arc<dyn SentenceScorer>,
    weights: DomainWeights,
    window: Option<usize>,
    normalization: f64,
}

impl std::fmt::Debug for ComplexityAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComplexityAnalyzer")
            .field("technical_keywords", &self.technical.len())
            .field("creative_keywords", &self.creative.len())
            .field("weights", &self.weights)
            .field("window", &self.window)
            .field("normalization", &self.normalization)
            .finish()
    }
}

impl ComplexityAnalyzer {
    /// Compile keyword matchers and the default sentence heuristic.
    pub fn from_config(config: &AnalyzerConfig) -> ConfigResult<Self> {
        config.validate()?;
        Ok(Self {
            technical: KeywordMatcher::new(&config.technical_keywords)?,
            creative: KeywordMatcher::new(&config.creative_keywords)?,
            scorer: Arc::new(HeuristicSentenceScorer::new(
                config.sentence_weights,
                &config.connectives,
            )),
            weights: config.domain_weights,
            window: config.window,
            normalization: config.cognitive_normalization,
        })
    }

    /// Replace the sentence-complexity strategy.
    pub fn with_scorer(mut self, scorer: impl SentenceScorer + 'static) -> Self {
        self.scorer = Arc::new(scorer);
        self
    }

    pub fn weights(&self) -> DomainWeights {
        self.weights
    }

    /// Score the decision window of `turns`.
    pub fn analyze(&self, turns: &[ConversationTurn]) -> ComplexityScore {
        let window = self.window_of(turns);
        if window.is_empty() {
            return ComplexityScore::zero();
        }

        let total = window.len() as f64;
        let technical_hits = window
            .iter()
            .filter(|t| self.technical.is_match(&t.content))
            .count() as f64;
        let creative_hits = window
            .iter()
            .filter(|t| self.creative.is_match(&t.content))
            .count() as f64;

        let technical_depth = clamp_score(100.0 * technical_hits / total);
        let creativity_level = clamp_score(100.0 * creative_hits / total);
        let cognitive_load = clamp_score(
            window
                .iter()
                .map(|t| self.turn_cognitive_load(&t.content))
                .sum(),
        );

        let overall = clamp_score(
            self.weights.technical * technical_depth
                + self.weights.cognitive * cognitive_load
                + self.weights.creative * creativity_level,
        );

        ComplexityScore {
            overall,
            cognitive_load,
            technical_depth,
            creativity_level,
        }
    }

    fn window_of<'a>(&self, turns: &'a [ConversationTurn]) -> &'a [ConversationTurn] {
        match self.window {
            Some(n) if turns.len() > n => &turns[turns.len() - n..],
            _ => turns,
        }
    }

    /// `words × mean_sentence_complexity / 100 / normalization` for one turn.
    fn turn_cognitive_load(&self, text: &str) -> f64 {
        let words = text.split_whitespace().count();
        if words == 0 {
            return 0.0;
        }

        let (sum, count) = split_sentences(text)
            .map(|s| self.scorer.score(s).clamp(0.0, 100.0))
            .fold((0.0, 0usize), |(sum, n), s| (sum + s, n + 1));
        if count == 0 {
            return 0.0;
        }

        let factor = sum / count as f64 / 100.0;
        words as f64 * factor / self.normalization
    }
}

fn clamp_score(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 100.0)
    }
}
