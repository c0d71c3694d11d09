//! Startup-time configuration errors
//!
//! Everything in here is fatal: an engine is never constructed from a config
//! that fails validation, so decision calls never see these.

use thiserror::Error;

/// Configuration error raised while loading or validating an [`EscalatorConfig`].
///
/// [`EscalatorConfig`]: crate::config::EscalatorConfig
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Model hierarchy is empty")]
    EmptyHierarchy,

    #[error("Tier name must not be empty (tier #{0})")]
    UnnamedTier(usize),

    #[error("Duplicate tier name: {0}")]
    DuplicateTier(String),

    #[error("Unknown tier: {0}")]
    UnknownTier(String),

    #[error("Tier '{tier}' has an empty or inverted score range [{min}, {max})")]
    InvalidRange { tier: String, min: f64, max: f64 },

    #[error("Score ranges are not contiguous: '{lower}' ends at {end} but '{upper}' starts at {start}")]
    NonContiguous {
        lower: String,
        end: f64,
        upper: String,
        start: f64,
    },

    #[error("Score ranges must cover [0, 100]: {0}")]
    IncompleteCoverage(String),

    #[error("Invalid cost for tier '{tier}': {cost}")]
    InvalidCost { tier: String, cost: f64 },

    #[error("Invalid budget policy: {0}")]
    InvalidBudget(String),

    #[error("Invalid analyzer settings: {0}")]
    InvalidAnalyzer(String),

    #[error("Invalid availability settings: {0}")]
    InvalidAvailability(String),

    #[error("Invalid keyword pattern: {0}")]
    Keyword(#[from] regex::Error),

    #[error("Failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Result type for configuration loading and validation
pub type ConfigResult<T> = Result<T, ConfigError>;
