//! Engine configuration loaded from TOML
//!
//! Every section has deployment defaults, so an empty file yields a working
//! three-tier setup:
//!
//! ```toml
//! initial_tier = "economy"
//!
//! [[tiers]]
//! name = "economy"
//! model = "small"
//! cost_per_token = 0.0000005
//! min_score = 0.0
//! max_score = 15.0
//!
//! [budget]
//! soft_limit = 1.0
//! hard_limit = 2.0
//! downgrade = { strategy = "lowest" }
//!
//! [hysteresis]
//! deescalation_threshold = 3
//! ```

use crate::analyzer::AnalyzerConfig;
use crate::availability::AvailabilityConfig;
use crate::budget::BudgetPolicy;
use crate::error::{ConfigError, ConfigResult};
use crate::hierarchy::{ModelHierarchy, ModelTier};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// De-escalation damping (the `[hysteresis]` table)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HysteresisConfig {
    /// Consecutive no-change decisions required before moving down a tier.
    /// `0` de-escalates immediately.
    pub deescalation_threshold: u32,
}

impl Default for HysteresisConfig {
    fn default() -> Self {
        Self {
            deescalation_threshold: 3,
        }
    }
}

/// Top-level configuration for an [`EscalationEngine`](crate::EscalationEngine)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EscalatorConfig {
    /// Tier ladder, cheapest first
    pub tiers: Vec<ModelTier>,
    /// Tier new sessions start on; the cheapest tier when unset
    pub initial_tier: Option<String>,
    pub analyzer: AnalyzerConfig,
    pub budget: BudgetPolicy,
    pub hysteresis: HysteresisConfig,
    pub availability: AvailabilityConfig,
}

impl Default for EscalatorConfig {
    fn default() -> Self {
        Self {
            tiers: default_tiers(),
            initial_tier: None,
            analyzer: AnalyzerConfig::default(),
            budget: BudgetPolicy::default(),
            hysteresis: HysteresisConfig::default(),
            availability: AvailabilityConfig::default(),
        }
    }
}

fn default_tiers() -> Vec<ModelTier> {
    vec![
        ModelTier::new("economy", "small", 0.000_000_5, 0.0, 15.0),
        ModelTier::new("standard", "medium", 0.000_003, 15.0, 30.0),
        ModelTier::new("premium", "large", 0.000_015, 30.0, 100.0),
    ]
}

impl EscalatorConfig {
    /// Read and validate a TOML config file.
    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate TOML text.
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every section. Called by the engine constructor as well.
    pub fn validate(&self) -> ConfigResult<()> {
        let hierarchy = self.hierarchy()?;
        self.initial_tier_index(&hierarchy)?;
        self.analyzer.validate()?;
        self.budget.validate(&hierarchy)?;
        self.availability.validate()?;
        Ok(())
    }

    /// Build the validated tier ladder.
    pub fn hierarchy(&self) -> ConfigResult<ModelHierarchy> {
        ModelHierarchy::new(self.tiers.clone())
    }

    /// Resolve `initial_tier` against `hierarchy`.
    pub fn initial_tier_index(&self, hierarchy: &ModelHierarchy) -> ConfigResult<usize> {
        match &self.initial_tier {
            None => Ok(hierarchy.lowest()),
            Some(name) => hierarchy
                .index_of(name)
                .ok_or_else(|| ConfigError::UnknownTier(name.clone())),
        }
    }
}
