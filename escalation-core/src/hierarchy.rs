//! Model Hierarchy — ordered tiers and their complexity intervals
//!
//! Tiers are ordered cheapest first. Each tier owns a half-open score interval
//! `[min_score, max_score)`; the top tier's interval is closed at 100. The
//! intervals must be contiguous and cover `[0, 100]`, which is checked once
//! when the hierarchy is built.
//!
//! ```text
//! 0 ─────────── 15 ─────────── 30 ──────────────────── 100
//! │   economy    │   standard   │        premium         │
//! ```

use crate::error::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Lowest possible complexity score.
pub const MIN_SCORE: f64 = 0.0;
/// Highest possible complexity score.
pub const MAX_SCORE: f64 = 100.0;

const BOUNDARY_EPSILON: f64 = 1e-9;

/// One entry in the model hierarchy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelTier {
    /// Tier identifier used in decisions and configuration (e.g. "economy")
    pub name: String,
    /// Model identifier the gateway should call for this tier
    pub model: String,
    /// Cost in USD per token
    pub cost_per_token: f64,
    /// Inclusive lower bound of the score interval this tier is suited for
    pub min_score: f64,
    /// Exclusive upper bound (inclusive for the top tier)
    pub max_score: f64,
}

impl ModelTier {
    pub fn new(
        name: impl Into<String>,
        model: impl Into<String>,
        cost_per_token: f64,
        min_score: f64,
        max_score: f64,
    ) -> Self {
        Self {
            name: name.into(),
            model: model.into(),
            cost_per_token,
            min_score,
            max_score,
        }
    }

    /// Estimated cost of a call consuming `tokens` tokens on this tier.
    pub fn cost_for_tokens(&self, tokens: u64) -> f64 {
        self.cost_per_token * tokens as f64
    }
}

impl std::fmt::Display for ModelTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Validated, immutable tier ladder. Shared read-only across sessions.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelHierarchy {
    tiers: Vec<ModelTier>,
}

impl ModelHierarchy {
    /// Build a hierarchy, rejecting empty ladders, gaps, overlaps and bad costs.
    pub fn new(tiers: Vec<ModelTier>) -> ConfigResult<Self> {
        if tiers.is_empty() {
            return Err(ConfigError::EmptyHierarchy);
        }

        let mut seen = HashSet::new();
        for (idx, tier) in tiers.iter().enumerate() {
            if tier.name.trim().is_empty() {
                return Err(ConfigError::UnnamedTier(idx));
            }
            if !seen.insert(tier.name.as_str()) {
                return Err(ConfigError::DuplicateTier(tier.name.clone()));
            }
            if !tier.cost_per_token.is_finite() || tier.cost_per_token < 0.0 {
                return Err(ConfigError::InvalidCost {
                    tier: tier.name.clone(),
                    cost: tier.cost_per_token,
                });
            }
            if !tier.min_score.is_finite()
                || !tier.max_score.is_finite()
                || tier.min_score >= tier.max_score
            {
                return Err(ConfigError::InvalidRange {
                    tier: tier.name.clone(),
                    min: tier.min_score,
                    max: tier.max_score,
                });
            }
        }

        for pair in tiers.windows(2) {
            let (lower, upper) = (&pair[0], &pair[1]);
            if (lower.max_score - upper.min_score).abs() > BOUNDARY_EPSILON {
                return Err(ConfigError::NonContiguous {
                    lower: lower.name.clone(),
                    end: lower.max_score,
                    upper: upper.name.clone(),
                    start: upper.min_score,
                });
            }
        }

        let first = &tiers[0];
        let last = &tiers[tiers.len() - 1];
        if (first.min_score - MIN_SCORE).abs() > BOUNDARY_EPSILON {
            return Err(ConfigError::IncompleteCoverage(format!(
                "lowest tier '{}' starts at {} instead of {}",
                first.name, first.min_score, MIN_SCORE
            )));
        }
        if (last.max_score - MAX_SCORE).abs() > BOUNDARY_EPSILON {
            return Err(ConfigError::IncompleteCoverage(format!(
                "highest tier '{}' ends at {} instead of {}",
                last.name, last.max_score, MAX_SCORE
            )));
        }

        Ok(Self { tiers })
    }

    /// Number of tiers (always at least one).
    pub fn len(&self) -> usize {
        self.tiers.len()
    }

    /// Always false; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }

    pub fn tiers(&self) -> &[ModelTier] {
        &self.tiers
    }

    pub fn get(&self, index: usize) -> Option<&ModelTier> {
        self.tiers.get(index)
    }

    /// Tier at `index`, clamped to the top tier when out of range.
    pub fn tier(&self, index: usize) -> &ModelTier {
        &self.tiers[self.clamp_index(index)]
    }

    /// Index of the cheapest tier.
    pub fn lowest(&self) -> usize {
        0
    }

    /// Index of the most capable tier.
    pub fn highest(&self) -> usize {
        self.tiers.len() - 1
    }

    pub fn clamp_index(&self, index: usize) -> usize {
        index.min(self.highest())
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.tiers.iter().position(|t| t.name == name)
    }

    /// Map a complexity score to the tier suited for it.
    ///
    /// A score sitting exactly on a boundary belongs to the higher tier.
    /// Out-of-range and NaN scores are clamped into `[0, 100]` first.
    pub fn tier_for_score(&self, score: f64) -> usize {
        let score = if score.is_nan() {
            MIN_SCORE
        } else {
            score.clamp(MIN_SCORE, MAX_SCORE)
        };
        self.tiers
            .iter()
            .rposition(|t| score >= t.min_score)
            .unwrap_or(0)
    }
}
