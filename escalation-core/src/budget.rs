//! Budget Tracker — per-session spend against soft and hard limits
//!
//! Soft limit: warn (telemetry) but never block escalation.
//! Hard limit: the engine clamps the session to the policy's downgrade tier.

use crate::error::{ConfigError, ConfigResult};
use crate::hierarchy::ModelHierarchy;
use crate::session::SessionState;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Where a session's spend stands relative to the policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetStatus {
    Ok,
    SoftExceeded,
    HardExceeded,
}

impl std::fmt::Display for BudgetStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::SoftExceeded => write!(f, "soft_exceeded"),
            Self::HardExceeded => write!(f, "hard_exceeded"),
        }
    }
}

/// Which tier a session is forced onto once the hard limit is reached
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum DowngradeStrategy {
    /// The cheapest tier
    #[default]
    Lowest,
    /// A specific named tier
    Tier { name: String },
    /// One tier below the current one on every decision, floored at the cheapest
    StepDown,
}

/// Spending policy (the `[budget]` table). Amounts are USD.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetPolicy {
    pub soft_limit: f64,
    pub hard_limit: f64,
    pub downgrade: DowngradeStrategy,
}

impl Default for BudgetPolicy {
    fn default() -> Self {
        Self {
            soft_limit: 1.0,
            hard_limit: 2.0,
            downgrade: DowngradeStrategy::Lowest,
        }
    }
}

impl BudgetPolicy {
    pub fn validate(&self, hierarchy: &ModelHierarchy) -> ConfigResult<()> {
        for (label, value) in [("soft_limit", self.soft_limit), ("hard_limit", self.hard_limit)] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidBudget(format!(
                    "{label} must be finite and non-negative, got {value}"
                )));
            }
        }
        if self.soft_limit > self.hard_limit {
            return Err(ConfigError::InvalidBudget(format!(
                "soft_limit {} exceeds hard_limit {}",
                self.soft_limit, self.hard_limit
            )));
        }
        if let DowngradeStrategy::Tier { name } = &self.downgrade {
            if hierarchy.index_of(name).is_none() {
                return Err(ConfigError::UnknownTier(name.clone()));
            }
        }
        Ok(())
    }
}

/// Applies a [`BudgetPolicy`] to session state.
///
/// Holds no per-session data: spend lives in [`SessionState`].
#[derive(Debug, Clone)]
pub struct BudgetTracker {
    policy: BudgetPolicy,
    /// Resolved index for `DowngradeStrategy::Tier`
    named_target: Option<usize>,
}

impl BudgetTracker {
    pub fn new(policy: BudgetPolicy, hierarchy: &ModelHierarchy) -> ConfigResult<Self> {
        policy.validate(hierarchy)?;
        let named_target = match &policy.downgrade {
            DowngradeStrategy::Tier { name } => hierarchy.index_of(name),
            _ => None,
        };
        Ok(Self {
            policy,
            named_target,
        })
    }

    pub fn policy(&self) -> &BudgetPolicy {
        &self.policy
    }

    /// Classify an absolute spend. Reaching a limit counts as exceeding it.
    pub fn classify(&self, cost: f64) -> BudgetStatus {
        if cost >= self.policy.hard_limit {
            BudgetStatus::HardExceeded
        } else if cost >= self.policy.soft_limit {
            BudgetStatus::SoftExceeded
        } else {
            BudgetStatus::Ok
        }
    }

    pub fn status(&self, session: &SessionState) -> BudgetStatus {
        self.classify(session.cumulative_cost())
    }

    /// Add `cost` to the session's spend and return the new status.
    ///
    /// Negative, NaN and infinite costs are ignored.
    pub fn charge(&self, session: &mut SessionState, cost: f64) -> BudgetStatus {
        if !session.add_cost(cost) {
            warn!(
                session = %session.session_id,
                cost,
                "Ignoring invalid charge"
            );
        }
        self.status(session)
    }

    /// USD left before the hard limit.
    pub fn remaining(&self, session: &SessionState) -> f64 {
        (self.policy.hard_limit - session.cumulative_cost()).max(0.0)
    }

    /// Tier a hard-limited session is clamped to, given its current tier.
    pub fn downgrade_target(&self, current: usize, hierarchy: &ModelHierarchy) -> usize {
        let target = match &self.policy.downgrade {
            DowngradeStrategy::Lowest => hierarchy.lowest(),
            DowngradeStrategy::Tier { .. } => self.named_target.unwrap_or(hierarchy.lowest()),
            DowngradeStrategy::StepDown => current.saturating_sub(1),
        };
        hierarchy.clamp_index(target)
    }
}
