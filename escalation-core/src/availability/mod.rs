//! Availability Prober — per-tier circuit breakers shared by all sessions
//!
//! Each tier trips independently when its failures inside a sliding window
//! reach the threshold. Cool-down is evaluated lazily against a stored
//! deadline whenever the tier is queried; there is no background timer.
//!
//! ```text
//!            failures in window ≥ threshold
//!  Closed ───────────────────────────────────▶ Open
//!    ▲                                          │ cool-down elapsed
//!    │ success                                  ▼ (checked on query)
//!    └──────────────────────────────────── HalfOpen
//!                                               │ failure
//!                                               └──────▶ Open (new deadline)
//! ```

mod breaker;

use crate::clock::{Clock, SystemClock};
use crate::error::{ConfigError, ConfigResult};
use crate::hierarchy::ModelHierarchy;
use breaker::TierBreaker;
use serde::{Deserialize, Serialize};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Longest accepted cool-down (one year)
pub const MAX_COOLDOWN_SECS: u64 = 365 * 24 * 60 * 60;

/// Shared reference to the prober
pub type SharedProber = Arc<AvailabilityProber>;

/// Result of a completed model call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallOutcome {
    Success,
    Failure,
}

/// Circuit state for a single tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Healthy, requests allowed.
    Closed,
    /// Tripped; tier skipped until the cool-down deadline.
    Open,
    /// Cool-down elapsed. Usable; the next outcome decides.
    HalfOpen,
}

impl CircuitState {
    pub fn is_available(self) -> bool {
        !matches!(self, Self::Open)
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Breaker tuning (the `[availability]` table)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AvailabilityConfig {
    /// Failures inside the window that open the circuit
    pub failure_threshold: u32,
    /// Sliding window length in seconds
    pub window_secs: u64,
    /// Seconds the circuit stays open before going half-open
    pub cooldown_secs: u64,
}

impl Default for AvailabilityConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            window_secs: 60,
            cooldown_secs: 30,
        }
    }
}

impl AvailabilityConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::InvalidAvailability(
                "failure_threshold must be at least 1".to_string(),
            ));
        }
        if self.window_secs == 0 {
            return Err(ConfigError::InvalidAvailability(
                "window_secs must be at least 1".to_string(),
            ));
        }
        if self.cooldown_secs > MAX_COOLDOWN_SECS {
            return Err(ConfigError::InvalidAvailability(format!(
                "cooldown_secs must be at most {MAX_COOLDOWN_SECS}, got {}",
                self.cooldown_secs
            )));
        }
        Ok(())
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

/// A tier's circuit changed state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitTransition {
    pub tier: usize,
    pub tier_name: String,
    pub from: CircuitState,
    pub to: CircuitState,
    pub recent_failures: usize,
}

/// Point-in-time view of one tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierAvailability {
    pub tier: usize,
    pub name: String,
    pub state: CircuitState,
    pub available: bool,
    pub recent_failures: usize,
    pub total_successes: u64,
    pub total_failures: u64,
    pub trips: u64,
}

/// Process-wide availability tracker, one breaker per tier
#[derive(Debug)]
pub struct AvailabilityProber {
    breakers: Vec<TierBreaker>,
    names: Vec<String>,
    config: AvailabilityConfig,
    clock: Arc<dyn Clock>,
}

impl AvailabilityProber {
    pub fn new(hierarchy: &ModelHierarchy, config: AvailabilityConfig) -> ConfigResult<Self> {
        Self::with_clock(hierarchy, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        hierarchy: &ModelHierarchy,
        config: AvailabilityConfig,
        clock: Arc<dyn Clock>,
    ) -> ConfigResult<Self> {
        config.validate()?;
        Ok(Self {
            breakers: hierarchy.tiers().iter().map(|_| TierBreaker::new()).collect(),
            names: hierarchy.tiers().iter().map(|t| t.name.clone()).collect(),
            config,
            clock,
        })
    }

    /// Create a shared reference to this prober
    pub fn shared(self) -> SharedProber {
        Arc::new(self)
    }

    pub fn config(&self) -> &AvailabilityConfig {
        &self.config
    }

    /// Feed the outcome of a completed call on `tier`.
    ///
    /// Returns the circuit transition it caused, if any. Unknown tiers are
    /// logged and ignored.
    pub fn report(&self, tier: usize, outcome: CallOutcome) -> Option<CircuitTransition> {
        let Some(breaker) = self.breakers.get(tier) else {
            warn!(tier, "Outcome reported for unknown tier");
            return None;
        };
        let (from, to, recent_failures) = breaker.record(outcome, self.clock.now(), &self.config)?;
        let transition = CircuitTransition {
            tier,
            tier_name: self.names[tier].clone(),
            from,
            to,
            recent_failures,
        };
        if to == CircuitState::Open {
            warn!(
                tier = %transition.tier_name,
                recent_failures,
                cooldown_secs = self.config.cooldown_secs,
                "Tier circuit opened"
            );
        } else {
            info!(tier = %transition.tier_name, from = %from, to = %to, "Tier circuit changed");
        }
        Some(transition)
    }

    /// Circuit state of `tier`; `None` for unknown tiers.
    pub fn state(&self, tier: usize) -> Option<CircuitState> {
        self.breakers
            .get(tier)
            .map(|b| b.state(self.clock.now()))
    }

    /// Whether `tier` may serve requests (closed or half-open).
    /// Unknown tiers are never available.
    pub fn is_available(&self, tier: usize) -> bool {
        self.state(tier).is_some_and(CircuitState::is_available)
    }

    pub fn any_available(&self) -> bool {
        (0..self.breakers.len()).any(|t| self.is_available(t))
    }

    /// Per-tier view for telemetry.
    pub fn snapshot(&self) -> Vec<TierAvailability> {
        let now = self.clock.now();
        self.breakers
            .iter()
            .enumerate()
            .map(|(tier, breaker)| {
                let state = breaker.state(now);
                TierAvailability {
                    tier,
                    name: self.names[tier].clone(),
                    state,
                    available: state.is_available(),
                    recent_failures: breaker.recent_failures(now, &self.config),
                    total_successes: breaker.counters.successes.load(Ordering::Relaxed),
                    total_failures: breaker.counters.failures.load(Ordering::Relaxed),
                    trips: breaker.counters.trips.load(Ordering::Relaxed),
                }
            })
            .collect()
    }
}
