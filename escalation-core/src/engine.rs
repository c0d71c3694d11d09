//! Escalation Engine — deterministic tier selection per conversation turn
//!
//! Combines the complexity score, the session's budget and the shared tier
//! availability into one [`EscalationDecision`]. No model calls happen here.
//!
//! # Priority order
//!
//! ```text
//! 1. hard budget breach    → downgrade tier            (BudgetDowngrade)
//! 2. current tier open     → nearest available tier    (AvailabilityFallback)
//! 3. score maps higher     → escalate now              (ComplexityEscalation)
//!    score maps lower      → de-escalate after K holds (ComplexityDeescalation)
//! 4. otherwise             → stay                      (NoChange)
//! ```
//!
//! Escalation is immediate; de-escalation waits until the session has held
//! its tier for K consecutive decisions, so a single easy turn in a hard
//! conversation doesn't bounce the session down and back up.

use crate::analyzer::{ComplexityAnalyzer, ComplexityScore, ConversationTurn};
use crate::availability::{AvailabilityProber, CallOutcome, SharedProber};
use crate::budget::{BudgetStatus, BudgetTracker};
use crate::config::EscalatorConfig;
use crate::error::ConfigResult;
use crate::hierarchy::ModelHierarchy;
use crate::session::SessionState;
use crate::telemetry::{BudgetWarning, TelemetryEmitter, TelemetryEvent};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Why the engine chose its target tier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    ComplexityEscalation,
    ComplexityDeescalation,
    BudgetDowngrade,
    AvailabilityFallback,
    NoChange,
}

impl std::fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ComplexityEscalation => write!(f, "complexity_escalation"),
            Self::ComplexityDeescalation => write!(f, "complexity_deescalation"),
            Self::BudgetDowngrade => write!(f, "budget_downgrade"),
            Self::AvailabilityFallback => write!(f, "availability_fallback"),
            Self::NoChange => write!(f, "no_change"),
        }
    }
}

/// Decision produced by the Escalation Engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationDecision {
    /// Tier that should serve the next model call
    pub target_tier_index: usize,
    pub target_tier: String,
    /// Model identifier of the target tier
    pub model: String,
    /// Tier the session was on before this decision
    pub previous_tier_index: usize,
    pub previous_tier: String,
    /// Tier the complexity score alone maps to
    pub mapped_tier_index: usize,
    pub reason: DecisionReason,
    /// No tier was available; the current tier was kept anyway
    pub degraded: bool,
    /// Human-readable explanation
    pub rationale: String,
    pub scores: ComplexityScore,
    /// Budget status when the decision was made
    pub budget_status: BudgetStatus,
    /// Hysteresis counter after the decision was applied
    pub hysteresis_counter: u32,
}

impl EscalationDecision {
    pub fn tier_changed(&self) -> bool {
        self.target_tier_index != self.previous_tier_index
    }

    /// Get a summary for logging
    pub fn summary(&self) -> String {
        format!(
            "{} -> {} ({}){} score={:.1} budget={}",
            self.previous_tier,
            self.target_tier,
            self.reason,
            if self.degraded { " DEGRADED" } else { "" },
            self.scores.overall,
            self.budget_status,
        )
    }
}

/// Target chosen before it is applied to the session.
#[derive(Debug)]
struct Step {
    target: usize,
    reason: DecisionReason,
    degraded: bool,
    rationale: String,
}

impl Step {
    fn new(target: usize, reason: DecisionReason, rationale: String) -> Self {
        Self {
            target,
            reason,
            degraded: false,
            rationale,
        }
    }

    fn stay(current: usize, rationale: String) -> Self {
        Self::new(current, DecisionReason::NoChange, rationale)
    }

    fn degraded(current: usize) -> Self {
        Self {
            target: current,
            reason: DecisionReason::AvailabilityFallback,
            degraded: true,
            rationale: "no tier available; keeping current tier".to_string(),
        }
    }
}

/// The Escalation Engine. Shareable across threads; all per-conversation
/// state lives in the [`SessionState`] passed to each call.
#[derive(Debug, Clone)]
pub struct EscalationEngine {
    hierarchy: Arc<ModelHierarchy>,
    analyzer: ComplexityAnalyzer,
    budget: BudgetTracker,
    prober: SharedProber,
    telemetry: TelemetryEmitter,
    deescalation_threshold: u32,
    initial_tier: usize,
}

impl EscalationEngine {
    /// Validate `config` and build every component from it.
    ///
    /// Telemetry starts with no sinks; attach them with [`Self::with_telemetry`].
    pub fn from_config(config: &EscalatorConfig) -> ConfigResult<Self> {
        config.validate()?;
        let hierarchy = config.hierarchy()?;
        let analyzer = ComplexityAnalyzer::from_config(&config.analyzer)?;
        let budget = BudgetTracker::new(config.budget.clone(), &hierarchy)?;
        let prober = AvailabilityProber::new(&hierarchy, config.availability.clone())?.shared();
        let initial_tier = config.initial_tier_index(&hierarchy)?;

        info!(
            tiers = hierarchy.len(),
            initial_tier = %hierarchy.tier(initial_tier).name,
            deescalation_threshold = config.hysteresis.deescalation_threshold,
            "Escalation engine configured"
        );

        Ok(Self {
            hierarchy: Arc::new(hierarchy),
            analyzer,
            budget,
            prober,
            telemetry: TelemetryEmitter::new(),
            deescalation_threshold: config.hysteresis.deescalation_threshold,
            initial_tier,
        })
    }

    /// Share an availability prober with other engines or the gateway.
    /// It must have been built from the same hierarchy.
    pub fn with_prober(mut self, prober: SharedProber) -> Self {
        self.prober = prober;
        self
    }

    pub fn with_telemetry(mut self, telemetry: TelemetryEmitter) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn with_analyzer(mut self, analyzer: ComplexityAnalyzer) -> Self {
        self.analyzer = analyzer;
        self
    }

    pub fn hierarchy(&self) -> &ModelHierarchy {
        &self.hierarchy
    }

    pub fn analyzer(&self) -> &ComplexityAnalyzer {
        &self.analyzer
    }

    pub fn budget(&self) -> &BudgetTracker {
        &self.budget
    }

    pub fn prober(&self) -> &SharedProber {
        &self.prober
    }

    pub fn telemetry(&self) -> &TelemetryEmitter {
        &self.telemetry
    }

    pub fn deescalation_threshold(&self) -> u32 {
        self.deescalation_threshold
    }

    pub fn initial_tier(&self) -> usize {
        self.initial_tier
    }

    /// Fresh session on the configured initial tier.
    pub fn new_session(&self, session_id: impl Into<String>) -> SessionState {
        SessionState::new(session_id, self.initial_tier)
    }

    /// Decide which tier serves the next call and update `session` to match.
    ///
    /// Never fails: an empty transcript scores zero and a session whose
    /// tier index is out of range is clamped to the top tier.
    pub fn decide(
        &self,
        session: &mut SessionState,
        turns: &[ConversationTurn],
    ) -> EscalationDecision {
        let current = self.current_tier(session);
        let scores = self.analyzer.analyze(turns);
        let mapped = self.hierarchy.tier_for_score(scores.overall);
        let budget_status = self.budget.status(session);

        let step = self.choose(current, mapped, budget_status, session);
        self.apply(session, current, &step);
        session.mark_decided();

        let target = self.hierarchy.tier(step.target);
        let decision = EscalationDecision {
            target_tier_index: step.target,
            target_tier: target.name.clone(),
            model: target.model.clone(),
            previous_tier_index: current,
            previous_tier: self.hierarchy.tier(current).name.clone(),
            mapped_tier_index: mapped,
            reason: step.reason,
            degraded: step.degraded,
            rationale: step.rationale,
            scores,
            budget_status,
            hysteresis_counter: session.turns_since_last_escalation,
        };

        if decision.degraded {
            warn!(
                session = %session.session_id,
                tier = %decision.target_tier,
                "Degraded decision: no tier available"
            );
        } else if decision.tier_changed() {
            info!(
                session = %session.session_id,
                from = %decision.previous_tier,
                to = %decision.target_tier,
                reason = %decision.reason,
                score = decision.scores.overall,
                "Tier changed"
            );
        } else {
            debug!(session = %session.session_id, "{}", decision.summary());
        }

        self.telemetry
            .record_decision(&decision, session, self.prober.snapshot());
        decision
    }

    /// Feed the result of a completed call: the outcome goes to the tier's
    /// circuit breaker, the cost to the session's budget.
    ///
    /// Returns the session's budget status after the charge.
    pub fn report_outcome(
        &self,
        session: &mut SessionState,
        tier: usize,
        outcome: CallOutcome,
        cost: f64,
    ) -> BudgetStatus {
        self.report_availability(tier, outcome);

        let before = self.budget.status(session);
        let after = self.budget.charge(session, cost);
        if after > before {
            warn!(
                session = %session.session_id,
                status = %after,
                cumulative_cost = session.cumulative_cost(),
                "Budget threshold crossed"
            );
            let policy = self.budget.policy();
            self.telemetry
                .record(TelemetryEvent::BudgetWarning(BudgetWarning {
                    session_id: session.session_id.clone(),
                    timestamp: Utc::now(),
                    previous_status: before,
                    status: after,
                    cumulative_cost: session.cumulative_cost(),
                    remaining: self.budget.remaining(session),
                    soft_limit: policy.soft_limit,
                    hard_limit: policy.hard_limit,
                }));
        }
        after
    }

    /// Feed a call outcome to the tier's circuit breaker only.
    pub fn report_availability(&self, tier: usize, outcome: CallOutcome) {
        if let Some(transition) = self.prober.report(tier, outcome) {
            self.telemetry
                .record(TelemetryEvent::CircuitTransition(transition));
        }
    }

    fn current_tier(&self, session: &mut SessionState) -> usize {
        let clamped = self.hierarchy.clamp_index(session.current_tier_index);
        if clamped != session.current_tier_index {
            warn!(
                session = %session.session_id,
                tier_index = session.current_tier_index,
                "Session tier out of range; clamping to top tier"
            );
            session.current_tier_index = clamped;
        }
        clamped
    }

    fn choose(
        &self,
        current: usize,
        mapped: usize,
        budget_status: BudgetStatus,
        session: &SessionState,
    ) -> Step {
        if budget_status == BudgetStatus::HardExceeded {
            return self.budget_step(current);
        }

        if !self.prober.is_available(current) {
            return match self.nearest_available(current) {
                Some(t) => Step::new(
                    t,
                    DecisionReason::AvailabilityFallback,
                    format!(
                        "tier {} unavailable; falling back to {}",
                        self.name(current),
                        self.name(t)
                    ),
                ),
                None => Step::degraded(current),
            };
        }

        if mapped > current {
            return self.escalation_step(current, mapped);
        }

        if mapped < current {
            let held = session.turns_since_last_escalation;
            if held < self.deescalation_threshold {
                return Step::stay(
                    current,
                    format!(
                        "score maps to {}; holding {} ({}/{} decisions)",
                        self.name(mapped),
                        self.name(current),
                        held,
                        self.deescalation_threshold
                    ),
                );
            }
            return match (mapped..current).find(|&t| self.prober.is_available(t)) {
                Some(t) => Step::new(
                    t,
                    DecisionReason::ComplexityDeescalation,
                    format!("complexity dropped; moving down to {}", self.name(t)),
                ),
                None => Step::stay(
                    current,
                    "no lower tier available for de-escalation".to_string(),
                ),
            };
        }

        Step::stay(
            current,
            format!("complexity fits {}", self.name(current)),
        )
    }

    fn budget_step(&self, current: usize) -> Step {
        let target = self.budget.downgrade_target(current, &self.hierarchy);
        if self.prober.is_available(target) {
            return Step::new(
                target,
                DecisionReason::BudgetDowngrade,
                format!("hard budget limit reached; clamped to {}", self.name(target)),
            );
        }
        match self.nearest_available(target) {
            Some(t) => Step::new(
                t,
                DecisionReason::AvailabilityFallback,
                format!(
                    "hard budget limit reached; {} unavailable, using {}",
                    self.name(target),
                    self.name(t)
                ),
            ),
            None => Step::degraded(current),
        }
    }

    fn escalation_step(&self, current: usize, mapped: usize) -> Step {
        let below = (current + 1..=mapped).rev();
        let above = mapped + 1..self.hierarchy.len();
        match below.chain(above).find(|&t| self.prober.is_available(t)) {
            Some(t) if t == mapped => Step::new(
                t,
                DecisionReason::ComplexityEscalation,
                format!("complexity rose; escalating to {}", self.name(t)),
            ),
            Some(t) => Step::new(
                t,
                DecisionReason::AvailabilityFallback,
                format!(
                    "complexity maps to {} (unavailable); escalating to {}",
                    self.name(mapped),
                    self.name(t)
                ),
            ),
            None => Step::stay(
                current,
                format!("no tier at or above {} available", self.name(mapped)),
            ),
        }
    }

    /// Closest available tier to `from`, preferring cheaper tiers.
    fn nearest_available(&self, from: usize) -> Option<usize> {
        (0..from)
            .rev()
            .chain(from + 1..self.hierarchy.len())
            .find(|&t| self.prober.is_available(t))
    }

    fn apply(&self, session: &mut SessionState, current: usize, step: &Step) {
        if step.degraded {
            return;
        }
        if step.target != current {
            session.record_transition(step.target, step.reason.clone());
        } else if step.reason == DecisionReason::BudgetDowngrade {
            session.reset_hysteresis();
        } else {
            session.record_no_change();
        }
    }

    fn name(&self, index: usize) -> &str {
        &self.hierarchy.tier(index).name
    }
}
