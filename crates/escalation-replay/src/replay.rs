//! Offline replay of a recorded transcript through the engine.
//!
//! Each growing prefix of the transcript is one decision, as if the gateway
//! had received the conversation turn by turn.

use anyhow::{bail, Context, Result};
use escalation_core::{
    BudgetStatus, CallOutcome, ConversationTurn, EscalationDecision, EscalationEngine,
};
use serde::Serialize;
use std::collections::HashSet;
use std::path::Path;
use tracing::debug;

/// Knobs for a replay run
#[derive(Debug, Clone)]
pub struct ReplayOptions {
    pub session_id: String,
    /// Tokens charged per model call on the chosen tier
    pub tokens_per_turn: u64,
    /// Tiers whose calls are reported as failures
    pub failing_tiers: Vec<String>,
}

/// One line of replay output
#[derive(Debug, Clone, Serialize)]
pub struct ReplayStep {
    pub turn: usize,
    pub decision: EscalationDecision,
    pub outcome: CallOutcome,
    pub charged: f64,
    pub cumulative_cost: f64,
    pub budget_after: BudgetStatus,
}

pub fn load_transcript(path: &Path) -> Result<Vec<ConversationTurn>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read transcript {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse transcript {}", path.display()))
}

pub fn replay(
    engine: &EscalationEngine,
    turns: &[ConversationTurn],
    options: &ReplayOptions,
) -> Result<Vec<ReplayStep>> {
    let hierarchy = engine.hierarchy();
    let mut failing = HashSet::new();
    for name in &options.failing_tiers {
        match hierarchy.index_of(name) {
            Some(idx) => {
                failing.insert(idx);
            }
            None => bail!("Unknown tier in --fail-tier: {name}"),
        }
    }

    let mut session = engine.new_session(options.session_id.clone());
    let mut steps = Vec::with_capacity(turns.len());

    for turn in 1..=turns.len() {
        let decision = engine.decide(&mut session, &turns[..turn]);
        let tier = decision.target_tier_index;

        let (outcome, charged) = if failing.contains(&tier) {
            (CallOutcome::Failure, 0.0)
        } else {
            (
                CallOutcome::Success,
                hierarchy.tier(tier).cost_for_tokens(options.tokens_per_turn),
            )
        };
        let budget_after = engine.report_outcome(&mut session, tier, outcome, charged);
        debug!(turn, "{}", session.summary());

        steps.push(ReplayStep {
            turn,
            decision,
            outcome,
            charged,
            cumulative_cost: session.cumulative_cost(),
            budget_after,
        });
    }

    Ok(steps)
}
