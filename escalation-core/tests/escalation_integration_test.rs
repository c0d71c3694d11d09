//! Integration tests for the escalation engine
//!
//! Drives full conversations through `EscalationEngine` with the default
//! three-tier configuration (economy [0,15), standard [15,30), premium
//! [30,100]) and checks tier choices, budget enforcement, circuit breaking
//! and the telemetry each step emits.

use escalation_core::availability::AvailabilityProber;
use escalation_core::clock::ManualClock;
use escalation_core::telemetry::BroadcastSink;
use escalation_core::{
    BudgetStatus, CallOutcome, CircuitState, ConversationTurn, DecisionReason, EscalationEngine,
    EscalatorConfig, SessionState, SessionStore, TelemetryEmitter, TelemetryEvent,
};
use std::sync::Arc;
use std::time::Duration;

const ECONOMY: usize = 0;
const STANDARD: usize = 1;
const PREMIUM: usize = 2;

fn engine(k: u32) -> EscalationEngine {
    let mut config = EscalatorConfig::default();
    config.hysteresis.deescalation_threshold = k;
    EscalationEngine::from_config(&config).unwrap()
}

fn plain_conversation() -> Vec<ConversationTurn> {
    vec![
        ConversationTurn::user("hello there"),
        ConversationTurn::assistant("hi"),
        ConversationTurn::user("the weather is nice today"),
        ConversationTurn::user("i had toast for breakfast"),
        ConversationTurn::user("see you later"),
    ]
}

fn technical_conversation() -> Vec<ConversationTurn> {
    vec![
        ConversationTurn::user("We need a new architecture for the billing service"),
        ConversationTurn::user("which algorithm handles the ranking"),
        ConversationTurn::user("thanks for the overview"),
        ConversationTurn::user("is machine learning worth it here"),
    ]
}

fn trip(engine: &EscalationEngine, tier: usize) {
    let threshold = engine.prober().config().failure_threshold;
    for _ in 0..threshold {
        engine.report_availability(tier, CallOutcome::Failure);
    }
}

#[test]
fn test_plain_conversation_stays_on_lowest_tier() {
    let engine = engine(3);
    let mut session = engine.new_session("plain");

    let decision = engine.decide(&mut session, &plain_conversation());
    assert!(
        decision.scores.overall < 5.0,
        "score: {}",
        decision.scores.summary()
    );
    assert_eq!(decision.target_tier_index, ECONOMY);
    assert_eq!(decision.model, "small");
}

#[test]
fn test_plain_conversation_returns_to_lowest_tier_after_hysteresis() {
    let engine = engine(3);
    let mut session = SessionState::new("plain", PREMIUM);

    let mut decisions = Vec::new();
    for _ in 0..4 {
        decisions.push(engine.decide(&mut session, &plain_conversation()));
    }
    assert!(decisions[..3]
        .iter()
        .all(|d| d.reason == DecisionReason::NoChange && d.target_tier_index == PREMIUM));
    assert_eq!(decisions[3].reason, DecisionReason::ComplexityDeescalation);
    assert_eq!(decisions[3].target_tier_index, ECONOMY);
}

#[test]
fn test_technical_keywords_escalate_to_top_tier_immediately() {
    let engine = engine(3);
    let mut session = engine.new_session("tech");

    let decision = engine.decide(&mut session, &technical_conversation());
    assert_eq!(decision.scores.technical_depth, 75.0);
    assert!(decision.scores.overall >= 30.0);
    assert_eq!(decision.target_tier_index, PREMIUM);
    assert_eq!(decision.reason, DecisionReason::ComplexityEscalation);
    assert_eq!(decision.previous_tier_index, ECONOMY);
}

#[test]
fn test_upward_crossing_escalates_on_next_decision_for_any_threshold() {
    for k in [0, 1, 3, 7] {
        let engine = engine(k);
        let mut session = engine.new_session(format!("k{k}"));
        for _ in 0..2 {
            engine.decide(&mut session, &plain_conversation());
        }
        let decision = engine.decide(&mut session, &technical_conversation());
        assert_eq!(decision.target_tier_index, PREMIUM, "k = {k}");
        assert_eq!(decision.reason, DecisionReason::ComplexityEscalation);
    }
}

#[test]
fn test_deescalation_requires_k_held_decisions() {
    for k in [1u32, 2, 4] {
        let engine = engine(k);
        let mut session = engine.new_session("hold");
        engine.decide(&mut session, &technical_conversation());
        assert_eq!(session.current_tier_index, PREMIUM);

        for held in 0..k {
            let d = engine.decide(&mut session, &plain_conversation());
            assert_eq!(d.reason, DecisionReason::NoChange, "k = {k}, held = {held}");
            assert_eq!(d.target_tier_index, PREMIUM);
        }
        let d = engine.decide(&mut session, &plain_conversation());
        assert_eq!(d.reason, DecisionReason::ComplexityDeescalation, "k = {k}");
        assert_eq!(session.current_tier_index, ECONOMY);
    }
}

#[test]
fn test_complex_turn_during_hold_keeps_tier() {
    let engine = engine(2);
    let mut session = engine.new_session("flap");
    engine.decide(&mut session, &technical_conversation());
    engine.decide(&mut session, &plain_conversation());

    // Still premium-worthy: no change, counter keeps counting
    let d = engine.decide(&mut session, &technical_conversation());
    assert_eq!(d.reason, DecisionReason::NoChange);
    assert_eq!(d.target_tier_index, PREMIUM);
}

#[test]
fn test_charge_over_hard_limit_forces_downgrade_on_next_decision() {
    let engine = engine(3);
    let mut session = engine.new_session("budget");
    engine.decide(&mut session, &technical_conversation());

    let status = engine.report_outcome(&mut session, PREMIUM, CallOutcome::Success, 1.99);
    assert_eq!(status, BudgetStatus::SoftExceeded);
    let d = engine.decide(&mut session, &technical_conversation());
    assert_eq!(d.target_tier_index, PREMIUM, "soft limit never blocks");

    let status = engine.report_outcome(&mut session, PREMIUM, CallOutcome::Success, 0.02);
    assert_eq!(status, BudgetStatus::HardExceeded);
    let d = engine.decide(&mut session, &technical_conversation());
    assert_eq!(d.reason, DecisionReason::BudgetDowngrade);
    assert_eq!(d.target_tier_index, ECONOMY);
    assert_eq!(d.budget_status, BudgetStatus::HardExceeded);

    // Stays clamped
    let d = engine.decide(&mut session, &technical_conversation());
    assert_eq!(d.reason, DecisionReason::BudgetDowngrade);
    assert_eq!(d.target_tier_index, ECONOMY);
}

#[test]
fn test_downgrade_target_unavailable_uses_nearest_tier() {
    let engine = engine(3);
    let mut session = engine.new_session("budget");
    engine.decide(&mut session, &technical_conversation());
    engine.report_outcome(&mut session, PREMIUM, CallOutcome::Success, 5.0);
    trip(&engine, ECONOMY);

    let d = engine.decide(&mut session, &technical_conversation());
    assert_eq!(d.reason, DecisionReason::AvailabilityFallback);
    assert_eq!(d.target_tier_index, STANDARD);
}

#[test]
fn test_unavailable_current_tier_moves_to_available_tier() {
    let engine = engine(3);
    let mut session = engine.new_session("fallback");
    trip(&engine, ECONOMY);

    let d = engine.decide(&mut session, &plain_conversation());
    assert_ne!(d.target_tier_index, ECONOMY);
    assert_eq!(d.target_tier_index, STANDARD, "nearest tier wins");
    assert_eq!(d.reason, DecisionReason::AvailabilityFallback);
    assert!(!d.degraded);
}

#[test]
fn test_everything_down_is_degraded_not_an_error() {
    let engine = engine(3);
    for tier in [ECONOMY, STANDARD, PREMIUM] {
        trip(&engine, tier);
    }
    assert!(!engine.prober().any_available());

    let mut session = engine.new_session("dark");
    let d = engine.decide(&mut session, &technical_conversation());
    assert!(d.degraded);
    assert_eq!(d.target_tier_index, ECONOMY);
    assert_eq!(session.turns_since_last_escalation, 0);
}

#[test]
fn test_tier_recovers_after_cooldown() {
    let config = EscalatorConfig::default();
    let clock = Arc::new(ManualClock::new());
    let base = EscalationEngine::from_config(&config).unwrap();
    let prober = AvailabilityProber::with_clock(
        base.hierarchy(),
        config.availability.clone(),
        clock.clone(),
    )
    .unwrap()
    .shared();
    let engine = base.with_prober(prober);

    trip(&engine, PREMIUM);
    let mut session = engine.new_session("recover");
    let d = engine.decide(&mut session, &technical_conversation());
    assert_eq!(d.target_tier_index, STANDARD);

    clock.advance(Duration::from_secs(config.availability.cooldown_secs));
    assert_eq!(engine.prober().state(PREMIUM), Some(CircuitState::HalfOpen));

    let d = engine.decide(&mut session, &technical_conversation());
    assert_eq!(d.target_tier_index, PREMIUM);
    assert_eq!(d.reason, DecisionReason::ComplexityEscalation);

    engine.report_outcome(&mut session, PREMIUM, CallOutcome::Success, 0.01);
    assert_eq!(engine.prober().state(PREMIUM), Some(CircuitState::Closed));
}

#[test]
fn test_boundary_score_belongs_to_higher_tier() {
    let engine = engine(3);
    let h = engine.hierarchy();
    assert_eq!(h.tier_for_score(15.0), STANDARD);
    assert_eq!(h.tier_for_score(30.0), PREMIUM);
    assert_eq!(h.tier_for_score(14.999), ECONOMY);
    assert_eq!(h.tier_for_score(100.0), PREMIUM);
}

#[test]
fn test_overall_score_is_bounded_for_varied_transcripts() {
    let engine = engine(3);
    let pool = [
        "the", "Quantum", "Field", "Theory", "algorithm", "poem", "because", "which",
        "however,", "so that", "we", "ship", "kubernetes;", "story:", "and", "then",
        "Grand", "Central", "Station", "if", "neural network", "imagine", "latency.",
    ];

    let mut seed: u64 = 0x5eed;
    for case in 0..200 {
        let turn_count = (case % 12) + 1;
        let turns: Vec<ConversationTurn> = (0..turn_count)
            .map(|t| {
                let words = (case * 7 + t * 13) % 300;
                let text = (0..words)
                    .map(|_| {
                        seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                        pool[(seed >> 33) as usize % pool.len()]
                    })
                    .collect::<Vec<_>>()
                    .join(" ");
                ConversationTurn::user(text)
            })
            .collect();

        let score = engine.analyzer().analyze(&turns);
        for value in [
            score.overall,
            score.cognitive_load,
            score.technical_depth,
            score.creativity_level,
        ] {
            assert!(
                (0.0..=100.0).contains(&value),
                "case {case}: {}",
                score.summary()
            );
        }
    }
}

#[test]
fn test_empty_transcript_scores_zero() {
    let engine = engine(3);
    let mut session = engine.new_session("empty");
    let d = engine.decide(&mut session, &[]);
    assert_eq!(d.scores.overall, 0.0);
    assert_eq!(d.scores.cognitive_load, 0.0);
    assert_eq!(d.scores.technical_depth, 0.0);
    assert_eq!(d.scores.creativity_level, 0.0);
    assert_eq!(d.target_tier_index, ECONOMY);
}

#[test]
fn test_sessions_are_isolated_in_store() {
    let engine = Arc::new(engine(3));
    let store = Arc::new(SessionStore::new(Duration::from_secs(600)));

    let handles: Vec<_> = (0..6)
        .map(|i| {
            let engine = Arc::clone(&engine);
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                let id = format!("session-{i}");
                let turns = if i % 2 == 0 {
                    technical_conversation()
                } else {
                    plain_conversation()
                };
                for _ in 0..10 {
                    store.with_session(&id, || engine.new_session(id.clone()), |s| {
                        let tier = engine.decide(s, &turns).target_tier_index;
                        engine.report_outcome(s, tier, CallOutcome::Success, 0.01);
                    });
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(store.len(), 6);
    for i in 0..6 {
        let s = store.get(&format!("session-{i}")).unwrap();
        assert_eq!(s.decision_count, 10);
        assert!((s.cumulative_cost() - 0.1).abs() < 1e-9);
        let expected = if i % 2 == 0 { PREMIUM } else { ECONOMY };
        assert_eq!(s.current_tier_index, expected, "session-{i}");
    }
}

#[tokio::test]
async fn test_telemetry_records_decisions_budget_and_circuits() {
    let sink = BroadcastSink::new(64);
    let mut rx = sink.subscribe();
    let engine = engine(3).with_telemetry(TelemetryEmitter::new().with_sink(sink));
    let mut session = engine.new_session("observed");

    engine.decide(&mut session, &technical_conversation());
    engine.report_outcome(&mut session, PREMIUM, CallOutcome::Success, 1.2);
    trip(&engine, PREMIUM);

    match rx.recv().await.unwrap() {
        TelemetryEvent::Decision(record) => {
            assert_eq!(record.session_id, "observed");
            assert_eq!(record.from_tier_index, ECONOMY);
            assert_eq!(record.to_tier, "premium");
            assert_eq!(record.reason, DecisionReason::ComplexityEscalation);
            assert_eq!(record.budget_status, BudgetStatus::Ok);
            assert_eq!(record.availability.len(), 3);
            assert!(!record.decision_id.is_empty());
        }
        other => panic!("expected decision, got {}", other.event_type()),
    }

    match rx.recv().await.unwrap() {
        TelemetryEvent::BudgetWarning(warning) => {
            assert_eq!(warning.previous_status, BudgetStatus::Ok);
            assert_eq!(warning.status, BudgetStatus::SoftExceeded);
            assert!((warning.cumulative_cost - 1.2).abs() < 1e-12);
            assert!((warning.remaining - 0.8).abs() < 1e-12);
        }
        other => panic!("expected budget warning, got {}", other.event_type()),
    }

    match rx.recv().await.unwrap() {
        TelemetryEvent::CircuitTransition(t) => {
            assert_eq!(t.tier, PREMIUM);
            assert_eq!(t.to, CircuitState::Open);
        }
        other => panic!("expected circuit transition, got {}", other.event_type()),
    }
}

/// Drain pending events, keeping `(previous, new)` for each budget warning.
fn budget_warnings(
    rx: &mut tokio::sync::broadcast::Receiver<TelemetryEvent>,
) -> Vec<(BudgetStatus, BudgetStatus)> {
    let mut warnings = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let TelemetryEvent::BudgetWarning(w) = event {
            warnings.push((w.previous_status, w.status));
        }
    }
    warnings
}

#[tokio::test]
async fn test_single_charge_past_hard_limit_warns_once() {
    let sink = BroadcastSink::new(16);
    let mut rx = sink.subscribe();
    let engine = engine(3).with_telemetry(TelemetryEmitter::new().with_sink(sink));
    let mut session = engine.new_session("jump");

    engine.report_outcome(&mut session, ECONOMY, CallOutcome::Success, 2.5);

    assert_eq!(
        budget_warnings(&mut rx),
        vec![(BudgetStatus::Ok, BudgetStatus::HardExceeded)]
    );
}

#[tokio::test]
async fn test_budget_warnings_only_on_level_changes() {
    let sink = BroadcastSink::new(16);
    let mut rx = sink.subscribe();
    let engine = engine(3).with_telemetry(TelemetryEmitter::new().with_sink(sink));
    let mut session = engine.new_session("climb");

    engine.report_outcome(&mut session, ECONOMY, CallOutcome::Success, 1.2);
    assert_eq!(
        budget_warnings(&mut rx),
        vec![(BudgetStatus::Ok, BudgetStatus::SoftExceeded)]
    );

    engine.report_outcome(&mut session, ECONOMY, CallOutcome::Success, 0.1);
    assert!(budget_warnings(&mut rx).is_empty(), "still soft-exceeded");

    engine.report_outcome(&mut session, ECONOMY, CallOutcome::Success, 0.9);
    assert_eq!(
        budget_warnings(&mut rx),
        vec![(BudgetStatus::SoftExceeded, BudgetStatus::HardExceeded)]
    );

    engine.report_outcome(&mut session, ECONOMY, CallOutcome::Success, 1.0);
    assert!(budget_warnings(&mut rx).is_empty(), "still hard-exceeded");
}
