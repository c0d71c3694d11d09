//! Telemetry Emitter — one-way, fire-and-forget decision records
//!
//! Every decision, budget-threshold crossing and circuit change becomes a
//! [`TelemetryEvent`] handed to each configured [`TelemetrySink`]. Sink
//! failures are logged and counted, never surfaced to the caller, and nothing
//! in the engine reads telemetry back.

pub mod sinks;

pub use sinks::{BroadcastSink, TracingSink};

use crate::analyzer::ComplexityScore;
use crate::availability::{CircuitTransition, TierAvailability};
use crate::budget::BudgetStatus;
use crate::engine::{DecisionReason, EscalationDecision};
use crate::session::SessionState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// Errors a sink may report. The emitter swallows them.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("Sink {sink} rejected event: {reason}")]
    Rejected { sink: String, reason: String },

    #[error("Failed to serialize event: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for sink operations
pub type TelemetryResult<T> = Result<T, TelemetryError>;

/// Full record of one escalation decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub decision_id: String,
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub from_tier_index: usize,
    pub from_tier: String,
    pub to_tier_index: usize,
    pub to_tier: String,
    pub model: String,
    pub reason: DecisionReason,
    pub degraded: bool,
    pub scores: ComplexityScore,
    pub budget_status: BudgetStatus,
    pub cumulative_cost: f64,
    pub hysteresis_counter: u32,
    pub availability: Vec<TierAvailability>,
}

impl DecisionRecord {
    /// Build a record from a decision and the session state after it was applied.
    pub fn new(
        decision: &EscalationDecision,
        session: &SessionState,
        availability: Vec<TierAvailability>,
    ) -> Self {
        Self {
            decision_id: Uuid::new_v4().to_string(),
            session_id: session.session_id.clone(),
            timestamp: Utc::now(),
            from_tier_index: decision.previous_tier_index,
            from_tier: decision.previous_tier.clone(),
            to_tier_index: decision.target_tier_index,
            to_tier: decision.target_tier.clone(),
            model: decision.model.clone(),
            reason: decision.reason.clone(),
            degraded: decision.degraded,
            scores: decision.scores,
            budget_status: decision.budget_status,
            cumulative_cost: session.cumulative_cost(),
            hysteresis_counter: session.turns_since_last_escalation,
            availability,
        }
    }
}

/// A session's spend crossed a budget threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetWarning {
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub previous_status: BudgetStatus,
    pub status: BudgetStatus,
    pub cumulative_cost: f64,
    /// USD left before the hard limit
    pub remaining: f64,
    pub soft_limit: f64,
    pub hard_limit: f64,
}

/// Everything the emitter can publish
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TelemetryEvent {
    Decision(DecisionRecord),
    BudgetWarning(BudgetWarning),
    CircuitTransition(CircuitTransition),
}

impl TelemetryEvent {
    /// Get the event type name for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Decision(_) => "decision",
            Self::BudgetWarning(_) => "budget_warning",
            Self::CircuitTransition(_) => "circuit_transition",
        }
    }

    /// Session the event belongs to, if any
    pub fn session_id(&self) -> Option<&str> {
        match self {
            Self::Decision(r) => Some(&r.session_id),
            Self::BudgetWarning(w) => Some(&w.session_id),
            Self::CircuitTransition(_) => None,
        }
    }
}

/// Destination for telemetry events
pub trait TelemetrySink: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Deliver one event. Must not block on slow consumers.
    fn emit(&self, event: &TelemetryEvent) -> TelemetryResult<()>;
}

/// Fans events out to every configured sink.
#[derive(Clone, Default)]
pub struct TelemetryEmitter {
    sinks: Vec<Arc<dyn TelemetrySink>>,
    dropped: Arc<AtomicU64>,
}

impl std::fmt::Debug for TelemetryEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryEmitter")
            .field(
                "sinks",
                &self.sinks.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .field("dropped", &self.dropped_events())
            .finish()
    }
}

impl TelemetryEmitter {
    /// Emitter with no sinks; every event is discarded.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: impl TelemetrySink + 'static) -> Self {
        self.sinks.push(Arc::new(sink));
        self
    }

    pub fn with_shared_sink(mut self, sink: Arc<dyn TelemetrySink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    /// Events a sink failed to accept, summed over all sinks.
    pub fn dropped_events(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Hand `event` to every sink. Never fails.
    pub fn record(&self, event: TelemetryEvent) {
        for sink in &self.sinks {
            if let Err(e) = sink.emit(&event) {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    sink = sink.name(),
                    event_type = event.event_type(),
                    error = %e,
                    "Telemetry sink failed"
                );
            }
        }
    }

    pub fn record_decision(
        &self,
        decision: &EscalationDecision,
        session: &SessionState,
        availability: Vec<TierAvailability>,
    ) {
        if self.sinks.is_empty() {
            return;
        }
        self.record(TelemetryEvent::Decision(DecisionRecord::new(
            decision,
            session,
            availability,
        )));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::availability::CircuitState;
    use mockall::mock;
    use std::sync::Mutex;

    mock! {
        pub Sink {}
        impl TelemetrySink for Sink {
            fn name(&self) -> &'static str;
            fn emit(&self, event: &TelemetryEvent) -> TelemetryResult<()>;
        }
    }

    /// Keeps every event it receives.
    #[derive(Default)]
    struct CollectingSink {
        events: Mutex<Vec<TelemetryEvent>>,
    }

    impl TelemetrySink for CollectingSink {
        fn name(&self) -> &'static str {
            "collect"
        }

        fn emit(&self, event: &TelemetryEvent) -> TelemetryResult<()> {
            self.events.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    fn warning() -> TelemetryEvent {
        TelemetryEvent::BudgetWarning(BudgetWarning {
            session_id: "s-1".into(),
            timestamp: Utc::now(),
            previous_status: BudgetStatus::Ok,
            status: BudgetStatus::SoftExceeded,
            cumulative_cost: 1.1,
            remaining: 0.9,
            soft_limit: 1.0,
            hard_limit: 2.0,
        })
    }

    fn transition() -> TelemetryEvent {
        TelemetryEvent::CircuitTransition(CircuitTransition {
            tier: 1,
            tier_name: "standard".into(),
            from: CircuitState::Closed,
            to: CircuitState::Open,
            recent_failures: 3,
        })
    }

    #[test]
    fn test_failing_sink_is_swallowed_and_counted() {
        let mut failing = MockSink::new();
        failing.expect_name().return_const("failing");
        failing.expect_emit().times(2).returning(|_| {
            Err(TelemetryError::Rejected {
                sink: "failing".into(),
                reason: "backend down".into(),
            })
        });
        let collecting = Arc::new(CollectingSink::default());

        let emitter = TelemetryEmitter::new()
            .with_sink(failing)
            .with_shared_sink(collecting.clone());
        emitter.record(warning());
        emitter.record(transition());

        assert_eq!(emitter.dropped_events(), 2);
        assert_eq!(
            collecting.events.lock().unwrap().len(),
            2,
            "later sinks still receive events"
        );
    }

    #[test]
    fn test_sink_receives_exact_event() {
        let mut sink = MockSink::new();
        sink.expect_name().return_const("mock");
        sink.expect_emit()
            .withf(|e| e.event_type() == "circuit_transition")
            .times(1)
            .returning(|_| Ok(()));

        let emitter = TelemetryEmitter::new().with_sink(sink);
        emitter.record(transition());
        assert_eq!(emitter.dropped_events(), 0);
    }

    #[test]
    fn test_event_serialization_tags() {
        let json = serde_json::to_value(warning()).unwrap();
        assert_eq!(json["event"], "budget_warning");
        assert_eq!(json["status"], "soft_exceeded");

        let json = serde_json::to_value(transition()).unwrap();
        assert_eq!(json["event"], "circuit_transition");
        assert_eq!(json["to"], "open");
    }

    #[test]
    fn test_session_id_accessor() {
        assert_eq!(warning().session_id(), Some("s-1"));
        assert_eq!(transition().session_id(), None);
    }

    #[test]
    fn test_tracing_sink_accepts_events() {
        assert!(TracingSink.emit(&warning()).is_ok());
    }

    #[tokio::test]
    async fn test_broadcast_sink_delivers_to_subscribers() {
        let sink = BroadcastSink::new(16);
        let mut rx = sink.subscribe();
        let emitter = TelemetryEmitter::new().with_sink(sink.clone());

        emitter.record(warning());
        emitter.record(transition());

        assert_eq!(rx.recv().await.unwrap().event_type(), "budget_warning");
        assert_eq!(rx.recv().await.unwrap().event_type(), "circuit_transition");
    }

    #[test]
    fn test_broadcast_sink_without_receivers_is_ok() {
        let sink = BroadcastSink::default();
        assert_eq!(sink.subscriber_count(), 0);
        assert!(sink.emit(&warning()).is_ok());
    }
}
