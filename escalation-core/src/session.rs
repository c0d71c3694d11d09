//! Session State — per-conversation tier, cost and hysteresis tracking
//!
//! A `SessionState` is owned by exactly one conversation. The engine takes it
//! by `&mut` on every decision, so the gateway decides where it lives.
//! [`SessionStore`] is an optional gateway-side home for it with per-session
//! locking, explicit close and TTL expiry.

use crate::clock::{Clock, SystemClock};
use crate::engine::DecisionReason;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tracing::debug;

/// Transitions kept per session; older ones are dropped.
const MAX_TRANSITIONS: usize = 32;

/// Record of a tier change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierTransition {
    pub from_tier: usize,
    pub to_tier: usize,
    pub reason: DecisionReason,
    pub at: DateTime<Utc>,
}

/// Mutable per-conversation record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    /// Gateway-assigned session identifier
    pub session_id: String,
    /// Index into the model hierarchy of the tier currently serving the session
    pub current_tier_index: usize,
    /// Total spend in USD; only ever grows
    cumulative_cost: f64,
    /// Hysteresis counter: consecutive no-change decisions since the last tier change
    pub turns_since_last_escalation: u32,
    /// When the last decision was made
    pub last_decision_timestamp: Option<DateTime<Utc>>,
    /// When the session was created
    pub created_at: DateTime<Utc>,
    /// Decisions made for this session
    pub decision_count: u64,
    /// Most recent tier changes, oldest first
    pub transitions: Vec<TierTransition>,
}

impl SessionState {
    /// Fresh session at `tier_index` with zero spend.
    pub fn new(session_id: impl Into<String>, tier_index: usize) -> Self {
        Self {
            session_id: session_id.into(),
            current_tier_index: tier_index,
            cumulative_cost: 0.0,
            turns_since_last_escalation: 0,
            last_decision_timestamp: None,
            created_at: Utc::now(),
            decision_count: 0,
            transitions: Vec::new(),
        }
    }

    pub fn cumulative_cost(&self) -> f64 {
        self.cumulative_cost
    }

    /// Add a non-negative, finite amount. Returns whether it was applied.
    pub(crate) fn add_cost(&mut self, cost: f64) -> bool {
        if !cost.is_finite() || cost < 0.0 {
            return false;
        }
        self.cumulative_cost += cost;
        true
    }

    /// Move to `to_tier` and reset the hysteresis counter.
    pub(crate) fn record_transition(&mut self, to_tier: usize, reason: DecisionReason) {
        self.transitions.push(TierTransition {
            from_tier: self.current_tier_index,
            to_tier,
            reason,
            at: Utc::now(),
        });
        if self.transitions.len() > MAX_TRANSITIONS {
            self.transitions.remove(0);
        }
        self.current_tier_index = to_tier;
        self.turns_since_last_escalation = 0;
    }

    pub(crate) fn record_no_change(&mut self) {
        self.turns_since_last_escalation = self.turns_since_last_escalation.saturating_add(1);
    }

    pub(crate) fn reset_hysteresis(&mut self) {
        self.turns_since_last_escalation = 0;
    }

    pub(crate) fn mark_decided(&mut self) {
        self.decision_count += 1;
        self.last_decision_timestamp = Some(Utc::now());
    }

    /// Get a summary for logging
    pub fn summary(&self) -> String {
        format!(
            "session={} tier={} cost={:.6} hysteresis={} decisions={}",
            self.session_id,
            self.current_tier_index,
            self.cumulative_cost,
            self.turns_since_last_escalation,
            self.decision_count,
        )
    }
}

/// A stored session plus its last-access time.
#[derive(Debug)]
struct SessionSlot {
    state: Mutex<SessionState>,
    last_touched: Mutex<Instant>,
}

/// Gateway-side session map with per-session mutual exclusion and TTL expiry.
///
/// Each session sits behind its own `Mutex`, so concurrent decisions for one
/// session serialize while different sessions proceed in parallel.
#[derive(Debug)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Arc<SessionSlot>>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl,
            clock,
        }
    }

    /// Run `f` with exclusive access to the session, creating it with `init`
    /// when it does not exist yet.
    pub fn with_session<R>(
        &self,
        session_id: &str,
        init: impl FnOnce() -> SessionState,
        f: impl FnOnce(&mut SessionState) -> R,
    ) -> R {
        let slot = self.slot(session_id, init);
        *slot
            .last_touched
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = self.clock.now();
        let mut state = slot.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }

    /// Copy of the stored state, if present.
    pub fn get(&self, session_id: &str) -> Option<SessionState> {
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        sessions.get(session_id).map(|slot| {
            slot.state
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        })
    }

    /// Remove a session explicitly, returning its final state.
    pub fn close(&self, session_id: &str) -> Option<SessionState> {
        let slot = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(session_id)?;
        debug!(session = session_id, "Session closed");
        let state = slot.state.lock().unwrap_or_else(PoisonError::into_inner);
        Some(state.clone())
    }

    /// Drop sessions idle for longer than the TTL. Returns their ids.
    pub fn evict_expired(&self) -> Vec<String> {
        let now = self.clock.now();
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        let expired: Vec<String> = sessions
            .iter()
            .filter(|(_, slot)| {
                let touched = *slot
                    .last_touched
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                now.saturating_duration_since(touched) >= self.ttl
            })
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            sessions.remove(id);
            debug!(session = %id, "Session expired");
        }
        expired
    }

    pub fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, session_id: &str, init: impl FnOnce() -> SessionState) -> Arc<SessionSlot> {
        if let Some(slot) = self
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(session_id)
        {
            return Arc::clone(slot);
        }

        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        let now = self.clock.now();
        Arc::clone(sessions.entry(session_id.to_string()).or_insert_with(|| {
            debug!(session = session_id, "Session created");
            Arc::new(SessionSlot {
                state: Mutex::new(init()),
                last_touched: Mutex::new(now),
            })
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[test]
    fn test_new_session_starts_at_zero() {
        let s = SessionState::new("s-1", 0);
        assert_eq!(s.cumulative_cost(), 0.0);
        assert_eq!(s.turns_since_last_escalation, 0);
        assert!(s.last_decision_timestamp.is_none());
        assert!(s.transitions.is_empty());
    }

    #[test]
    fn test_cost_never_decreases() {
        let mut s = SessionState::new("s-1", 0);
        assert!(s.add_cost(0.5));
        assert!(!s.add_cost(-0.2));
        assert!(!s.add_cost(f64::NAN));
        assert!(!s.add_cost(f64::INFINITY));
        assert!((s.cumulative_cost() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_transition_resets_hysteresis() {
        let mut s = SessionState::new("s-1", 0);
        s.record_no_change();
        s.record_no_change();
        assert_eq!(s.turns_since_last_escalation, 2);

        s.record_transition(2, DecisionReason::ComplexityEscalation);
        assert_eq!(s.current_tier_index, 2);
        assert_eq!(s.turns_since_last_escalation, 0);
        assert_eq!(s.transitions.len(), 1);
        assert_eq!(s.transitions[0].from_tier, 0);
    }

    #[test]
    fn test_transition_history_is_bounded() {
        let mut s = SessionState::new("s-1", 0);
        for i in 0..(MAX_TRANSITIONS + 10) {
            s.record_transition(i % 3, DecisionReason::ComplexityEscalation);
        }
        assert_eq!(s.transitions.len(), MAX_TRANSITIONS);
    }

    #[test]
    fn test_state_serialization_keeps_cost() {
        let mut s = SessionState::new("s-9", 1);
        s.add_cost(1.25);
        let json = serde_json::to_string(&s).unwrap();
        assert!(json.contains("\"cumulative_cost\":1.25"), "JSON: {json}");
        let back: SessionState = serde_json::from_str(&json).unwrap();
        assert_eq!(back.cumulative_cost(), 1.25);
        assert_eq!(back.current_tier_index, 1);
    }

    #[test]
    fn test_store_creates_once_and_mutates_in_place() {
        let store = SessionStore::new(Duration::from_secs(60));
        store.with_session("a", || SessionState::new("a", 0), |s| s.add_cost(1.0));
        store.with_session("a", || SessionState::new("a", 2), |s| s.add_cost(1.0));

        let s = store.get("a").unwrap();
        assert_eq!(s.current_tier_index, 0, "init must only run once");
        assert!((s.cumulative_cost() - 2.0).abs() < 1e-12);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_store_close() {
        let store = SessionStore::new(Duration::from_secs(60));
        store.with_session("a", || SessionState::new("a", 0), |_| ());
        let closed = store.close("a").unwrap();
        assert_eq!(closed.session_id, "a");
        assert!(store.is_empty());
        assert!(store.close("a").is_none());
    }

    #[test]
    fn test_store_ttl_eviction() {
        let clock = Arc::new(ManualClock::new());
        let store = SessionStore::with_clock(Duration::from_secs(30), clock.clone());
        store.with_session("old", || SessionState::new("old", 0), |_| ());
        clock.advance(Duration::from_secs(20));
        store.with_session("new", || SessionState::new("new", 0), |_| ());
        clock.advance(Duration::from_secs(15));

        let evicted = store.evict_expired();
        assert_eq!(evicted, vec!["old".to_string()]);
        assert!(store.get("old").is_none());
        assert!(store.get("new").is_some());
    }

    #[test]
    fn test_store_serializes_concurrent_updates() {
        let store = Arc::new(SessionStore::new(Duration::from_secs(60)));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        store.with_session(
                            "shared",
                            || SessionState::new("shared", 0),
                            |s| s.record_no_change(),
                        );
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(store.get("shared").unwrap().turns_since_last_escalation, 800);
    }
}
