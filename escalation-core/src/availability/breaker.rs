//! Single-tier circuit breaker with a sliding failure window.
//!
//! State is guarded by one `Mutex` per tier; lifetime counters are atomics so
//! snapshots never contend with outcome reports.

use super::{AvailabilityConfig, CallOutcome, CircuitState};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

#[derive(Debug, Clone, Copy)]
enum Phase {
    Closed,
    /// `None`: the deadline is beyond what `Instant` can represent.
    Open { until: Option<Instant> },
    HalfOpen,
}

#[derive(Debug)]
struct BreakerInner {
    phase: Phase,
    failures: VecDeque<Instant>,
}

impl BreakerInner {
    /// Promote Open → HalfOpen once the cool-down deadline has passed.
    fn refresh(&mut self, now: Instant) -> CircuitState {
        if let Phase::Open { until: Some(until) } = self.phase {
            if now >= until {
                self.phase = Phase::HalfOpen;
            }
        }
        self.state()
    }

    fn state(&self) -> CircuitState {
        match self.phase {
            Phase::Closed => CircuitState::Closed,
            Phase::Open { .. } => CircuitState::Open,
            Phase::HalfOpen => CircuitState::HalfOpen,
        }
    }

    fn prune(&mut self, now: Instant, config: &AvailabilityConfig) {
        let window = config.window();
        while let Some(oldest) = self.failures.front() {
            if now.saturating_duration_since(*oldest) >= window {
                self.failures.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Lifetime counters for one tier.
#[derive(Debug, Default)]
pub(crate) struct BreakerCounters {
    pub successes: AtomicU64,
    pub failures: AtomicU64,
    pub trips: AtomicU64,
}

#[derive(Debug)]
pub(crate) struct TierBreaker {
    inner: Mutex<BreakerInner>,
    pub counters: BreakerCounters,
}

impl TierBreaker {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(BreakerInner {
                phase: Phase::Closed,
                failures: VecDeque::new(),
            }),
            counters: BreakerCounters::default(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current state, applying any elapsed cool-down.
    pub fn state(&self, now: Instant) -> CircuitState {
        self.lock().refresh(now)
    }

    /// Failures still inside the sliding window.
    pub fn recent_failures(&self, now: Instant, config: &AvailabilityConfig) -> usize {
        let mut inner = self.lock();
        inner.prune(now, config);
        inner.failures.len()
    }

    /// Apply an outcome. Returns `(before, after, recent_failures)` when the
    /// circuit changed state.
    pub fn record(
        &self,
        outcome: CallOutcome,
        now: Instant,
        config: &AvailabilityConfig,
    ) -> Option<(CircuitState, CircuitState, usize)> {
        let mut inner = self.lock();
        inner.prune(now, config);
        let before = inner.refresh(now);

        match outcome {
            CallOutcome::Success => {
                self.counters.successes.fetch_add(1, Ordering::Relaxed);
                if before == CircuitState::HalfOpen {
                    inner.phase = Phase::Closed;
                    inner.failures.clear();
                }
            }
            CallOutcome::Failure => {
                self.counters.failures.fetch_add(1, Ordering::Relaxed);
                inner.failures.push_back(now);
                let trip = match before {
                    CircuitState::HalfOpen => true,
                    CircuitState::Closed => {
                        inner.failures.len() >= config.failure_threshold as usize
                    }
                    // Late reports from calls started before the trip keep the
                    // original deadline.
                    CircuitState::Open => false,
                };
                if trip {
                    inner.phase = Phase::Open {
                        until: now.checked_add(config.cooldown()),
                    };
                    self.counters.trips.fetch_add(1, Ordering::Relaxed);
                }
            }
        }

        let after = inner.state();
        (after != before).then(|| (before, after, inner.failures.len()))
    }
}
