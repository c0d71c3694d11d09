//! Model Escalation Library
//!
//! Decides, turn by turn, which model tier should serve a conversation:
//! cheap tiers for easy exchanges, expensive tiers when the conversation gets
//! hard, within a per-session budget and around tiers that are failing.
//!
//! # Components
//!
//! - [`analyzer`]: scores the recent transcript window (technical depth,
//!   creativity, cognitive load) into a composite `overall` score.
//! - [`budget`]: soft and hard spend limits per session.
//! - [`availability`]: per-tier circuit breakers shared by all sessions.
//! - [`engine`]: the decision itself, with fast escalation and damped
//!   de-escalation.
//! - [`telemetry`]: fire-and-forget decision records for logging and metrics.
//!
//! # Usage
//!
//! ```no_run
//! use escalation_core::{CallOutcome, ConversationTurn, EscalationEngine, EscalatorConfig};
//!
//! let config = EscalatorConfig::from_file("config/escalator.toml")?;
//! let engine = EscalationEngine::from_config(&config)?;
//! let mut session = engine.new_session("conversation-42");
//!
//! let turns = vec![ConversationTurn::user("Design a distributed cache protocol")];
//! let decision = engine.decide(&mut session, &turns);
//! // ... call decision.model, then:
//! engine.report_outcome(&mut session, decision.target_tier_index, CallOutcome::Success, 0.004);
//! # Ok::<(), escalation_core::ConfigError>(())
//! ```

pub mod analyzer;
pub mod availability;
pub mod budget;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod hierarchy;
pub mod session;
pub mod telemetry;

pub use analyzer::{ComplexityAnalyzer, ComplexityScore, ConversationTurn, Role};
pub use availability::{AvailabilityProber, CallOutcome, CircuitState, SharedProber};
pub use budget::{BudgetPolicy, BudgetStatus, BudgetTracker, DowngradeStrategy};
pub use config::EscalatorConfig;
pub use engine::{DecisionReason, EscalationDecision, EscalationEngine};
pub use error::{ConfigError, ConfigResult};
pub use hierarchy::{ModelHierarchy, ModelTier};
pub use session::{SessionState, SessionStore};
pub use telemetry::{TelemetryEmitter, TelemetryEvent, TelemetrySink};
