//! Built-in telemetry sinks

use super::{TelemetryError, TelemetryEvent, TelemetrySink};
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Channel capacity for the broadcast sink
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Writes every event as a structured `tracing` record with a JSON payload.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl TelemetrySink for TracingSink {
    fn name(&self) -> &'static str {
        "tracing"
    }

    fn emit(&self, event: &TelemetryEvent) -> Result<(), TelemetryError> {
        let payload = serde_json::to_string(event)?;
        info!(
            target: "escalation::telemetry",
            event_type = event.event_type(),
            session = event.session_id().unwrap_or("-"),
            payload = %payload,
            "Telemetry event"
        );
        Ok(())
    }
}

/// Fans events out to in-process subscribers over a tokio broadcast channel.
///
/// Sending never blocks. Slow subscribers lag and lose the oldest events.
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    sender: broadcast::Sender<TelemetryEvent>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TelemetryEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for BroadcastSink {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

impl TelemetrySink for BroadcastSink {
    fn name(&self) -> &'static str {
        "broadcast"
    }

    fn emit(&self, event: &TelemetryEvent) -> Result<(), TelemetryError> {
        let event_type = event.event_type();
        match self.sender.send(event.clone()) {
            Ok(receivers) => debug!(event_type, receivers, "Telemetry event broadcast"),
            // No receivers is fine
            Err(_) => debug!(event_type, "Telemetry event broadcast (no receivers)"),
        }
        Ok(())
    }
}
