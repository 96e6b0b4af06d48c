//! Structured logging of bus activity.

use crate::events::{Event, EventListener};

/// Bus listener that writes every event to the `tracing` log.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventLogSink;

impl EventListener for EventLogSink {
    fn on_event(&self, event: &Event) -> anyhow::Result<()> {
        tracing::info!(
            event_type = %event.event_type,
            user_id = event.user_id.as_deref().unwrap_or("-"),
            ts = %event.ts,
            payload = %event.payload,
            "Bus event"
        );
        Ok(())
    }
}
