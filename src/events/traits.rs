use anyhow::Result;
use serde::{Deserialize, Serialize};

/// An activity notification carried by the [`EventBus`](super::EventBus).
///
/// Events are transient: they exist for the duration of dispatch and are
/// never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    /// ISO-8601 timestamp taken at publish time.
    pub ts: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub payload: serde_json::Value,
    #[serde(rename = "userId", default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl Event {
    pub fn new(event_type: &str, payload: serde_json::Value, user_id: Option<&str>) -> Self {
        Self {
            ts: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            event_type: event_type.to_string(),
            payload,
            user_id: user_id.map(ToString::to_string),
        }
    }
}

/// A bus subscriber. Called synchronously on the publishing task.
///
/// Returning an error (or panicking) only affects this listener's delivery;
/// the bus logs it and moves on to the next listener.
pub trait EventListener: Send + Sync {
    fn on_event(&self, event: &Event) -> Result<()>;
}

impl<F> EventListener for F
where
    F: Fn(&Event) -> Result<()> + Send + Sync,
{
    fn on_event(&self, event: &Event) -> Result<()> {
        self(event)
    }
}
