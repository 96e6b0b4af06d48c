//! In-process activity bus decoupling producers (fulfillment, health checks)
//! from consumers (dashboard feed, log sinks).

pub mod bus;
pub mod traits;

pub use bus::{EventBus, EventStream, Subscription};
pub use traits::{Event, EventListener};

/// Event type emitted after a fulfillment request resolves.
pub const FULFILLMENT_EVENT: &str = "fulfillment";

/// Event type emitted when the assistant health endpoint is polled.
pub const HEALTH_EVENT: &str = "health";
