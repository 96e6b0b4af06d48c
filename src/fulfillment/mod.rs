//! Webhook fulfillment: request parsing, intent resolution, and the handler
//! that ties resolution to session memory and the event bus.

pub mod handler;
pub mod request;
pub mod resolver;

pub use handler::FulfillmentHandler;
pub use request::{FulfillmentRequest, IntentSource};
pub use resolver::{
    resolve, resolve_response, respond, FulfillmentResponse, Intent, Resolution, APOLOGY_TEXT,
    FALLBACK_TEXT,
};
