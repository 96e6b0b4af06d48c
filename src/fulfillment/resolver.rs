//! Pure intent resolution: canonical request + counts → response text.

use serde::{Deserialize, Serialize};

use super::request::FulfillmentRequest;
use crate::catalog::ShopCounts;

pub const FALLBACK_TEXT: &str = "Unhandled intent. Try saying: dashboard.";
pub const APOLOGY_TEXT: &str = "Sorry, there was an error handling your request.";

/// The only payload ever returned to the NLU platform.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FulfillmentResponse {
    #[serde(rename = "fulfillmentText")]
    pub fulfillment_text: String,
}

impl FulfillmentResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            fulfillment_text: text.into(),
        }
    }

    pub fn fallback() -> Self {
        Self::text(FALLBACK_TEXT)
    }

    pub fn apology() -> Self {
        Self::text(APOLOGY_TEXT)
    }
}

/// Known intents. Anything else resolves to the fallback response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Dashboard,
    Unknown(String),
}

impl Intent {
    /// Case-insensitive match of an already-canonical intent name.
    pub fn parse(name: &str) -> Self {
        if name.eq_ignore_ascii_case("dashboard") {
            Self::Dashboard
        } else {
            Self::Unknown(name.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Dashboard => "dashboard",
            Self::Unknown(name) => name,
        }
    }
}

/// Canonical (trimmed, lower-cased) intent name; `""` when none was given.
pub fn resolve(request: &FulfillmentRequest) -> String {
    request.intent.raw().trim().to_lowercase()
}

pub fn respond(intent: &Intent, counts: ShopCounts) -> FulfillmentResponse {
    match intent {
        Intent::Dashboard => FulfillmentResponse::text(format!(
            "Dashboard is up. Orders: {}, Inventory items: {}. Say \"shop status\" for more.",
            counts.orders, counts.inventory_items
        )),
        Intent::Unknown(_) => FulfillmentResponse::fallback(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub intent: String,
    pub response: FulfillmentResponse,
}

/// `resolve` then `respond`. No I/O; deterministic in its inputs.
pub fn resolve_response(request: &FulfillmentRequest, counts: ShopCounts) -> Resolution {
    let intent = resolve(request);
    let response = respond(&Intent::parse(&intent), counts);
    Resolution { intent, response }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const DASHBOARD_TEXT: &str =
        "Dashboard is up. Orders: 0, Inventory items: 0. Say \"shop status\" for more.";

    #[test]
    fn dashboard_in_any_casing_resolves() {
        for name in ["Dashboard", "dashboard", "DASHBOARD", "dAsHbOaRd"] {
            let req = FulfillmentRequest::from_value(&json!({
                "queryResult": {"intent": {"displayName": name}}
            }));
            let resolution = resolve_response(&req, ShopCounts::default());
            assert_eq!(resolution.intent, "dashboard");
            assert_eq!(resolution.response.fulfillment_text, DASHBOARD_TEXT);
        }
    }

    #[test]
    fn direct_shape_dashboard_resolves() {
        let resolution =
            resolve_response(&FulfillmentRequest::direct("dashboard"), ShopCounts::default());
        assert_eq!(resolution.response.fulfillment_text, DASHBOARD_TEXT);
    }

    #[test]
    fn dashboard_reports_supplied_counts() {
        let counts = ShopCounts {
            orders: 12,
            inventory_items: 40,
        };
        let response = respond(&Intent::Dashboard, counts);
        assert_eq!(
            response.fulfillment_text,
            "Dashboard is up. Orders: 12, Inventory items: 40. Say \"shop status\" for more."
        );
    }

    #[test]
    fn missing_intent_gets_fallback() {
        let resolution = resolve_response(
            &FulfillmentRequest::from_value(&json!({})),
            ShopCounts::default(),
        );
        assert_eq!(resolution.intent, "");
        assert_eq!(resolution.response, FulfillmentResponse::fallback());
        assert!(FALLBACK_TEXT.contains("dashboard"));
    }

    #[test]
    fn whitespace_nlu_name_shadows_direct_intent() {
        let resolution = resolve_response(
            &FulfillmentRequest::from_value(&json!({
                "queryResult": {"intent": {"displayName": "   "}},
                "intent": "dashboard"
            })),
            ShopCounts::default(),
        );
        assert_eq!(resolution.intent, "");
        assert_eq!(resolution.response.fulfillment_text, FALLBACK_TEXT);
    }

    #[test]
    fn unknown_intent_gets_fallback() {
        let resolution = resolve_response(
            &FulfillmentRequest::direct("CheckInventory"),
            ShopCounts::default(),
        );
        assert_eq!(resolution.intent, "checkinventory");
        assert_eq!(resolution.response.fulfillment_text, FALLBACK_TEXT);
    }

    #[test]
    fn response_uses_wire_field_name() {
        let json = serde_json::to_value(FulfillmentResponse::apology()).unwrap();
        assert_eq!(json, json!({"fulfillmentText": APOLOGY_TEXT}));
    }

    #[test]
    fn intent_names_round_trip() {
        assert_eq!(Intent::parse("Dashboard").as_str(), "dashboard");
        assert_eq!(Intent::parse("other").as_str(), "other");
    }
}
