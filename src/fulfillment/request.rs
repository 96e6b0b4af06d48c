//! Boundary conversion of raw webhook bodies into a canonical request.
//!
//! Two body shapes are accepted:
//!
//! * NLU platform: `{ "queryResult": { "intent": { "displayName": "..." } } }`
//! * direct: `{ "intent": "..." }`
//!
//! Parsing never fails. Missing, empty or mistyped fields are treated as absent.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Where the intent name came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "shape", content = "name", rename_all = "snake_case")]
pub enum IntentSource {
    /// `queryResult.intent.displayName`
    Nlu(String),
    /// top-level `intent`
    Direct(String),
    Missing,
}

impl IntentSource {
    pub fn raw(&self) -> &str {
        match self {
            Self::Nlu(name) | Self::Direct(name) => name,
            Self::Missing => "",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FulfillmentRequest {
    pub intent: IntentSource,
    pub user_id: Option<String>,
    pub query_text: Option<String>,
}

impl FulfillmentRequest {
    pub fn direct(intent: &str) -> Self {
        Self {
            intent: IntentSource::Direct(intent.to_string()),
            user_id: None,
            query_text: None,
        }
    }

    pub fn with_user(mut self, user_id: &str) -> Self {
        self.user_id = Some(user_id.to_string());
        self
    }

    /// Parse a raw request body. Bytes that are not JSON yield an empty request.
    pub fn from_slice(body: &[u8]) -> Self {
        match serde_json::from_slice::<Value>(body) {
            Ok(value) => Self::from_value(&value),
            Err(error) => {
                tracing::debug!("Fulfillment body is not JSON, treating as empty: {error}");
                Self::from_value(&Value::Null)
            }
        }
    }

    pub fn from_value(body: &Value) -> Self {
        // Precedence is decided on the raw name; normalization happens in `resolve`.
        let intent = match (
            raw_str(body.pointer("/queryResult/intent/displayName")),
            raw_str(body.get("intent")),
        ) {
            (Some(nlu), _) => IntentSource::Nlu(nlu),
            (None, Some(direct)) => IntentSource::Direct(direct),
            (None, None) => IntentSource::Missing,
        };

        let user_id = non_empty_str(body.get("userId"))
            .or_else(|| non_empty_str(body.get("user_id")))
            .or_else(|| non_empty_str(body.get("session")).and_then(|s| session_tail(&s)));

        let query_text = non_empty_str(body.pointer("/queryResult/queryText"))
            .or_else(|| non_empty_str(body.get("query")))
            .or_else(|| non_empty_str(body.get("text")));

        Self {
            intent,
            user_id,
            query_text,
        }
    }
}

fn raw_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}

/// `projects/<p>/agent/sessions/<id>` → `<id>`; a bare id is returned as is.
fn session_tail(session: &str) -> Option<String> {
    session
        .rsplit('/')
        .next()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}
