//! Remote health check used by deploy scripts and container probes.
//!
//! GETs the assistant health URL and maps the outcome onto a process exit
//! code: `0` healthy, `2` reachable but not healthy, `1` unreachable.

use crate::config::HealthCheckConfig;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub enum HealthOutcome {
    /// Reachable and the body carries a truthy `ok`.
    Healthy(Value),
    /// Reachable, but `ok` is missing or falsy (or the body is not JSON).
    Unhealthy(Value),
    /// Transport failure, timeout, or non-2xx status.
    Failed(String),
}

impl HealthOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Healthy(_) => 0,
            Self::Unhealthy(_) => 2,
            Self::Failed(_) => 1,
        }
    }

    pub fn body(&self) -> Option<&Value> {
        match self {
            Self::Healthy(body) | Self::Unhealthy(body) => Some(body),
            Self::Failed(_) => None,
        }
    }
}

pub async fn check_health(config: &HealthCheckConfig) -> HealthOutcome {
    check_url(&config.url, Duration::from_millis(config.timeout_ms)).await
}

pub async fn check_url(url: &str, timeout: Duration) -> HealthOutcome {
    let client = match Client::builder().timeout(timeout).build() {
        Ok(client) => client,
        Err(e) => return HealthOutcome::Failed(format!("failed to build HTTP client: {e}")),
    };

    let response = match client.get(url).send().await {
        Ok(response) => response,
        Err(e) => return HealthOutcome::Failed(e.to_string()),
    };

    let status = response.status();
    if !status.is_success() {
        return HealthOutcome::Failed(format!("{url} returned {status}"));
    }

    let text = match response.text().await {
        Ok(text) => text,
        Err(e) => return HealthOutcome::Failed(format!("failed to read body: {e}")),
    };

    classify(serde_json::from_str(&text).unwrap_or(Value::String(text)))
}

fn classify(body: Value) -> HealthOutcome {
    if body.get("ok").is_some_and(is_truthy) {
        HealthOutcome::Healthy(body)
    } else {
        HealthOutcome::Unhealthy(body)
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
