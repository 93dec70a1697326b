use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Source tag stamped on every message accepted over HTTP.
pub const SOURCE_DIRECT_HTTP: &str = "direct_http";

fn unknown_source() -> String {
    "unknown".to_string()
}

/// The payload relayed from HTTP ingress to the worker: an arbitrary JSON
/// object plus two provenance fields added at enqueue time. Immutable once
/// enqueued.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct RequestMessage {
    #[serde(default = "unknown_source")]
    pub source: String,
    #[serde(default)]
    pub received_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl RequestMessage {
    /// Builds the message enqueued for an HTTP request body, stamping the
    /// ingress source and receipt time. Body-supplied `source` and
    /// `received_at` keys are overwritten.
    pub fn from_http(mut payload: Map<String, Value>) -> Self {
        payload.remove("source");
        payload.remove("received_at");

        RequestMessage {
            source: SOURCE_DIRECT_HTTP.to_string(),
            received_at: Some(Utc::now()),
            payload,
        }
    }
}
