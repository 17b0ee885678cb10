//! Uniform response envelope.
//!
//! Every reply the broker writes, and every JSON reply it reads back from
//! an HTTP backend, has the shape `{error, message, data?}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The `{error, message, data?}` envelope.
///
/// `data` is omitted from the serialized form when absent. Failure
/// envelopes produced by the broker never carry `data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonResponse {
    /// True when the request failed.
    pub error: bool,
    /// Human-readable outcome.
    #[serde(default)]
    pub message: String,
    /// Opaque backend payload (e.g. the authenticated user record).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonResponse {
    /// Successful envelope without data.
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            error: false,
            message: message.into(),
            data: None,
        }
    }

    /// Failure envelope.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            error: true,
            message: message.into(),
            data: None,
        }
    }

    /// Attach a data payload. A JSON `null` is treated as absent.
    pub fn with_data(mut self, data: Option<Value>) -> Self {
        self.data = data.filter(|v| !v.is_null());
        self
    }
}
