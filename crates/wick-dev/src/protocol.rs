//! The hot-reload channel envelope.
//!
//! Every message pushed to clients is an `{action, data?}` pair. The
//! action vocabulary is defined by the consumers; the coordinator only
//! guarantees the envelope shape.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One message on the hot-reload channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HotMessage {
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl HotMessage {
    pub fn new(action: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            action: action.into(),
            data,
        }
    }

    /// Serialize for the wire. Falls back to an empty envelope rather
    /// than failing the broadcast path.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}
