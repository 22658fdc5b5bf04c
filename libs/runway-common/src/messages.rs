//! Realtime gateway wire protocol.
//!
//! Every frame is a JSON object discriminated by `type`:
//!
//! ```text
//! {"type":"CONNECTED","payload":"<userId>"}          gateway -> user
//! {"type":"CONNECTED","workerId":"<uuid>"}           gateway -> worker
//! {"type":"UPDATE_USER","payload":{userId,result}}   worker  -> gateway
//! {"type":"UPDATE_USER","payload":<result>}          gateway -> user
//! {"type":"HEARTBEAT"}                               either direction
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Status text pushed to a user when its job starts running
pub const EXECUTING_CODE: &str = "Executing Code";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GatewayMessage {
    Connected {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<String>,
        #[serde(
            default,
            rename = "workerId",
            skip_serializing_if = "Option::is_none"
        )]
        worker_id: Option<String>,
    },
    UpdateUser {
        payload: Value,
    },
    Heartbeat,
}

impl GatewayMessage {
    pub fn connected_user(user_id: &str) -> Self {
        GatewayMessage::Connected {
            payload: Some(user_id.to_string()),
            worker_id: None,
        }
    }

    pub fn connected_worker(worker_id: &str) -> Self {
        GatewayMessage::Connected {
            payload: None,
            worker_id: Some(worker_id.to_string()),
        }
    }

    /// Frame a worker sends to have `result` routed to `user_id`
    pub fn result_event(event: &ResultEvent) -> Self {
        GatewayMessage::UpdateUser {
            payload: serde_json::json!({
                "userId": event.user_id,
                "result": event.result,
            }),
        }
    }

    pub fn to_json(&self) -> String {
        // Serializing this enum cannot fail: every field is a string or a JSON value
        serde_json::to_string(self).unwrap_or_else(|_| String::from("{}"))
    }

    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// A result routed from a dispatcher to the user that submitted the job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultEvent {
    pub user_id: String,
    pub result: Value,
}

impl ResultEvent {
    pub fn new(user_id: impl Into<String>, result: impl Into<Value>) -> Self {
        Self {
            user_id: user_id.into(),
            result: result.into(),
        }
    }
}
