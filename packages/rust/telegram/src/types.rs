//! Bot API payload types.
//!
//! Only the fields the bot reads are modeled; every field is optional so a
//! partial update deserializes instead of failing.

use serde::{Deserialize, Serialize};

/// An incoming update (webhook body or `getUpdates` element).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat: Option<Chat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
}

impl Update {
    /// Chat id of the carried message, if any.
    pub fn chat_id(&self) -> Option<i64> {
        self.message.as_ref()?.chat.as_ref()?.id
    }

    /// Text of the carried message, if any.
    pub fn text(&self) -> Option<&str> {
        self.message.as_ref()?.text.as_deref()
    }
}

/// Best-effort chat id lookup on a payload that failed to decode as an [`Update`].
pub fn chat_id_from_value(value: &serde_json::Value) -> Option<i64> {
    value
        .get("message")?
        .get("chat")?
        .get("id")?
        .as_i64()
}

/// Envelope every Bot API method responds with.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    #[serde(default = "Option::default")]
    pub result: Option<T>,
    #[serde(default)]
    pub description: Option<String>,
}
