//! Typed views of the success payloads consumers usually decode.
//!
//! The client itself never requires these; frames reach listeners as raw
//! JSON. They are here so callers don't each re-derive the field names.

use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Whether a conversation is a room or a direct one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationKind {
    Room,
    People,
}

impl ConversationKind {
    /// Decode the numeric `type` of a user-list entry: 0 is a person, 1 a room.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::People),
            1 => Some(Self::Room),
            _ => None,
        }
    }

    /// Decode the `type` of a chat message: the numeric code or the name.
    pub fn from_field(field: &NumberOrText) -> Option<Self> {
        match field {
            NumberOrText::Number(code) => Self::from_code(*code),
            NumberOrText::Text(name) => match name.trim() {
                "room" => Some(Self::Room),
                "people" => Some(Self::People),
                other => other.parse().ok().and_then(Self::from_code),
            },
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Room => "room",
            Self::People => "people",
        }
    }
}

/// A field the backend sends either as a JSON number or as a string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NumberOrText {
    Number(i64),
    Text(String),
}

impl NumberOrText {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => s.trim().parse().ok(),
        }
    }
}

/// One entry of GET_USER_LIST: a person or a room the user has talked in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserEntry {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: i64,
    #[serde(rename = "actionTime", default, skip_serializing_if = "Option::is_none")]
    pub action_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub online: Option<bool>,
}

impl UserEntry {
    pub fn conversation_kind(&self) -> Option<ConversationKind> {
        ConversationKind::from_code(self.kind)
    }

    pub fn last_action(&self) -> Option<NaiveDateTime> {
        self.action_time.as_deref().and_then(parse_timestamp)
    }
}

/// `{status: bool}` replies: JOIN_ROOM, CHECK_USER_EXIST, CHECK_USER_ONLINE.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReply {
    pub status: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

/// LOGIN / RE_LOGIN success payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginReply {
    #[serde(rename = "RE_LOGIN_CODE", default, skip_serializing_if = "Option::is_none")]
    pub relogin_code: Option<String>,
}

/// One chat message, from a history page or a live SEND_CHAT push.
///
/// The backend is not consistent about field names, so both spellings are
/// kept and the accessors pick whichever is present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<NumberOrText>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<NumberOrText>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl ChatMessage {
    pub fn sender(&self) -> &str {
        non_empty(&self.name)
            .or_else(|| non_empty(&self.sender))
            .unwrap_or("Unknown")
    }

    pub fn text(&self) -> &str {
        non_empty(&self.mes)
            .or_else(|| non_empty(&self.content))
            .unwrap_or("")
    }

    pub fn conversation_kind(&self) -> Option<ConversationKind> {
        self.kind.as_ref().and_then(ConversationKind::from_field)
    }

    /// Send time, from `createAt` or else `timestamp`.
    pub fn created_at(&self) -> Option<NaiveDateTime> {
        non_empty(&self.create_at)
            .or_else(|| non_empty(&self.timestamp))
            .and_then(parse_timestamp)
    }
}

fn non_empty(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|s| !s.is_empty())
}

/// Accepts `2025-12-29 11:52:32`, RFC 3339, or epoch milliseconds.
fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(t) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(t);
    }
    if let Ok(t) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(t);
    }
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Some(t.naive_utc());
    }
    raw.parse::<i64>()
        .ok()
        .and_then(DateTime::from_timestamp_millis)
        .map(|t| t.naive_utc())
}

/// Messages of a GET_ROOM_CHAT_MES / GET_PEOPLE_CHAT_MES payload, oldest
/// first. The payload is either `{messages: [..]}` or the bare array.
/// Messages without a numeric id keep their position in the page; entries
/// that are not messages at all are skipped with a warning.
pub fn history_from(data: &Value) -> serde_json::Result<Vec<ChatMessage>> {
    let list = data
        .get("messages")
        .filter(|v| v.is_array())
        .unwrap_or(data);
    let entries: Vec<Value> = Vec::deserialize(list)?;
    let mut keyed: Vec<(i64, ChatMessage)> = entries
        .into_iter()
        .enumerate()
        .filter_map(|(idx, entry)| match ChatMessage::deserialize(entry) {
            Ok(m) => Some((m.id.as_ref().and_then(NumberOrText::as_i64).unwrap_or(idx as i64), m)),
            Err(e) => {
                tracing::warn!(index = idx, error = %e, "skipping unreadable history entry");
                None
            }
        })
        .collect();
    keyed.sort_by_key(|(key, _)| *key);
    Ok(keyed.into_iter().map(|(_, m)| m).collect())
}
