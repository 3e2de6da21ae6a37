//! Wire envelopes.
//!
//! Outbound: `{"action":"onchat","data":{"event":NAME,"data":PAYLOAD}}`.
//! Inbound: `{"status":"success","event":NAME,"data":..}` or
//! `{"status":"error","event":NAME,"mes":".."}`. Neither direction carries
//! a correlation id.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::event::EventName;

/// The only `action` value the backend routes.
pub const ACTION: &str = "onchat";

/// One outbound call, ready to serialize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundEnvelope {
    pub action: String,
    pub data: OutboundBody,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundBody {
    pub event: EventName,
    pub data: Value,
}

impl OutboundEnvelope {
    pub fn new(event: EventName, payload: Value) -> Self {
        Self {
            action: ACTION.to_string(),
            data: OutboundBody {
                event,
                data: payload,
            },
        }
    }

    pub fn event(&self) -> &EventName {
        &self.data.event
    }

    pub fn payload(&self) -> &Value {
        &self.data.data
    }

    pub fn to_json(&self) -> String {
        // A struct of strings and a `Value` always serializes.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// One inbound frame, tagged by `status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum InboundFrame {
    Success {
        event: EventName,
        #[serde(default)]
        data: Value,
    },
    Error {
        event: EventName,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mes: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
    },
}

impl InboundFrame {
    pub fn parse(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    pub fn event(&self) -> &EventName {
        match self {
            Self::Success { event, .. } | Self::Error { event, .. } => event,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Success payload; `Null` for error frames.
    pub fn data(&self) -> &Value {
        match self {
            Self::Success { data, .. } => data,
            Self::Error { .. } => &Value::Null,
        }
    }

    /// Human-readable message of an error frame.
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Error { mes, .. } => mes.as_deref(),
            Self::Success { .. } => None,
        }
    }

    /// Decode the success payload into a typed view.
    pub fn decode<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        T::deserialize(self.data())
    }

    /// `RE_LOGIN_CODE` of a successful LOGIN / RE_LOGIN, if present.
    pub fn relogin_code(&self) -> Option<&str> {
        match self {
            Self::Success { event, data } if event.issues_token() => {
                data.get("RE_LOGIN_CODE").and_then(Value::as_str)
            }
            _ => None,
        }
    }
}

/// Copy of `payload` safe to log: secrets of sensitive events are masked.
pub fn redact(event: &EventName, payload: &Value) -> Value {
    let mut safe = payload.clone();
    if event.is_sensitive() {
        if let Some(map) = safe.as_object_mut() {
            for key in ["pass", "code"] {
                if let Some(v) = map.get_mut(key) {
                    *v = Value::String("***".to_string());
                }
            }
        }
    }
    safe
}
