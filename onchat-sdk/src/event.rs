//! Event names carried in both directions of the `onchat` protocol.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Name of a protocol event.
///
/// Outbound it selects the backend operation; inbound it tells listeners
/// which operation a frame answers (or that it is a push, e.g. `SEND_CHAT`
/// copies delivered to recipients). Names the SDK does not know are kept
/// verbatim in [`EventName::Other`] so a new backend event never fails the
/// whole frame.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventName {
    Auth,
    Login,
    Register,
    ReLogin,
    Logout,
    CreateRoom,
    JoinRoom,
    GetRoomChatMes,
    GetPeopleChatMes,
    GetUserList,
    CheckUser,
    CheckUserExist,
    CheckUserOnline,
    SendChat,
    Message,
    Other(String),
}

impl EventName {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Auth => "AUTH",
            Self::Login => "LOGIN",
            Self::Register => "REGISTER",
            Self::ReLogin => "RE_LOGIN",
            Self::Logout => "LOGOUT",
            Self::CreateRoom => "CREATE_ROOM",
            Self::JoinRoom => "JOIN_ROOM",
            Self::GetRoomChatMes => "GET_ROOM_CHAT_MES",
            Self::GetPeopleChatMes => "GET_PEOPLE_CHAT_MES",
            Self::GetUserList => "GET_USER_LIST",
            Self::CheckUser => "CHECK_USER",
            Self::CheckUserExist => "CHECK_USER_EXIST",
            Self::CheckUserOnline => "CHECK_USER_ONLINE",
            Self::SendChat => "SEND_CHAT",
            Self::Message => "MESSAGE",
            Self::Other(name) => name,
        }
    }

    /// Events whose payload carries a password or a resumption code.
    pub fn is_sensitive(&self) -> bool {
        matches!(self, Self::Login | Self::Register | Self::ReLogin)
    }

    /// Events whose success payload may carry a fresh `RE_LOGIN_CODE`.
    pub fn issues_token(&self) -> bool {
        matches!(self, Self::Login | Self::ReLogin)
    }
}

impl From<&str> for EventName {
    fn from(s: &str) -> Self {
        match s {
            "AUTH" => Self::Auth,
            "LOGIN" => Self::Login,
            "REGISTER" => Self::Register,
            "RE_LOGIN" => Self::ReLogin,
            "LOGOUT" => Self::Logout,
            "CREATE_ROOM" => Self::CreateRoom,
            "JOIN_ROOM" => Self::JoinRoom,
            "GET_ROOM_CHAT_MES" => Self::GetRoomChatMes,
            "GET_PEOPLE_CHAT_MES" => Self::GetPeopleChatMes,
            "GET_USER_LIST" => Self::GetUserList,
            "CHECK_USER" => Self::CheckUser,
            "CHECK_USER_EXIST" => Self::CheckUserExist,
            "CHECK_USER_ONLINE" => Self::CheckUserOnline,
            "SEND_CHAT" => Self::SendChat,
            "MESSAGE" => Self::Message,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for EventName {
    fn from(s: String) -> Self {
        match Self::from(s.as_str()) {
            Self::Other(_) => Self::Other(s),
            known => known,
        }
    }
}

impl From<EventName> for String {
    fn from(event: EventName) -> Self {
        match event {
            EventName::Other(name) => name,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_names_map_both_ways() {
        for name in [
            "LOGIN",
            "RE_LOGIN",
            "GET_ROOM_CHAT_MES",
            "CHECK_USER_ONLINE",
            "SEND_CHAT",
        ] {
            let event = EventName::from(name);
            assert!(!matches!(event, EventName::Other(_)), "{name} should be known");
            assert_eq!(event.as_str(), name);
        }
    }

    #[test]
    fn unknown_name_is_preserved() {
        let event: EventName = serde_json::from_str(r#""TYPING""#).unwrap();
        assert_eq!(event, EventName::Other("TYPING".to_string()));
        assert_eq!(serde_json::to_string(&event).unwrap(), r#""TYPING""#);
    }

    #[test]
    fn serializes_as_wire_name() {
        assert_eq!(
            serde_json::to_string(&EventName::GetUserList).unwrap(),
            r#""GET_USER_LIST""#
        );
    }

    #[test]
    fn sensitive_events() {
        assert!(EventName::Login.is_sensitive());
        assert!(EventName::ReLogin.is_sensitive());
        assert!(EventName::Register.is_sensitive());
        assert!(!EventName::SendChat.is_sensitive());
        assert!(EventName::ReLogin.issues_token());
        assert!(!EventName::Register.issues_token());
    }
}
