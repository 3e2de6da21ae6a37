//! Turning inbound frames into terminal lines.

use onchat_sdk::models::{history_from, ChatMessage, ConversationKind, UserEntry};
use onchat_sdk::{EventName, InboundFrame};

/// Lines to print for `frame`. Never includes resumption codes.
pub fn describe(frame: &InboundFrame) -> Vec<String> {
    let event = frame.event();
    if !frame.is_success() {
        let mes = frame.message().unwrap_or("no reason given");
        return vec![format!("! {event} failed: {}", sanitize_text(mes))];
    }

    match event {
        EventName::Login | EventName::ReLogin => vec!["* logged in".to_string()],
        EventName::Register => vec!["* registered; now /login".to_string()],
        EventName::Logout => vec!["* logged out".to_string()],
        EventName::GetUserList => match frame.decode::<Vec<UserEntry>>() {
            Ok(users) if users.is_empty() => vec!["* no conversations yet".to_string()],
            Ok(users) => users.iter().map(user_line).collect(),
            Err(e) => vec![format!("! unexpected user list: {e}")],
        },
        EventName::GetRoomChatMes | EventName::GetPeopleChatMes => match history_from(frame.data()) {
            Ok(messages) if messages.is_empty() => vec!["* no messages".to_string()],
            Ok(messages) => messages.iter().map(message_line).collect(),
            Err(e) => vec![format!("! unexpected history: {e}")],
        },
        EventName::SendChat | EventName::Message => match frame.decode::<ChatMessage>() {
            Ok(message) if !message.text().is_empty() => vec![message_line(&message)],
            Ok(_) => Vec::new(),
            Err(e) => {
                tracing::warn!(%event, error = %e, "undecodable chat message");
                vec![format!("! unreadable {event} message: {e}")]
            }
        },
        EventName::CheckUserExist | EventName::CheckUserOnline | EventName::JoinRoom => {
            let status = frame.data().get("status").and_then(|v| v.as_bool());
            match status {
                Some(s) => vec![format!("* {event}: {s}")],
                None => vec![format!("* {event} ok")],
            }
        }
        _ if frame.data().is_null() => vec![format!("* {event} ok")],
        _ => vec![format!("* {event} {}", sanitize_text(&frame.data().to_string()))],
    }
}

fn user_line(user: &UserEntry) -> String {
    let kind = match user.conversation_kind() {
        Some(ConversationKind::Room) => "#",
        Some(ConversationKind::People) => "@",
        None => "?",
    };
    let seen = user
        .last_action()
        .map(|t| format!(" (last active {})", t.format("%Y-%m-%d %H:%M")))
        .unwrap_or_default();
    format!("  {kind}{}{seen}", sanitize_text(&user.name))
}

fn message_line(message: &ChatMessage) -> String {
    let time = message
        .created_at()
        .map(|t| t.format("%H:%M").to_string())
        .unwrap_or_else(|| "--:--".to_string());
    let to = message
        .to
        .as_deref()
        .map(|to| format!(" → {}", sanitize_text(to)))
        .unwrap_or_default();
    format!(
        "[{time}] <{}{to}> {}",
        sanitize_text(message.sender()),
        sanitize_text(message.text())
    )
}

/// Strip terminal control characters (ESC sequences, C0/C1 controls) so
/// other users can't drive the terminal.
pub fn sanitize_text(s: &str) -> String {
    s.chars()
        .filter(|&c| c == '\t' || (c >= ' ' && c != '\x7f' && !('\u{80}'..='\u{9f}').contains(&c)))
        .collect()
}
