//! Slash commands typed at the prompt.

use anyhow::{bail, Context, Result};
use serde_json::Value;

pub const HELP: &str = "\
/login <user> <pass>     log in (the session is resumed on later runs)
/register <user> <pass>  create an account
/logout                  log out and forget the session
/create <room>           create a room and talk in it
/join <room>             join a room and talk in it
/query <user>            talk to a user directly
/history [page]          show history of the current conversation
/users                   list your conversations
/exists <user>           does the account exist?
/online <user>           is the user online?
/check <user>            raw CHECK_USER
/msg <user> <text>       one direct message
/raw <EVENT> [json]      send any event
/status                  connection and session state
/connect /disconnect     open or close the connection
/forget                  clear the stored session
/quit                    exit
Anything else is sent to the current conversation.";

/// Where plain text goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Room(String),
    User(String),
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Target::Room(name) => write!(f, "#{name}"),
            Target::User(name) => write!(f, "@{name}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Login { user: String, pass: String },
    Register { user: String, pass: String },
    Logout,
    Create(String),
    Join(String),
    Query(String),
    History(u32),
    Users,
    Exists(String),
    Online(String),
    Check(String),
    Msg { user: String, text: String },
    Raw { event: String, payload: Value },
    Status,
    Connect,
    Disconnect,
    Forget,
    Help,
    Quit,
    /// Plain text for the current conversation.
    Say(String),
}

/// Parse one input line. Blank lines yield `None`.
pub fn parse(line: &str) -> Result<Option<Command>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Ok(Some(Command::Say(line.to_string())));
    };

    let (cmd, args) = rest.split_once(' ').unwrap_or((rest, ""));
    let args = args.trim();
    let command = match cmd.to_ascii_lowercase().as_str() {
        "login" => {
            let (user, pass) = two(args, "/login <user> <pass>")?;
            Command::Login { user, pass }
        }
        "register" => {
            let (user, pass) = two(args, "/register <user> <pass>")?;
            Command::Register { user, pass }
        }
        "logout" => Command::Logout,
        "create" => Command::Create(one(args, "/create <room>")?),
        "join" => Command::Join(one(args, "/join <room>")?),
        "query" => Command::Query(one(args, "/query <user>")?),
        "history" => {
            let page = if args.is_empty() {
                1
            } else {
                args.parse().context("page must be a number")?
            };
            if page == 0 {
                bail!("pages start at 1");
            }
            Command::History(page)
        }
        "users" => Command::Users,
        "exists" => Command::Exists(one(args, "/exists <user>")?),
        "online" => Command::Online(one(args, "/online <user>")?),
        "check" => Command::Check(one(args, "/check <user>")?),
        "msg" => {
            let (user, text) = args.split_once(' ').context("usage: /msg <user> <text>")?;
            let text = text.trim();
            if text.is_empty() {
                bail!("usage: /msg <user> <text>");
            }
            Command::Msg {
                user: user.to_string(),
                text: text.to_string(),
            }
        }
        "raw" => {
            let (event, json) = args.split_once(' ').unwrap_or((args, ""));
            if event.is_empty() {
                bail!("usage: /raw <EVENT> [json]");
            }
            let payload = if json.trim().is_empty() {
                Value::Object(Default::default())
            } else {
                serde_json::from_str(json.trim()).context("payload is not valid JSON")?
            };
            Command::Raw {
                event: event.to_ascii_uppercase(),
                payload,
            }
        }
        "status" => Command::Status,
        "connect" => Command::Connect,
        "disconnect" => Command::Disconnect,
        "forget" => Command::Forget,
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => bail!("unknown command /{other} (try /help)"),
    };
    Ok(Some(command))
}

fn one(args: &str, usage: &str) -> Result<String> {
    match args.split_whitespace().collect::<Vec<_>>().as_slice() {
        [one] => Ok(one.to_string()),
        _ => bail!("usage: {usage}"),
    }
}

fn two(args: &str, usage: &str) -> Result<(String, String)> {
    match args.split_whitespace().collect::<Vec<_>>().as_slice() {
        [a, b] => Ok((a.to_string(), b.to_string())),
        _ => bail!("usage: {usage}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plain_text_and_blank_lines() {
        assert_eq!(parse("   ").unwrap(), None);
        assert_eq!(parse(" hello there ").unwrap(), Some(Command::Say("hello there".into())));
    }

    #[test]
    fn login_needs_two_args() {
        assert_eq!(
            parse("/login alice secret").unwrap(),
            Some(Command::Login { user: "alice".into(), pass: "secret".into() })
        );
        assert!(parse("/login alice").is_err());
        assert!(parse("/login a b c").is_err());
    }

    #[test]
    fn history_page_defaults_to_one() {
        assert_eq!(parse("/history").unwrap(), Some(Command::History(1)));
        assert_eq!(parse("/HISTORY 3").unwrap(), Some(Command::History(3)));
        assert!(parse("/history 0").is_err());
        assert!(parse("/history two").is_err());
    }

    #[test]
    fn msg_keeps_spaces_in_text() {
        assert_eq!(
            parse("/msg bob see you at 5").unwrap(),
            Some(Command::Msg { user: "bob".into(), text: "see you at 5".into() })
        );
        assert!(parse("/msg bob").is_err());
    }

    #[test]
    fn raw_parses_payload() {
        assert_eq!(
            parse(r#"/raw check_user {"user":"bob"}"#).unwrap(),
            Some(Command::Raw { event: "CHECK_USER".into(), payload: json!({"user": "bob"}) })
        );
        assert_eq!(
            parse("/raw LOGOUT").unwrap(),
            Some(Command::Raw { event: "LOGOUT".into(), payload: json!({}) })
        );
        assert!(parse("/raw LOGIN {nope").is_err());
    }

    #[test]
    fn unknown_command_is_an_error() {
        let err = parse("/dance").unwrap_err();
        assert!(err.to_string().contains("/dance"));
    }

    #[test]
    fn target_display() {
        assert_eq!(Target::Room("lobby".into()).to_string(), "#lobby");
        assert_eq!(Target::User("bob".into()).to_string(), "@bob");
    }
}
