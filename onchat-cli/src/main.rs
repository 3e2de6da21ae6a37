//! `onchat`: a line-oriented terminal client for the onchat backend.

mod commands;
mod config;
mod render;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use onchat_sdk::debounce::Debounced;
use onchat_sdk::{EventName, FileSessionStore, InboundFrame, SessionStore, SocketClient};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;

use crate::commands::{Command, Target};
use crate::config::{Config, Resolved};

#[derive(Parser, Debug)]
#[command(name = "onchat", about = "Terminal client for the onchat chat backend")]
pub struct Cli {
    /// WebSocket endpoint (ws:// or wss://)
    #[arg(long, env = "ONCHAT_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Log in as this user on start (needs --password)
    #[arg(long)]
    pub user: Option<String>,

    /// Password for --user
    #[arg(long, env = "ONCHAT_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Automatic reconnect attempts after a drop
    #[arg(long)]
    pub max_reconnect_attempts: Option<u32>,

    /// Pause before each reconnect attempt, in milliseconds
    #[arg(long)]
    pub reconnect_delay_ms: Option<u64>,

    /// Envelopes held while offline
    #[arg(long)]
    pub queue_capacity: Option<usize>,

    /// Session token file [default: ~/.config/onchat/session.toml]
    #[arg(long)]
    pub session_file: Option<PathBuf>,

    /// Config file [default: ~/.config/onchat/cli.toml]
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Write the merged settings back to the config file
    #[arg(long)]
    pub save_config: bool,
}

fn init_tracing() {
    // JSON logs with ONCHAT_LOG_JSON=1, human-readable otherwise. stdout is
    // reserved for chat output.
    let json_logs = std::env::var("ONCHAT_LOG_JSON").unwrap_or_default() == "1";
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("onchat=warn,onchat_sdk=warn"));
    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(config::config_path);
    let file_config = Config::load_from(&config_path);
    let resolved = Resolved::merge(&cli, &file_config);
    if cli.save_config {
        resolved.to_config().save_to(&config_path)?;
        println!("* saved settings to {}", config_path.display());
    }

    let store = Arc::new(FileSessionStore::new(&resolved.session_file));
    let client = SocketClient::new(resolved.client.clone(), store.clone());
    tracing::info!(
        endpoint = %resolved.client.endpoint,
        session = %resolved.session_file.display(),
        "starting onchat"
    );

    // Logins, joins and pushes all ask for a conversation list refresh.
    let refresh = Arc::new(Debounced::user_list(client.clone()));
    let _printer = client.on_message({
        let store = store.clone();
        let refresh = Arc::clone(&refresh);
        move |frame| {
            for line in render::describe(frame) {
                println!("{line}");
            }
            after_frame(frame, store.as_ref(), &refresh);
        }
    });

    match (&resolved.user, &cli.password) {
        (Some(user), Some(pass)) => client.login(user, pass),
        (Some(user), None) if store.load().ok().and_then(|s| s.credential()).is_none() => {
            println!("* no saved session for {user}; use /login {user} <pass>");
            client.connect();
        }
        _ => client.connect(),
    }
    println!("* connecting to {} (type /help)", resolved.client.endpoint);

    let mut target: Option<Target> = None;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match commands::parse(&line) {
                    Ok(Some(Command::Quit)) => break,
                    Ok(Some(cmd)) => {
                        run(&client, store.as_ref(), &mut target, cmd);
                    }
                    Ok(None) => {}
                    Err(e) => println!("! {e}"),
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    client.disconnect();
    Ok(())
}

/// Side effects of a frame beyond printing it.
fn after_frame(frame: &InboundFrame, store: &dyn SessionStore, refresh: &Debounced) {
    match (frame.event(), frame.is_success()) {
        // A rejected resumption code is useless; don't replay it next time.
        (EventName::ReLogin, false) | (EventName::Logout, true) => {
            if let Err(e) = store.clear() {
                tracing::warn!(error = %e, "can't clear session");
            } else {
                println!("* session cleared");
            }
        }
        (
            EventName::Login
            | EventName::ReLogin
            | EventName::JoinRoom
            | EventName::CreateRoom
            | EventName::SendChat,
            true,
        ) => {
            refresh.trigger();
        }
        _ => {}
    }
}

/// Carry out one command. Lookups that wait for an answer run on their own
/// task so the prompt and ctrl-c stay live; their handle is returned.
fn run(
    client: &SocketClient,
    store: &dyn SessionStore,
    target: &mut Option<Target>,
    cmd: Command,
) -> Option<JoinHandle<()>> {
    match cmd {
        Command::Login { user, pass } => client.login(&user, &pass),
        Command::Register { user, pass } => client.register(&user, &pass),
        Command::Logout => client.logout(),
        Command::Create(room) => {
            client.create_room(&room);
            *target = Some(Target::Room(room));
        }
        Command::Join(room) => {
            client.join_room(&room);
            *target = Some(Target::Room(room));
        }
        Command::Query(user) => {
            println!("* talking to @{user}");
            *target = Some(Target::User(user));
        }
        Command::History(page) => match target.as_ref() {
            Some(Target::Room(room)) => client.get_room_messages(room, page),
            Some(Target::User(user)) => client.get_people_messages(user, page),
            None => println!("! no conversation; /join or /query first"),
        },
        Command::Users => client.get_user_list(),
        Command::Exists(user) => {
            let client = client.clone();
            return Some(tokio::spawn(async move {
                match client.user_exists(&user).await {
                    Ok(exists) => println!("* {user} {}", if exists { "exists" } else { "does not exist" }),
                    Err(e) => println!("! {e}"),
                }
            }));
        }
        Command::Online(user) => {
            let client = client.clone();
            return Some(tokio::spawn(async move {
                match client.user_online(&user).await {
                    Ok(online) => println!("* {user} is {}", if online { "online" } else { "offline" }),
                    Err(e) => println!("! {e}"),
                }
            }));
        }
        Command::Check(user) => client.check_user(&user),
        Command::Msg { user, text } => client.send_personal_message(&user, &text),
        Command::Raw { event, payload } => client.send(event, payload),
        Command::Status => {
            println!("* {:?} to {}", client.state(), client.config().endpoint);
            match store.load() {
                Ok(session) => match session.credential() {
                    Some(cred) => println!("* session for {} is saved", cred.username),
                    None => println!("* no saved session"),
                },
                Err(e) => println!("! {e}"),
            }
            if let Some(t) = target.as_ref() {
                println!("* talking in {t}");
            }
        }
        Command::Connect => client.connect(),
        Command::Disconnect => client.disconnect(),
        Command::Forget => match client.clear_session() {
            Ok(()) => println!("* session cleared"),
            Err(e) => println!("! {e}"),
        },
        Command::Help => println!("{}", commands::HELP),
        Command::Say(text) => match target.as_ref() {
            Some(Target::Room(room)) => client.send_room_message(room, &text),
            Some(Target::User(user)) => client.send_personal_message(user, &text),
            None => println!("! no conversation; /join <room> or /query <user> first"),
        },
        Command::Quit => {}
    }
    None
}
