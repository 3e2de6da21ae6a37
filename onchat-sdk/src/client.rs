//! The socket client: one connection, one driver task.
//!
//! [`SocketClient`] is a cheap handle. Every call is turned into a
//! [`Command`] for a background task that owns the connection state, the
//! outbound queue and the reconnect timer. Nothing else touches them, so
//! there is never more than one live transport and queued envelopes go out
//! in the order they were sent.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time::Sleep;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::envelope::{redact, InboundFrame, OutboundEnvelope};
use crate::error::{Error, Result};
use crate::event::EventName;
use crate::listener::{ListenerSet, Subscription};
use crate::models::ConversationKind;
use crate::queue::OutboundQueue;
use crate::session::{Session, SessionStore};
use crate::transport::{Connector, Transport, TransportEvent, WsConnector};

/// Where the connection is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No transport and no timer. Only `connect` or `send` leave this state.
    #[default]
    Absent,
    /// A connection attempt is in flight.
    Connecting,
    /// The transport is open; sends go straight out.
    Open,
    /// Waiting out the delay before the next automatic attempt.
    Reconnecting,
}

enum Command {
    Connect,
    Disconnect,
    Send(OutboundEnvelope),
}

struct Shared {
    config: ClientConfig,
    state: Mutex<ConnectionState>,
    listeners: Arc<ListenerSet>,
    store: Arc<dyn SessionStore>,
}

/// Handle to the connection. Clones share it.
#[derive(Clone)]
pub struct SocketClient {
    cmd_tx: mpsc::UnboundedSender<Command>,
    shared: Arc<Shared>,
}

impl std::fmt::Debug for SocketClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketClient")
            .field("endpoint", &self.shared.config.endpoint)
            .field("state", &self.state())
            .finish()
    }
}

impl SocketClient {
    /// Create a client using the WebSocket connector. Nothing connects until
    /// the first `connect` or `send`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: ClientConfig, store: Arc<dyn SessionStore>) -> Self {
        Self::with_connector(config, store, WsConnector::new())
    }

    /// Create a client with a custom [`Connector`].
    pub fn with_connector(
        config: ClientConfig,
        store: Arc<dyn SessionStore>,
        connector: impl Connector,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            config,
            state: Mutex::new(ConnectionState::Absent),
            listeners: ListenerSet::new(),
            store,
        });
        let driver = Driver {
            queue: OutboundQueue::new(shared.config.queue.clone()),
            shared: Arc::clone(&shared),
            connector: Arc::new(connector),
            commands: cmd_rx,
            link: Link::Idle,
            attempts: 0,
            pending_user: None,
        };
        tokio::spawn(driver.run());
        Self { cmd_tx, shared }
    }

    /// Open the connection if it is not open or opening already.
    pub fn connect(&self) {
        self.command(Command::Connect);
    }

    /// Close the connection and cancel any pending reconnect. Queued
    /// envelopes are kept for the next connection.
    pub fn disconnect(&self) {
        self.command(Command::Disconnect);
    }

    /// Send one call. Written at once when open; otherwise queued and a
    /// connection is started.
    pub fn send(&self, event: impl Into<EventName>, payload: Value) {
        self.command(Command::Send(OutboundEnvelope::new(event.into(), payload)));
    }

    /// Register a listener for every inbound frame.
    pub fn on_message<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&InboundFrame) + Send + Sync + 'static,
    {
        self.shared.listeners.register(listener)
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.shared.listeners.len()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.lock()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.shared.config
    }

    /// The persisted session, as the next connection would use it.
    pub fn session(&self) -> Result<Session> {
        self.shared.store.load()
    }

    /// Forget the persisted session, e.g. after the backend rejected it.
    pub fn clear_session(&self) -> Result<()> {
        self.shared.store.clear()
    }

    fn command(&self, cmd: Command) {
        if self.cmd_tx.send(cmd).is_err() {
            warn!("connection task is gone; command dropped");
        }
    }

    // ── Named calls ──────────────────────────────────────────────────

    pub fn login(&self, user: &str, pass: &str) {
        self.send(EventName::Login, json!({ "user": user, "pass": pass }));
    }

    pub fn register(&self, user: &str, pass: &str) {
        self.send(EventName::Register, json!({ "user": user, "pass": pass }));
    }

    pub fn logout(&self) {
        self.send(EventName::Logout, json!({}));
    }

    pub fn create_room(&self, name: &str) {
        self.send(EventName::CreateRoom, json!({ "name": name }));
    }

    pub fn join_room(&self, name: &str) {
        self.send(EventName::JoinRoom, json!({ "name": name }));
    }

    /// One page of a room's history. Pages start at 1.
    pub fn get_room_messages(&self, name: &str, page: u32) {
        self.send(EventName::GetRoomChatMes, json!({ "name": name, "page": page }));
    }

    /// One page of a direct conversation's history. Pages start at 1.
    pub fn get_people_messages(&self, name: &str, page: u32) {
        self.send(EventName::GetPeopleChatMes, json!({ "name": name, "page": page }));
    }

    pub fn get_user_list(&self) {
        self.send(EventName::GetUserList, json!({}));
    }

    pub fn check_user(&self, user: &str) {
        self.send(EventName::CheckUser, json!({ "user": user }));
    }

    pub fn check_user_exist(&self, user: &str) {
        self.send(EventName::CheckUserExist, json!({ "user": user }));
    }

    pub fn check_user_online(&self, user: &str) {
        self.send(EventName::CheckUserOnline, json!({ "user": user }));
    }

    pub fn send_room_message(&self, room: &str, mes: &str) {
        self.send_chat(ConversationKind::Room, room, mes);
    }

    pub fn send_personal_message(&self, user: &str, mes: &str) {
        self.send_chat(ConversationKind::People, user, mes);
    }

    fn send_chat(&self, kind: ConversationKind, to: &str, mes: &str) {
        self.send(
            EventName::SendChat,
            json!({ "type": kind, "to": to, "mes": mes }),
        );
    }
}

// ── Driver ───────────────────────────────────────────────────────────

type Dial = Pin<Box<dyn Future<Output = Result<Transport>> + Send>>;

/// The connection slot. At most one dial, transport or timer exists.
enum Link {
    Idle,
    Dialing(Dial),
    Open(Transport),
    Waiting(Pin<Box<Sleep>>),
}

enum LinkEvent {
    Dialed(Result<Transport>),
    Received(TransportEvent),
    RetryDue,
}

/// Wait for whatever the current link can produce. Idle never resolves.
async fn next_link_event(link: &mut Link) -> LinkEvent {
    match link {
        Link::Idle => std::future::pending().await,
        Link::Dialing(dial) => LinkEvent::Dialed(dial.await),
        Link::Open(transport) => LinkEvent::Received(transport.recv().await),
        Link::Waiting(sleep) => {
            sleep.await;
            LinkEvent::RetryDue
        }
    }
}

struct Driver {
    shared: Arc<Shared>,
    connector: Arc<dyn Connector>,
    commands: mpsc::UnboundedReceiver<Command>,
    queue: OutboundQueue,
    link: Link,
    /// Consecutive automatic attempts since the last successful open.
    attempts: u32,
    /// Username of the last LOGIN sent, paired with the token it earns.
    pending_user: Option<String>,
}

impl Driver {
    async fn run(mut self) {
        loop {
            tokio::select! {
                cmd = self.commands.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd),
                    None => break,
                },
                event = next_link_event(&mut self.link) => self.handle_link_event(event),
            }
        }
        debug!("all client handles dropped; connection task exiting");
    }

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Connect => match self.link {
                Link::Dialing(_) | Link::Open(_) => {
                    debug!("connect ignored: already connecting or open");
                }
                Link::Idle | Link::Waiting(_) => self.start(),
            },
            Command::Disconnect => {
                if !matches!(self.link, Link::Idle) {
                    info!("disconnecting");
                }
                // Dropping the transport closes it normally; dropping a
                // pending dial or timer cancels it.
                self.link = Link::Idle;
                self.attempts = 0;
                self.set_state(ConnectionState::Absent);
            }
            Command::Send(envelope) => self.send(envelope),
        }
    }

    fn handle_link_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Dialed(Ok(transport)) => self.on_open(transport),
            LinkEvent::Dialed(Err(e)) => {
                warn!(error = %e, "connection attempt failed");
                self.on_lost();
            }
            LinkEvent::Received(TransportEvent::Text(text)) => self.on_text(&text),
            LinkEvent::Received(TransportEvent::Closed { reason }) => {
                info!(%reason, "connection closed");
                self.on_lost();
            }
            LinkEvent::RetryDue => self.dial(),
        }
    }

    fn set_state(&self, state: ConnectionState) {
        *self.shared.state.lock() = state;
    }

    fn dial(&mut self) {
        let connector = Arc::clone(&self.connector);
        let url = self.shared.config.endpoint.clone();
        let limit = self.shared.config.connect_timeout;
        info!(%url, attempt = self.attempts, "connecting");
        self.link = Link::Dialing(Box::pin(async move {
            tokio::time::timeout(limit, connector.connect(&url))
                .await
                .map_err(|_| Error::Transport(format!("connect to {url} timed out after {limit:?}")))?
        }));
        self.set_state(ConnectionState::Connecting);
    }

    fn send(&mut self, envelope: OutboundEnvelope) {
        let event = envelope.event().clone();
        debug!(%event, payload = %redact(&event, envelope.payload()), "send");
        if event == EventName::Login {
            if let Some(user) = envelope.payload().get("user").and_then(Value::as_str) {
                self.pending_user = Some(user.to_string());
            }
        }

        let json = envelope.to_json();
        if let Link::Open(transport) = &self.link {
            if !transport.is_closed() {
                if let Err(e) = transport.send(json) {
                    warn!(%event, error = %e, "write failed; envelope lost");
                }
                return;
            }
            // The close event is on its way; queue for the next connection.
        }

        debug!(%event, queued = self.queue.len() + 1, "not connected; queueing");
        if let Some(dropped) = self.queue.push(event, json) {
            warn!(
                %dropped,
                capacity = self.shared.config.queue.capacity,
                "outbound queue full; dropped oldest envelope"
            );
        }
        if matches!(self.link, Link::Idle | Link::Waiting(_)) {
            self.start();
        }
    }

    /// Dial on behalf of a caller. Coming out of Idle, whether never
    /// connected or after giving up, grants a fresh retry budget.
    fn start(&mut self) {
        if matches!(self.link, Link::Idle) {
            self.attempts = 0;
        }
        self.dial();
    }

    fn on_open(&mut self, transport: Transport) {
        self.attempts = 0;
        self.set_state(ConnectionState::Open);
        info!(url = %self.shared.config.endpoint, "connected");

        if transport.is_closed() {
            // The close event follows; the queue waits for the next transport.
            warn!(queued = self.queue.len(), "connection dropped right after opening");
            self.link = Link::Open(transport);
            return;
        }

        // Resumption goes first so queued calls run as the logged-in user.
        // This runs once per opened transport.
        match self.shared.store.load() {
            Ok(session) => {
                if let Some(cred) = session.credential() {
                    debug!(user = %cred.username, "resuming session");
                    let resume = OutboundEnvelope::new(
                        EventName::ReLogin,
                        json!({ "user": cred.username, "code": cred.token }),
                    );
                    if transport.try_send(resume.to_json()).is_err() {
                        warn!("connection dropped before resuming; next connection retries");
                    }
                }
            }
            Err(e) => warn!(error = %e, "can't read session store; not resuming"),
        }

        let (ready, expired) = self.queue.drain_ready(Instant::now());
        if !expired.is_empty() {
            warn!(count = expired.len(), events = ?expired, "dropped expired queued envelopes");
        }
        if !ready.is_empty() {
            debug!(count = ready.len(), "flushing outbound queue");
        }
        let mut ready = ready.into_iter();
        while let Some(mut item) = ready.next() {
            if let Err(json) = transport.try_send(std::mem::take(&mut item.json)) {
                item.json = json;
                let mut unsent = vec![item];
                unsent.extend(ready.by_ref());
                warn!(count = unsent.len(), "connection dropped during flush; requeueing");
                self.queue.requeue_front(unsent);
                break;
            }
        }
        self.link = Link::Open(transport);
    }

    /// The transport closed or an attempt failed: schedule the next attempt
    /// or give up.
    fn on_lost(&mut self) {
        let policy = self.shared.config.reconnect.clone();
        if self.attempts < policy.max_attempts {
            self.attempts += 1;
            let delay = policy.delay_for_attempt(self.attempts);
            info!(
                attempt = self.attempts,
                max = policy.max_attempts,
                delay_ms = delay.as_millis() as u64,
                "reconnecting"
            );
            self.link = Link::Waiting(Box::pin(tokio::time::sleep(delay)));
            self.set_state(ConnectionState::Reconnecting);
        } else {
            if policy.max_attempts > 0 {
                warn!(
                    attempts = self.attempts,
                    "reconnect attempts exhausted; offline until connect()"
                );
            }
            self.link = Link::Idle;
            self.set_state(ConnectionState::Absent);
        }
    }

    fn on_text(&mut self, text: &str) {
        let frame = match InboundFrame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, len = text.len(), "dropping malformed frame");
                return;
            }
        };
        debug!(event = %frame.event(), success = frame.is_success(), "frame");
        if let Some(code) = frame.relogin_code() {
            self.persist_token(frame.event(), code);
        }
        self.shared.listeners.dispatch(&frame);
    }

    fn persist_token(&mut self, event: &EventName, code: &str) {
        let store = &self.shared.store;
        let mut session = store.load().unwrap_or_else(|e| {
            warn!(error = %e, "can't read session store; starting a fresh session");
            Session::default()
        });
        if *event == EventName::Login {
            if let Some(user) = self.pending_user.take() {
                session.user = Some(user);
            }
        }
        session.relogin_code = Some(code.to_string());
        match store.save(&session) {
            Ok(()) => debug!(%event, "session token stored"),
            Err(e) => warn!(error = %e, "can't write session store"),
        }
    }
}
