//! Coalescing of bursty refresh calls.
//!
//! UI layers ask for GET_USER_LIST after every login, room join and
//! incoming message. [`Debounced`] turns a burst of such triggers into one
//! send and then stays quiet for a window.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::task::JoinHandle;

use crate::client::SocketClient;
use crate::event::EventName;

/// Minimum gap between two sends.
pub const DEFAULT_WINDOW: Duration = Duration::from_millis(1000);
/// Delay before a scheduled send goes out.
pub const DEFAULT_DELAY: Duration = Duration::from_millis(100);

#[derive(Default)]
struct State {
    last_sent: Option<Instant>,
    pending: Option<JoinHandle<()>>,
}

/// A send of one fixed call, rate limited.
///
/// A trigger within `window` of the last actual send is ignored. Otherwise
/// any pending send is cancelled and a new one is scheduled after `delay`,
/// so a burst collapses into its last trigger.
pub struct Debounced {
    client: SocketClient,
    event: EventName,
    payload: Value,
    window: Duration,
    delay: Duration,
    state: Arc<Mutex<State>>,
}

impl Debounced {
    pub fn new(client: SocketClient, event: impl Into<EventName>, payload: Value) -> Self {
        Self {
            client,
            event: event.into(),
            payload,
            window: DEFAULT_WINDOW,
            delay: DEFAULT_DELAY,
            state: Arc::new(Mutex::new(State::default())),
        }
    }

    /// The usual case: a debounced GET_USER_LIST.
    pub fn user_list(client: SocketClient) -> Self {
        Self::new(client, EventName::GetUserList, json!({}))
    }

    pub fn window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Ask for a send. Returns whether one was scheduled.
    pub fn trigger(&self) -> bool {
        let mut state = self.state.lock();
        if let Some(last) = state.last_sent {
            if last.elapsed() < self.window {
                tracing::trace!(event = %self.event, "debounced");
                return false;
            }
        }
        if let Some(pending) = state.pending.take() {
            pending.abort();
        }

        let shared = Arc::clone(&self.state);
        let client = self.client.clone();
        let event = self.event.clone();
        let payload = self.payload.clone();
        let delay = self.delay;
        state.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut state = shared.lock();
                state.last_sent = Some(Instant::now());
                state.pending = None;
            }
            client.send(event, payload);
        }));
        true
    }
}

impl Drop for Debounced {
    fn drop(&mut self) {
        if let Some(pending) = self.state.lock().pending.take() {
            pending.abort();
        }
    }
}

impl std::fmt::Debug for Debounced {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Debounced")
            .field("event", &self.event)
            .field("window", &self.window)
            .field("delay", &self.delay)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::session::MemorySessionStore;
    use crate::transport::testing::test_connector;

    #[tokio::test]
    async fn burst_collapses_then_window_blocks() {
        let (connector, mut controls) = test_connector(false);
        let client = SocketClient::with_connector(
            ClientConfig::new("ws://test.invalid/chat"),
            Arc::new(MemorySessionStore::default()),
            connector,
        );
        client.connect();
        let mut peer = controls.next_peer().await;

        let refresh = Debounced::user_list(client.clone())
            .window(Duration::from_millis(300))
            .delay(Duration::from_millis(20));
        assert!(refresh.trigger());
        assert!(refresh.trigger());
        assert!(refresh.trigger());

        assert_eq!(peer.next_json().await["data"]["event"], "GET_USER_LIST");
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(peer.written.try_recv().is_err(), "burst should send once");

        assert!(!refresh.trigger(), "inside the window");
        tokio::time::sleep(Duration::from_millis(350)).await;
        assert!(refresh.trigger());
        assert_eq!(peer.next_json().await["data"]["event"], "GET_USER_LIST");
    }

    #[tokio::test]
    async fn dropping_cancels_pending_send() {
        let (connector, mut controls) = test_connector(false);
        let client = SocketClient::with_connector(
            ClientConfig::new("ws://test.invalid/chat"),
            Arc::new(MemorySessionStore::default()),
            connector,
        );
        client.connect();
        let mut peer = controls.next_peer().await;

        let refresh = Debounced::user_list(client.clone()).delay(Duration::from_millis(50));
        assert!(refresh.trigger());
        drop(refresh);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(peer.written.try_recv().is_err());
    }
}
