//! Request/response on top of fire-and-forget sends.
//!
//! The wire has no request ids. A request subscribes, sends, and takes the
//! first frame whose event name matches, so two concurrent requests for the
//! same event can see each other's answers. Callers that need strictness
//! should not overlap requests for one event.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::oneshot;
use tracing::Instrument;

use crate::client::SocketClient;
use crate::envelope::InboundFrame;
use crate::error::{Error, Result};
use crate::event::EventName;
use crate::models::{history_from, ChatMessage, StatusReply, UserEntry};

static NEXT_REQUEST: AtomicU64 = AtomicU64::new(1);

impl SocketClient {
    /// Send `event` and wait for the next frame with the same event name.
    ///
    /// Resolves to the success payload, [`Error::Rejected`] for an error
    /// frame, or [`Error::Timeout`] after the configured request timeout.
    pub async fn request(&self, event: impl Into<EventName>, payload: Value) -> Result<Value> {
        let event = event.into();
        let seq = NEXT_REQUEST.fetch_add(1, Ordering::Relaxed);
        let span = tracing::debug_span!("request", seq, event = %event);
        self.request_inner(event, payload).instrument(span).await
    }

    async fn request_inner(&self, event: EventName, payload: Value) -> Result<Value> {
        let (tx, rx) = oneshot::channel();
        let slot = Mutex::new(Some(tx));
        let wanted = event.clone();
        let subscription = self.on_message(move |frame| {
            if frame.event() == &wanted {
                if let Some(tx) = slot.lock().take() {
                    let _ = tx.send(frame.clone());
                }
            }
        });

        self.send(event.clone(), payload);
        let outcome = tokio::time::timeout(self.config().request_timeout, rx).await;
        subscription.unsubscribe();

        match outcome {
            Ok(Ok(InboundFrame::Success { data, .. })) => {
                tracing::debug!("answered");
                Ok(data)
            }
            Ok(Ok(InboundFrame::Error { mes, .. })) => Err(Error::Rejected {
                event,
                message: mes.unwrap_or_default(),
            }),
            Ok(Err(_)) => Err(Error::Closed),
            Err(_) => {
                tracing::debug!("timed out");
                Err(Error::Timeout { event })
            }
        }
    }

    pub async fn fetch_user_list(&self) -> Result<Vec<UserEntry>> {
        let data = self.request(EventName::GetUserList, json!({})).await?;
        Ok(serde_json::from_value(data)?)
    }

    pub async fn user_exists(&self, user: &str) -> Result<bool> {
        let data = self
            .request(EventName::CheckUserExist, json!({ "user": user }))
            .await?;
        Ok(serde_json::from_value::<StatusReply>(data)?.status)
    }

    pub async fn user_online(&self, user: &str) -> Result<bool> {
        let data = self
            .request(EventName::CheckUserOnline, json!({ "user": user }))
            .await?;
        Ok(serde_json::from_value::<StatusReply>(data)?.status)
    }

    /// One page of room history, oldest first.
    pub async fn fetch_room_history(&self, room: &str, page: u32) -> Result<Vec<ChatMessage>> {
        let data = self
            .request(EventName::GetRoomChatMes, json!({ "name": room, "page": page }))
            .await?;
        Ok(history_from(&data)?)
    }

    /// One page of a direct conversation, oldest first.
    pub async fn fetch_people_history(&self, user: &str, page: u32) -> Result<Vec<ChatMessage>> {
        let data = self
            .request(EventName::GetPeopleChatMes, json!({ "name": user, "page": page }))
            .await?;
        Ok(history_from(&data)?)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::json;

    use crate::config::ClientConfig;
    use crate::error::Error;
    use crate::session::MemorySessionStore;
    use crate::transport::testing::test_connector;
    use crate::SocketClient;

    fn client(timeout: Duration) -> (SocketClient, crate::transport::testing::Controls) {
        let (connector, controls) = test_connector(false);
        let client = SocketClient::with_connector(
            ClientConfig::new("ws://test.invalid/chat").request_timeout(timeout),
            Arc::new(MemorySessionStore::default()),
            connector,
        );
        (client, controls)
    }

    #[tokio::test]
    async fn resolves_with_first_matching_frame() {
        let (client, mut controls) = client(Duration::from_secs(2));
        let pending = tokio::spawn({
            let client = client.clone();
            async move { client.user_exists("bob").await }
        });

        let mut peer = controls.next_peer().await;
        let sent = peer.next_json().await;
        assert_eq!(sent["data"]["event"], "CHECK_USER_EXIST");
        peer.push(r#"{"status":"success","event":"GET_USER_LIST","data":[]}"#);
        peer.push(r#"{"status":"success","event":"CHECK_USER_EXIST","data":{"status":true}}"#);

        assert!(pending.await.unwrap().unwrap());
    }

    #[tokio::test]
    async fn error_frame_is_rejected() {
        let (client, mut controls) = client(Duration::from_secs(2));
        let pending = tokio::spawn({
            let client = client.clone();
            async move { client.request("CREATE_ROOM", json!({"name": "lobby"})).await }
        });

        let mut peer = controls.next_peer().await;
        peer.next_written().await;
        peer.push(r#"{"status":"error","event":"CREATE_ROOM","mes":"Room exist"}"#);

        match pending.await.unwrap() {
            Err(Error::Rejected { event, message }) => {
                assert_eq!(event.as_str(), "CREATE_ROOM");
                assert_eq!(message, "Room exist");
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn times_out_and_unsubscribes() {
        let (client, mut controls) = client(Duration::from_millis(50));
        let err = client.request("CHECK_USER", json!({"user": "x"})).await.unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));
        let _peer = controls.next_peer().await;

        // The request's listener is gone; a fresh one is the only one left.
        let _sub = client.on_message(|_| {});
        assert_eq!(client.listener_count(), 1);
    }

    #[tokio::test]
    async fn history_is_decoded_and_sorted() {
        let (client, mut controls) = client(Duration::from_secs(2));
        let pending = tokio::spawn({
            let client = client.clone();
            async move { client.fetch_room_history("lobby", 1).await }
        });

        let mut peer = controls.next_peer().await;
        let sent = peer.next_json().await;
        assert_eq!(sent["data"]["data"], json!({"name": "lobby", "page": 1}));
        peer.push(
            &json!({"status": "success", "event": "GET_ROOM_CHAT_MES", "data": {
                "messages": [
                    {"id": 2, "name": "bob", "mes": "second", "createAt": "2025-12-29 11:52:32"},
                    {"id": 1, "name": "amy", "mes": "first", "createAt": "2025-12-29 11:50:00"}
                ]
            }})
            .to_string(),
        );

        let history = pending.await.unwrap().unwrap();
        assert_eq!(history[0].sender(), "amy");
        assert_eq!(history[1].text(), "second");
    }
}
