//! Transport seam between the client and the WebSocket.
//!
//! A [`Connector`] opens one connection and hands back a [`Transport`]: a
//! sender for outgoing text frames and a receiver of [`TransportEvent`]s.
//! Dropping the `Transport` closes the connection normally. The real
//! implementation is [`WsConnector`]; tests plug in scripted connectors.

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::error::{Error, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Something the connection reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// One text frame from the server.
    Text(String),
    /// The connection is gone. Never sent for a close we initiated.
    Closed { reason: String },
}

/// An open connection.
#[derive(Debug)]
pub struct Transport {
    outgoing: mpsc::UnboundedSender<String>,
    incoming: mpsc::UnboundedReceiver<TransportEvent>,
}

impl Transport {
    pub fn new(
        outgoing: mpsc::UnboundedSender<String>,
        incoming: mpsc::UnboundedReceiver<TransportEvent>,
    ) -> Self {
        Self { outgoing, incoming }
    }

    /// Build a transport plus the peer ends: the receiver of what the
    /// client writes and the sender for what the client reads.
    pub fn pair() -> (
        Self,
        mpsc::UnboundedReceiver<String>,
        mpsc::UnboundedSender<TransportEvent>,
    ) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        (Self::new(out_tx, in_rx), out_rx, in_tx)
    }

    /// Queue one text frame. Fails only if the connection task is gone.
    pub fn send(&self, text: String) -> Result<()> {
        self.try_send(text)
            .map_err(|_| Error::Transport("connection task ended".into()))
    }

    /// Like [`send`](Self::send), but hands the frame back on failure.
    pub fn try_send(&self, text: String) -> std::result::Result<(), String> {
        self.outgoing.send(text).map_err(|e| e.0)
    }

    /// True once the connection task has stopped reading.
    pub fn is_closed(&self) -> bool {
        self.outgoing.is_closed()
    }

    /// Next event; a vanished connection task reads as `Closed`.
    pub async fn recv(&mut self) -> TransportEvent {
        self.incoming
            .recv()
            .await
            .unwrap_or_else(|| TransportEvent::Closed {
                reason: "connection task ended".into(),
            })
    }
}

/// Opens connections to an endpoint.
#[async_trait::async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, url: &str) -> Result<Transport>;
}

/// [`Connector`] backed by tokio-tungstenite, with rustls for `wss://`.
#[derive(Debug, Clone, Default)]
pub struct WsConnector;

impl WsConnector {
    pub fn new() -> Self {
        install_crypto_provider();
        Self
    }
}

fn install_crypto_provider() {
    // Fails harmlessly when a provider is already installed.
    let _ = rustls::crypto::ring::default_provider().install_default();
}

#[async_trait::async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Transport> {
        install_crypto_provider();
        let (ws, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| Error::Transport(format!("connect to {url} failed: {e}")))?;
        tracing::debug!(%url, "WebSocket handshake complete");

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        tokio::spawn(pump(ws, out_rx, in_tx));
        Ok(Transport::new(out_tx, in_rx))
    }
}

/// Shuttle frames between the socket and the transport channels until
/// either side goes away.
async fn pump(
    ws: WsStream,
    mut outgoing: mpsc::UnboundedReceiver<String>,
    incoming: mpsc::UnboundedSender<TransportEvent>,
) {
    let (mut write, mut read) = ws.split();
    loop {
        tokio::select! {
            cmd = outgoing.recv() => {
                match cmd {
                    Some(text) => {
                        if let Err(e) = write.send(Message::Text(text.into())).await {
                            let _ = incoming.send(TransportEvent::Closed {
                                reason: format!("send failed: {e}"),
                            });
                            break;
                        }
                    }
                    None => {
                        // Transport dropped by the client: caller-initiated close.
                        let _ = write.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
            msg = read.next() => {
                let event = match msg {
                    Some(Ok(Message::Text(text))) => TransportEvent::Text(text.to_string()),
                    Some(Ok(Message::Binary(data))) => match String::from_utf8(data.to_vec()) {
                        Ok(text) => TransportEvent::Text(text),
                        Err(_) => {
                            tracing::warn!(len = data.len(), "dropping non-UTF-8 binary frame");
                            continue;
                        }
                    },
                    Some(Ok(Message::Close(frame))) => TransportEvent::Closed {
                        reason: frame
                            .map(|f| format!("{} {}", u16::from(f.code), f.reason))
                            .unwrap_or_else(|| "closed by server".into()),
                    },
                    // Pong replies are handled by tungstenite.
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => TransportEvent::Closed { reason: e.to_string() },
                    None => TransportEvent::Closed { reason: "stream ended".into() },
                };
                let closed = matches!(event, TransportEvent::Closed { .. });
                if incoming.send(event).is_err() || closed {
                    break;
                }
            }
        }
    }
}


#[cfg(test)]
pub(crate) mod testing {
    //! Scripted connector: every successful `connect` hands the test the
    //! peer ends of an in-memory transport.

    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::sync::{mpsc, Semaphore};

    use super::{Connector, Transport, TransportEvent};
    use crate::error::{Error, Result};

    const WAIT: Duration = Duration::from_secs(2);

    /// The server side of one connection.
    pub(crate) struct Peer {
        pub written: mpsc::UnboundedReceiver<String>,
        pub inject: mpsc::UnboundedSender<TransportEvent>,
    }

    impl Peer {
        pub async fn next_written(&mut self) -> String {
            tokio::time::timeout(WAIT, self.written.recv())
                .await
                .expect("timed out waiting for a write")
                .expect("transport dropped")
        }

        pub async fn next_json(&mut self) -> serde_json::Value {
            serde_json::from_str(&self.next_written().await).unwrap()
        }

        pub fn push(&self, text: &str) {
            self.inject
                .send(TransportEvent::Text(text.to_string()))
                .unwrap();
        }

        pub fn close(&self) {
            let _ = self.inject.send(TransportEvent::Closed {
                reason: "test close".into(),
            });
        }
    }

    pub(crate) struct TestConnector {
        calls: Arc<AtomicUsize>,
        gate: Arc<Semaphore>,
        failing: Arc<AtomicBool>,
        dead: Arc<AtomicUsize>,
        peers: mpsc::UnboundedSender<Peer>,
    }

    /// Test-side controls of a [`TestConnector`].
    pub(crate) struct Controls {
        calls: Arc<AtomicUsize>,
        gate: Arc<Semaphore>,
        failing: Arc<AtomicBool>,
        dead: Arc<AtomicUsize>,
        peers: mpsc::UnboundedReceiver<Peer>,
    }

    impl Controls {
        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub fn open_gate(&self) {
            self.gate.add_permits(1);
        }

        pub fn set_failing(&self, failing: bool) {
            self.failing.store(failing, Ordering::SeqCst);
        }

        /// The next `count` connections open with both peer ends already
        /// gone: writes fail and the first read is a close.
        pub fn open_dead(&self, count: usize) {
            self.dead.store(count, Ordering::SeqCst);
        }

        pub async fn next_peer(&mut self) -> Peer {
            tokio::time::timeout(WAIT, self.peers.recv())
                .await
                .expect("timed out waiting for a connection")
                .expect("connector dropped")
        }
    }

    /// A connector whose attempts complete at once, or, with `gated`, only
    /// after [`Controls::open_gate`].
    pub(crate) fn test_connector(gated: bool) -> (TestConnector, Controls) {
        let calls = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(Semaphore::new(if gated { 0 } else { 1 }));
        let failing = Arc::new(AtomicBool::new(false));
        let dead = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = mpsc::unbounded_channel();
        (
            TestConnector {
                calls: Arc::clone(&calls),
                gate: Arc::clone(&gate),
                failing: Arc::clone(&failing),
                dead: Arc::clone(&dead),
                peers: tx,
            },
            Controls {
                calls,
                gate,
                failing,
                dead,
                peers: rx,
            },
        )
    }

    #[async_trait::async_trait]
    impl Connector for TestConnector {
        async fn connect(&self, _url: &str) -> Result<Transport> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let _permit = self
                .gate
                .acquire()
                .await
                .map_err(|_| Error::Transport("gate closed".into()))?;
            if self.failing.load(Ordering::SeqCst) {
                return Err(Error::Transport("connection refused".into()));
            }
            let (transport, written, inject) = Transport::pair();
            let dead = self
                .dead
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if !dead {
                let _ = self.peers.send(Peer { written, inject });
            }
            Ok(transport)
        }
    }

    /// Poll `cond` until it holds, panicking after a couple of seconds.
    pub(crate) async fn eventually(what: &str, mut cond: impl FnMut() -> bool) {
        let deadline = tokio::time::Instant::now() + WAIT;
        while !cond() {
            if tokio::time::Instant::now() > deadline {
                panic!("timed out waiting for {what}");
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}
