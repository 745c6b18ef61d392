#![allow(
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    reason = "Do not need additional syntax for setting up tests"
)]
#![allow(
    unused,
    reason = "Each test binary only uses part of the shared helpers"
)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use fraud_alert_feed::ws::{EventReceiver, StreamEvent};
use futures_util::{SinkExt as _, StreamExt as _};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

/// How long a test waits for something that should happen promptly.
pub const PATIENCE: Duration = Duration::from_secs(3);

#[derive(Debug, Clone)]
enum Command {
    /// Send a text frame
    Send(String),
    /// Send a close frame, then hang up
    Close,
    /// Hang up without a close frame
    Drop,
}

/// Mock alert backend.
pub struct MockWsServer {
    addr: SocketAddr,
    /// Commands fan out to ALL connected clients
    command_tx: broadcast::Sender<Command>,
    /// One item per completed handshake
    accepted_rx: mpsc::UnboundedReceiver<()>,
    /// One item per connection that ended on the server side
    disconnected_rx: mpsc::UnboundedReceiver<()>,
    accepted: Arc<AtomicUsize>,
}

impl MockWsServer {
    /// Start a mock WebSocket server on a random port.
    pub async fn start() -> Self {
        Self::start_with(true).await
    }

    /// Start a server that never reads from its clients, so pings go unanswered.
    pub async fn start_silent() -> Self {
        Self::start_with(false).await
    }

    async fn start_with(responsive: bool) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (command_tx, _) = broadcast::channel::<Command>(100);
        let (accepted_tx, accepted_rx) = mpsc::unbounded_channel();
        let (disconnected_tx, disconnected_rx) = mpsc::unbounded_channel();
        let accepted = Arc::new(AtomicUsize::new(0));

        let commands = command_tx.clone();
        let counter = Arc::clone(&accepted);

        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };

                let Ok(ws_stream) = tokio_tungstenite::accept_async(stream).await else {
                    continue;
                };

                let (mut write, mut read) = ws_stream.split();
                // Subscribe before announcing the connection so no command is missed
                let mut command_rx = commands.subscribe();
                counter.fetch_add(1, Ordering::SeqCst);
                drop(accepted_tx.send(()));

                let disconnected = disconnected_tx.clone();
                tokio::spawn(async move {
                    loop {
                        tokio::select! {
                            msg = read.next(), if responsive => {
                                match msg {
                                    Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                                    Some(Ok(_)) => {}
                                }
                            }
                            command = command_rx.recv() => {
                                match command {
                                    Ok(Command::Send(text)) => {
                                        if write.send(Message::Text(text.into())).await.is_err() {
                                            break;
                                        }
                                    }
                                    Ok(Command::Close) => {
                                        let frame = CloseFrame {
                                            code: CloseCode::Normal,
                                            reason: "bye".into(),
                                        };
                                        drop(write.send(Message::Close(Some(frame))).await);
                                        break;
                                    }
                                    Ok(Command::Drop) | Err(_) => break,
                                }
                            }
                        }
                    }
                    drop(disconnected.send(()));
                });
            }
        });

        Self {
            addr,
            command_tx,
            accepted_rx,
            disconnected_rx,
            accepted,
        }
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    /// Send a text frame to all connected clients.
    pub fn send(&self, message: &str) {
        drop(self.command_tx.send(Command::Send(message.to_owned())));
    }

    /// Close every connection with a normal close frame.
    pub fn close_all(&self) {
        drop(self.command_tx.send(Command::Close));
    }

    /// Hang up on every connection without a closing handshake.
    pub fn drop_all(&self) {
        drop(self.command_tx.send(Command::Drop));
    }

    /// Total handshakes completed so far.
    pub fn connections(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    /// Wait for the next completed handshake.
    pub async fn wait_for_connection(&mut self) -> bool {
        timeout(PATIENCE, self.accepted_rx.recv())
            .await
            .ok()
            .flatten()
            .is_some()
    }

    /// Wait for the next connection to end on the server side.
    pub async fn wait_for_disconnect(&mut self) -> bool {
        timeout(PATIENCE, self.disconnected_rx.recv())
            .await
            .ok()
            .flatten()
            .is_some()
    }
}

/// An endpoint nothing listens on, so every attempt is refused.
pub async fn refused_endpoint() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("ws://{addr}/ws")
}

/// A listener that accepts TCP but never answers the WebSocket handshake.
pub async fn unresponsive_endpoint() -> (String, TcpListener) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (format!("ws://{addr}/ws"), listener)
}

/// Next event, failing the test if none arrives promptly.
pub async fn next_event(events: &mut EventReceiver) -> StreamEvent {
    timeout(PATIENCE, events.recv())
        .await
        .expect("timed out waiting for a stream event")
        .expect("event channel ended")
}

/// Example alert payloads.
pub mod payloads {
    use serde_json::{Value, json};

    pub const VELOCITY: &str = r#"{"type":"velocity","reason":"5 cards/1 device","transaction":{"user_id":"u1","card_id":"c1","device_id":"d1","amount":120.50,"merchant":"Acme"}}"#;

    /// Every field present, but as an array instead of an object.
    pub const POSITIONAL: &str = r#"["velocity","positional",["u1","c1","d1",5,"Acme"]]"#;

    #[must_use]
    pub fn alert(reason: &str) -> String {
        json!({
            "type": "velocity",
            "reason": reason,
            "transaction": {
                "user_id": "u1",
                "card_id": "c1",
                "device_id": "d1",
                "amount": 42.00,
                "merchant": "Acme"
            }
        })
        .to_string()
    }

    #[must_use]
    pub fn missing_transaction() -> Value {
        json!({
            "type": "velocity",
            "reason": "no transaction attached"
        })
    }
}
