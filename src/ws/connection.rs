#![expect(
    clippy::module_name_repetitions,
    reason = "Connection types expose their domain in the name for clarity"
)]

use std::fmt;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use backoff::backoff::Backoff as _;
use futures::{SinkExt as _, StreamExt as _};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, timeout};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use url::Url;

use super::config::{Config, HeartbeatConfig};
use super::error::WsError;
use crate::Result;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How long a stopping connection waits for its close frame to be flushed.
const CLOSE_GRACE: Duration = Duration::from_millis(500);

/// Close code reported when the peer sends a close frame without a status.
const NO_STATUS_RECEIVED: u16 = 1005;

/// Connection state tracking.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Constructed but not started
    Idle,
    /// Attempting to connect
    Connecting {
        /// Consecutive attempt number, starting at 1
        attempt: u32,
    },
    /// Successfully connected
    Connected {
        /// When the connection was established
        since: Instant,
    },
    /// Waiting out the reconnect delay after a close
    Reconnecting {
        /// Consecutive failed attempts so far; zero after a session that did open
        attempt: u32,
        /// Delay before the next attempt
        delay: Duration,
    },
    /// Gave up after reaching the configured attempt cap
    Failed {
        /// Number of consecutive failed attempts
        attempts: u32,
    },
    /// Stopped by the owner; terminal
    Stopped,
}

impl ConnectionState {
    /// Check if the connection is currently active.
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected { .. })
    }

    /// No further transitions happen from a terminal state.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Failed { .. } | Self::Stopped)
    }
}

/// Why a physical connection ended.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseCause {
    /// The peer sent a close frame.
    Remote {
        /// WebSocket close code
        code: u16,
        /// Close reason supplied by the peer, possibly empty
        reason: String,
    },
    /// Network or protocol fault after the connection was open.
    Transport(String),
    /// The connection could not be established at all.
    ConnectFailed(String),
}

impl CloseCause {
    /// Whether this close was caused by a fault rather than an orderly close.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::ConnectFailed(_))
    }
}

impl fmt::Display for CloseCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Remote { code, reason } if reason.is_empty() => {
                write!(f, "closed by peer ({code})")
            }
            Self::Remote { code, reason } => write!(f, "closed by peer ({code}): {reason}"),
            Self::Transport(reason) => write!(f, "transport error: {reason}"),
            Self::ConnectFailed(reason) => write!(f, "connect failed: {reason}"),
        }
    }
}

/// One lifecycle signal from a [`StreamConnection`], in the order it happened.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// A new physical connection attempt has begun.
    Connecting {
        /// Consecutive attempt number, starting at 1
        attempt: u32,
    },
    /// Physical connection established and usable.
    Opened,
    /// One inbound text frame, exactly as received.
    Message(String),
    /// Transient error signal; always followed by the [`StreamEvent::Closed`] it belongs to.
    Error(String),
    /// Physical connection ended.
    Closed(CloseCause),
    /// The attempt cap was reached; no further events follow.
    GaveUp {
        /// Number of consecutive failed attempts
        attempts: u32,
    },
}

/// Receiving half of a [`StreamConnection`]'s event channel.
///
/// Once the owning connection has been stopped, [`EventReceiver::recv`] returns
/// `None`, even for events that were still buffered.
#[derive(Debug)]
pub struct EventReceiver {
    rx: mpsc::UnboundedReceiver<StreamEvent>,
    stopped: CancellationToken,
}

impl EventReceiver {
    /// Receive the next event, or `None` once the connection is stopped or gone.
    pub async fn recv(&mut self) -> Option<StreamEvent> {
        if self.stopped.is_cancelled() {
            return None;
        }

        tokio::select! {
            biased;

            () = self.stopped.cancelled() => None,
            event = self.rx.recv() => event.filter(|_| !self.stopped.is_cancelled()),
        }
    }
}

/// Sending half used by the connection task; drops events once stopped.
struct Emitter {
    tx: mpsc::UnboundedSender<StreamEvent>,
    stopped: CancellationToken,
}

impl Emitter {
    fn emit(&self, event: StreamEvent) {
        if self.stopped.is_cancelled() {
            return;
        }
        _ = self.tx.send(event);
    }
}

enum Lifecycle {
    Idle(mpsc::UnboundedSender<StreamEvent>),
    Running(JoinHandle<()>),
    Stopped,
}

/// How a single physical connection ended.
enum Ended {
    Closed(CloseCause),
    Stopped,
}

/// Signals from the heartbeat task to the frame loop.
enum Beat {
    Ping,
    Dead(Duration),
}

/// Owns exactly one logical connection to a WebSocket event source.
///
/// A single background task holds the physical socket, replaces it after every
/// close according to the [`ReconnectConfig`](super::config::ReconnectConfig),
/// and reports everything it does as [`StreamEvent`]s on one ordered channel.
///
/// # Example
///
/// ```ignore
/// let (connection, mut events) = StreamConnection::new("ws://localhost:8000/ws", Config::default());
/// connection.start();
///
/// while let Some(event) = events.recv().await {
///     println!("{event:?}");
/// }
/// ```
pub struct StreamConnection {
    endpoint: String,
    config: Config,
    state_tx: watch::Sender<ConnectionState>,
    cancel: CancellationToken,
    lifecycle: Mutex<Lifecycle>,
}

impl fmt::Debug for StreamConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamConnection")
            .field("endpoint", &self.endpoint)
            .field("config", &self.config)
            .field("state", &*self.state_tx.borrow())
            .finish_non_exhaustive()
    }
}

impl StreamConnection {
    /// Create a connection for `endpoint` without connecting yet.
    ///
    /// The endpoint is not validated here: a malformed endpoint surfaces as a
    /// failed attempt once started, and is retried like any other failure.
    #[must_use]
    pub fn new(endpoint: &str, config: Config) -> (Self, EventReceiver) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state_tx, _) = watch::channel(ConnectionState::Idle);
        let cancel = CancellationToken::new();

        let receiver = EventReceiver {
            rx: events_rx,
            stopped: cancel.clone(),
        };
        let connection = Self {
            endpoint: endpoint.to_owned(),
            config,
            state_tx,
            cancel,
            lifecycle: Mutex::new(Lifecycle::Idle(events_tx)),
        };

        (connection, receiver)
    }

    /// Start the connection loop on the current tokio runtime.
    ///
    /// Calling this again, or after [`StreamConnection::stop`], does nothing.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime.
    pub fn start(&self) {
        let mut lifecycle = self
            .lifecycle
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let Lifecycle::Idle(events_tx) = &*lifecycle else {
            #[cfg(feature = "tracing")]
            tracing::debug!(endpoint = %self.endpoint, "start ignored: connection already started or stopped");
            return;
        };

        let emitter = Emitter {
            tx: events_tx.clone(),
            stopped: self.cancel.clone(),
        };
        let handle = tokio::spawn(Self::connection_loop(
            self.endpoint.clone(),
            self.config.clone(),
            emitter,
            self.state_tx.clone(),
            self.cancel.clone(),
        ));

        *lifecycle = Lifecycle::Running(handle);
    }

    /// Stop the connection for good.
    ///
    /// Cancels any pending reconnect delay, closes the live socket if there is
    /// one, and waits for the background task to finish. Once this returns, the
    /// [`EventReceiver`] yields no further events. Calling it again, or from
    /// several tasks at once, is safe: every caller returns only after the
    /// connection has fully stopped.
    pub async fn stop(&self) {
        self.cancel.cancel();

        let previous = {
            let mut lifecycle = self
                .lifecycle
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *lifecycle, Lifecycle::Stopped)
        };

        match previous {
            Lifecycle::Running(handle) => {
                if let Err(e) = handle.await {
                    #[cfg(feature = "tracing")]
                    tracing::error!(error = %e, "connection task ended abnormally");
                    #[cfg(not(feature = "tracing"))]
                    let _ = &e;
                }
                self.state_tx.send_replace(ConnectionState::Stopped);
                #[cfg(feature = "tracing")]
                tracing::debug!(endpoint = %self.endpoint, "connection stopped");
            }
            Lifecycle::Idle(_) => {
                self.state_tx.send_replace(ConnectionState::Stopped);
            }
            Lifecycle::Stopped => {
                // Another caller is still tearing down; wait until it is done
                let mut state = self.state_tx.subscribe();
                _ = state
                    .wait_for(|s| matches!(s, ConnectionState::Stopped))
                    .await;
            }
        }
    }

    /// Get the current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Subscribe to connection state changes.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// The endpoint this connection targets.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Main connection loop with automatic reconnection.
    async fn connection_loop(
        endpoint: String,
        config: Config,
        emitter: Emitter,
        state_tx: watch::Sender<ConnectionState>,
        cancel: CancellationToken,
    ) {
        let mut attempt = 0_u32;
        let mut backoff = config.reconnect.backoff();

        loop {
            attempt = attempt.saturating_add(1);
            state_tx.send_replace(ConnectionState::Connecting { attempt });
            emitter.emit(StreamEvent::Connecting { attempt });

            let connected = tokio::select! {
                biased;

                () = cancel.cancelled() => break,
                result = connect(&endpoint, config.connect_timeout) => result,
            };

            let cause = match connected {
                Ok(ws_stream) => {
                    attempt = 0;
                    backoff.reset();
                    state_tx.send_replace(ConnectionState::Connected {
                        since: Instant::now(),
                    });
                    emitter.emit(StreamEvent::Opened);

                    #[cfg(feature = "tracing")]
                    tracing::info!(%endpoint, "connected to alert stream");

                    match Self::handle_connection(ws_stream, &emitter, &config, &cancel).await {
                        Ended::Closed(cause) => cause,
                        Ended::Stopped => break,
                    }
                }
                Err(e) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(%endpoint, attempt, error = %e, "unable to connect");
                    CloseCause::ConnectFailed(e.to_string())
                }
            };

            #[cfg(feature = "tracing")]
            tracing::info!(%endpoint, %cause, "disconnected from alert stream");

            if cause.is_error() {
                emitter.emit(StreamEvent::Error(cause.to_string()));
            }
            emitter.emit(StreamEvent::Closed(cause));

            // Check if we should stop reconnecting
            if let Some(max) = config.reconnect.max_attempts
                && attempt >= max
            {
                #[cfg(feature = "tracing")]
                tracing::error!(%endpoint, attempts = attempt, "giving up on alert stream");
                state_tx.send_replace(ConnectionState::Failed { attempts: attempt });
                emitter.emit(StreamEvent::GaveUp { attempts: attempt });
                break;
            }

            let delay = backoff.next_backoff().unwrap_or(Duration::ZERO);
            state_tx.send_replace(ConnectionState::Reconnecting { attempt, delay });

            #[cfg(feature = "tracing")]
            tracing::debug!(%endpoint, ?delay, "reconnect scheduled");

            tokio::select! {
                biased;

                () = cancel.cancelled() => break,
                () = sleep(delay) => {}
            }
        }
    }

    /// Handle an active WebSocket connection until it closes or is stopped.
    async fn handle_connection(
        ws_stream: WsStream,
        emitter: &Emitter,
        config: &Config,
        cancel: &CancellationToken,
    ) -> Ended {
        let (mut write, mut read) = ws_stream.split();

        // Channel to notify heartbeat loop when PONG is received
        let (pong_tx, pong_rx) = watch::channel(Instant::now());
        let (beat_tx, mut beat_rx) = mpsc::unbounded_channel();

        // Without a heartbeat the sender is dropped here and its branch below stays disabled
        let heartbeat_handle = config
            .heartbeat
            .map(|heartbeat| {
                tokio::spawn(Self::heartbeat_loop(beat_tx, heartbeat.clamped(), pong_rx))
            });

        let ended = loop {
            tokio::select! {
                biased;

                () = cancel.cancelled() => {
                    _ = timeout(CLOSE_GRACE, write.close()).await;
                    break Ended::Stopped;
                }

                // Handle incoming messages
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            #[cfg(feature = "tracing")]
                            tracing::trace!(%text, "Received WebSocket text message");
                            emitter.emit(StreamEvent::Message(text.as_str().to_owned()));
                        }
                        Some(Ok(Message::Pong(_))) => {
                            _ = pong_tx.send(Instant::now());
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let (code, reason) = frame.map_or_else(
                                || (NO_STATUS_RECEIVED, String::new()),
                                |frame| (u16::from(frame.code), frame.reason.as_str().to_owned()),
                            );
                            break Ended::Closed(CloseCause::Remote { code, reason });
                        }
                        Some(Err(e)) => {
                            break Ended::Closed(CloseCause::Transport(WsError::Connection(e).to_string()));
                        }
                        None => {
                            break Ended::Closed(CloseCause::Transport(WsError::ConnectionClosed.to_string()));
                        }
                        Some(Ok(_)) => {
                            // Ignore binary frames; pings are answered by the transport.
                        }
                    }
                }

                // Handle requests from heartbeat loop
                Some(beat) = beat_rx.recv() => {
                    match beat {
                        Beat::Ping => {
                            if let Err(e) = write.send(Message::Ping(Vec::new().into())).await {
                                break Ended::Closed(CloseCause::Transport(WsError::Connection(e).to_string()));
                            }
                        }
                        Beat::Dead(after) => {
                            break Ended::Closed(CloseCause::Transport(WsError::HeartbeatTimeout(after).to_string()));
                        }
                    }
                }
            }
        };

        // Cleanup
        if let Some(handle) = heartbeat_handle {
            handle.abort();
        }

        ended
    }

    /// Heartbeat loop that requests PING frames and monitors PONG responses.
    async fn heartbeat_loop(
        beat_tx: mpsc::UnboundedSender<Beat>,
        heartbeat: HeartbeatConfig,
        mut pong_rx: watch::Receiver<Instant>,
    ) {
        let mut ping_interval = interval(heartbeat.interval);

        loop {
            ping_interval.tick().await;

            // Mark current PONG state as seen before sending PING
            // This prevents changed() from returning immediately due to a stale PONG
            drop(pong_rx.borrow_and_update());

            // Send PING request to message loop
            if beat_tx.send(Beat::Ping).is_err() {
                // Message loop has terminated
                break;
            }

            match timeout(heartbeat.timeout, pong_rx.changed()).await {
                Ok(Ok(())) => {}
                Ok(Err(_)) => {
                    // Channel closed, connection is terminating
                    break;
                }
                Err(_) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(
                        "Heartbeat timeout: no PONG received within {:?}",
                        heartbeat.timeout
                    );
                    _ = beat_tx.send(Beat::Dead(heartbeat.timeout));
                    break;
                }
            }
        }
    }
}

impl Drop for StreamConnection {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Validate the endpoint and open one physical connection.
async fn connect(endpoint: &str, connect_timeout: Option<Duration>) -> Result<WsStream> {
    let url = validate_endpoint(endpoint)?;
    let connecting = connect_async(url.as_str());

    let (ws_stream, _) = match connect_timeout {
        Some(limit) => timeout(limit, connecting)
            .await
            .map_err(|_elapsed| WsError::ConnectTimeout(limit))??,
        None => connecting.await?,
    };

    Ok(ws_stream)
}

/// Parse `endpoint` and check that it is a WebSocket URL.
pub(crate) fn validate_endpoint(endpoint: &str) -> Result<Url> {
    let url = Url::parse(endpoint).map_err(|e| WsError::InvalidEndpoint {
        endpoint: endpoint.to_owned(),
        reason: e.to_string(),
    })?;

    match url.scheme() {
        "ws" | "wss" => Ok(url),
        other => Err(WsError::InvalidEndpoint {
            endpoint: endpoint.to_owned(),
            reason: format!("unsupported scheme {other:?}, expected ws or wss"),
        }
        .into()),
    }
}
