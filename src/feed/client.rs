use std::sync::{Arc, Mutex, PoisonError};

use futures::Stream;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::store::AlertFeedStore;
use super::types::FeedSnapshot;
use crate::ws::config::Config;
use crate::ws::connection::{ConnectionState, EventReceiver, StreamConnection};

/// Dashboard endpoint of the alert backend.
pub const DEFAULT_ENDPOINT: &str = "ws://localhost:8000/ws";

/// Live fraud-alert feed: one resilient connection feeding one store.
///
/// Events flow from the connection's task through a single pump task into the
/// [`AlertFeedStore`], so alerts from each physical connection land in the
/// order they were received.
///
/// # Examples
///
/// ```rust, no_run
/// use fraud_alert_feed::feed::Client;
/// use futures::StreamExt as _;
///
/// #[tokio::main]
/// async fn main() {
///     let client = Client::default();
///     client.start();
///
///     let mut updates = Box::pin(client.updates());
///     while let Some(snapshot) = updates.next().await {
///         println!("{} ({} alerts)", snapshot.status, snapshot.len());
///     }
/// }
/// ```
#[derive(Clone, Debug)]
pub struct Client {
    inner: Arc<ClientInner>,
}

#[derive(Debug)]
struct ClientInner {
    /// Connection manager for the WebSocket
    connection: StreamConnection,
    /// Status and alerts shown to the user
    store: AlertFeedStore,
    /// Task applying events to the store
    pump: Mutex<Pump>,
    /// Held for the whole of [`Client::stop`], so concurrent callers all wait for the drain
    stopping: tokio::sync::Mutex<()>,
}

#[derive(Debug)]
enum Pump {
    Idle(EventReceiver),
    Running(JoinHandle<()>),
    Stopped,
}

impl Default for Client {
    fn default() -> Self {
        Self::new(DEFAULT_ENDPOINT, Config::default())
    }
}

impl Client {
    /// Create a client for `endpoint`. Nothing connects until [`Client::start`].
    #[must_use]
    pub fn new(endpoint: &str, config: Config) -> Self {
        let (connection, events) = StreamConnection::new(endpoint, config);

        Self {
            inner: Arc::new(ClientInner {
                connection,
                store: AlertFeedStore::new(),
                pump: Mutex::new(Pump::Idle(events)),
                stopping: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Start connecting. Idempotent; does nothing after [`Client::stop`].
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime.
    pub fn start(&self) {
        let mut pump = self.inner.pump.lock().unwrap_or_else(PoisonError::into_inner);

        let mut events = match std::mem::replace(&mut *pump, Pump::Stopped) {
            Pump::Idle(events) => events,
            other => {
                *pump = other;
                return;
            }
        };

        let store = self.inner.store.clone();
        *pump = Pump::Running(tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                // Decode failures are logged by the store and go no further
                _ = store.apply(&event);
            }
        }));

        // Started under the lock so a concurrent stop sees a consistent pair
        self.inner.connection.start();
    }

    /// Stop the feed. Once this returns the store no longer changes.
    ///
    /// Safe to call at any time, including while a reconnect is pending, more
    /// than once, and from several tasks at once.
    pub async fn stop(&self) {
        let _stopping = self.inner.stopping.lock().await;

        // Nothing may start after a stop
        let previous = std::mem::replace(
            &mut *self.inner.pump.lock().unwrap_or_else(PoisonError::into_inner),
            Pump::Stopped,
        );

        self.inner.connection.stop().await;

        if let Pump::Running(pump) = previous
            && let Err(e) = pump.await
        {
            #[cfg(feature = "tracing")]
            tracing::error!(error = %e, "feed pump ended abnormally");
            #[cfg(not(feature = "tracing"))]
            let _ = &e;
        }
    }

    /// Current status and alerts.
    #[must_use]
    pub fn snapshot(&self) -> FeedSnapshot {
        self.inner.store.snapshot()
    }

    /// Watch receiver notified on every status change or new alert.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<FeedSnapshot> {
        self.inner.store.subscribe()
    }

    /// Stream of snapshots: the current one first, then one per change.
    pub fn updates(&self) -> impl Stream<Item = FeedSnapshot> + use<> {
        self.inner.store.updates()
    }

    /// The store backing this client.
    #[must_use]
    pub fn store(&self) -> &AlertFeedStore {
        &self.inner.store
    }

    /// Get the current transport-level connection state.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.inner.connection.state()
    }

    /// Subscribe to transport-level connection state changes.
    #[must_use]
    pub fn connection_state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.inner.connection.state_receiver()
    }

    /// The endpoint this client connects to.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        self.inner.connection.endpoint()
    }
}
