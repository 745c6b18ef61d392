#![expect(
    clippy::module_name_repetitions,
    reason = "Store types carry the module name for clarity when re-exported"
)]

use std::fmt;
use std::sync::Arc;

use futures::Stream;
use tokio::sync::watch;

use super::parser::FraudAlertParser;
use super::types::{ConnectionStatus, FeedSnapshot, FraudAlert};
use crate::Result;
use crate::ws::MessageParser;
use crate::ws::connection::{CloseCause, StreamEvent};

impl FeedSnapshot {
    /// The most recently received alert.
    #[must_use]
    pub fn latest(&self) -> Option<&FraudAlert> {
        self.alerts.front()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }

    /// Reduce one stream event into this state.
    ///
    /// Returns `Ok(true)` when the status or the alert list changed. A frame
    /// that fails to decode leaves both untouched, bumps `discarded` and is
    /// returned as the error.
    pub fn apply<P: MessageParser<FraudAlert>>(
        &mut self,
        event: &StreamEvent,
        parser: &P,
    ) -> Result<bool> {
        match event {
            StreamEvent::Connecting { .. } => Ok(self.set_status(ConnectionStatus::Connecting)),
            StreamEvent::Opened => Ok(self.set_status(ConnectionStatus::Connected)),
            StreamEvent::Message(raw) => self.push_raw(raw, parser).map(|()| true),
            StreamEvent::Error(_) => Ok(self.set_status(ConnectionStatus::Error)),
            StreamEvent::Closed(_) => {
                Ok(self.set_status(ConnectionStatus::DisconnectedReconnecting))
            }
            StreamEvent::GaveUp { .. } => Ok(self.set_status(ConnectionStatus::Failed)),
        }
    }

    fn push_raw<P: MessageParser<FraudAlert>>(&mut self, raw: &str, parser: &P) -> Result<()> {
        match parser.parse(raw) {
            Ok(alert) => {
                self.alerts.push_front(alert);
                Ok(())
            }
            Err(e) => {
                self.discarded = self.discarded.saturating_add(1);
                Err(e)
            }
        }
    }

    fn set_status(&mut self, status: ConnectionStatus) -> bool {
        if self.status == status {
            return false;
        }
        self.status = status;
        true
    }
}

/// Holds the connection status and the newest-first alert feed.
///
/// The store is only ever mutated through stream events; readers get cloned
/// [`FeedSnapshot`]s or a watch receiver that is notified on every status
/// change and every appended alert. Cloning the store yields another handle to
/// the same state.
pub struct AlertFeedStore<P = FraudAlertParser> {
    inner: Arc<StoreInner<P>>,
}

struct StoreInner<P> {
    state: watch::Sender<FeedSnapshot>,
    parser: P,
}

impl<P> Clone for AlertFeedStore<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P> fmt::Debug for AlertFeedStore<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("AlertFeedStore")
            .field("status", &state.status)
            .field("alerts", &state.alerts.len())
            .field("discarded", &state.discarded)
            .finish_non_exhaustive()
    }
}

impl Default for AlertFeedStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AlertFeedStore {
    /// Create an empty store in the `Connecting` status.
    #[must_use]
    pub fn new() -> Self {
        Self::with_parser(FraudAlertParser)
    }
}

impl<P: MessageParser<FraudAlert>> AlertFeedStore<P> {
    /// Create an empty store decoding frames with `parser`.
    #[must_use]
    pub fn with_parser(parser: P) -> Self {
        let (state, _) = watch::channel(FeedSnapshot::default());
        Self {
            inner: Arc::new(StoreInner { state, parser }),
        }
    }

    /// Apply one stream event.
    ///
    /// Decode failures are reported here and returned, but never change the
    /// status or the feed.
    pub fn apply(&self, event: &StreamEvent) -> Result<()> {
        let mut outcome = Ok(());
        self.inner.state.send_if_modified(|snapshot| {
            match snapshot.apply(event, &self.inner.parser) {
                Ok(changed) => changed,
                Err(e) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(
                        error = %e,
                        discarded = snapshot.discarded,
                        "discarding malformed alert frame"
                    );
                    outcome = Err(e);
                    false
                }
            }
        });
        outcome
    }

    /// A physical connection attempt has begun.
    pub fn on_connecting(&self) {
        self.update_status(ConnectionStatus::Connecting);
    }

    /// The physical connection is open.
    pub fn on_opened(&self) {
        self.update_status(ConnectionStatus::Connected);
    }

    /// Decode `raw` and prepend it to the feed, or discard it if malformed.
    pub fn on_message(&self, raw: &str) -> Result<()> {
        self.apply(&StreamEvent::Message(raw.to_owned()))
    }

    /// A transport error was reported; the close that follows drives reconnection.
    pub fn on_error(&self) {
        self.update_status(ConnectionStatus::Error);
    }

    /// The physical connection ended and a reconnect is pending.
    ///
    /// A close caused by a fault passes through `Error` first.
    pub fn on_closed(&self, cause: &CloseCause) {
        if cause.is_error() {
            self.on_error();
        }
        self.update_status(ConnectionStatus::DisconnectedReconnecting);
    }

    /// Reconnection was abandoned.
    pub fn on_gave_up(&self) {
        self.update_status(ConnectionStatus::Failed);
    }

    fn update_status(&self, status: ConnectionStatus) {
        self.inner
            .state
            .send_if_modified(|snapshot| snapshot.set_status(status));
    }

    /// Current status and feed.
    #[must_use]
    pub fn snapshot(&self) -> FeedSnapshot {
        self.inner.state.borrow().clone()
    }

    /// Current status only.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.inner.state.borrow().status
    }

    /// Watch receiver notified on every status change or appended alert.
    ///
    /// A slow reader only sees the latest snapshot, never a stale one.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<FeedSnapshot> {
        self.inner.state.subscribe()
    }

    /// Stream of snapshots: the current one first, then one per change.
    pub fn updates(&self) -> impl Stream<Item = FeedSnapshot> + use<P> {
        let mut rx = self.subscribe();

        async_stream::stream! {
            loop {
                let snapshot = rx.borrow_and_update().clone();
                yield snapshot;

                if rx.changed().await.is_err() {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt as _;

    use super::*;
    use crate::error::Kind;
    use crate::types::dec;

    fn alert_json(reason: &str) -> String {
        serde_json::json!({
            "type": "velocity",
            "reason": reason,
            "transaction": {
                "user_id": "u1",
                "card_id": "c1",
                "device_id": "d1",
                "amount": 120.50,
                "merchant": "Acme"
            }
        })
        .to_string()
    }

    fn reasons(snapshot: &FeedSnapshot) -> Vec<&str> {
        snapshot.alerts.iter().map(|a| a.reason.as_str()).collect()
    }

    #[test]
    fn starts_connecting_and_empty() {
        let store = AlertFeedStore::new();
        let snapshot = store.snapshot();

        assert_eq!(snapshot.status, ConnectionStatus::Connecting);
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.discarded, 0);
    }

    #[test]
    fn reference_velocity_alert_is_prepended() {
        let store = AlertFeedStore::new();
        store.apply(&StreamEvent::Opened).unwrap();
        store.on_message(&alert_json("5 cards/1 device")).unwrap();

        let snapshot = store.snapshot();
        assert_eq!(snapshot.status, ConnectionStatus::Connected);
        assert_eq!(reasons(&snapshot), ["5 cards/1 device"]);
        assert_eq!(snapshot.alerts[0].transaction.amount, dec!(120.50));
    }

    #[test]
    fn alerts_are_newest_first_in_arrival_order() {
        let store = AlertFeedStore::new();
        store.on_opened();
        for reason in ["m1", "m2", "m3", "m4"] {
            store.on_message(&alert_json(reason)).unwrap();
        }

        assert_eq!(reasons(&store.snapshot()), ["m4", "m3", "m2", "m1"]);
    }

    #[test]
    fn malformed_frames_are_isolated() {
        let store = AlertFeedStore::new();
        store.on_opened();
        store.on_message(&alert_json("first")).unwrap();

        let error = store.on_message("not json").unwrap_err();
        assert_eq!(error.kind(), Kind::Decode);

        let missing_field = r#"{"type":"velocity","reason":"partial"}"#;
        assert!(store.on_message(missing_field).is_err());

        let snapshot = store.snapshot();
        assert_eq!(snapshot.status, ConnectionStatus::Connected);
        assert_eq!(reasons(&snapshot), ["first"]);
        assert_eq!(snapshot.discarded, 2);

        store.on_message(&alert_json("second")).unwrap();
        assert_eq!(reasons(&store.snapshot()), ["second", "first"]);
    }

    #[test]
    fn not_json_leaves_empty_feed_and_reports_once() {
        let store = AlertFeedStore::new();
        store.on_opened();

        assert!(store.on_message("not json").is_err());

        let snapshot = store.snapshot();
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.status, ConnectionStatus::Connected);
        assert_eq!(snapshot.discarded, 1);
    }

    #[test]
    fn positional_frames_never_reach_the_feed() {
        let store = AlertFeedStore::new();
        store.on_opened();

        let positional = r#"["velocity","positional",["u1","c1","d1",5,"Acme"]]"#;
        assert!(store.on_message(positional).is_err());

        let snapshot = store.snapshot();
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.discarded, 1);
    }

    #[test]
    fn status_follows_lifecycle_events() {
        let store = AlertFeedStore::new();
        let events = [
            (StreamEvent::Connecting { attempt: 1 }, ConnectionStatus::Connecting),
            (StreamEvent::Opened, ConnectionStatus::Connected),
            (
                StreamEvent::Error("network error".to_owned()),
                ConnectionStatus::Error,
            ),
            (
                StreamEvent::Closed(CloseCause::Transport("network error".to_owned())),
                ConnectionStatus::DisconnectedReconnecting,
            ),
            (StreamEvent::Connecting { attempt: 1 }, ConnectionStatus::Connecting),
            (StreamEvent::GaveUp { attempts: 1 }, ConnectionStatus::Failed),
        ];

        for (event, expected) in events {
            store.apply(&event).unwrap();
            assert_eq!(store.status(), expected, "after {event:?}");
        }
    }

    #[test]
    fn clean_close_goes_straight_to_reconnecting() {
        let store = AlertFeedStore::new();
        store.on_opened();
        store
            .apply(&StreamEvent::Closed(CloseCause::Remote {
                code: 1000,
                reason: String::new(),
            }))
            .unwrap();

        assert_eq!(store.status(), ConnectionStatus::DisconnectedReconnecting);
    }

    #[test]
    fn alerts_survive_reconnects() {
        let store = AlertFeedStore::new();
        store.on_opened();
        store.on_message(&alert_json("before")).unwrap();
        store.on_closed(&CloseCause::Transport("network error".to_owned()));
        assert_eq!(store.status(), ConnectionStatus::DisconnectedReconnecting);
        store.on_connecting();
        store.on_opened();
        store.on_message(&alert_json("after")).unwrap();

        assert_eq!(reasons(&store.snapshot()), ["after", "before"]);
    }

    #[test]
    fn reducer_reports_changes() {
        let mut state = FeedSnapshot::default();

        assert!(!state.apply(&StreamEvent::Connecting { attempt: 1 }, &FraudAlertParser).unwrap());
        assert!(state.apply(&StreamEvent::Opened, &FraudAlertParser).unwrap());
        assert!(!state.apply(&StreamEvent::Opened, &FraudAlertParser).unwrap());
        assert!(
            state
                .apply(&StreamEvent::Message(alert_json("x")), &FraudAlertParser)
                .unwrap()
        );
    }

    #[tokio::test]
    async fn subscribers_are_notified_on_change_only() {
        let store = AlertFeedStore::new();
        let mut rx = store.subscribe();

        store.on_connecting();
        assert!(!rx.has_changed().unwrap(), "unchanged status does not notify");

        store.on_opened();
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().status, ConnectionStatus::Connected);

        assert!(store.on_message("garbage").is_err());
        assert!(!rx.has_changed().unwrap(), "discarded frames do not notify");

        store.on_message(&alert_json("x")).unwrap();
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().len(), 1);
    }

    #[tokio::test]
    async fn updates_stream_yields_current_then_changes() {
        let store = AlertFeedStore::new();
        let mut updates = Box::pin(store.updates());

        let first = updates.next().await.unwrap();
        assert_eq!(first.status, ConnectionStatus::Connecting);

        store.on_opened();
        let second = updates.next().await.unwrap();
        assert_eq!(second.status, ConnectionStatus::Connected);

        drop(store);
        assert!(updates.next().await.is_none(), "stream ends with the store");
    }

    #[test]
    fn snapshot_is_safe_across_threads() {
        let store = AlertFeedStore::new();
        store.on_opened();

        let writer = {
            let store = store.clone();
            std::thread::spawn(move || {
                for i in 0..100 {
                    store.on_message(&alert_json(&i.to_string())).unwrap();
                }
            })
        };

        for _ in 0..100 {
            let snapshot = store.snapshot();
            // Every observed snapshot is a consistent prefix, newest first
            let seen: Vec<usize> = snapshot
                .alerts
                .iter()
                .map(|a| a.reason.parse().unwrap())
                .collect();
            assert!(seen.windows(2).all(|w| w[0] > w[1]));
        }

        writer.join().unwrap();
        assert_eq!(store.snapshot().len(), 100);
    }
}
