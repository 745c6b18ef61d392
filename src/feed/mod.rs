//! Live fraud-alert feed for a dashboard.
//!
//! This module turns the raw [`StreamEvent`](crate::ws::connection::StreamEvent)s of a
//! [`StreamConnection`](crate::ws::connection::StreamConnection) into the two things a
//! dashboard renders: the current [`ConnectionStatus`] and the newest-first list of
//! [`FraudAlert`]s.
//!
//! # Example
//!
//! ```rust, no_run
//! use fraud_alert_feed::feed::Client;
//! use fraud_alert_feed::ws::config::Config;
//!
//! #[tokio::main]
//! async fn main() {
//!     let client = Client::new("ws://localhost:8000/ws", Config::default());
//!     client.start();
//!
//!     let mut rx = client.subscribe();
//!     while rx.changed().await.is_ok() {
//!         let snapshot = rx.borrow_and_update().clone();
//!         if let Some(alert) = snapshot.latest() {
//!             println!("[{}] {}", snapshot.status, alert.reason);
//!         }
//!     }
//! }
//! ```

pub mod client;
pub mod parser;
pub mod store;
pub mod types;

pub use client::Client;
pub use parser::FraudAlertParser;
pub use store::AlertFeedStore;
pub use types::{ConnectionStatus, FeedSnapshot, FraudAlert, Transaction};
