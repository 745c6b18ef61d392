//! Core WebSocket infrastructure.
//!
//! This module owns the transport side of the feed: one logical connection that
//! survives any number of physical reconnects, reported as an ordered channel of
//! [`StreamEvent`]s.
//!
//! # Architecture
//!
//! - [`StreamConnection`]: WebSocket connection handler with reconnection and optional heartbeat
//! - [`EventReceiver`]: ordered event channel that goes silent once the connection is stopped
//! - [`MessageParser`]: Trait for decoding the raw frames carried by [`StreamEvent::Message`]
//!
//! # Example
//!
//! ```ignore
//! let (connection, mut events) = StreamConnection::new(endpoint, Config::default());
//! connection.start();
//!
//! while let Some(event) = events.recv().await {
//!     store.apply(&event)?;
//! }
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod traits;

pub use connection::{CloseCause, ConnectionState, EventReceiver, StreamConnection, StreamEvent};
#[expect(
    clippy::module_name_repetitions,
    reason = "WsError includes module name for clarity when used outside this module"
)]
pub use error::WsError;
pub use traits::*;
