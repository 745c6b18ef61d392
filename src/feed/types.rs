use std::collections::VecDeque;

use bon::Builder;
use serde::{Deserialize, Serialize};

use crate::types::Decimal;

/// A fraud decision pushed by the alert backend.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Builder)]
#[builder(on(String, into))]
pub struct FraudAlert {
    /// Category label (e.g. `velocity`); opaque to the client
    #[serde(rename = "type")]
    pub kind: String,
    /// Human-readable explanation
    pub reason: String,
    /// The transaction that triggered the alert
    #[serde(deserialize_with = "crate::serde_helpers::object_only")]
    pub transaction: Transaction,
}

/// The transaction an alert was raised for.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Builder)]
#[builder(on(String, into))]
pub struct Transaction {
    pub user_id: String,
    pub card_id: String,
    pub device_id: String,
    /// Non-negative transaction amount, sent as a JSON number
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub merchant: String,
}

/// User-visible connection status, as shown next to the alert list.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, strum_macros::Display)]
pub enum ConnectionStatus {
    /// A connection attempt is in progress.
    #[default]
    #[strum(serialize = "Connecting...")]
    Connecting,
    /// Connected and receiving alerts.
    #[strum(serialize = "Connected")]
    Connected,
    /// The connection dropped and a new attempt is scheduled.
    #[strum(serialize = "Disconnected - Reconnecting...")]
    DisconnectedReconnecting,
    /// A transport error was just reported.
    #[strum(serialize = "Error")]
    Error,
    /// Reconnection was abandoned.
    #[strum(serialize = "Failed to connect")]
    Failed,
}

impl ConnectionStatus {
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }
}

/// Read-only view of the feed handed to the presentation layer.
#[non_exhaustive]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedSnapshot {
    pub status: ConnectionStatus,
    /// Alerts, newest first
    pub alerts: VecDeque<FraudAlert>,
    /// Frames discarded because they failed to decode
    pub discarded: u64,
}
