#![cfg_attr(doc, doc = include_str!("../README.md"))]

pub mod error;
pub mod feed;
pub(crate) mod serde_helpers;
pub mod types;
pub mod ws;

use crate::error::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Environment variable the demos read the alert endpoint from.
pub const ENDPOINT_VAR: &str = "FRAUD_ALERTS_WS_URL";

/// Endpoint from [`ENDPOINT_VAR`], falling back to [`feed::client::DEFAULT_ENDPOINT`].
#[must_use]
pub fn endpoint_from_env() -> String {
    std::env::var(ENDPOINT_VAR).unwrap_or_else(|_| feed::client::DEFAULT_ENDPOINT.to_owned())
}
