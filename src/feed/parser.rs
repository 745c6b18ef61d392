use super::types::FraudAlert;
use crate::Result;
use crate::error::Error;
use crate::serde_helpers::{Object, deserialize_with_warnings};
use crate::types::Decimal;
use crate::ws::MessageParser;

/// Decodes one text frame as a [`FraudAlert`] and enforces the alert schema.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Default)]
pub struct FraudAlertParser;

impl MessageParser<FraudAlert> for FraudAlertParser {
    fn parse(&self, raw: &str) -> Result<FraudAlert> {
        let Object(alert) = deserialize_with_warnings::<Object<FraudAlert>>(raw)?;

        if alert.transaction.amount < Decimal::ZERO {
            return Err(Error::schema(
                "transaction.amount",
                "amount must not be negative",
            ));
        }

        Ok(alert)
    }
}
