//! Re-exported types from external crates for convenience.
//!
//! These types are commonly used in this crate and are re-exported here
//! so users don't need to add these dependencies to their `Cargo.toml`.

/// Arbitrary precision decimal type for transaction amounts.
pub use rust_decimal::Decimal;
/// Macro for creating [`Decimal`] literals at compile time.
///
/// # Example
/// ```
/// use fraud_alert_feed::types::dec;
/// let amount = dec!(120.50);
/// ```
pub use rust_decimal_macros::dec;
