//! Core traits for the WebSocket feed infrastructure.

/// Message parser trait for turning one raw text frame into a typed message.
///
/// The connection layer never parses: it hands frames over exactly as
/// received, and whoever consumes the events decides how to decode them.
///
/// # Example
///
/// ```ignore
/// pub struct SimpleParser;
///
/// impl MessageParser<MyMessage> for SimpleParser {
///     fn parse(&self, raw: &str) -> crate::Result<MyMessage> {
///         Ok(serde_json::from_str(raw)?)
///     }
/// }
/// ```
pub trait MessageParser<M>: Send + Sync + 'static {
    /// Parse one inbound frame.
    ///
    /// An error means the frame is discarded as a whole; implementations must
    /// never return a partially populated message.
    fn parse(&self, raw: &str) -> crate::Result<M>;
}
