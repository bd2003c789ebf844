//! The point-to-point channel trait.

use thiserror::Error;

/// Errors surfaced by a channel implementation.
///
/// The coupling core never retries: every transport error is fatal to the
/// run and propagates unchanged.
#[derive(Debug, Error)]
pub enum TransportError {
    /// A receive was attempted but no message is pending.
    #[error("no message pending on channel (peer has not sent yet)")]
    NoMessagePending,

    /// The next pending message has a different type than requested.
    #[error("type mismatch on channel: expected {expected}, received {actual}")]
    TypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    /// A received vector has a different length than the wire contract
    /// prescribes.
    #[error("size mismatch on channel: expected {expected} doubles, received {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    /// The peer endpoint is gone.
    #[error("channel closed: {0}")]
    Closed(String),
}

/// Result type for channel operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// A reliable, typed, FIFO point-to-point pipe between two participants.
///
/// Implementations must deliver messages in send order and preserve the
/// type of each message. Sends may block until the peer receives; receives
/// block until a message is available (the in-memory implementation instead
/// fails fast with [`TransportError::NoMessagePending`], which test drivers
/// treat as a scripting error).
pub trait Channel {
    fn send_int(&mut self, value: i32) -> TransportResult<()>;
    fn send_double(&mut self, value: f64) -> TransportResult<()>;
    fn send_bool(&mut self, value: bool) -> TransportResult<()>;
    fn send_doubles(&mut self, values: &[f64]) -> TransportResult<()>;

    fn receive_int(&mut self) -> TransportResult<i32>;
    fn receive_double(&mut self) -> TransportResult<f64>;
    fn receive_bool(&mut self) -> TransportResult<bool>;

    /// Receives a double vector of exactly `len` entries.
    fn receive_doubles(&mut self, len: usize) -> TransportResult<Vec<f64>>;
}
