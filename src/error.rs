//! Errors surfaced to callers of `SocketClient`.
//!
//! Only `emit` reports errors directly. Connection loss, protocol errors and
//! timeouts travel through the event sink instead.

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The socket is not open; the call was neither queued nor sent.
    #[error("socket is not open")]
    NotConnected,
    /// The client task is gone (runtime shut down).
    #[error("client task has stopped")]
    Stopped,
    #[error(transparent)]
    Encode(#[from] frames::CodecError),
    /// Writing to the socket failed; the connection is treated as dropped.
    #[error("websocket send failed: {0}")]
    Send(Box<tokio_tungstenite::tungstenite::Error>),
}
