//! Error types for ejbwire.

use thiserror::Error;

/// Main error type for all channel operations.
#[derive(Debug, Error)]
pub enum EjbwireError {
    /// I/O error on the underlying message transport.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Object graph construction/inspection error.
    #[error("object graph error: {0}")]
    Json(#[from] serde_json::Error),

    /// MessagePack serialization error inside a codec stream.
    #[error("MsgPack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    /// MessagePack deserialization error inside a codec stream.
    #[error("MsgPack decode error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),

    /// Protocol error (unknown opcode, truncated frame, malformed stream).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The target bean does not exist on the server.
    #[error("no such EJB: {0}")]
    NoSuchEjb(String),

    /// The invoked method does not exist on the target bean.
    #[error("no such method: {0}")]
    NoSuchMethod(String),

    /// The target of an open-session request is not a stateful bean.
    #[error("EJB is not stateful: {0}")]
    NotStateful(String),

    /// The stateful session is no longer active on the server.
    #[error("session is not active: {0}")]
    SessionNotActive(String),

    /// The server-side invocation raised an application exception.
    ///
    /// Carries the decoded throwable as an object graph value.
    #[error("application exception")]
    ApplicationException(serde_json::Value),

    /// The transport closed before a response arrived.
    #[error("channel closed")]
    ChannelClosed,

    /// The request was cancelled before a response could be delivered.
    #[error("request cancelled")]
    Cancelled,

    /// Version negotiation failed.
    #[error("handshake failed: {0}")]
    Handshake(String),
}

/// Result type alias using EjbwireError.
pub type Result<T> = std::result::Result<T, EjbwireError>;
