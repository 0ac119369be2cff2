//! Protocol constants and wire primitives.
//!
//! Frame layout (all multi-byte integers Big Endian):
//! ```text
//! ┌────────┬──────────┬────────────────┐
//! │ Opcode │ Invoc ID │ Body           │
//! │ 1 byte │ 2 bytes  │ opcode-defined │
//! └────────┴──────────┴────────────────┘
//! ```
//!
//! The only frame without this shape is the server greeting received
//! during the handshake: one byte carrying the server's maximum protocol
//! version followed by arbitrary padding.

pub mod wire;

/// Name of the transport channel the protocol runs on.
pub const CHANNEL_NAME: &str = "ejb";

/// Highest protocol version this client speaks.
pub const LATEST_VERSION: u8 = 3;

/// Name of the object-graph codec negotiated by default.
pub const DEFAULT_CODEC: &str = "river";

/// Bytes of an inbound frame header (opcode + invocation id).
pub const FRAME_HEADER_LEN: usize = 3;

/// Protocol opcodes.
pub mod opcode {
    /// Open a stateful session (request).
    pub const OPEN_SESSION_REQUEST: u8 = 0x01;
    /// Session created (response).
    pub const OPEN_SESSION_RESPONSE: u8 = 0x02;
    /// Invoke a method (request).
    pub const INVOCATION_REQUEST: u8 = 0x03;
    /// Method completed normally (response).
    pub const INVOCATION_RESPONSE: u8 = 0x05;
    /// Method (or session open) raised an application exception.
    pub const APPLICATION_EXCEPTION: u8 = 0x06;
    /// The target bean does not exist.
    pub const NO_SUCH_EJB: u8 = 0x0A;
    /// The target method does not exist.
    pub const NO_SUCH_METHOD: u8 = 0x0B;
    /// The stateful session is gone.
    pub const SESSION_NOT_ACTIVE: u8 = 0x0C;
    /// The open-session target is not a stateful bean.
    pub const EJB_NOT_STATEFUL: u8 = 0x0D;
    /// The request will continue asynchronously; a real response follows.
    pub const PROCEED_ASYNC_RESPONSE: u8 = 0x0E;
    /// Method completed normally; body is a DEFLATE-compressed
    /// [`INVOCATION_RESPONSE`] body.
    pub const COMPRESSED_INVOCATION_MESSAGE: u8 = 0x1B;
}

/// Build the codec tag sent in the handshake reply: a one-byte length
/// prefix followed by the codec's short name.
///
/// For the default `"river"` codec this yields
/// `{0x05, 'r', 'i', 'v', 'e', 'r'}`.
pub fn codec_tag(name: &str) -> Vec<u8> {
    debug_assert!(name.len() <= u8::MAX as usize);
    let mut tag = Vec::with_capacity(1 + name.len());
    tag.push(name.len() as u8);
    tag.extend_from_slice(name.as_bytes());
    tag
}
