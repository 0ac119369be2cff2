//! # ejbwire
//!
//! Client-side channel for the remote EJB invocation protocol.
//!
//! One channel multiplexes concurrent method invocations and
//! session-open requests over a single ordered bidirectional message
//! transport. Each request is framed with a protocol opcode and a
//! 16-bit invocation id; parameters and results travel through a
//! pluggable object-graph codec negotiated during the handshake.
//!
//! ## Architecture
//!
//! - **Handshake**: the server greets with its maximum protocol
//!   version; the client picks `min(server, 3)` and replies with the
//!   chosen version plus the codec tag. One handshake per connection,
//!   memoized by [`RemoteConnection`].
//! - **Multiplexer**: a registry maps each live 16-bit id to its
//!   pending invocation; a single reader task routes every inbound
//!   frame by id. Outbound frames are gated by a write-credit counter
//!   seeded from the transport's advertised window.
//! - **Codec**: the provided `"river"` codec (MessagePack with
//!   per-version interning tables) encodes one object graph at a time
//!   into the request and response streams.
//!
//! ## Example
//!
//! ```ignore
//! use ejbwire::{
//!     ChannelConfig, InvocationContext, MethodLocator, ReceiverContext, RemoteConnection,
//!     StatelessLocator,
//! };
//!
//! # async fn example(opener: impl ejbwire::transport::ChannelOpener) -> ejbwire::Result<()> {
//! let connection = RemoteConnection::new(opener);
//! let channel = connection.client_channel().await?;
//!
//! let locator = StatelessLocator::new("", "shop", "CartBean", "")?;
//! let invocation = InvocationContext::new(MethodLocator::new("ping", vec![]), locator)
//!     .parameter(serde_json::json!("hello"));
//! let (receiver, mut events) = ReceiverContext::new(invocation);
//! channel.process_invocation(receiver).await;
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod protocol;
pub mod transport;

mod attachment;
mod channel;
mod credit;
mod error;
mod invocation;
mod locator;
mod registry;
mod request;
mod response;

pub use attachment::{keys, Attachments};
pub use channel::{ChannelConfig, ClientChannel, RemoteConnection, DEFAULT_HANDSHAKE_TIMEOUT};
pub use credit::WriteCredit;
pub use error::{EjbwireError, Result};
pub use invocation::{InvocationContext, InvocationEvent, ReceiverContext};
pub use locator::{
    Affinity, EjbLocator, MethodLocator, SessionId, StatefulLocator, StatelessLocator,
};
pub use response::ResultProducer;
