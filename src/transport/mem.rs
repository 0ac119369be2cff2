//! In-memory message transport.
//!
//! Backs the integration tests and local loopback setups: [`pair`]
//! produces two [`MessageChannel`] ends wired to each other, and
//! [`MemOpener`] hands a prepared end to the channel core when it opens
//! the protocol channel by name.

use std::io;
use std::sync::Mutex;

use tokio::sync::mpsc;

use super::{BoxFuture, ChannelOpener, MessageChannel};

/// Create a connected pair of message channels.
///
/// Both ends advertise the same outbound window.
pub fn pair(name: &str, window: u32) -> (MessageChannel, MessageChannel) {
    let (a_tx, b_rx) = mpsc::unbounded_channel();
    let (b_tx, a_rx) = mpsc::unbounded_channel();
    (
        MessageChannel::new(name, window, a_tx, a_rx),
        MessageChannel::new(name, window, b_tx, b_rx),
    )
}

/// A [`ChannelOpener`] serving one prepared channel end.
pub struct MemOpener {
    channel: Mutex<Option<MessageChannel>>,
}

impl MemOpener {
    /// Wrap a channel end to be served on its own name.
    pub fn new(channel: MessageChannel) -> Self {
        Self {
            channel: Mutex::new(Some(channel)),
        }
    }
}

impl ChannelOpener for MemOpener {
    fn open_channel(&self, name: &str) -> BoxFuture<'static, io::Result<MessageChannel>> {
        let result = {
            let mut slot = self.channel.lock().unwrap();
            match slot.take() {
                Some(channel) if channel.name() == name => Ok(channel),
                Some(channel) => {
                    let err = io::Error::new(
                        io::ErrorKind::NotFound,
                        format!("no channel named {name:?} (serving {:?})", channel.name()),
                    );
                    *slot = Some(channel);
                    Err(err)
                }
                None => Err(io::Error::new(
                    io::ErrorKind::AddrInUse,
                    format!("channel {name:?} already opened"),
                )),
            }
        };
        Box::pin(async move { result })
    }
}
