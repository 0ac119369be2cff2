//! Transport surface consumed by the channel.
//!
//! The protocol runs over any transport that can open named channels and
//! deliver whole framed byte messages in order, in both directions. The
//! channel core never touches sockets itself: it consumes
//! [`MessageChannel`] handles produced by a [`ChannelOpener`].
//!
//! Outbound messages are built through [`OutFrame`]: bytes are written
//! incrementally, then the frame is either [`OutFrame::close`]d (the
//! message is committed to the peer as one unit) or [`OutFrame::cancel`]led
//! (the partial message is discarded and never delivered). Inbound
//! messages arrive as whole [`Bytes`] frames through a single receiver;
//! end of the inbound stream is the transport-closure signal.

pub mod mem;

use std::future::Future;
use std::io;
use std::pin::Pin;

use bytes::Bytes;
use tokio::sync::mpsc;

/// Boxed future returned by transport callbacks.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Opens named message channels on some underlying connection.
pub trait ChannelOpener: Send + Sync + 'static {
    /// Open the channel with the given name.
    fn open_channel(&self, name: &str) -> BoxFuture<'static, io::Result<MessageChannel>>;
}

/// One logical framed, bidirectional byte-message stream.
pub struct MessageChannel {
    name: String,
    initial_credit: u32,
    outbound: mpsc::UnboundedSender<Bytes>,
    inbound: Option<mpsc::UnboundedReceiver<Bytes>>,
}

impl MessageChannel {
    /// Assemble a channel from its transport endpoints.
    ///
    /// `initial_credit` is the transport's advertised outbound window,
    /// used to seed the channel's write-credit counter.
    pub fn new(
        name: impl Into<String>,
        initial_credit: u32,
        outbound: mpsc::UnboundedSender<Bytes>,
        inbound: mpsc::UnboundedReceiver<Bytes>,
    ) -> Self {
        Self {
            name: name.into(),
            initial_credit,
            outbound,
            inbound: Some(inbound),
        }
    }

    /// Name the channel was opened under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The transport's advertised outbound window.
    pub fn initial_credit(&self) -> u32 {
        self.initial_credit
    }

    /// Allocate an outbound frame.
    ///
    /// Fails once the peer end of the channel is gone.
    pub fn write_message(&self) -> io::Result<OutFrame> {
        if self.outbound.is_closed() {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "message channel closed",
            ));
        }
        Ok(OutFrame {
            buf: Vec::new(),
            tx: self.outbound.clone(),
            committed: false,
        })
    }

    /// Take the inbound message receiver.
    ///
    /// There is exactly one receiver per channel; returns `None` if it
    /// was already claimed.
    pub fn take_inbound(&mut self) -> Option<mpsc::UnboundedReceiver<Bytes>> {
        self.inbound.take()
    }

    /// Close the outbound direction; the peer observes end-of-stream.
    pub fn close(&mut self) {
        let (tx, _) = mpsc::unbounded_channel();
        self.outbound = tx;
    }
}

/// One outbound message under construction.
///
/// Dropping the frame without [`OutFrame::close`] cancels it.
#[derive(Debug)]
pub struct OutFrame {
    buf: Vec<u8>,
    tx: mpsc::UnboundedSender<Bytes>,
    committed: bool,
}

impl OutFrame {
    /// Commit the frame: the accumulated bytes are delivered to the peer
    /// as one message.
    pub fn close(mut self) -> io::Result<()> {
        self.committed = true;
        let payload = Bytes::from(std::mem::take(&mut self.buf));
        self.tx
            .send(payload)
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "message channel closed"))
    }

    /// Discard the frame; the peer never sees the partial message.
    pub fn cancel(self) {}

    /// Bytes buffered so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether nothing has been written yet.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

impl io::Write for OutFrame {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_close_delivers_one_message() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (_keep, inbound) = mpsc::unbounded_channel();
        let channel = MessageChannel::new("ejb", 4, tx, inbound);

        let mut frame = channel.write_message().unwrap();
        std::io::Write::write_all(&mut frame, b"abc").unwrap();
        std::io::Write::write_all(&mut frame, b"def").unwrap();
        frame.close().unwrap();

        assert_eq!(rx.try_recv().unwrap(), Bytes::from_static(b"abcdef"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_cancelled_frame_never_delivered() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (_keep, inbound) = mpsc::unbounded_channel();
        let channel = MessageChannel::new("ejb", 4, tx, inbound);

        let mut frame = channel.write_message().unwrap();
        std::io::Write::write_all(&mut frame, b"partial").unwrap();
        frame.cancel();

        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_dropped_frame_behaves_like_cancel() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (_keep, inbound) = mpsc::unbounded_channel();
        let channel = MessageChannel::new("ejb", 4, tx, inbound);

        {
            let mut frame = channel.write_message().unwrap();
            std::io::Write::write_all(&mut frame, b"oops").unwrap();
        }
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_write_message_fails_after_peer_gone() {
        let (tx, rx) = mpsc::unbounded_channel();
        let (_keep, inbound) = mpsc::unbounded_channel();
        let channel = MessageChannel::new("ejb", 4, tx, inbound);

        drop(rx);
        assert!(channel.write_message().is_err());
    }

    #[test]
    fn test_close_drops_outbound_direction() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (_keep, inbound) = mpsc::unbounded_channel();
        let mut channel = MessageChannel::new("ejb", 4, tx, inbound);

        channel.close();
        assert!(rx.try_recv().is_err());
        assert!(channel.write_message().is_err());
    }

    #[test]
    fn test_inbound_taken_once() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let (_keep, inbound) = mpsc::unbounded_channel();
        let mut channel = MessageChannel::new("ejb", 4, tx, inbound);

        assert!(channel.take_inbound().is_some());
        assert!(channel.take_inbound().is_none());
    }
}
