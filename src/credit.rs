//! Write-credit accounting for outbound frames.
//!
//! The transport advertises how many outbound messages may be in flight
//! at once; the channel enforces that window with a credit counter. A
//! caller obtains one credit unit before allocating an outbound frame
//! and the unit returns to the pool when the frame is closed or
//! cancelled, waking one waiter if the pool was empty.
//!
//! Closing the counter (on transport closure) fails every current and
//! future acquisition with [`EjbwireError::ChannelClosed`].

use std::io::{self, Write};
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::{EjbwireError, Result};
use crate::transport::OutFrame;

/// Counter of available outbound message slots.
#[derive(Debug, Clone)]
pub struct WriteCredit {
    slots: Arc<Semaphore>,
}

impl WriteCredit {
    /// Create a counter with the transport's advertised window.
    pub fn new(initial: u32) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(initial as usize)),
        }
    }

    /// Take one credit unit, suspending while none are available.
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit> {
        self.slots
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| EjbwireError::ChannelClosed)
    }

    /// Units currently available.
    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }

    /// Fail all current and future acquisitions.
    pub fn close(&self) {
        self.slots.close();
    }
}

/// An outbound frame holding one credit unit.
///
/// The unit is released exactly once: when the frame is closed, when it
/// is cancelled, or when it is dropped.
#[derive(Debug)]
pub struct CreditedFrame {
    frame: OutFrame,
    _permit: OwnedSemaphorePermit,
}

impl CreditedFrame {
    /// Wrap a freshly allocated frame with its credit unit.
    pub fn new(frame: OutFrame, permit: OwnedSemaphorePermit) -> Self {
        Self {
            frame,
            _permit: permit,
        }
    }

    /// Commit the frame and release the credit unit.
    pub fn close(self) -> io::Result<()> {
        let CreditedFrame { frame, _permit } = self;
        frame.close()
    }

    /// Discard the frame and release the credit unit.
    pub fn cancel(self) {
        let CreditedFrame { frame, _permit } = self;
        frame.cancel();
    }
}

impl Write for CreditedFrame {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.frame.write(data)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.frame.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mem;
    use std::time::Duration;

    fn frame_from(channel: &crate::transport::MessageChannel) -> OutFrame {
        channel.write_message().unwrap()
    }

    #[tokio::test]
    async fn test_acquire_decrements_close_releases() {
        let (client, _server) = mem::pair("ejb", 2);
        let credit = WriteCredit::new(2);

        let permit = credit.acquire().await.unwrap();
        assert_eq!(credit.available(), 1);

        let frame = CreditedFrame::new(frame_from(&client), permit);
        frame.close().unwrap();
        assert_eq!(credit.available(), 2);
    }

    #[tokio::test]
    async fn test_cancel_releases_exactly_one_unit() {
        let (client, _server) = mem::pair("ejb", 1);
        let credit = WriteCredit::new(1);

        let permit = credit.acquire().await.unwrap();
        let frame = CreditedFrame::new(frame_from(&client), permit);
        frame.cancel();
        assert_eq!(credit.available(), 1);
    }

    #[tokio::test]
    async fn test_drop_releases_unit() {
        let (client, _server) = mem::pair("ejb", 1);
        let credit = WriteCredit::new(1);

        {
            let permit = credit.acquire().await.unwrap();
            let _frame = CreditedFrame::new(frame_from(&client), permit);
        }
        assert_eq!(credit.available(), 1);
    }

    #[tokio::test]
    async fn test_acquire_suspends_until_release() {
        let credit = WriteCredit::new(1);
        let held = credit.acquire().await.unwrap();

        let waiter = {
            let credit = credit.clone();
            tokio::spawn(async move { credit.acquire().await.map(|_| ()) })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(held);
        waiter.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_close_fails_waiters_and_new_acquires() {
        let credit = WriteCredit::new(1);
        let held = credit.acquire().await.unwrap();

        let waiter = {
            let credit = credit.clone();
            tokio::spawn(async move { credit.acquire().await.map(|_| ()) })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        credit.close();
        assert!(matches!(
            waiter.await.unwrap(),
            Err(EjbwireError::ChannelClosed)
        ));
        assert!(matches!(
            credit.acquire().await,
            Err(EjbwireError::ChannelClosed)
        ));
        drop(held);
    }

    #[tokio::test]
    async fn test_zero_window_blocks_immediately() {
        let credit = WriteCredit::new(0);
        let attempt =
            tokio::time::timeout(Duration::from_millis(20), credit.acquire()).await;
        assert!(attempt.is_err());
    }
}
