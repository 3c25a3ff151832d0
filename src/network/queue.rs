//! Bounded cross-task queue of outbound messages.
//!
//! Producer tasks (button handlers, sensors, UI) hand messages to the
//! network task through this queue; the network task is the sole consumer
//! and drains it only while the broker session is live. The producer side
//! never blocks: when the queue is at capacity the *newest* message is
//! rejected and reported to the caller. Under sustained overflow this
//! loses messages, which is expected behavior on a device this small.

use heapless::mpmc::MpMcQueue;
use heapless::{String, Vec};

use super::error::Error;
use super::{MAX_PAYLOAD_LEN, MAX_TOPIC_LEN};

/// One outbound message awaiting a live broker session.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct PublishRequest {
    /// Topic to publish on.
    pub topic: String<MAX_TOPIC_LEN>,
    /// Opaque payload bytes.
    pub payload: Vec<u8, MAX_PAYLOAD_LEN>,
    /// Whether the broker should retain the message.
    pub retained: bool,
}

impl PublishRequest {
    /// Build a request from borrowed parts.
    ///
    /// Fails with [`Error::TooLarge`] when the topic or payload exceeds
    /// the bounded message capacity.
    pub fn new(topic: &str, payload: &[u8], retained: bool) -> Result<Self, Error> {
        let topic = String::try_from(topic).map_err(|_| Error::TooLarge)?;
        let payload = Vec::from_slice(payload).map_err(|_| Error::TooLarge)?;
        Ok(Self {
            topic,
            payload,
            retained,
        })
    }
}

/// Lock-free bounded queue of [`PublishRequest`]s.
///
/// `N` must be a power of two (a `heapless::mpmc` requirement). Both ends
/// take `&self`, so a `static` queue can be shared freely across tasks;
/// FIFO order is preserved per producer, which with a single consumer
/// gives the delivery-order guarantee the manager documents.
pub struct PublishQueue<const N: usize> {
    inner: MpMcQueue<PublishRequest, N>,
}

impl<const N: usize> PublishQueue<N> {
    /// An empty queue. `const`, so it can back a `static`.
    pub const fn new() -> Self {
        Self {
            inner: MpMcQueue::new(),
        }
    }

    /// Enqueue a message without blocking.
    ///
    /// Rejects the message with [`Error::QueueFull`] when at capacity.
    pub fn enqueue(&self, request: PublishRequest) -> Result<(), Error> {
        self.inner.enqueue(request).map_err(|_| Error::QueueFull)
    }

    /// Take the oldest pending message, if any. Consumer side only.
    pub fn dequeue(&self) -> Option<PublishRequest> {
        self.inner.dequeue()
    }
}

impl<const N: usize> Default for PublishQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> core::fmt::Debug for PublishQueue<N> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PublishQueue").field("capacity", &N).finish()
    }
}
