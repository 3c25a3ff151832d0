//! Seam traits and shared types for the connection machinery.
//!
//! The connectivity core orchestrates three independently-failing layers
//! (radio association, the TCP/session transport, the MQTT handshake)
//! but implements none of them. [`Radio`] and [`Broker`] are the seams to
//! the platform's radio driver and MQTT client; [`Clock`] supplies the
//! monotonic time the state machine compares its start timestamps against
//! instead of ever blocking.

#![allow(missing_docs)]

/// Common error types for connection operations
pub mod error;

/// Bounded cross-task queue of outbound messages
pub mod queue;

/// The connection state machine and its control surface
pub mod manager;

/// Re-exports of common traits
pub mod prelude {
    pub use super::manager::{NetworkControl, NetworkHandle, SessionOps};
    pub use super::{Broker, Clock, Radio};
}

use heapless::{String, Vec};

/// Maximum topic length carried through the publish queue and inbound
/// dispatch.
pub const MAX_TOPIC_LEN: usize = 256;
/// Maximum payload size carried through the publish queue and inbound
/// dispatch.
pub const MAX_PAYLOAD_LEN: usize = 1024;

/// Radio credentials for an association attempt.
#[derive(Debug, Clone, Copy)]
pub struct Credentials<'a> {
    /// Network name.
    pub ssid: &'a str,
    /// Passphrase, empty for open networks.
    pub password: &'a str,
}

/// Broker session parameters for one handshake attempt.
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig<'a> {
    /// Broker host name or address.
    pub host: &'a str,
    /// Broker TCP port.
    pub port: u16,
    /// Client identifier, unique per broker.
    pub client_id: &'a str,
    /// Username, empty for anonymous access.
    pub username: &'a str,
    /// Password.
    pub password: &'a str,
    /// Keep-alive interval in seconds.
    pub keep_alive_seconds: u16,
}

/// An inbound broker message handed to the registered callback.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Inbound {
    /// Topic the message arrived on.
    pub topic: String<MAX_TOPIC_LEN>,
    /// Opaque payload bytes.
    pub payload: Vec<u8, MAX_PAYLOAD_LEN>,
}

/// The radio association seam.
///
/// `begin`/`begin_quick` start an association attempt and return once the
/// attempt is underway; the state machine polls [`is_link_up`](Radio::is_link_up)
/// afterwards and bounds the wait with its own timeout. Implementations
/// own any cached fast-reassociation parameters (channel, BSSID) learned
/// from a previous success.
pub trait Radio {
    /// Associated error type
    type Error: core::fmt::Debug;

    /// Start a full scan-and-associate attempt.
    fn begin(&mut self, credentials: &Credentials<'_>) -> Result<(), Self::Error>;

    /// Start a fast re-association attempt from cached parameters.
    fn begin_quick(&mut self, credentials: &Credentials<'_>) -> Result<(), Self::Error>;

    /// Whether the link is currently up.
    fn is_link_up(&mut self) -> bool;

    /// Drop the association. With `forget`, additionally discard cached
    /// fast-reassociation parameters so the next attempt must scan.
    fn disconnect(&mut self, forget: bool) -> Result<(), Self::Error>;
}

/// The broker client seam.
///
/// One bounded handshake attempt per [`connect`](Broker::connect) call;
/// the state machine retries within its own timeout window. Topic strings
/// and payload bytes are opaque to the core.
pub trait Broker {
    /// Associated error type
    type Error: core::fmt::Debug;

    /// Perform one session handshake attempt over the established link.
    fn connect(&mut self, config: &SessionConfig<'_>) -> Result<(), Self::Error>;

    /// Whether the session is currently live.
    fn is_connected(&mut self) -> bool;

    /// Publish a message on the live session.
    fn publish(&mut self, topic: &str, payload: &[u8], retained: bool)
    -> Result<(), Self::Error>;

    /// Register a broker-side subscription on the live session.
    fn subscribe(&mut self, topic: &str) -> Result<(), Self::Error>;

    /// Pump the session: returns the next pending inbound message, if any.
    fn poll(&mut self) -> Option<Inbound>;

    /// Tear down the session. Infallible by design; a session that is
    /// already gone is torn down trivially.
    fn disconnect(&mut self);
}

/// Monotonic time source in milliseconds.
///
/// The state machine never sleeps; it records a start timestamp on state
/// entry and compares elapsed time on each step.
pub trait Clock {
    /// Milliseconds since an arbitrary fixed origin.
    fn now_ms(&self) -> u64;
}

impl<C: Clock> Clock for &C {
    fn now_ms(&self) -> u64 {
        (*self).now_ms()
    }
}

/// A [`Clock`] backed by `std::time::Instant`, for host builds and tests.
#[cfg(feature = "std")]
#[derive(Debug)]
pub struct StdClock {
    origin: std::time::Instant,
}

#[cfg(feature = "std")]
impl StdClock {
    /// A clock whose origin is the moment of construction.
    pub fn new() -> Self {
        Self {
            origin: std::time::Instant::now(),
        }
    }
}

#[cfg(feature = "std")]
impl Default for StdClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "std")]
impl Clock for StdClock {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}
