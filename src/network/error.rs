//! Common error types for connection operations

/// A common error type for operations on the connection manager surface.
///
/// Failures inside the state machine never escape as errors; they are
/// absorbed into retry/fallback policy and persisted counters. This enum
/// covers the producer-facing operations (`publish`, `subscribe`) and is
/// available to seam implementations that want a shared error type. It is
/// simple and portable for `no_std` environments.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Error {
    /// The operation requires a live broker session.
    NotConnected,
    /// The publish queue is at capacity; the message was rejected.
    QueueFull,
    /// Topic or payload exceeds the bounded message capacity.
    TooLarge,
    /// An attempt exceeded its bounded time window.
    Timeout,
    /// The radio link is down.
    LinkDown,
    /// The broker refused the session.
    ConnectionRefused,
    /// A protocol-level error occurred in the underlying client.
    ProtocolError,
}

#[cfg(feature = "defmt")]
impl defmt::Format for Error {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Error::NotConnected => defmt::write!(f, "NotConnected"),
            Error::QueueFull => defmt::write!(f, "QueueFull"),
            Error::TooLarge => defmt::write!(f, "TooLarge"),
            Error::Timeout => defmt::write!(f, "Timeout"),
            Error::LinkDown => defmt::write!(f, "LinkDown"),
            Error::ConnectionRefused => defmt::write!(f, "ConnectionRefused"),
            Error::ProtocolError => defmt::write!(f, "ProtocolError"),
        }
    }
}
