//! Common error types for preference-store operations

/// A common error type for key-value store operations.
///
/// Backend implementations are free to define their own associated error
/// type; this enum covers the failure modes shared by typical embedded
/// preference stores and is what the in-crate mocks use. It is simple and
/// portable for `no_std` environments.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Error {
    /// An operation was attempted with no section open.
    NotOpen,
    /// A write was attempted on a section opened read-only.
    ReadOnly,
    /// The backend has no room for the key or value.
    CapacityExceeded,
    /// The underlying storage device reported a failure.
    Backend,
}

#[cfg(feature = "defmt")]
impl defmt::Format for Error {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Error::NotOpen => defmt::write!(f, "NotOpen"),
            Error::ReadOnly => defmt::write!(f, "ReadOnly"),
            Error::CapacityExceeded => defmt::write!(f, "CapacityExceeded"),
            Error::Backend => defmt::write!(f, "Backend"),
        }
    }
}
