//! # Sectioned key-value storage seam
//!
//! Durable device state lives in a preference store organized as named
//! *sections* (`"factory"`, `"user"`, `"persisted"`), each a flat namespace
//! of typed key-value pairs. The physical backend (NVS flash, EEPROM, a
//! host file) is not this crate's concern: it is consumed through the
//! [`KvStore`] trait, and its durability and wear-leveling are its own
//! problem.
//!
//! A section must be closed after use on every exit path, including error
//! paths. Rather than trusting every call site to pair `open`/`close`, the
//! [`Section`] guard (obtained via [`KvStoreExt::section`]) closes the
//! section on drop and carries the typed accessors, so a forgotten close is
//! unrepresentable.
//!
//! Values use fixed encodings: booleans are a single byte, `u32` is four
//! little-endian bytes, strings are raw UTF-8. A stored value with the
//! wrong shape for the requested type reads as absent and the caller's
//! default applies; the store never guesses.

/// Common error types for store operations
pub mod error;

#[cfg(test)]
mod tests;

use heapless::String;

/// A sectioned key-value preference store.
///
/// At most one section is open at a time; `put_bytes`/`get_bytes`/
/// `remove_all` operate on the currently open section. Implementations
/// should fail with their `NotOpen`-equivalent error when no section is
/// open, and with a `ReadOnly`-equivalent when a write hits a section
/// opened read-only.
pub trait KvStore {
    /// Associated error type
    type Error: core::fmt::Debug;

    /// Open the named section. `read_only` sections reject writes.
    fn open(&mut self, section: &str, read_only: bool) -> Result<(), Self::Error>;

    /// Close the currently open section. Closing with none open is a no-op.
    fn close(&mut self);

    /// Store a value under `key` in the open section, replacing any
    /// previous value.
    fn put_bytes(&mut self, key: &str, value: &[u8]) -> Result<(), Self::Error>;

    /// Read the value stored under `key` into `buf`.
    ///
    /// Returns `Ok(None)` if the key is absent, otherwise the *full*
    /// stored length, even when only `buf.len()` bytes were copied. The
    /// typed accessors rely on this to detect values of the wrong shape.
    fn get_bytes(&mut self, key: &str, buf: &mut [u8]) -> Result<Option<usize>, Self::Error>;

    /// Remove every key in the open section.
    fn remove_all(&mut self) -> Result<(), Self::Error>;
}

/// Scoped-section extension for any [`KvStore`].
pub trait KvStoreExt: KvStore + Sized {
    /// Open `name` and return a guard that closes it on drop.
    fn section(&mut self, name: &str, read_only: bool) -> Result<Section<'_, Self>, Self::Error> {
        self.open(name, read_only)?;
        Ok(Section { store: self })
    }
}

impl<S: KvStore> KvStoreExt for S {}

/// An open store section, closed automatically on drop.
///
/// Carries the typed accessors used by the device-state layer. Every
/// getter takes a default that applies when the key is absent or the
/// stored bytes do not decode as the requested type.
#[derive(Debug)]
pub struct Section<'a, S: KvStore> {
    store: &'a mut S,
}

impl<S: KvStore> Drop for Section<'_, S> {
    fn drop(&mut self) {
        self.store.close();
    }
}

impl<S: KvStore> Section<'_, S> {
    /// Read a boolean, falling back to `default`.
    pub fn get_bool(&mut self, key: &str, default: bool) -> Result<bool, S::Error> {
        let mut buf = [0u8; 1];
        match self.store.get_bytes(key, &mut buf)? {
            Some(1) => Ok(buf[0] != 0),
            _ => Ok(default),
        }
    }

    /// Store a boolean as a single byte.
    pub fn put_bool(&mut self, key: &str, value: bool) -> Result<(), S::Error> {
        self.store.put_bytes(key, &[u8::from(value)])
    }

    /// Read a `u32`, falling back to `default`.
    pub fn get_u32(&mut self, key: &str, default: u32) -> Result<u32, S::Error> {
        let mut buf = [0u8; 4];
        match self.store.get_bytes(key, &mut buf)? {
            Some(4) => Ok(u32::from_le_bytes(buf)),
            _ => Ok(default),
        }
    }

    /// Store a `u32` as four little-endian bytes.
    pub fn put_u32(&mut self, key: &str, value: u32) -> Result<(), S::Error> {
        self.store.put_bytes(key, &value.to_le_bytes())
    }

    /// Read a string of at most `N` bytes, falling back to `default`.
    ///
    /// A stored value longer than `N` bytes is truncated by the backend
    /// read; if truncation splits a UTF-8 sequence the value reads as
    /// absent and `default` applies.
    pub fn get_string<const N: usize>(
        &mut self,
        key: &str,
        default: &str,
    ) -> Result<String<N>, S::Error> {
        let mut buf = [0u8; N];
        let value = match self.store.get_bytes(key, &mut buf)? {
            Some(len) => core::str::from_utf8(&buf[..len.min(N)]).ok(),
            None => None,
        };
        Ok(truncated(value.unwrap_or(default)))
    }

    /// Store a string as raw UTF-8 bytes.
    pub fn put_str(&mut self, key: &str, value: &str) -> Result<(), S::Error> {
        self.store.put_bytes(key, value.as_bytes())
    }

    /// Remove every key in this section.
    pub fn wipe(&mut self) -> Result<(), S::Error> {
        self.store.remove_all()
    }
}

/// Copy `s` into a bounded string, truncating at a char boundary if it
/// does not fit.
pub(crate) fn truncated<const N: usize>(s: &str) -> String<N> {
    let mut out = String::new();
    for c in s.chars() {
        if out.push(c).is_err() {
            break;
        }
    }
    out
}
