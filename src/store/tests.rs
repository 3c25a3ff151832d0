use super::error::Error;
use super::*;
use heapless::{FnvIndexMap, Vec};

const MAX_VALUE: usize = 64;

#[derive(Default)]
struct MockStore {
    entries: FnvIndexMap<String<16>, Vec<u8, MAX_VALUE>, 16>,
    // read_only flag of the open section, None when closed
    open: Option<bool>,
    closes: usize,
}

impl KvStore for MockStore {
    type Error = Error;

    fn open(&mut self, _section: &str, read_only: bool) -> Result<(), Self::Error> {
        self.open = Some(read_only);
        Ok(())
    }

    fn close(&mut self) {
        if self.open.take().is_some() {
            self.closes += 1;
        }
    }

    fn put_bytes(&mut self, key: &str, value: &[u8]) -> Result<(), Self::Error> {
        match self.open {
            None => Err(Error::NotOpen),
            Some(true) => Err(Error::ReadOnly),
            Some(false) => {
                let key = String::try_from(key).map_err(|_| Error::CapacityExceeded)?;
                let value = Vec::from_slice(value).map_err(|_| Error::CapacityExceeded)?;
                self.entries
                    .insert(key, value)
                    .map_err(|_| Error::CapacityExceeded)?;
                Ok(())
            }
        }
    }

    fn get_bytes(&mut self, key: &str, buf: &mut [u8]) -> Result<Option<usize>, Self::Error> {
        if self.open.is_none() {
            return Err(Error::NotOpen);
        }
        let key = String::<16>::try_from(key).map_err(|_| Error::CapacityExceeded)?;
        match self.entries.get(&key) {
            Some(value) => {
                let len = value.len().min(buf.len());
                buf[..len].copy_from_slice(&value[..len]);
                Ok(Some(value.len()))
            }
            None => Ok(None),
        }
    }

    fn remove_all(&mut self) -> Result<(), Self::Error> {
        match self.open {
            None => Err(Error::NotOpen),
            Some(true) => Err(Error::ReadOnly),
            Some(false) => {
                self.entries.clear();
                Ok(())
            }
        }
    }
}

#[test]
fn typed_round_trip() {
    let mut store = MockStore::default();
    {
        let mut section = store.section("user", false).unwrap();
        section.put_bool("flag", true).unwrap();
        section.put_u32("count", 0xDEAD_BEEF).unwrap();
        section.put_str("name", "button").unwrap();
    }
    let mut section = store.section("user", true).unwrap();
    assert!(section.get_bool("flag", false).unwrap());
    assert_eq!(section.get_u32("count", 0).unwrap(), 0xDEAD_BEEF);
    let name: String<16> = section.get_string("name", "").unwrap();
    assert_eq!(name.as_str(), "button");
}

#[test]
fn absent_keys_fall_back_to_defaults() {
    let mut store = MockStore::default();
    let mut section = store.section("user", true).unwrap();
    assert!(section.get_bool("missing", true).unwrap());
    assert_eq!(section.get_u32("missing", 42).unwrap(), 42);
    let s: String<8> = section.get_string("missing", "dflt").unwrap();
    assert_eq!(s.as_str(), "dflt");
}

#[test]
fn wrong_shape_reads_as_absent() {
    let mut store = MockStore::default();
    let mut section = store.section("user", false).unwrap();
    section.store.put_bytes("flag", &[1, 2]).unwrap();
    // two bytes is not a bool, default applies
    assert!(!section.get_bool("flag", false).unwrap());
    section.store.put_bytes("count", &[1, 2]).unwrap();
    assert_eq!(section.get_u32("count", 7).unwrap(), 7);
}

#[test]
fn section_closes_on_drop() {
    let mut store = MockStore::default();
    {
        let mut section = store.section("user", false).unwrap();
        section.put_bool("flag", false).unwrap();
    }
    assert_eq!(store.closes, 1);
    // closed again only after the next guard drops, not before
    let section = store.section("user", true).unwrap();
    drop(section);
    assert_eq!(store.closes, 2);
}

#[test]
fn read_only_section_rejects_writes() {
    let mut store = MockStore::default();
    let mut section = store.section("factory", true).unwrap();
    assert_eq!(section.put_str("serial", "x"), Err(Error::ReadOnly));
    assert_eq!(section.wipe(), Err(Error::ReadOnly));
}

#[test]
fn access_without_open_section_fails() {
    let mut store = MockStore::default();
    let mut buf = [0u8; 4];
    assert_eq!(store.get_bytes("key", &mut buf), Err(Error::NotOpen));
    assert_eq!(store.put_bytes("key", &[0]), Err(Error::NotOpen));
}

#[test]
fn wipe_removes_every_key() {
    let mut store = MockStore::default();
    {
        let mut section = store.section("persisted", false).unwrap();
        section.put_bool("a", true).unwrap();
        section.put_u32("b", 1).unwrap();
        section.wipe().unwrap();
    }
    let mut section = store.section("persisted", true).unwrap();
    assert!(!section.get_bool("a", false).unwrap());
    assert_eq!(section.get_u32("b", 0).unwrap(), 0);
}

#[test]
fn long_string_is_truncated_to_capacity() {
    let mut store = MockStore::default();
    let mut section = store.section("user", false).unwrap();
    section.put_str("name", "a-rather-long-label").unwrap();
    let s: String<8> = section.get_string("name", "").unwrap();
    assert_eq!(s.as_str(), "a-rather");
}
