//! Shared test harness: an in-memory store and scriptable radio, broker
//! and clock fakes. Shared `Rc<RefCell<_>>` inner state lets a test keep a
//! control handle to a fake after moving it into the state machine.

// each test binary uses a different subset of the harness
#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use uplink::network::{Broker, Clock, Credentials, Inbound, Radio, SessionConfig};
use uplink::store::KvStore;

#[derive(Debug, PartialEq, Eq)]
pub enum MemStoreError {
    NotOpen,
    ReadOnly,
}

/// In-memory key-value store keyed by `(section, key)`.
#[derive(Default)]
pub struct MemStore {
    data: Rc<RefCell<HashMap<(String, String), Vec<u8>>>>,
    open: Option<(String, bool)>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A second store over the same backing map, for pre-seeding or
    /// inspecting data around the instance under test.
    pub fn share(&self) -> Self {
        Self {
            data: Rc::clone(&self.data),
            open: None,
        }
    }
}

impl KvStore for MemStore {
    type Error = MemStoreError;

    fn open(&mut self, section: &str, read_only: bool) -> Result<(), Self::Error> {
        self.open = Some((section.to_string(), read_only));
        Ok(())
    }

    fn close(&mut self) {
        self.open = None;
    }

    fn put_bytes(&mut self, key: &str, value: &[u8]) -> Result<(), Self::Error> {
        match &self.open {
            None => Err(MemStoreError::NotOpen),
            Some((_, true)) => Err(MemStoreError::ReadOnly),
            Some((section, false)) => {
                self.data
                    .borrow_mut()
                    .insert((section.clone(), key.to_string()), value.to_vec());
                Ok(())
            }
        }
    }

    fn get_bytes(&mut self, key: &str, buf: &mut [u8]) -> Result<Option<usize>, Self::Error> {
        let (section, _) = self.open.as_ref().ok_or(MemStoreError::NotOpen)?;
        match self
            .data
            .borrow()
            .get(&(section.clone(), key.to_string()))
        {
            Some(value) => {
                let n = value.len().min(buf.len());
                buf[..n].copy_from_slice(&value[..n]);
                Ok(Some(value.len()))
            }
            None => Ok(None),
        }
    }

    fn remove_all(&mut self) -> Result<(), Self::Error> {
        match &self.open {
            None => Err(MemStoreError::NotOpen),
            Some((_, true)) => Err(MemStoreError::ReadOnly),
            Some((section, false)) => {
                self.data
                    .borrow_mut()
                    .retain(|(s, _), _| s != section);
                Ok(())
            }
        }
    }
}

/// Manually-advanced test clock.
#[derive(Clone, Default)]
pub struct TestClock {
    now: Rc<Cell<u64>>,
}

impl TestClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, ms: u64) {
        self.now.set(self.now.get() + ms);
    }
}

impl Clock for TestClock {
    fn now_ms(&self) -> u64 {
        self.now.get()
    }
}

#[derive(Default)]
pub struct RadioInner {
    pub link_up: bool,
    pub begin_calls: usize,
    pub begin_quick_calls: usize,
    pub disconnect_calls: usize,
    pub forget_calls: usize,
    pub last_ssid: String,
}

/// Scriptable radio fake. Tests flip `link_up` to simulate association
/// completing or the link dropping.
#[derive(Clone, Default)]
pub struct FakeRadio {
    pub inner: Rc<RefCell<RadioInner>>,
}

impl FakeRadio {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_link_up(&self, up: bool) {
        self.inner.borrow_mut().link_up = up;
    }
}

impl Radio for FakeRadio {
    type Error = &'static str;

    fn begin(&mut self, credentials: &Credentials<'_>) -> Result<(), Self::Error> {
        let mut inner = self.inner.borrow_mut();
        inner.begin_calls += 1;
        inner.last_ssid = credentials.ssid.to_string();
        Ok(())
    }

    fn begin_quick(&mut self, credentials: &Credentials<'_>) -> Result<(), Self::Error> {
        let mut inner = self.inner.borrow_mut();
        inner.begin_quick_calls += 1;
        inner.last_ssid = credentials.ssid.to_string();
        Ok(())
    }

    fn is_link_up(&mut self) -> bool {
        self.inner.borrow().link_up
    }

    fn disconnect(&mut self, forget: bool) -> Result<(), Self::Error> {
        let mut inner = self.inner.borrow_mut();
        inner.disconnect_calls += 1;
        if forget {
            inner.forget_calls += 1;
        }
        inner.link_up = false;
        Ok(())
    }
}

#[derive(Default)]
pub struct BrokerInner {
    /// Next handshake attempts succeed when true.
    pub accept_connect: bool,
    pub connected: bool,
    pub connect_attempts: usize,
    pub disconnect_calls: usize,
    pub last_client_id: String,
    pub published: Vec<(String, Vec<u8>, bool)>,
    pub subscriptions: Vec<String>,
    pub inbound: std::collections::VecDeque<Inbound>,
    /// When true, publish calls fail.
    pub fail_publish: bool,
}

/// Scriptable broker fake recording everything the machine does to it.
#[derive(Clone, Default)]
pub struct FakeBroker {
    pub inner: Rc<RefCell<BrokerInner>>,
}

impl FakeBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accept_next_connect(&self) {
        self.inner.borrow_mut().accept_connect = true;
    }

    pub fn drop_session(&self) {
        self.inner.borrow_mut().connected = false;
    }

    pub fn push_inbound(&self, topic: &str, payload: &[u8]) {
        let message = Inbound {
            topic: topic.try_into().unwrap(),
            payload: heapless::Vec::from_slice(payload).unwrap(),
        };
        self.inner.borrow_mut().inbound.push_back(message);
    }

    pub fn published(&self) -> Vec<(String, Vec<u8>, bool)> {
        self.inner.borrow().published.clone()
    }
}

impl Broker for FakeBroker {
    type Error = &'static str;

    fn connect(&mut self, config: &SessionConfig<'_>) -> Result<(), Self::Error> {
        let mut inner = self.inner.borrow_mut();
        inner.connect_attempts += 1;
        inner.last_client_id = config.client_id.to_string();
        if inner.accept_connect {
            inner.connected = true;
            Ok(())
        } else {
            Err("refused")
        }
    }

    fn is_connected(&mut self) -> bool {
        self.inner.borrow().connected
    }

    fn publish(&mut self, topic: &str, payload: &[u8], retained: bool) -> Result<(), Self::Error> {
        let mut inner = self.inner.borrow_mut();
        if inner.fail_publish || !inner.connected {
            return Err("publish failed");
        }
        inner
            .published
            .push((topic.to_string(), payload.to_vec(), retained));
        Ok(())
    }

    fn subscribe(&mut self, topic: &str) -> Result<(), Self::Error> {
        let mut inner = self.inner.borrow_mut();
        if !inner.connected {
            return Err("not connected");
        }
        inner.subscriptions.push(topic.to_string());
        Ok(())
    }

    fn poll(&mut self) -> Option<Inbound> {
        self.inner.borrow_mut().inbound.pop_front()
    }

    fn disconnect(&mut self) {
        let mut inner = self.inner.borrow_mut();
        inner.disconnect_calls += 1;
        inner.connected = false;
    }
}
