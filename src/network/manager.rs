//! # The connection state machine
//!
//! [`Network`] reconciles three independently-failing layers (radio
//! association, session transport, MQTT handshake) into one lifecycle,
//! advanced one bounded step at a time by [`update`](Network::update) from
//! a single dedicated task. No call here blocks: connect attempts bound
//! themselves by comparing elapsed time against a start timestamp recorded
//! on state entry.
//!
//! ## States
//!
//! ```text
//!            ┌────────────────── disconnect() ─────────────────┐
//!            ▼                                                 │
//!          Idle ──connect()──▶ QuickConnect ──link up──▶ MqttConnect ──ok──▶ FullyConnected
//!            ▲                     │ timeout                ▲  │ timeout/link lost    │
//!            │                     ▼                        │  ▼              broker  │ radio
//!            │                NormalConnect ───link up──────┘ Disconnect       lost   │ lost
//!            │                     │ timeout                    │    ▲          ▼     │
//!            └─────────────────────┴────────────◀───────────────┘    └──── WifiConnected
//! ```
//!
//! Cross-task command and message flow happens exclusively through
//! [`NetworkControl`]: producer tasks hold a [`NetworkHandle`] and only
//! ever set flags or enqueue into the bounded publish queue; the network
//! task observes them on its next step. This keeps every state transition
//! on one task by construction.

use core::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use crate::state::DeviceState;
use crate::store::KvStore;

use super::error::Error;
use super::queue::{PublishQueue, PublishRequest};
use super::{Broker, Clock, Credentials, Radio, SessionConfig};

/// Time budget for a fast re-association attempt before falling back to
/// the full scan path.
pub const QUICK_CONNECT_TIMEOUT_MS: u64 = 5_000;
/// Time budget for a full scan-and-associate attempt.
pub const NORMAL_CONNECT_TIMEOUT_MS: u64 = 15_000;
/// Time budget for the broker handshake once the link is up.
pub const MQTT_CONNECT_TIMEOUT_MS: u64 = 10_000;
/// Interval between liveness re-checks while fully connected.
pub const CONN_CHECK_INTERVAL_MS: u64 = 1_000;
/// Consecutive failed cycles after which quick-connect eligibility is
/// revoked and user-facing setup is requested via a persisted flag.
pub const MAX_FAILED_CONNECTIONS: u32 = 5;
/// Upper bound on inbound messages dispatched per [`Network::update`]
/// step, so a chatty topic cannot starve queue draining.
pub const MAX_INBOUND_PER_STEP: usize = 8;
/// Keep-alive interval requested from the broker.
pub const MQTT_KEEP_ALIVE_S: u16 = 60;

/// Coarse connection status exposed to external consumers.
///
/// Deliberately coarser than the internal state machine: consumers care
/// whether messages can flow, not which handshake is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Status {
    /// No usable connectivity.
    Disconnected = 0,
    /// Radio link up, broker session not (yet) live.
    WifiConnected = 1,
    /// Radio link and broker session both live.
    MqttConnected = 2,
}

impl Status {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Status::WifiConnected,
            2 => Status::MqttConnected,
            _ => Status::Disconnected,
        }
    }
}

/// Diagnostic name of the state machine's current state.
///
/// For logging and tests; policy decisions must use
/// [`Network::get_state`] instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsmState {
    /// Waiting for a connect command.
    Idle,
    /// Fast re-association from cached radio parameters.
    QuickConnect,
    /// Full scan-and-associate.
    NormalConnect,
    /// Broker handshake over the established link.
    MqttConnect,
    /// Link up, broker session not yet (re-)attempted.
    WifiConnected,
    /// Orderly teardown, folds back to Idle.
    Disconnect,
    /// Steady state: draining outbound, dispatching inbound.
    FullyConnected,
}

impl FsmState {
    /// Short human-readable state name.
    pub fn name(self) -> &'static str {
        match self {
            FsmState::Idle => "Idle",
            FsmState::QuickConnect => "QuickConnect",
            FsmState::NormalConnect => "NormalConnect",
            FsmState::MqttConnect => "MqttConnect",
            FsmState::WifiConnected => "WifiConnected",
            FsmState::Disconnect => "Disconnect",
            FsmState::FullyConnected => "FullyConnected",
        }
    }
}

/// Internal machine state. Per-state context (start timestamps, fallback
/// origin) lives in the variant that needs it, so each step function
/// receives exactly the capabilities of its state.
#[derive(Debug, Clone, Copy)]
enum Fsm {
    Idle,
    QuickConnect { start: u64 },
    NormalConnect { start: u64, fallback: bool },
    MqttConnect { start: u64 },
    WifiConnected,
    Disconnect,
    FullyConnected { last_check: u64 },
}

impl Fsm {
    fn state(&self) -> FsmState {
        match self {
            Fsm::Idle => FsmState::Idle,
            Fsm::QuickConnect { .. } => FsmState::QuickConnect,
            Fsm::NormalConnect { .. } => FsmState::NormalConnect,
            Fsm::MqttConnect { .. } => FsmState::MqttConnect,
            Fsm::WifiConnected => FsmState::WifiConnected,
            Fsm::Disconnect => FsmState::Disconnect,
            Fsm::FullyConnected { .. } => FsmState::FullyConnected,
        }
    }
}

/// Shared control block between producer tasks and the network task.
///
/// Const-constructible so it can live in a `static` outliving both sides.
/// Commands are sticky flags consumed by the network task on its next
/// step; a pending disconnect always wins over a pending connect, because
/// disconnect is the cancellation primitive.
pub struct NetworkControl<const N: usize> {
    connect_req: AtomicBool,
    disconnect_req: AtomicBool,
    erase_req: AtomicBool,
    status: AtomicU8,
    queue: PublishQueue<N>,
}

impl<const N: usize> NetworkControl<N> {
    /// An idle control block with an empty publish queue.
    pub const fn new() -> Self {
        Self {
            connect_req: AtomicBool::new(false),
            disconnect_req: AtomicBool::new(false),
            erase_req: AtomicBool::new(false),
            status: AtomicU8::new(Status::Disconnected as u8),
            queue: PublishQueue::new(),
        }
    }

    /// A producer-side handle onto this control block.
    pub fn handle(&self) -> NetworkHandle<'_, N> {
        NetworkHandle { ctrl: self }
    }

    fn request_connect(&self) {
        self.connect_req.store(true, Ordering::Release);
    }

    fn request_disconnect(&self, erase: bool) {
        if erase {
            self.erase_req.store(true, Ordering::Release);
        }
        self.disconnect_req.store(true, Ordering::Release);
    }

    fn take_connect(&self) -> bool {
        self.connect_req.swap(false, Ordering::AcqRel)
    }

    fn take_disconnect(&self) -> bool {
        self.disconnect_req.swap(false, Ordering::AcqRel)
    }

    fn take_erase(&self) -> bool {
        self.erase_req.swap(false, Ordering::AcqRel)
    }

    fn status(&self) -> Status {
        Status::from_u8(self.status.load(Ordering::Acquire))
    }

    fn set_status(&self, status: Status) {
        self.status.store(status as u8, Ordering::Release);
    }

    fn publish(&self, topic: &str, payload: &[u8], retained: bool) -> Result<(), Error> {
        let request = PublishRequest::new(topic, payload, retained)?;
        self.queue.enqueue(request)
    }
}

impl<const N: usize> Default for NetworkControl<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> core::fmt::Debug for NetworkControl<N> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("NetworkControl")
            .field("status", &self.status())
            .field("queue", &self.queue)
            .finish()
    }
}

/// Cheap, copyable producer-side handle.
///
/// Every operation is non-blocking: commands set flags, `publish`
/// enqueues or rejects. Safe to use from any task.
#[derive(Debug, Clone, Copy)]
pub struct NetworkHandle<'a, const N: usize> {
    ctrl: &'a NetworkControl<N>,
}

impl<const N: usize> NetworkHandle<'_, N> {
    /// Request a connection cycle. Idempotent while one is underway.
    pub fn connect(&self) {
        self.ctrl.request_connect();
    }

    /// Request teardown. With `erase`, additionally discard cached
    /// quick-connect state so the next cycle is forced onto the full
    /// scan path.
    pub fn disconnect(&self, erase: bool) {
        self.ctrl.request_disconnect(erase);
    }

    /// Current coarse connection status.
    pub fn status(&self) -> Status {
        self.ctrl.status()
    }

    /// Enqueue an outbound message, best-effort.
    ///
    /// Messages are drained in FIFO order once the broker session is
    /// live. Rejected with [`Error::QueueFull`] at capacity or
    /// [`Error::TooLarge`] for oversized topic/payload; never blocks.
    pub fn publish(&self, topic: &str, payload: &[u8], retained: bool) -> Result<(), Error> {
        self.ctrl.publish(topic, payload, retained)
    }
}

/// Capability view of the live broker session handed to the on-connect
/// hook, so it can register subscriptions and publish immediately without
/// re-borrowing the whole state machine.
pub trait SessionOps {
    /// Register a broker-side subscription.
    fn subscribe(&mut self, topic: &str) -> Result<(), Error>;
    /// Publish directly on the live session, bypassing the queue.
    fn publish(&mut self, topic: &str, payload: &[u8], retained: bool) -> Result<(), Error>;
}

struct Session<'s, B: Broker> {
    broker: &'s mut B,
}

impl<B: Broker> SessionOps for Session<'_, B> {
    fn subscribe(&mut self, topic: &str) -> Result<(), Error> {
        if !self.broker.is_connected() {
            return Err(Error::NotConnected);
        }
        self.broker.subscribe(topic).map_err(|err| {
            log::warn!("broker: subscribe {} failed: {:?}", topic, err);
            Error::ProtocolError
        })
    }

    fn publish(&mut self, topic: &str, payload: &[u8], retained: bool) -> Result<(), Error> {
        if !self.broker.is_connected() {
            return Err(Error::NotConnected);
        }
        self.broker
            .publish(topic, payload, retained)
            .map_err(|err| {
                log::warn!("broker: publish {} failed: {:?}", topic, err);
                Error::ProtocolError
            })
    }
}

/// The connection state machine.
///
/// Owns the radio and broker client objects exclusively; borrows the
/// device state whose policy fields (`failed_connections`,
/// `wifi_quick_connect`, escalation flags) it alone mutates while running.
///
/// `setup()` and every `update()` must run on the same dedicated task;
/// this is a precondition, not an enforced property. All other tasks
/// interact through a [`NetworkHandle`].
pub struct Network<'a, S, R, B, C, const N: usize>
where
    S: KvStore,
    R: Radio,
    B: Broker,
    C: Clock,
{
    ctrl: &'a NetworkControl<N>,
    device: &'a mut DeviceState<S>,
    radio: R,
    broker: B,
    clock: C,
    fsm: Fsm,
    mqtt_callback: Option<&'a mut (dyn FnMut(&str, &[u8]) + 'a)>,
    on_connect: Option<&'a mut (dyn FnMut(&mut dyn SessionOps) + 'a)>,
}

impl<'a, S, R, B, C, const N: usize> Network<'a, S, R, B, C, N>
where
    S: KvStore,
    R: Radio,
    B: Broker,
    C: Clock,
{
    /// Bind the state machine to its control block, device state and
    /// platform objects. The machine starts in Idle; call
    /// [`setup`](Self::setup) before the first [`update`](Self::update).
    pub fn new(
        ctrl: &'a NetworkControl<N>,
        device: &'a mut DeviceState<S>,
        radio: R,
        broker: B,
        clock: C,
    ) -> Self {
        Self {
            ctrl,
            device,
            radio,
            broker,
            clock,
            fsm: Fsm::Idle,
            mqtt_callback: None,
            on_connect: None,
        }
    }

    /// Load device state and reset the machine to Idle.
    ///
    /// Must be called from the same task that will call
    /// [`update`](Self::update).
    pub fn setup(&mut self) -> Result<(), S::Error> {
        self.device.load_all()?;
        self.fsm = Fsm::Idle;
        self.ctrl.set_status(Status::Disconnected);
        log::info!("network: ready");
        Ok(())
    }

    /// Advance the machine by exactly one state's bounded work.
    pub fn update(&mut self) {
        match self.fsm {
            Fsm::Idle => self.step_idle(),
            Fsm::QuickConnect { start } => self.step_quick_connect(start),
            Fsm::NormalConnect { start, fallback } => self.step_normal_connect(start, fallback),
            Fsm::MqttConnect { start } => self.step_mqtt_connect(start),
            Fsm::WifiConnected => self.step_wifi_connected(),
            Fsm::Disconnect => self.step_disconnect(),
            Fsm::FullyConnected { last_check } => self.step_fully_connected(last_check),
        }
    }

    /// Request a connection cycle (see [`NetworkHandle::connect`]).
    pub fn connect(&self) {
        self.ctrl.request_connect();
    }

    /// Request teardown (see [`NetworkHandle::disconnect`]).
    pub fn disconnect(&self, erase: bool) {
        self.ctrl.request_disconnect(erase);
    }

    /// Current coarse connection status.
    pub fn get_state(&self) -> Status {
        self.ctrl.status()
    }

    /// Enqueue an outbound message (see [`NetworkHandle::publish`]).
    pub fn publish(&self, topic: &str, payload: &[u8], retained: bool) -> Result<(), Error> {
        self.ctrl.publish(topic, payload, retained)
    }

    /// Register a broker-side subscription on the live session.
    ///
    /// Fails with [`Error::NotConnected`] before the session is up.
    /// Failures are surfaced, never retried internally; the on-connect
    /// hook is the natural place to (re-)register subscriptions, since it
    /// runs on every session establishment.
    pub fn subscribe(&mut self, topic: &str) -> Result<(), Error> {
        Session {
            broker: &mut self.broker,
        }
        .subscribe(topic)
    }

    /// Register the inbound-message dispatcher. At most one; last write
    /// wins. Runs synchronously on the network task and must not block:
    /// a slow callback stalls connection maintenance and publish draining.
    pub fn set_mqtt_callback(&mut self, callback: &'a mut (dyn FnMut(&str, &[u8]) + 'a)) {
        self.mqtt_callback = Some(callback);
    }

    /// Register the post-connect hook. At most one; last write wins.
    /// Invoked on every session establishment with a capability view of
    /// the live session.
    pub fn set_on_connect(&mut self, hook: &'a mut (dyn FnMut(&mut dyn SessionOps) + 'a)) {
        self.on_connect = Some(hook);
    }

    /// Diagnostic fine-grained state name.
    pub fn fsm(&self) -> FsmState {
        self.fsm.state()
    }

    /// Shared view of the bound device state.
    pub fn device(&self) -> &DeviceState<S> {
        self.device
    }

    /// Mutable view of the bound device state, for application flags.
    /// The reconnection-policy fields belong to the machine while it runs.
    pub fn device_mut(&mut self) -> &mut DeviceState<S> {
        self.device
    }

    // ---- state steps ----

    fn step_idle(&mut self) {
        // disconnect first: it is the cancellation primitive and may
        // carry an erase request that must apply before the next attempt
        if self.ctrl.take_disconnect() {
            self.enter_disconnect();
            return;
        }
        if self.ctrl.take_connect() {
            let persisted = self.device.persisted();
            if persisted.wifi_done
                && persisted.wifi_quick_connect
                && persisted.failed_connections == 0
            {
                self.enter_quick_connect();
            } else {
                self.enter_normal_connect(false);
            }
        }
    }

    fn step_quick_connect(&mut self, start: u64) {
        if self.disconnect_requested() {
            self.enter_disconnect();
            return;
        }
        if self.radio.is_link_up() {
            log::info!("radio: link up (quick)");
            self.ctrl.set_status(Status::WifiConnected);
            self.enter_mqtt_connect();
            return;
        }
        if self.elapsed_since(start) >= QUICK_CONNECT_TIMEOUT_MS {
            log::warn!("radio: quick associate timed out, falling back to full scan");
            self.record_failed_connection();
            self.enter_normal_connect(true);
        }
    }

    fn step_normal_connect(&mut self, start: u64, fallback: bool) {
        if self.disconnect_requested() {
            self.enter_disconnect();
            return;
        }
        if self.radio.is_link_up() {
            log::info!("radio: link up");
            self.ctrl.set_status(Status::WifiConnected);
            if fallback {
                // the full scan worked where the cached parameters did
                // not; re-arm quick connect with the freshly learned ones
                self.device.persisted_mut().wifi_quick_connect = true;
                self.persist_flags();
            }
            self.enter_mqtt_connect();
            return;
        }
        if self.elapsed_since(start) >= NORMAL_CONNECT_TIMEOUT_MS {
            log::warn!("radio: associate timed out");
            {
                let persisted = self.device.persisted_mut();
                persisted.failed_connections = persisted.failed_connections.saturating_add(1);
                if persisted.failed_connections >= MAX_FAILED_CONNECTIONS {
                    persisted.wifi_quick_connect = false;
                    persisted.restart_to_wifi_setup = true;
                }
            }
            self.persist_flags();
            if let Err(err) = self.radio.disconnect(false) {
                log::warn!("radio: abort failed: {:?}", err);
            }
            self.ctrl.set_status(Status::Disconnected);
            self.transition(Fsm::Idle);
        }
    }

    fn step_mqtt_connect(&mut self, start: u64) {
        if self.disconnect_requested() {
            self.enter_disconnect();
            return;
        }
        if !self.radio.is_link_up() {
            log::warn!("radio: link lost during broker handshake");
            self.enter_disconnect();
            return;
        }
        // one bounded handshake attempt per step
        let attempt = {
            let Self { device, broker, .. } = self;
            let user = device.user();
            let factory = device.factory();
            let client_id = if factory.unique_id.is_empty() {
                "uplink-device"
            } else {
                &factory.unique_id
            };
            let config = SessionConfig {
                host: &user.mqtt.server,
                port: user.mqtt.port,
                client_id,
                username: &user.mqtt.user,
                password: &user.mqtt.password,
                keep_alive_seconds: MQTT_KEEP_ALIVE_S,
            };
            broker.connect(&config)
        };
        match attempt {
            Ok(()) => self.session_established(),
            Err(err) => {
                log::debug!("broker: handshake attempt failed: {:?}", err);
                if self.elapsed_since(start) >= MQTT_CONNECT_TIMEOUT_MS {
                    log::warn!("broker: handshake timed out");
                    self.enter_disconnect();
                }
            }
        }
    }

    fn step_wifi_connected(&mut self) {
        if self.disconnect_requested() {
            self.enter_disconnect();
            return;
        }
        if !self.radio.is_link_up() {
            log::warn!("radio: link lost");
            self.enter_disconnect();
            return;
        }
        self.enter_mqtt_connect();
    }

    fn step_disconnect(&mut self) {
        self.transition(Fsm::Idle);
    }

    fn step_fully_connected(&mut self, last_check: u64) {
        if self.disconnect_requested() {
            self.enter_disconnect();
            return;
        }
        let now = self.clock.now_ms();
        if now.saturating_sub(last_check) >= CONN_CHECK_INTERVAL_MS {
            self.fsm = Fsm::FullyConnected { last_check: now };
            if !self.radio.is_link_up() {
                log::warn!("radio: link lost");
                self.enter_disconnect();
                return;
            }
            if !self.broker.is_connected() {
                // broker-only loss: keep the association, re-handshake
                log::warn!("broker: session lost, re-establishing");
                self.ctrl.set_status(Status::WifiConnected);
                self.transition(Fsm::WifiConnected);
                return;
            }
        }
        self.drain_outbound();
        self.dispatch_inbound();
    }

    // ---- transitions ----

    fn enter_quick_connect(&mut self) {
        let start = self.clock.now_ms();
        {
            let Self { device, radio, .. } = self;
            let user = device.user();
            let credentials = Credentials {
                ssid: &user.wifi_ssid,
                password: &user.wifi_password,
            };
            if let Err(err) = radio.begin_quick(&credentials) {
                log::warn!("radio: quick associate failed to start: {:?}", err);
            }
        }
        self.transition(Fsm::QuickConnect { start });
    }

    fn enter_normal_connect(&mut self, fallback: bool) {
        let start = self.clock.now_ms();
        {
            let Self { device, radio, .. } = self;
            let user = device.user();
            let credentials = Credentials {
                ssid: &user.wifi_ssid,
                password: &user.wifi_password,
            };
            if let Err(err) = radio.begin(&credentials) {
                log::warn!("radio: associate failed to start: {:?}", err);
            }
        }
        self.transition(Fsm::NormalConnect { start, fallback });
    }

    fn enter_mqtt_connect(&mut self) {
        let start = self.clock.now_ms();
        self.transition(Fsm::MqttConnect { start });
    }

    fn session_established(&mut self) {
        log::info!("broker: session established");
        {
            let persisted = self.device.persisted_mut();
            persisted.failed_connections = 0;
            persisted.wifi_quick_connect = true;
        }
        self.persist_flags();
        self.ctrl.set_status(Status::MqttConnected);
        {
            let Self {
                broker, on_connect, ..
            } = self;
            if let Some(hook) = on_connect.as_mut() {
                let mut session = Session { broker };
                (*hook)(&mut session);
            }
        }
        let last_check = self.clock.now_ms();
        self.transition(Fsm::FullyConnected { last_check });
    }

    fn enter_disconnect(&mut self) {
        self.broker.disconnect();
        if self.ctrl.take_erase() {
            // forced onto the full scan path next cycle
            if let Err(err) = self.radio.disconnect(true) {
                log::warn!("radio: disconnect failed: {:?}", err);
            }
            self.device.persisted_mut().wifi_quick_connect = false;
            self.persist_flags();
        }
        self.ctrl.set_status(Status::Disconnected);
        self.transition(Fsm::Disconnect);
    }

    // ---- helpers ----

    fn transition(&mut self, next: Fsm) {
        log::debug!(
            "network: {} -> {}",
            self.fsm.state().name(),
            next.state().name()
        );
        self.fsm = next;
    }

    fn elapsed_since(&self, start: u64) -> u64 {
        self.clock.now_ms().saturating_sub(start)
    }

    /// Consume pending commands while a cycle is underway: a connect
    /// request is idempotent noise, a disconnect request cancels.
    fn disconnect_requested(&self) -> bool {
        let _ = self.ctrl.take_connect();
        self.ctrl.take_disconnect()
    }

    fn record_failed_connection(&mut self) {
        let persisted = self.device.persisted_mut();
        persisted.failed_connections = persisted.failed_connections.saturating_add(1);
        self.persist_flags();
    }

    fn persist_flags(&mut self) {
        if let Err(err) = self.device.save_persisted() {
            log::warn!("state: persist failed: {:?}", err);
        }
    }

    fn drain_outbound(&mut self) {
        while let Some(request) = self.ctrl.queue.dequeue() {
            if let Err(err) = self
                .broker
                .publish(&request.topic, &request.payload, request.retained)
            {
                // message lost; the liveness check will notice a dead
                // session and the rest of the queue waits for the next one
                log::warn!("broker: publish {} failed: {:?}", request.topic, err);
                break;
            }
        }
    }

    fn dispatch_inbound(&mut self) {
        let Self {
            broker,
            mqtt_callback,
            ..
        } = self;
        for _ in 0..MAX_INBOUND_PER_STEP {
            match broker.poll() {
                Some(message) => {
                    if let Some(callback) = mqtt_callback.as_mut() {
                        (*callback)(&message.topic, &message.payload);
                    }
                }
                None => break,
            }
        }
    }
}

impl<S, R, B, C, const N: usize> core::fmt::Debug for Network<'_, S, R, B, C, N>
where
    S: KvStore,
    R: Radio,
    B: Broker,
    C: Clock,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Network")
            .field("fsm", &self.fsm.state())
            .field("status", &self.ctrl.status())
            .finish()
    }
}
