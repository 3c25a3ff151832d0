//! # uplink - connectivity manager for battery-powered IoT devices
//!
//! This crate owns the connection lifecycle of a small, battery-powered,
//! Wi-Fi + MQTT device: radio association, broker session establishment,
//! steady-state message pumping and orderly teardown. It is designed for
//! `no_std` environments and deliberately does *not* implement 802.11 or
//! MQTT framing itself: the radio driver, the MQTT client and the durable
//! preference store are consumed through small traits, so the whole state
//! machine can be driven deterministically on a host as well as on target.
//!
//! ## Architecture
//!
//! ```text
//! application tasks                     network task
//! ─────────────────                     ────────────
//! NetworkHandle ───commands/messages──▶ NetworkControl ──▶ Network::update()
//!   .connect()                            (atomics +          │
//!   .disconnect(erase)                     publish queue)     ├─ Radio (trait)
//!   .publish(topic, payload)                                  ├─ Broker (trait)
//!                                                             └─ DeviceState
//!                                                                  └─ KvStore (trait)
//! ```
//!
//! - [`state::DeviceState`] loads and persists factory identity, user
//!   configuration and the reconnection-policy flags through a sectioned
//!   key-value [`store::KvStore`].
//! - [`network::manager::Network`] is a finite state machine advanced one
//!   bounded step per [`update`](network::manager::Network::update) call
//!   from a single dedicated task; it never blocks the caller.
//! - [`network::queue::PublishQueue`] decouples producer tasks from the
//!   task that owns the client objects; outbound messages are drained only
//!   while the broker session is live.
//!
//! ## Connection strategy
//!
//! The machine prefers a *quick connect* (fast re-association from the
//! radio driver's cached channel/BSSID) when the previous cycle succeeded,
//! and falls back to a full scan-and-associate when the cache is stale or
//! failures accumulate. The failure counter and quick-connect eligibility
//! are persisted so the policy survives deep sleep and reboots.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use uplink::network::manager::{Network, NetworkControl};
//! # use uplink::network::{Radio, Broker, Clock, Credentials, SessionConfig, Inbound};
//! # use uplink::state::DeviceState;
//! # use uplink::store::KvStore;
//! # fn demo<S: KvStore, R: Radio, B: Broker, C: Clock>(
//! #     mut device: DeviceState<S>, radio: R, broker: B, clock: C,
//! # ) {
//! static CTRL: NetworkControl<16> = NetworkControl::new();
//!
//! // Producer side, any task:
//! let handle = CTRL.handle();
//! handle.connect();
//! let _ = handle.publish("devices/button/1", b"press", false);
//!
//! // Network task:
//! let mut network = Network::new(&CTRL, &mut device, radio, broker, clock);
//! network.setup().unwrap();
//! loop {
//!     network.update();
//!     // yield / sleep between steps
//! }
//! # }
//! ```
//!
//! ## Optional features
//!
//! - `std`: host conveniences ([`network::StdClock`])
//! - `defmt`: `defmt::Format` impls on error types for embedded logging

#![cfg_attr(not(feature = "std"), no_std)]
#![deny(missing_docs)]
#![warn(missing_debug_implementations)]

/// Sectioned key-value storage seam consumed by the persisted device state.
///
/// The physical backend (NVS, EEPROM, a file) is out of scope; this module
/// defines the trait and an RAII section guard with typed accessors.
pub mod store;

/// Durable device state: factory identity, user configuration and the
/// persisted flags that parameterize reconnection policy.
pub mod state;

/// The connection state machine, its seam traits (radio, broker, clock)
/// and the cross-task publish queue.
pub mod network;
