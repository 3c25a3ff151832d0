//! # Durable device state
//!
//! [`DeviceState`] is the single durable record of the device, split into
//! three store sections with different ownership rules:
//!
//! - **`factory`**: identity programmed at manufacture. Loaded read-only
//!   at boot, never mutated by the connection machinery. [`DeviceState::save_factory`]
//!   exists for provisioning tooling only.
//! - **`user`**: configuration entered through the setup wizard (names,
//!   credentials, broker address, button labels). The connectivity core
//!   reads it at the start of each connection attempt but never writes it.
//! - **`persisted`**: the runtime flags that drive reconnection policy and
//!   pending one-shot actions across reboots and deep-sleep cycles. These
//!   fields are owned by the network task while it runs.
//!
//! The record is loaded once at boot, mutated in memory, and flushed on the
//! explicit `save_*` calls, never implicitly, to bound flash write wear.
//! Key names and defaults are a compatibility surface: changing either
//! changes behavior for already-deployed units.

use core::fmt::Write as _;

use heapless::String;

use crate::store::{KvStore, KvStoreExt, truncated};

/// Number of hardware buttons with user-assignable labels.
pub const NUM_BUTTONS: usize = 6;

/// Default broker port applied when `mqtt_port` is absent.
pub const MQTT_PORT_DFLT: u16 = 1883;
/// Default base topic applied when `base_topic` is absent.
pub const BASE_TOPIC_DFLT: &str = "devices";
/// Default discovery prefix applied when `disc_prefix` is absent.
pub const DISCOVERY_PREFIX_DFLT: &str = "homeassistant";
/// Default sensor polling interval in minutes.
pub const SENSOR_INTERVAL_DFLT: u32 = 10;
/// Default button labels applied when `btnN_txt` keys are absent.
pub const BTN_LABEL_DFLTS: [&str; NUM_BUTTONS] = ["B1", "B2", "B3", "B4", "B5", "B6"];

const SECTION_FACTORY: &str = "factory";
const SECTION_USER: &str = "user";
const SECTION_PERSISTED: &str = "persisted";

const BTN_LABEL_KEYS: [&str; NUM_BUTTONS] = [
    "btn1_txt", "btn2_txt", "btn3_txt", "btn4_txt", "btn5_txt", "btn6_txt",
];

/// Identity programmed at manufacture, immutable at runtime.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FactoryIdentity {
    /// Device serial number.
    pub serial_number: String<32>,
    /// Random id assigned at provisioning, used in default naming.
    pub random_id: String<16>,
    /// Human-readable model name.
    pub model_name: String<32>,
    /// Short model identifier.
    pub model_id: String<16>,
    /// Hardware revision.
    pub hw_version: String<16>,
    /// Globally unique id, used as the broker client id.
    pub unique_id: String<40>,
}

/// Broker connection settings within [`UserConfig`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MqttSettings {
    /// Broker host name or address.
    pub server: String<64>,
    /// Broker TCP port.
    pub port: u16,
    /// Broker username, empty for anonymous access.
    pub user: String<64>,
    /// Broker password.
    pub password: String<64>,
    /// Base topic under which the device publishes.
    pub base_topic: String<64>,
    /// Prefix for broker auto-discovery metadata.
    pub discovery_prefix: String<64>,
}

/// User-entered configuration, owned by the application/setup layer.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UserConfig {
    /// Display name, defaults to a factory-derived string.
    pub device_name: String<64>,
    /// Wi-Fi network name.
    pub wifi_ssid: String<32>,
    /// Wi-Fi passphrase.
    pub wifi_password: String<64>,
    /// Broker connection settings.
    pub mqtt: MqttSettings,
    /// Sensor polling interval in minutes.
    pub sensor_interval: u32,
    btn_labels: [String<20>; NUM_BUTTONS],
}

/// Persisted runtime flags: reconnection policy plus UI/lifecycle
/// bookkeeping stored in the same durable record.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PersistedFlags {
    /// Device is operating in the low-battery regime.
    pub low_batt_mode: bool,
    /// Wi-Fi provisioning has completed at least once.
    pub wifi_done: bool,
    /// Full setup has completed at least once.
    pub setup_done: bool,
    /// Software version active on the previous boot.
    pub last_sw_ver: String<16>,
    /// Device is in user-awake (interactive) mode.
    pub user_awake_mode: bool,
    /// Eligible for fast re-association from cached radio parameters.
    pub wifi_quick_connect: bool,
    /// Charge-complete screen is currently displayed.
    pub charge_complete_showing: bool,
    /// Info screen is currently displayed.
    pub info_screen_showing: bool,
    /// Request an extra liveness check on the next cycle.
    pub check_connection: bool,
    /// Consecutive unsuccessful connection cycles; reset on full success.
    pub failed_connections: u32,
    /// One-shot: reboot into Wi-Fi setup.
    pub restart_to_wifi_setup: bool,
    /// One-shot: reboot into full setup.
    pub restart_to_setup: bool,
    /// Discovery metadata must be (re)published once connected.
    pub send_discovery_config: bool,
    /// One-shot: restart without user-visible feedback.
    pub silent_restart: bool,
}

/// The durable device record bound to its preference store.
///
/// Construct with [`DeviceState::new`], then [`load_all`](Self::load_all)
/// once at boot. All mutation happens on the in-memory copy; `save_*`
/// flushes a section back to the store.
#[derive(Debug)]
pub struct DeviceState<S: KvStore> {
    store: S,
    factory: FactoryIdentity,
    user: UserConfig,
    persisted: PersistedFlags,
}

impl<S: KvStore> DeviceState<S> {
    /// Bind a device record to its preference store. The in-memory record
    /// starts zeroed; call [`load_all`](Self::load_all) before use.
    pub fn new(store: S) -> Self {
        Self {
            store,
            factory: FactoryIdentity::default(),
            user: UserConfig::default(),
            persisted: PersistedFlags::default(),
        }
    }

    /// Factory identity (read-only).
    pub fn factory(&self) -> &FactoryIdentity {
        &self.factory
    }

    /// Mutable factory identity, for provisioning tooling only.
    pub fn factory_mut(&mut self) -> &mut FactoryIdentity {
        &mut self.factory
    }

    /// User configuration.
    pub fn user(&self) -> &UserConfig {
        &self.user
    }

    /// Mutable user configuration, for the setup/provisioning layer.
    pub fn user_mut(&mut self) -> &mut UserConfig {
        &mut self.user
    }

    /// Persisted flags.
    pub fn persisted(&self) -> &PersistedFlags {
        &self.persisted
    }

    /// Mutable persisted flags. While the network task runs it owns the
    /// policy fields; application code must not race writes to them.
    pub fn persisted_mut(&mut self) -> &mut PersistedFlags {
        &mut self.persisted
    }

    /// Load factory identity from the `factory` section.
    pub fn load_factory(&mut self) -> Result<(), S::Error> {
        let Self { store, factory, .. } = self;
        let mut sec = store.section(SECTION_FACTORY, true)?;
        factory.serial_number = sec.get_string("serial_number", "")?;
        factory.random_id = sec.get_string("random_id", "")?;
        factory.model_name = sec.get_string("model_name", "")?;
        factory.model_id = sec.get_string("model_id", "")?;
        factory.hw_version = sec.get_string("hw_version", "")?;
        factory.unique_id = sec.get_string("unique_id", "")?;
        Ok(())
    }

    /// Write factory identity. Provisioning tooling only; the runtime
    /// never calls this.
    pub fn save_factory(&mut self) -> Result<(), S::Error> {
        let Self { store, factory, .. } = self;
        let mut sec = store.section(SECTION_FACTORY, false)?;
        sec.put_str("serial_number", &factory.serial_number)?;
        sec.put_str("random_id", &factory.random_id)?;
        sec.put_str("model_name", &factory.model_name)?;
        sec.put_str("model_id", &factory.model_id)?;
        sec.put_str("hw_version", &factory.hw_version)?;
        sec.put_str("unique_id", &factory.unique_id)?;
        Ok(())
    }

    /// Erase the `factory` section.
    pub fn clear_factory(&mut self) -> Result<(), S::Error> {
        self.store.section(SECTION_FACTORY, false)?.wipe()
    }

    /// Load user configuration, applying documented defaults for absent
    /// keys.
    pub fn load_user(&mut self) -> Result<(), S::Error> {
        let default_name = default_device_name(&self.factory);
        let Self { store, user, .. } = self;
        let mut sec = store.section(SECTION_USER, true)?;
        user.device_name = sec.get_string("device_name", &default_name)?;
        user.wifi_ssid = sec.get_string("wifi_ssid", "")?;
        user.wifi_password = sec.get_string("wifi_pass", "")?;
        user.mqtt.server = sec.get_string("mqtt_srv", "")?;
        user.mqtt.port = sec.get_u32("mqtt_port", u32::from(MQTT_PORT_DFLT))? as u16;
        user.mqtt.user = sec.get_string("mqtt_user", "")?;
        user.mqtt.password = sec.get_string("mqtt_pass", "")?;
        user.mqtt.base_topic = sec.get_string("base_topic", BASE_TOPIC_DFLT)?;
        user.mqtt.discovery_prefix = sec.get_string("disc_prefix", DISCOVERY_PREFIX_DFLT)?;
        for (i, key) in BTN_LABEL_KEYS.iter().enumerate() {
            user.btn_labels[i] = sec.get_string(key, BTN_LABEL_DFLTS[i])?;
        }
        user.sensor_interval = sec.get_u32("sen_itv", SENSOR_INTERVAL_DFLT)?;
        Ok(())
    }

    /// Flush user configuration to the `user` section.
    pub fn save_user(&mut self) -> Result<(), S::Error> {
        let Self { store, user, .. } = self;
        let mut sec = store.section(SECTION_USER, false)?;
        sec.put_str("device_name", &user.device_name)?;
        sec.put_str("wifi_ssid", &user.wifi_ssid)?;
        sec.put_str("wifi_pass", &user.wifi_password)?;
        sec.put_str("mqtt_srv", &user.mqtt.server)?;
        sec.put_u32("mqtt_port", u32::from(user.mqtt.port))?;
        sec.put_str("mqtt_user", &user.mqtt.user)?;
        sec.put_str("mqtt_pass", &user.mqtt.password)?;
        sec.put_str("base_topic", &user.mqtt.base_topic)?;
        sec.put_str("disc_prefix", &user.mqtt.discovery_prefix)?;
        for (i, key) in BTN_LABEL_KEYS.iter().enumerate() {
            sec.put_str(key, &user.btn_labels[i])?;
        }
        sec.put_u32("sen_itv", user.sensor_interval)?;
        Ok(())
    }

    /// Erase the `user` section.
    pub fn clear_user(&mut self) -> Result<(), S::Error> {
        self.store.section(SECTION_USER, false)?.wipe()
    }

    /// Load persisted flags, defaulting each to its zero value.
    pub fn load_persisted(&mut self) -> Result<(), S::Error> {
        let Self {
            store, persisted, ..
        } = self;
        let mut sec = store.section(SECTION_PERSISTED, true)?;
        persisted.low_batt_mode = sec.get_bool("lb_mode", false)?;
        persisted.wifi_done = sec.get_bool("wifi_done", false)?;
        persisted.setup_done = sec.get_bool("setup_done", false)?;
        persisted.last_sw_ver = sec.get_string("last_sw", "")?;
        persisted.user_awake_mode = sec.get_bool("u_awake", false)?;
        persisted.wifi_quick_connect = sec.get_bool("wifi_qc", false)?;
        persisted.charge_complete_showing = sec.get_bool("chg_cpt_shwn", false)?;
        persisted.info_screen_showing = sec.get_bool("info_shwn", false)?;
        persisted.check_connection = sec.get_bool("chk_conn", false)?;
        persisted.failed_connections = sec.get_u32("faild_cons", 0)?;
        persisted.restart_to_wifi_setup = sec.get_bool("rst_to_w_stp", false)?;
        persisted.restart_to_setup = sec.get_bool("rst_to_stp", false)?;
        persisted.send_discovery_config = sec.get_bool("send_adisc", false)?;
        persisted.silent_restart = sec.get_bool("silent_rst", false)?;
        Ok(())
    }

    /// Flush persisted flags to the `persisted` section.
    pub fn save_persisted(&mut self) -> Result<(), S::Error> {
        let Self {
            store, persisted, ..
        } = self;
        let mut sec = store.section(SECTION_PERSISTED, false)?;
        sec.put_bool("lb_mode", persisted.low_batt_mode)?;
        sec.put_bool("wifi_done", persisted.wifi_done)?;
        sec.put_bool("setup_done", persisted.setup_done)?;
        sec.put_str("last_sw", &persisted.last_sw_ver)?;
        sec.put_bool("u_awake", persisted.user_awake_mode)?;
        sec.put_bool("wifi_qc", persisted.wifi_quick_connect)?;
        sec.put_bool("chg_cpt_shwn", persisted.charge_complete_showing)?;
        sec.put_bool("info_shwn", persisted.info_screen_showing)?;
        sec.put_bool("chk_conn", persisted.check_connection)?;
        sec.put_u32("faild_cons", persisted.failed_connections)?;
        sec.put_bool("rst_to_w_stp", persisted.restart_to_wifi_setup)?;
        sec.put_bool("rst_to_stp", persisted.restart_to_setup)?;
        sec.put_bool("send_adisc", persisted.send_discovery_config)?;
        sec.put_bool("silent_rst", persisted.silent_restart)?;
        Ok(())
    }

    /// Erase the `persisted` section.
    pub fn clear_persisted(&mut self) -> Result<(), S::Error> {
        self.store.section(SECTION_PERSISTED, false)?.wipe()
    }

    /// Reset the one-shot/ephemeral flags to their defaults and persist
    /// immediately. Identity, user configuration, `wifi_done`,
    /// `setup_done`, `last_sw_ver`, `user_awake_mode` and `low_batt_mode`
    /// are untouched.
    pub fn clear_persisted_flags(&mut self) -> Result<(), S::Error> {
        self.persisted.wifi_quick_connect = false;
        self.persisted.charge_complete_showing = false;
        self.persisted.info_screen_showing = false;
        self.persisted.check_connection = false;
        self.persisted.failed_connections = 0;
        self.persisted.restart_to_wifi_setup = false;
        self.persisted.restart_to_setup = false;
        self.persisted.silent_restart = false;
        self.save_all()
    }

    /// Flush user configuration and persisted flags together. Callers must
    /// not assume the two sections land atomically.
    pub fn save_all(&mut self) -> Result<(), S::Error> {
        log::debug!("state: save all");
        self.save_user()?;
        self.save_persisted()
    }

    /// Load every section. Factory identity loads first so user defaults
    /// can derive from it.
    pub fn load_all(&mut self) -> Result<(), S::Error> {
        log::debug!("state: load all");
        self.load_factory()?;
        self.load_user()?;
        self.load_persisted()
    }

    /// Erase user configuration and persisted flags, leaving factory
    /// identity intact.
    pub fn clear_all(&mut self) -> Result<(), S::Error> {
        log::debug!("state: clear all");
        self.clear_user()?;
        self.clear_persisted()
    }
}

impl UserConfig {
    /// Button label at `index`, or the empty string out of range.
    pub fn btn_label(&self, index: usize) -> &str {
        if index < NUM_BUTTONS {
            &self.btn_labels[index]
        } else {
            ""
        }
    }

    /// Set the button label at `index`, truncating to capacity. Silently
    /// ignores out-of-range indices.
    pub fn set_btn_label(&mut self, index: usize, label: &str) {
        if index < NUM_BUTTONS {
            self.btn_labels[index] = truncated(label);
        }
    }
}

/// Default display name: model name plus random id, e.g. `"Button Mk2 a3f9"`.
fn default_device_name(factory: &FactoryIdentity) -> String<64> {
    let model = if factory.model_name.is_empty() {
        "Device"
    } else {
        &factory.model_name
    };
    let mut name = String::new();
    if factory.random_id.is_empty() {
        let _ = name.push_str(model);
    } else {
        let _ = write!(name, "{} {}", model, factory.random_id);
    }
    name
}
