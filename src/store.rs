use crate::config::{Configuration, MqttSettings, WifiSettings};
use crate::error::StorageError;
use crate::hal::{KeyValueStore, StoredValue};
use crate::selection::AntennaSelection;
use tracing::{debug, warn};

/// Storage keys. Each setting is written independently.
pub mod keys {
    pub const SELECTION: &str = "antenna";
    pub const WIFI_SSID: &str = "wifi_ssid";
    pub const WIFI_PASSWORD: &str = "wifi_pass";
    pub const GATEWAY: &str = "gateway";
    pub const MQTT_ENABLED: &str = "mqtt_enabled";
    pub const MQTT_BROKER: &str = "mqtt_broker";
    pub const MQTT_PORT: &str = "mqtt_port";
    pub const MQTT_USERNAME: &str = "mqtt_user";
    pub const MQTT_PASSWORD: &str = "mqtt_pass";
    pub const MQTT_COMMAND_TOPIC: &str = "mqtt_cmd_topic";
    pub const MQTT_STATE_TOPIC: &str = "mqtt_state_topic";
}

/// Owner of the authoritative selection and configuration.
///
/// Reads never fail: a missing, unreadable or mistyped key yields its
/// default. Writes are synchronous (put then commit); a failed write is
/// logged and the in-memory value still reflects what the hardware does.
#[derive(Debug)]
pub struct StateStore<S> {
    storage: S,
    antenna_count: u8,
    selection: AntennaSelection,
    config: Configuration,
    write_failures: u32,
}

impl<S: KeyValueStore> StateStore<S> {
    /// Wraps `storage` holding defaults; call [`StateStore::load`] to seed
    /// from durable state.
    pub fn new(storage: S, antenna_count: u8) -> Self {
        Self {
            storage,
            antenna_count,
            selection: AntennaSelection::OFF,
            config: Configuration::default(),
            write_failures: 0,
        }
    }

    pub fn load(&mut self) -> (AntennaSelection, Configuration) {
        let defaults = Configuration::default();

        let stored = self.read(keys::SELECTION, 0, |s, k| s.get_int(k));
        let selection = AntennaSelection::coerce(i64::from(stored), self.antenna_count);

        let port = self.read(keys::MQTT_PORT, i32::from(defaults.mqtt.port), |s, k| {
            s.get_int(k)
        });
        let port = u16::try_from(port).unwrap_or(defaults.mqtt.port);

        let mut config = Configuration {
            wifi: WifiSettings {
                ssid: self.read_str(keys::WIFI_SSID, &defaults.wifi.ssid),
                password: self.read_str(keys::WIFI_PASSWORD, &defaults.wifi.password),
            },
            gateway: self.read_str(keys::GATEWAY, &defaults.gateway),
            mqtt: MqttSettings {
                enabled: self.read(keys::MQTT_ENABLED, defaults.mqtt.enabled, |s, k| {
                    s.get_bool(k)
                }),
                broker: self.read_str(keys::MQTT_BROKER, &defaults.mqtt.broker),
                port,
                username: self.read_str(keys::MQTT_USERNAME, &defaults.mqtt.username),
                password: self.read_str(keys::MQTT_PASSWORD, &defaults.mqtt.password),
                command_topic: self
                    .read_str(keys::MQTT_COMMAND_TOPIC, &defaults.mqtt.command_topic),
                state_topic: self.read_str(keys::MQTT_STATE_TOPIC, &defaults.mqtt.state_topic),
            },
        };
        if let Err(e) = config.validate() {
            warn!(error = %e, "stored bus settings invalid, bus disabled");
            config.mqtt.enabled = false;
        }

        self.selection = selection;
        self.config = config.clone();
        debug!(selection = %selection, bus_enabled = config.mqtt.enabled, "state loaded");
        (selection, config)
    }

    fn read<T>(
        &self,
        key: &str,
        default: T,
        get: impl Fn(&S, &str) -> Result<Option<T>, StorageError>,
    ) -> T {
        match get(&self.storage, key) {
            Ok(Some(value)) => value,
            Ok(None) => default,
            Err(e) => {
                debug!(key, error = %e, "storage read failed, using default");
                default
            }
        }
    }

    fn read_str(&self, key: &str, default: &str) -> String {
        self.read(key, default.to_string(), |s, k| s.get_str(k))
    }

    /// Persists only the selection. Returns whether it reached durable storage.
    pub fn save_selection(&mut self, selection: AntennaSelection) -> bool {
        self.selection = selection;
        let result = self
            .storage
            .put(keys::SELECTION, StoredValue::Int(i32::from(selection.value())))
            .and_then(|()| self.storage.commit());
        self.note_write(result, "selection")
    }

    /// Persists the full configuration. Returns whether it reached durable storage.
    pub fn save_configuration(&mut self, config: &Configuration) -> bool {
        self.config = config.clone();

        let entries = [
            (keys::WIFI_SSID, StoredValue::Str(config.wifi.ssid.clone())),
            (
                keys::WIFI_PASSWORD,
                StoredValue::Str(config.wifi.password.clone()),
            ),
            (keys::GATEWAY, StoredValue::Str(config.gateway.clone())),
            (keys::MQTT_ENABLED, StoredValue::Bool(config.mqtt.enabled)),
            (keys::MQTT_BROKER, StoredValue::Str(config.mqtt.broker.clone())),
            (keys::MQTT_PORT, StoredValue::Int(i32::from(config.mqtt.port))),
            (
                keys::MQTT_USERNAME,
                StoredValue::Str(config.mqtt.username.clone()),
            ),
            (
                keys::MQTT_PASSWORD,
                StoredValue::Str(config.mqtt.password.clone()),
            ),
            (
                keys::MQTT_COMMAND_TOPIC,
                StoredValue::Str(config.mqtt.command_topic.clone()),
            ),
            (
                keys::MQTT_STATE_TOPIC,
                StoredValue::Str(config.mqtt.state_topic.clone()),
            ),
        ];

        let mut result = Ok(());
        for (key, value) in entries {
            if let Err(e) = self.storage.put(key, value) {
                result = Err(e);
                break;
            }
        }
        let result = result.and_then(|()| self.storage.commit());
        self.note_write(result, "configuration")
    }

    fn note_write(&mut self, result: Result<(), StorageError>, what: &str) -> bool {
        match result {
            Ok(()) => true,
            Err(e) => {
                self.write_failures = self.write_failures.saturating_add(1);
                warn!(error = %e, "failed to persist {}", what);
                false
            }
        }
    }

    pub fn selection(&self) -> AntennaSelection {
        self.selection
    }

    pub fn configuration(&self) -> &Configuration {
        &self.config
    }

    pub fn antenna_count(&self) -> u8 {
        self.antenna_count
    }

    pub fn write_failures(&self) -> u32 {
        self.write_failures
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }
}
