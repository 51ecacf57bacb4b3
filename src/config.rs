use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use static_assertions::const_assert;

pub const DEFAULT_MQTT_PORT: u16 = 1883;
pub const DEFAULT_COMMAND_TOPIC: &str = "flexpilot/antennaSwitch/cmd";
pub const DEFAULT_STATE_TOPIC: &str = "flexpilot/antennaSwitch/state";
pub const DEFAULT_GATEWAY: &str = "192.168.1.1";
pub const DEFAULT_HOSTNAME: &str = "flexpilot-switch";
pub const DEFAULT_CLIENT_ID: &str = "esp32-antenna-switch";

pub const RELAY_SETTLE_MS: u32 = 20;
pub const HEALTH_CHECK_INTERVAL_MS: u64 = 30_000;
pub const WIFI_MAX_RECONNECT_ATTEMPTS: u8 = 10;
pub const PROBE_TIMEOUT_MS: u64 = 1_000;
// 40 polls of 200ms each
pub const WIFI_CONNECT_TIMEOUT_MS: u64 = 8_000;
pub const MQTT_CONNECT_TIMEOUT_MS: u64 = 5_000;

pub const MAX_FIELD_LEN: usize = 128;

const_assert!(WIFI_MAX_RECONNECT_ATTEMPTS > 0);
const_assert!(HEALTH_CHECK_INTERVAL_MS > PROBE_TIMEOUT_MS);

/// Station credentials for the wireless network
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WifiSettings {
    pub ssid: String,
    pub password: String,
}

/// Message bus session settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttSettings {
    pub enabled: bool,
    pub broker: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub command_topic: String,
    pub state_topic: String,
}

impl Default for MqttSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            broker: String::new(),
            port: DEFAULT_MQTT_PORT,
            username: String::new(),
            password: String::new(),
            command_topic: DEFAULT_COMMAND_TOPIC.to_string(),
            state_topic: DEFAULT_STATE_TOPIC.to_string(),
        }
    }
}

impl MqttSettings {
    /// A session is only ever attempted when enabled with a broker address.
    pub fn is_active(&self) -> bool {
        self.enabled && !self.broker.trim().is_empty()
    }

    /// Credentials to present, `None` for an anonymous session.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        if self.username.is_empty() {
            None
        } else {
            Some((self.username.as_str(), self.password.as_str()))
        }
    }
}

/// Runtime configuration, persisted alongside the selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    pub wifi: WifiSettings,
    /// Address probed by the connectivity supervisor
    pub gateway: String,
    pub mqtt: MqttSettings,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            wifi: WifiSettings::default(),
            gateway: DEFAULT_GATEWAY.to_string(),
            mqtt: MqttSettings::default(),
        }
    }
}

/// What a configuration save affects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConfigChange {
    /// Network identity or secret changed; takes effect after a restart
    pub restart_required: bool,
    /// Bus settings changed; the session is rebuilt immediately
    pub bus_changed: bool,
    pub gateway_changed: bool,
}

impl ConfigChange {
    pub fn is_empty(&self) -> bool {
        !(self.restart_required || self.bus_changed || self.gateway_changed)
    }
}

impl Configuration {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fields: [(&'static str, &str); 8] = [
            ("ssid", &self.wifi.ssid),
            ("wifi password", &self.wifi.password),
            ("gateway", &self.gateway),
            ("broker", &self.mqtt.broker),
            ("mqtt username", &self.mqtt.username),
            ("mqtt password", &self.mqtt.password),
            ("command topic", &self.mqtt.command_topic),
            ("state topic", &self.mqtt.state_topic),
        ];
        for (field, value) in fields {
            if value.len() > MAX_FIELD_LEN {
                return Err(ConfigError::TooLong {
                    field,
                    max: MAX_FIELD_LEN,
                });
            }
        }

        if !self.mqtt.enabled {
            return Ok(());
        }

        if self.mqtt.port == 0 {
            return Err(ConfigError::InvalidPort);
        }

        for (which, topic) in [
            ("command", &self.mqtt.command_topic),
            ("state", &self.mqtt.state_topic),
        ] {
            if topic.trim().is_empty() {
                return Err(ConfigError::EmptyTopic(which));
            }
            if topic.contains(['+', '#']) {
                return Err(ConfigError::WildcardTopic {
                    which,
                    topic: topic.clone(),
                });
            }
        }

        // The device would receive its own retained state as a command.
        if self.mqtt.command_topic.trim() == self.mqtt.state_topic.trim() {
            return Err(ConfigError::SharedTopic(self.mqtt.command_topic.clone()));
        }

        Ok(())
    }

    pub fn classify_change(&self, next: &Configuration) -> ConfigChange {
        ConfigChange {
            restart_required: self.wifi != next.wifi,
            bus_changed: self.mqtt != next.mqtt,
            gateway_changed: self.gateway != next.gateway,
        }
    }
}

/// Fixed device parameters, not persisted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSettings {
    pub active_high: bool,
    pub settle_ms: u32,
    pub check_interval_ms: u64,
    pub failure_ceiling: u8,
    pub probe_timeout_ms: u64,
    pub reconnect_timeout_ms: u64,
    pub bus_connect_timeout_ms: u64,
    pub hostname: String,
    pub client_id: String,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            active_high: true,
            settle_ms: RELAY_SETTLE_MS,
            check_interval_ms: HEALTH_CHECK_INTERVAL_MS,
            failure_ceiling: WIFI_MAX_RECONNECT_ATTEMPTS,
            probe_timeout_ms: PROBE_TIMEOUT_MS,
            reconnect_timeout_ms: WIFI_CONNECT_TIMEOUT_MS,
            bus_connect_timeout_ms: MQTT_CONNECT_TIMEOUT_MS,
            hostname: DEFAULT_HOSTNAME.to_string(),
            client_id: DEFAULT_CLIENT_ID.to_string(),
        }
    }
}
