use clap::ArgMatches;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use uuid::Uuid;

use crate::modbus::protocol::{is_valid_slave_id, SlaveId, MAX_READ_QUANTITY, MAX_SLAVE_ID, MIN_SLAVE_ID};
use crate::utils::error::ModbusError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub serial: SerialConfig,
    pub master: MasterConfig,
    pub slave: SlaveConfig,
    pub mqtt: MqttConfig,
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    pub port: String,
    pub baud_rate: u32,
    pub parity: ParityConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParityConfig {
    None,
    Even,
    Odd,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MasterConfig {
    pub scan_start: SlaveId,
    pub scan_end: SlaveId,
    pub scan_timeout_ms: u64,
    pub response_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub register_start: u16,
    /// Registers per device per poll; two per float value.
    pub register_count: u16,
    /// Poll these IDs instead of scanning when non-empty.
    pub slave_ids: Vec<SlaveId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlaveConfig {
    pub port: String,
    pub slave_ids: Vec<SlaveId>,
    pub values_per_device: usize,
    pub refresh_interval_ms: u64,
    pub max_value: f32,
    /// Answer out-of-range requests with exception 0x02 instead of staying silent.
    pub exception_responses: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub enabled: bool,
    pub broker: String,
    pub port: u16,
    pub topic: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    pub client_id: String,
    pub qos: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub enabled: bool,
    pub path: String,
    pub max_connections: u32,
    pub busy_timeout_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyV0".to_string(),
            baud_rate: 9600,
            parity: ParityConfig::None,
        }
    }
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            scan_start: MIN_SLAVE_ID,
            scan_end: MAX_SLAVE_ID,
            scan_timeout_ms: 10,
            response_timeout_ms: 1000,
            poll_interval_ms: 3000,
            register_start: 0,
            register_count: 2,
            slave_ids: Vec::new(),
        }
    }
}

impl Default for SlaveConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyV1".to_string(),
            slave_ids: vec![1, 2, 3, 4, 5],
            values_per_device: 1,
            refresh_interval_ms: 5000,
            max_value: 100.0,
            exception_responses: false,
        }
    }
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            broker: "localhost".to_string(),
            port: 1883,
            topic: "v1/devices/me/telemetry".to_string(),
            access_token: None,
            client_id: format!("rs485-master-{}", Uuid::new_v4().simple()),
            qos: 0,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: "data/rs485.db".to_string(),
            max_connections: 4,
            busy_timeout_ms: 30000,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            serial: SerialConfig::default(),
            master: MasterConfig::default(),
            slave: SlaveConfig::default(),
            mqtt: MqttConfig::default(),
            database: DatabaseConfig::default(),
        }
    }
}

impl MasterConfig {
    pub fn scan_timeout(&self) -> Duration {
        Duration::from_millis(self.scan_timeout_ms)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl SlaveConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ModbusError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ModbusError::ConfigError(format!("Cannot read {}: {}", path.display(), e)))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| ModbusError::ConfigError(format!("Invalid config {}: {}", path.display(), e)))?;
        info!("📄 Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ModbusError> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| ModbusError::SerializationError(format!("TOML error: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply deployment overrides from the environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(broker) = lookup("MQTT_BROKER_IP") {
            self.mqtt.broker = broker;
            self.mqtt.enabled = true;
        }
        if let Some(token) = lookup("ACCESS_TOKEN") {
            self.mqtt.access_token = Some(token);
        }
        if let Some(port) = lookup("SERIAL_PORT") {
            self.serial.port = port;
        }
        if let Some(path) = lookup("DATABASE_PATH") {
            self.database.path = path;
            self.database.enabled = true;
        }
    }

    /// Override with command line arguments.
    pub fn apply_matches(&mut self, matches: &ArgMatches) -> Result<(), ModbusError> {
        if let Some(port) = matches.get_one::<String>("port") {
            self.serial.port = port.clone();
        }
        if let Some(baud) = matches.get_one::<String>("baud") {
            self.serial.baud_rate = baud
                .parse()
                .map_err(|_| ModbusError::ConfigError(format!("Invalid baud rate: {}", baud)))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ModbusError> {
        let m = &self.master;
        if !is_valid_slave_id(m.scan_start) || !is_valid_slave_id(m.scan_end) || m.scan_start > m.scan_end {
            return Err(ModbusError::ConfigError(format!(
                "Scan range {}..={} must lie within {}..={}",
                m.scan_start, m.scan_end, MIN_SLAVE_ID, MAX_SLAVE_ID
            )));
        }
        if m.register_count == 0 || m.register_count % 2 != 0 || m.register_count > MAX_READ_QUANTITY {
            return Err(ModbusError::ConfigError(format!(
                "register_count {} must be even and between 2 and {}",
                m.register_count, MAX_READ_QUANTITY
            )));
        }
        if let Some(&bad) = m.slave_ids.iter().chain(&self.slave.slave_ids).find(|id| !is_valid_slave_id(**id)) {
            return Err(ModbusError::InvalidSlaveId(bad));
        }
        if self.slave.values_per_device == 0 || self.slave.values_per_device * 2 > MAX_READ_QUANTITY as usize {
            return Err(ModbusError::ConfigError(format!(
                "values_per_device {} out of range",
                self.slave.values_per_device
            )));
        }
        if self.serial.baud_rate == 0 {
            return Err(ModbusError::ConfigError("baud_rate must be positive".to_string()));
        }
        if m.poll_interval_ms == 0 || self.slave.refresh_interval_ms == 0 {
            return Err(ModbusError::ConfigError("intervals must be positive".to_string()));
        }
        if (m.register_count as usize) > self.slave.values_per_device * 2 {
            warn!(
                "⚠️  Master reads {} registers but simulated devices hold {}",
                m.register_count,
                self.slave.values_per_device * 2
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.serial.baud_rate, 9600);
        assert_eq!(config.master.scan_timeout(), Duration::from_millis(10));
        assert_eq!(config.master.poll_interval(), Duration::from_secs(3));
        assert_eq!(config.slave.refresh_interval(), Duration::from_secs(5));
        assert_eq!(config.mqtt.topic, "v1/devices/me/telemetry");
    }

    #[test]
    fn test_round_trip_through_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("conf").join("rs485.toml");
        let mut config = Config::default();
        config.master.slave_ids = vec![2, 7];
        config.serial.parity = ParityConfig::Even;
        config.save_to_file(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str("[master]\nscan_end = 10\n").unwrap();
        assert_eq!(config.master.scan_end, 10);
        assert_eq!(config.master.scan_start, 1);
        assert_eq!(config.serial.port, "/dev/ttyV0");
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> =
            HashMap::from([("MQTT_BROKER_IP", "10.0.0.5"), ("ACCESS_TOKEN", "secret")]);
        let mut config = Config::default();
        config.apply_overrides(|k| env.get(k).map(|v| v.to_string()));
        assert!(config.mqtt.enabled);
        assert_eq!(config.mqtt.broker, "10.0.0.5");
        assert_eq!(config.mqtt.access_token.as_deref(), Some("secret"));
        assert!(!config.database.enabled);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = Config::default();
        config.master.register_count = 3;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.master.scan_start = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.master.scan_start = 20;
        config.master.scan_end = 10;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.slave.slave_ids = vec![1, 250];
        assert!(matches!(config.validate(), Err(ModbusError::InvalidSlaveId(250))));
    }
}
