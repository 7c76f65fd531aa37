use crate::error::ConfigError;
use crate::schedule::PollSchedule;
use anyhow::Context;
use homie_device::DeviceInfo;
use mbus_transport::Address;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub device: DeviceSection,
    pub mbus: MbusSection,
    #[serde(default)]
    pub mqtt: MqttSection,
    pub publish_interval: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceSection {
    pub id: String,
    pub name: String,
}

impl Default for DeviceSection {
    fn default() -> Self {
        Self {
            id: "mbus-to-mqtt-homie".to_string(),
            name: "MBus to MQTT Homie Bridge".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    #[default]
    Mock,
    Replay,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MbusSection {
    #[serde(default)]
    pub backend: BackendKind,
    #[serde(default)]
    pub replay_dir: Option<PathBuf>,
    #[serde(default)]
    pub serial_port: Option<String>,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    pub bus_addresses: Vec<Address>,
}

fn default_baud_rate() -> u32 {
    2400
}

fn default_timeout_ms() -> u64 {
    10_000
}

impl MbusSection {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttSection {
    pub host: String,
    pub port: u16,
    pub client_id: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub base_topic: String,
    pub keep_alive_secs: u64,
    pub publish_timeout_ms: u64,
}

impl Default for MqttSection {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            client_id: None,
            username: None,
            password: None,
            base_topic: "homie".to_string(),
            keep_alive_secs: 30,
            publish_timeout_ms: 5_000,
        }
    }
}

impl BridgeConfig {
    pub fn from_yaml_str(raw: &str) -> anyhow::Result<Self> {
        serde_yaml::from_str(raw).context("decoding bridge config")
    }

    /// Check everything that must hold before any connection is opened and return the
    /// parsed poll schedule.
    pub fn validate(&self) -> Result<PollSchedule, ConfigError> {
        let id = &self.device.id;
        let id_ok = !id.is_empty()
            && !id.starts_with('-')
            && id
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
        if !id_ok {
            return Err(ConfigError::InvalidDeviceId(id.clone()));
        }

        if self.mbus.bus_addresses.is_empty() {
            return Err(ConfigError::NoAddresses);
        }
        let mut seen = HashSet::new();
        for addr in &self.mbus.bus_addresses {
            addr.validate()?;
            if !seen.insert(addr.to_string()) {
                return Err(ConfigError::DuplicateAddress(addr.clone()));
            }
        }

        if self.mbus.backend == BackendKind::Replay && self.mbus.replay_dir.is_none() {
            return Err(ConfigError::MissingReplayDir);
        }
        if self.mbus.timeout_ms == 0 || self.mqtt.publish_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout);
        }

        Ok(PollSchedule::parse(&self.publish_interval)?)
    }

    pub fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            id: self.device.id.clone(),
            name: self.device.name.clone(),
            base_topic: self.mqtt.base_topic.clone(),
        }
    }
}

/// Read, decode and validate a YAML config file.
pub fn load_config_file(path: impl AsRef<Path>) -> anyhow::Result<(BridgeConfig, PollSchedule)> {
    let path = path.as_ref();
    let raw =
        fs::read_to_string(path).with_context(|| format!("reading config: {}", path.display()))?;
    let config: BridgeConfig = serde_yaml::from_str(&raw)
        .with_context(|| format!("parsing yaml: {}", path.display()))?;
    let schedule = config
        .validate()
        .with_context(|| format!("validating config: {}", path.display()))?;
    Ok((config, schedule))
}
