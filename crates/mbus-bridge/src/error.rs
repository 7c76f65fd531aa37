use homie_device::PublishError;
use mbus_transport::{Address, AddressParseError, TransportError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PollError {
    #[error("reading address {address} failed: {source}")]
    Transport {
        address: Address,
        #[source]
        source: TransportError,
    },
    #[error("publishing for address {address} failed: {source}")]
    Publish {
        address: Address,
        #[source]
        source: PublishError,
    },
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ScheduleError {
    #[error("invalid cron expression {expr:?}: {reason}")]
    InvalidCron { expr: String, reason: String },
    #[error("poll interval must be greater than zero")]
    ZeroInterval,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    #[error("mbus.bus_addresses must list at least one address")]
    NoAddresses,
    #[error("bus address {0} is listed more than once")]
    DuplicateAddress(Address),
    #[error(transparent)]
    InvalidAddress(#[from] AddressParseError),
    #[error("device id {0:?} must be non-empty lowercase letters, digits and '-'")]
    InvalidDeviceId(String),
    #[error("mbus.replay_dir is required for the replay backend")]
    MissingReplayDir,
    #[error("mbus.timeout_ms and mqtt.publish_timeout_ms must be greater than zero")]
    ZeroTimeout,
    #[error("publish_interval: {0}")]
    InvalidSchedule(#[from] ScheduleError),
}
