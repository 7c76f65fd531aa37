//! mbus-bridge: poll M-Bus meters and republish their readings as Homie properties
//!
//! A [`DeviceSession`] binds one bus address to one Homie node. Its first poll creates
//! a property per reported value; later polls only publish new values, scaled by the
//! factors learned from the unit text on the first poll. The [`Scheduler`] runs every
//! session on a recurring schedule and drains them on shutdown before the shared
//! [`TransportHandle`] is closed.

pub mod units;
pub use units::{parse_property_unit, parse_scaled_unit, ParsedUnit, ScaledUnit};

mod cache;
pub use cache::ScaleFactorCache;

pub mod mapper;
pub use mapper::{map_data_records, map_slave_information, MappedValue};

mod error;
pub use error::{ConfigError, PollError, ScheduleError};

mod metrics;
pub use metrics::{BridgeMetrics, MetricsHub};

mod transport;
pub use transport::TransportHandle;

mod session;
pub use session::{node_id, DeviceSession, PollReport};

mod schedule;
pub use schedule::PollSchedule;

mod scheduler;
pub use scheduler::Scheduler;

mod config;
pub use config::{
    load_config_file, BackendKind, BridgeConfig, DeviceSection, MbusSection, MqttSection,
};
