//! homie-device: publish devices, nodes and properties following the Homie convention
//!
//! Topic layout is handled here; the transport underneath is a [`Publish`]
//! implementation. [`MemoryPublisher`] records messages in-process, [`MqttPublisher`]
//! (feature `mqtt`) forwards them to a broker through `rumqttc`.

mod types;
pub use types::{DataType, DeviceInfo, DeviceState, PropertyDescriptor};

mod error;
pub use error::{PublishError, Result};

mod traits;
pub use traits::Publish;

mod device;
pub use device::{HomieDevice, Node, PropertyHandle};

mod memory;
pub use memory::{MemoryPublisher, Message};

#[cfg(feature = "mqtt")]
mod mqtt;

#[cfg(feature = "mqtt")]
pub use mqtt::{MqttPublisher, MqttSettings};

/// Homie convention version announced in `$homie`.
pub const HOMIE_VERSION: &str = "4.0.0";
