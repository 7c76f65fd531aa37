use core::fmt;

/// Homie `$datatype` of a property
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum DataType {
    Integer,
    Float,
    String,
}

impl DataType {
    pub fn as_str(self) -> &'static str {
        match self {
            DataType::Integer => "integer",
            DataType::Float => "float",
            DataType::String => "string",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attributes fixed when a property is created
#[derive(Clone, Debug, PartialEq)]
pub struct PropertyDescriptor {
    pub key: String,
    pub display_name: String,
    pub data_type: DataType,
    pub unit: Option<String>,
}

/// Device lifecycle as announced in `$state`
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DeviceState {
    Init,
    Ready,
    Disconnected,
    Lost,
}

impl DeviceState {
    pub fn as_str(self) -> &'static str {
        match self {
            DeviceState::Init => "init",
            DeviceState::Ready => "ready",
            DeviceState::Disconnected => "disconnected",
            DeviceState::Lost => "lost",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceInfo {
    pub id: String,
    pub name: String,
    pub base_topic: String,
}

impl DeviceInfo {
    /// `<base>/<device-id>`
    pub fn topic(&self) -> String {
        format!("{}/{}", self.base_topic.trim_end_matches('/'), self.id)
    }

    pub fn state_topic(&self) -> String {
        format!("{}/$state", self.topic())
    }
}
