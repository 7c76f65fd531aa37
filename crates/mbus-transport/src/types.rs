use core::fmt;
use core::str::FromStr;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use time::OffsetDateTime;

/// Primary (0..=250) or secondary (16 hex digits) slave address
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Address {
    Primary(u8),
    Secondary(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AddressParseError {
    #[error("primary address {0} is outside 0..=250")]
    PrimaryOutOfRange(u8),
    #[error("secondary address must be 16 hex digits, got {0:?}")]
    MalformedSecondary(String),
}

impl Address {
    pub const MAX_PRIMARY: u8 = 250;

    pub fn primary(addr: u8) -> Option<Self> {
        (addr <= Self::MAX_PRIMARY).then_some(Self::Primary(addr))
    }

    pub fn validate(&self) -> Result<(), AddressParseError> {
        match self {
            Self::Primary(a) if *a > Self::MAX_PRIMARY => {
                Err(AddressParseError::PrimaryOutOfRange(*a))
            }
            Self::Primary(_) => Ok(()),
            Self::Secondary(s) => {
                if s.len() == 16 && s.chars().all(|c| c.is_ascii_hexdigit()) {
                    Ok(())
                } else {
                    Err(AddressParseError::MalformedSecondary(s.clone()))
                }
            }
        }
    }
}

impl FromStr for Address {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let t = s.trim();
        let addr = match t.parse::<u8>() {
            Ok(a) => Self::Primary(a),
            Err(_) => Self::Secondary(t.to_ascii_uppercase()),
        };
        addr.validate()?;
        Ok(addr)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary(a) => write!(f, "{a}"),
            Self::Secondary(s) => write!(f, "{}", s.to_ascii_uppercase()),
        }
    }
}

/// A scalar value as delivered by the meter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    /// True for integers and for floats without a fractional part.
    pub fn is_whole(&self) -> bool {
        match self {
            Self::Integer(_) => true,
            Self::Float(v) => v.is_finite() && v.fract() == 0.0,
            Self::Text(_) => false,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::Text(_) => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<i32> for Scalar {
    fn from(v: i32) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<u32> for Scalar {
    fn from(v: u32) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Scalar {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Scalar {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

/// One measurement slot of a reading. `id` is stable across polls of the same meter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataRecord {
    pub id: u32,
    #[serde(rename = "Value")]
    pub value: Scalar,
    #[serde(rename = "Unit", default)]
    pub unit: String,
    #[serde(rename = "Function", default, skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
    #[serde(rename = "StorageNumber", default, skip_serializing_if = "Option::is_none")]
    pub storage_number: Option<u32>,
    #[serde(rename = "Timestamp", default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl DataRecord {
    pub fn new(id: u32, value: impl Into<Scalar>, unit: &str) -> Self {
        Self {
            id,
            value: value.into(),
            unit: unit.to_string(),
            function: None,
            storage_number: None,
            timestamp: None,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Timestamp(pub OffsetDateTime);

/// Result of one poll of one slave
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    #[serde(
        rename = "SlaveInformation",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub slave_information: Option<BTreeMap<String, Scalar>>,
    #[serde(
        rename = "DataRecord",
        alias = "DataRecordList",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub data_records: Option<Vec<DataRecord>>,
    #[serde(skip)]
    pub received_at: Option<Timestamp>,
}

impl Reading {
    pub fn with_info(mut self, name: &str, value: impl Into<Scalar>) -> Self {
        self.slave_information
            .get_or_insert_with(BTreeMap::new)
            .insert(name.to_string(), value.into());
        self
    }

    pub fn with_record(mut self, record: DataRecord) -> Self {
        self.data_records.get_or_insert_with(Vec::new).push(record);
        self
    }

    pub fn stamped_now(mut self) -> Self {
        self.received_at = Some(Timestamp(OffsetDateTime::now_utc()));
        self
    }
}
