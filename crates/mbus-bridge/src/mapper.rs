//! Turns one reading into property keys, descriptors and values.

use crate::cache::ScaleFactorCache;
use crate::units::{parse_property_unit, parse_scaled_unit};
use homie_device::{DataType, PropertyDescriptor};
use mbus_transport::{DataRecord, Scalar};
use std::collections::BTreeMap;

/// One value to publish. `descriptor` is set only when the property has to be created.
#[derive(Debug, Clone, PartialEq)]
pub struct MappedValue {
    pub key: String,
    pub descriptor: Option<PropertyDescriptor>,
    pub value: Scalar,
}

pub fn information_key(name: &str) -> String {
    format!("information/{name}")
}

pub fn data_record_key(id: u32) -> String {
    format!("datarecord/id-{id}")
}

fn inferred_type(value: &Scalar) -> DataType {
    if value.is_whole() {
        DataType::Integer
    } else {
        DataType::String
    }
}

pub fn map_slave_information(info: &BTreeMap<String, Scalar>) -> Vec<MappedValue> {
    info.iter()
        .map(|(name, value)| {
            let key = information_key(name);
            MappedValue {
                descriptor: Some(PropertyDescriptor {
                    key: key.clone(),
                    display_name: name.clone(),
                    data_type: inferred_type(value),
                    unit: None,
                }),
                key,
                value: value.clone(),
            }
        })
        .collect()
}

/// Map data records in input order.
///
/// On the first poll each record's unit text is parsed, its scale factor (if any)
/// recorded in `cache` and a descriptor produced. Later polls only apply the cached
/// factor to the raw value.
pub fn map_data_records(
    records: &[DataRecord],
    cache: &mut ScaleFactorCache,
    first_poll: bool,
) -> Vec<MappedValue> {
    records
        .iter()
        .map(|record| {
            let descriptor = first_poll.then(|| describe_record(record, cache));
            MappedValue {
                key: data_record_key(record.id),
                descriptor,
                value: cache.apply(record.id, &record.value),
            }
        })
        .collect()
}

fn describe_record(record: &DataRecord, cache: &mut ScaleFactorCache) -> PropertyDescriptor {
    let parsed = parse_property_unit(&record.unit);
    let (data_type, unit) = match parsed.annotation.as_deref().map(parse_scaled_unit) {
        Some(scaled) => match scaled.scale_factor {
            Some(factor) => {
                cache.record(record.id, factor);
                (DataType::Float, Some(scaled.unit))
            }
            None => (inferred_type(&record.value), Some(scaled.unit)),
        },
        None => (inferred_type(&record.value), None),
    };
    PropertyDescriptor {
        key: data_record_key(record.id),
        display_name: parsed.display_name,
        data_type,
        unit,
    }
}
