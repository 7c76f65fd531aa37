use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};

#[derive(Clone)]
pub struct BridgeMetrics {
    pub readings: IntCounter,
    pub read_errors: IntCounter,
    pub values_published: IntCounter,
    pub lookup_misses: IntCounter,
    pub devices: IntGauge,
}

#[derive(Clone)]
pub struct MetricsHub {
    pub registry: Registry,
    pub bridge: BridgeMetrics,
}

impl MetricsHub {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();
        let bridge = BridgeMetrics {
            readings: IntCounter::new("mbus_readings_total", "Successful M-Bus readings")?,
            read_errors: IntCounter::new("mbus_read_errors_total", "Failed M-Bus readings")?,
            values_published: IntCounter::new(
                "homie_values_published_total",
                "Property values published",
            )?,
            lookup_misses: IntCounter::new(
                "homie_property_lookup_misses_total",
                "Values dropped because their property was never created",
            )?,
            devices: IntGauge::new("mbus_devices", "Number of polled bus addresses")?,
        };
        registry.register(Box::new(bridge.readings.clone()))?;
        registry.register(Box::new(bridge.read_errors.clone()))?;
        registry.register(Box::new(bridge.values_published.clone()))?;
        registry.register(Box::new(bridge.lookup_misses.clone()))?;
        registry.register(Box::new(bridge.devices.clone()))?;
        Ok(Self { registry, bridge })
    }

    pub fn encode_text(&self) -> String {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buf) {
            return format!("error encoding metrics: {e}");
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_exposition_lists_counters() {
        let hub = MetricsHub::new().unwrap();
        hub.bridge.readings.inc();
        hub.bridge.devices.set(2);
        let text = hub.encode_text();
        assert!(text.contains("mbus_readings_total 1"));
        assert!(text.contains("mbus_devices 2"));
        assert!(text.contains("homie_property_lookup_misses_total 0"));
    }
}
