use crate::cache::ScaleFactorCache;
use crate::error::PollError;
use crate::mapper::{map_data_records, map_slave_information, MappedValue};
use crate::metrics::BridgeMetrics;
use crate::transport::TransportHandle;
use homie_device::{HomieDevice, Node};
use mbus_transport::{Address, Reading, Timestamp};
use tracing::{debug, error, info};

/// Counts from one poll.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollReport {
    pub created: usize,
    pub published: usize,
    pub skipped: usize,
}

/// Binds one bus address to one Homie node.
///
/// The first successful poll creates a property per slave information entry and per
/// data record id; later polls only publish values to those properties.
pub struct DeviceSession {
    address: Address,
    node: Node,
    transport: TransportHandle,
    cache: ScaleFactorCache,
    first_poll_done: bool,
    last_reading_at: Option<Timestamp>,
    metrics: BridgeMetrics,
}

impl DeviceSession {
    pub fn new(
        address: Address,
        device: &HomieDevice,
        transport: TransportHandle,
        metrics: BridgeMetrics,
    ) -> Self {
        let node = device.node(&node_id(&address), &format!("Bus address {address}"));
        Self {
            address,
            node,
            transport,
            cache: ScaleFactorCache::new(),
            first_poll_done: false,
            last_reading_at: None,
            metrics,
        }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    pub fn cache(&self) -> &ScaleFactorCache {
        &self.cache
    }

    pub fn has_completed_first_poll(&self) -> bool {
        self.first_poll_done
    }

    /// When the master last answered this address.
    pub fn last_reading_at(&self) -> Option<Timestamp> {
        self.last_reading_at
    }

    /// Scheduled work: create properties until a first poll succeeds, refresh after.
    pub async fn tick(&mut self) -> Result<PollReport, PollError> {
        if self.first_poll_done {
            self.refresh().await
        } else {
            info!(address = %self.address, "retrying property creation");
            self.first_poll().await
        }
    }

    /// Read the device and create and publish every property it reports.
    ///
    /// A failed read leaves the session untouched.
    pub async fn first_poll(&mut self) -> Result<PollReport, PollError> {
        let reading = self.read().await?;
        info!(
            address = %self.address,
            records = reading.data_records.as_ref().map_or(0, Vec::len),
            "received M-Bus reading"
        );

        let mut report = PollReport::default();
        for mapped in self.map(&reading, true) {
            let MappedValue {
                key,
                descriptor,
                value,
            } = mapped;
            let handle = match descriptor {
                Some(descriptor) => self
                    .node
                    .add_property(descriptor)
                    .await
                    .map_err(|source| self.publish_error(source))?,
                None => continue,
            };
            report.created += 1;
            handle
                .publish_value(&value.to_string())
                .await
                .map_err(|source| self.publish_error(source))?;
            self.metrics.values_published.inc();
            report.published += 1;
            debug!(address = %self.address, %key, %value, "property created");
        }

        self.first_poll_done = true;
        Ok(report)
    }

    /// Read the device and publish values to the properties created earlier.
    ///
    /// Values whose property does not exist, or whose publish fails, are logged and
    /// skipped without affecting the rest of the reading. A failed read leaves every
    /// published value as it was.
    pub async fn refresh(&mut self) -> Result<PollReport, PollError> {
        let reading = self.read().await?;
        debug!(
            address = %self.address,
            received_at = ?reading.received_at.map(|t| t.0),
            slave_information = ?reading.slave_information,
            data_records = ?reading.data_records,
            "received M-Bus reading"
        );

        let mut report = PollReport::default();
        for MappedValue { key, value, .. } in self.map(&reading, false) {
            let Some(handle) = self.node.property(&key) else {
                error!(address = %self.address, %key, "property not found, value dropped");
                self.metrics.lookup_misses.inc();
                report.skipped += 1;
                continue;
            };
            match handle.publish_value(&value.to_string()).await {
                Ok(()) => {
                    self.metrics.values_published.inc();
                    report.published += 1;
                }
                Err(e) => {
                    error!(address = %self.address, %key, error = %e, "publishing value failed");
                    report.skipped += 1;
                }
            }
        }
        Ok(report)
    }

    async fn read(&mut self) -> Result<Reading, PollError> {
        match self.transport.get_reading(&self.address).await {
            Ok(reading) => {
                self.metrics.readings.inc();
                if reading.received_at.is_some() {
                    self.last_reading_at = reading.received_at;
                }
                Ok(reading)
            }
            Err(source) => {
                error!(
                    address = %self.address,
                    error = %source,
                    last_reading_at = ?self.last_reading_at.map(|t| t.0),
                    "M-Bus read failed"
                );
                self.metrics.read_errors.inc();
                Err(PollError::Transport {
                    address: self.address.clone(),
                    source,
                })
            }
        }
    }

    fn map(&mut self, reading: &Reading, first_poll: bool) -> Vec<MappedValue> {
        let mut mapped = reading
            .slave_information
            .as_ref()
            .map(map_slave_information)
            .unwrap_or_default();
        if let Some(records) = &reading.data_records {
            mapped.extend(map_data_records(records, &mut self.cache, first_poll));
        }
        mapped
    }

    fn publish_error(&self, source: homie_device::PublishError) -> PollError {
        PollError::Publish {
            address: self.address.clone(),
            source,
        }
    }
}

/// Homie node id for a bus address, e.g. `bus-address-5`.
pub fn node_id(address: &Address) -> String {
    format!("bus-address-{address}").to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MetricsHub;
    use homie_device::{DataType, DeviceInfo, MemoryPublisher};
    use mbus_transport::{DataRecord, MockMaster, TransportError};
    use std::sync::Arc;
    use std::time::Duration;

    const NODE: &str = "homie/mbus-bridge/bus-address-5";

    fn device(publisher: &Arc<MemoryPublisher>) -> HomieDevice {
        HomieDevice::new(
            DeviceInfo {
                id: "mbus-bridge".into(),
                name: "MBus Bridge".into(),
                base_topic: "homie".into(),
            },
            publisher.clone(),
        )
    }

    fn reading(volume: i64) -> Reading {
        Reading::default()
            .with_info("Manufacturer", "ABC")
            .with_record(DataRecord::new(1, volume, "Volume (1e-3 m^3)"))
    }

    #[tokio::test]
    async fn first_poll_creates_then_refresh_updates() {
        let addr = Address::Primary(5);
        let mut master = MockMaster::new().with_reading(addr.clone(), reading(1600));
        master.push_response(addr.clone(), Ok(reading(1500)));
        let transport = TransportHandle::open(master, Duration::from_secs(5)).unwrap();
        let publisher = Arc::new(MemoryPublisher::new());
        let dev = device(&publisher);
        let hub = MetricsHub::new().unwrap();
        let mut session = DeviceSession::new(addr, &dev, transport, hub.bridge.clone());

        let report = session.first_poll().await.unwrap();
        assert_eq!(report.created, 2);
        assert!(session.has_completed_first_poll());

        let manufacturer = session.node().property("information/Manufacturer").unwrap();
        assert_eq!(manufacturer.descriptor().data_type, DataType::String);
        let volume = session.node().property("datarecord/id-1").unwrap();
        assert_eq!(volume.descriptor().data_type, DataType::Float);
        assert_eq!(volume.descriptor().unit.as_deref(), Some("m³"));
        assert_eq!(
            publisher.last_value(&format!("{NODE}/information/Manufacturer")).as_deref(),
            Some("ABC")
        );
        assert_eq!(
            publisher.last_value(&format!("{NODE}/datarecord/id-1")).as_deref(),
            Some("1.5")
        );

        let report = session.refresh().await.unwrap();
        assert_eq!(report, PollReport { created: 0, published: 2, skipped: 0 });
        assert_eq!(
            publisher.last_value(&format!("{NODE}/datarecord/id-1")).as_deref(),
            Some("1.6")
        );
        assert_eq!(publisher.count(&format!("{NODE}/datarecord/id-1/$datatype")), 1);
        assert_eq!(hub.bridge.readings.get(), 2);
        assert_eq!(hub.bridge.values_published.get(), 4);
    }

    #[tokio::test]
    async fn failed_first_poll_creates_nothing() {
        let addr = Address::Primary(5);
        let mut master = MockMaster::new().with_reading(addr.clone(), reading(1500));
        master.push_response(addr.clone(), Err(TransportError::Timeout));
        let transport = TransportHandle::open(master, Duration::from_secs(5)).unwrap();
        let publisher = Arc::new(MemoryPublisher::new());
        let dev = device(&publisher);
        let hub = MetricsHub::new().unwrap();
        let mut session = DeviceSession::new(addr, &dev, transport, hub.bridge.clone());

        let err = session.first_poll().await.unwrap_err();
        assert!(matches!(
            err,
            PollError::Transport {
                source: TransportError::Timeout,
                ..
            }
        ));
        assert!(!session.has_completed_first_poll());
        assert!(session.last_reading_at().is_none());
        assert!(session.node().property_keys().is_empty());
        assert!(session.cache().is_empty());
        assert!(publisher.messages().is_empty());
        assert_eq!(hub.bridge.read_errors.get(), 1);

        // the next scheduled tick creates the properties instead of refreshing
        let report = session.tick().await.unwrap();
        assert_eq!(report.created, 2);
        assert!(session.has_completed_first_poll());
        assert!(session.last_reading_at().is_some());
    }

    #[tokio::test]
    async fn refresh_skips_unknown_records_and_keeps_values_on_error() {
        let addr = Address::Primary(5);
        let mut master = MockMaster::new();
        master.push_response(addr.clone(), Ok(reading(1500)));
        master.push_response(addr.clone(), Err(TransportError::Io("frame lost".into())));
        master.push_response(
            addr.clone(),
            Ok(reading(1700).with_record(DataRecord::new(4, 12, "Energy (1e-1 Wh)"))),
        );
        let transport = TransportHandle::open(master, Duration::from_secs(5)).unwrap();
        let publisher = Arc::new(MemoryPublisher::new());
        let dev = device(&publisher);
        let hub = MetricsHub::new().unwrap();
        let mut session = DeviceSession::new(addr, &dev, transport, hub.bridge.clone());

        session.first_poll().await.unwrap();
        let first_read_at = session.last_reading_at();
        assert!(first_read_at.is_some());
        assert!(session.refresh().await.is_err());
        assert_eq!(session.last_reading_at(), first_read_at);
        assert_eq!(
            publisher.last_value(&format!("{NODE}/datarecord/id-1")).as_deref(),
            Some("1.5")
        );

        let report = session.tick().await.unwrap();
        assert_eq!(report, PollReport { created: 0, published: 2, skipped: 1 });
        assert_eq!(
            publisher.last_value(&format!("{NODE}/datarecord/id-1")).as_deref(),
            Some("1.7")
        );
        assert!(publisher.last_value(&format!("{NODE}/datarecord/id-4")).is_none());
        assert_eq!(hub.bridge.lookup_misses.get(), 1);
    }

    #[tokio::test]
    async fn publish_failure_on_first_poll_is_reported() {
        let addr = Address::Primary(5);
        let master = MockMaster::new().with_reading(addr.clone(), reading(1500));
        let transport = TransportHandle::open(master, Duration::from_secs(5)).unwrap();
        let publisher = Arc::new(MemoryPublisher::new());
        publisher.close();
        let dev = device(&publisher);
        let hub = MetricsHub::new().unwrap();
        let mut session = DeviceSession::new(addr, &dev, transport, hub.bridge);

        assert!(matches!(
            session.first_poll().await,
            Err(PollError::Publish { .. })
        ));
        assert!(!session.has_completed_first_poll());
    }

    #[test]
    fn node_ids_are_lowercase() {
        assert_eq!(node_id(&Address::Primary(5)), "bus-address-5");
        assert_eq!(
            node_id(&Address::Secondary("11490378A0070407".into())),
            "bus-address-11490378a0070407"
        );
    }
}
