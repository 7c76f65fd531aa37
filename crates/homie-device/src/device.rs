use crate::{
    DeviceInfo, DeviceState, PropertyDescriptor, Publish, Result, HOMIE_VERSION,
};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

/// A Homie device: the root of a node/property tree published under one topic prefix.
pub struct HomieDevice {
    info: DeviceInfo,
    publisher: Arc<dyn Publish>,
    nodes: Mutex<Vec<Node>>,
}

impl HomieDevice {
    pub fn new(info: DeviceInfo, publisher: Arc<dyn Publish>) -> Self {
        Self {
            info,
            publisher,
            nodes: Mutex::new(Vec::new()),
        }
    }

    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    /// Announce the device before any node exists.
    pub async fn init(&self) -> Result<()> {
        let topic = self.info.topic();
        self.publisher
            .publish(&format!("{topic}/$homie"), HOMIE_VERSION, true)
            .await?;
        self.publisher
            .publish(&format!("{topic}/$name"), &self.info.name, true)
            .await?;
        self.set_state(DeviceState::Init).await
    }

    /// Register a node, or return the already registered node with the same id.
    pub fn node(&self, id: &str, name: &str) -> Node {
        let mut nodes = self.nodes.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = nodes.iter().find(|n| n.id() == id) {
            return existing.clone();
        }
        let node = Node {
            inner: Arc::new(NodeInner {
                id: id.to_string(),
                name: name.to_string(),
                topic: format!("{}/{id}", self.info.topic()),
                publisher: Arc::clone(&self.publisher),
                properties: Mutex::new(BTreeMap::new()),
            }),
        };
        nodes.push(node.clone());
        node
    }

    pub fn nodes(&self) -> Vec<Node> {
        self.nodes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Publish the node list and node names, then mark the device ready.
    pub async fn setup(&self) -> Result<()> {
        let nodes = self.nodes();
        let listing = nodes
            .iter()
            .map(|n| n.id().to_string())
            .collect::<Vec<_>>()
            .join(",");
        let topic = self.info.topic();
        self.publisher
            .publish(&format!("{topic}/$nodes"), &listing, true)
            .await?;
        for node in &nodes {
            self.publisher
                .publish(&format!("{}/$name", node.inner.topic), node.name(), true)
                .await?;
        }
        self.set_state(DeviceState::Ready).await
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.set_state(DeviceState::Disconnected).await
    }

    async fn set_state(&self, state: DeviceState) -> Result<()> {
        debug!(device = %self.info.id, state = state.as_str(), "device state");
        self.publisher
            .publish(&self.info.state_topic(), state.as_str(), true)
            .await
    }
}

/// Cloneable handle to one node of a [`HomieDevice`].
#[derive(Clone)]
pub struct Node {
    inner: Arc<NodeInner>,
}

struct NodeInner {
    id: String,
    name: String,
    topic: String,
    publisher: Arc<dyn Publish>,
    properties: Mutex<BTreeMap<String, PropertyHandle>>,
}

impl Node {
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Create a property and publish its attributes.
    ///
    /// A key is created at most once: adding a key that already exists returns the
    /// existing handle and its original attributes are kept. The property is only
    /// registered after all of its attributes were published.
    pub async fn add_property(&self, descriptor: PropertyDescriptor) -> Result<PropertyHandle> {
        let listing = {
            let props = self
                .inner
                .properties
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if let Some(existing) = props.get(&descriptor.key) {
                return Ok(existing.clone());
            }
            let mut keys: Vec<&str> = props.keys().map(String::as_str).collect();
            keys.push(&descriptor.key);
            keys.sort_unstable();
            keys.join(",")
        };

        let handle = PropertyHandle {
            inner: Arc::new(PropertyInner {
                topic: format!("{}/{}", self.inner.topic, descriptor.key),
                descriptor,
                publisher: Arc::clone(&self.inner.publisher),
            }),
        };
        let publisher = &self.inner.publisher;
        let topic = handle.topic();
        let desc = handle.descriptor();
        publisher
            .publish(&format!("{topic}/$name"), &desc.display_name, true)
            .await?;
        publisher
            .publish(&format!("{topic}/$datatype"), desc.data_type.as_str(), true)
            .await?;
        if let Some(unit) = &desc.unit {
            publisher
                .publish(&format!("{topic}/$unit"), unit, true)
                .await?;
        }
        publisher
            .publish(&format!("{}/$properties", self.inner.topic), &listing, true)
            .await?;

        let mut props = self
            .inner
            .properties
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(props
            .entry(desc.key.clone())
            .or_insert_with(|| handle.clone())
            .clone())
    }

    pub fn property(&self, key: &str) -> Option<PropertyHandle> {
        self.inner
            .properties
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn property_keys(&self) -> Vec<String> {
        self.inner
            .properties
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }
}

/// Handle used to publish values of one created property.
#[derive(Clone)]
pub struct PropertyHandle {
    inner: Arc<PropertyInner>,
}

struct PropertyInner {
    topic: String,
    descriptor: PropertyDescriptor,
    publisher: Arc<dyn Publish>,
}

impl PropertyHandle {
    pub fn descriptor(&self) -> &PropertyDescriptor {
        &self.inner.descriptor
    }

    pub fn topic(&self) -> &str {
        &self.inner.topic
    }

    pub async fn publish_value(&self, payload: &str) -> Result<()> {
        self.inner
            .publisher
            .publish(&self.inner.topic, payload, true)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DataType, MemoryPublisher};

    fn device(publisher: &Arc<MemoryPublisher>) -> HomieDevice {
        HomieDevice::new(
            DeviceInfo {
                id: "mbus-bridge".into(),
                name: "MBus Bridge".into(),
                base_topic: "homie/".into(),
            },
            publisher.clone(),
        )
    }

    fn volume() -> PropertyDescriptor {
        PropertyDescriptor {
            key: "datarecord/id-1".into(),
            display_name: "Volume ".into(),
            data_type: DataType::Float,
            unit: Some("m³".into()),
        }
    }

    #[tokio::test]
    async fn init_and_setup_announce_device() {
        let publisher = Arc::new(MemoryPublisher::new());
        let dev = device(&publisher);
        dev.init().await.unwrap();
        dev.node("bus-address-5", "Bus address 5");
        dev.node("bus-address-7", "Bus address 7");
        dev.node("bus-address-5", "ignored");
        dev.setup().await.unwrap();

        assert_eq!(
            publisher.last_value("homie/mbus-bridge/$homie").as_deref(),
            Some("4.0.0")
        );
        assert_eq!(
            publisher.last_value("homie/mbus-bridge/$nodes").as_deref(),
            Some("bus-address-5,bus-address-7")
        );
        assert_eq!(
            publisher
                .last_value("homie/mbus-bridge/bus-address-5/$name")
                .as_deref(),
            Some("Bus address 5")
        );
        assert_eq!(
            publisher.last_value("homie/mbus-bridge/$state").as_deref(),
            Some("ready")
        );
        dev.disconnect().await.unwrap();
        assert_eq!(
            publisher.last_value("homie/mbus-bridge/$state").as_deref(),
            Some("disconnected")
        );
    }

    #[tokio::test]
    async fn add_property_publishes_attributes_once() {
        let publisher = Arc::new(MemoryPublisher::new());
        let dev = device(&publisher);
        let node = dev.node("bus-address-5", "Bus address 5");

        let handle = node.add_property(volume()).await.unwrap();
        assert_eq!(handle.topic(), "homie/mbus-bridge/bus-address-5/datarecord/id-1");
        assert_eq!(
            publisher
                .last_value("homie/mbus-bridge/bus-address-5/datarecord/id-1/$unit")
                .as_deref(),
            Some("m³")
        );
        assert_eq!(
            publisher
                .last_value("homie/mbus-bridge/bus-address-5/datarecord/id-1/$datatype")
                .as_deref(),
            Some("float")
        );

        let mut changed = volume();
        changed.data_type = DataType::String;
        let again = node.add_property(changed).await.unwrap();
        assert_eq!(again.descriptor().data_type, DataType::Float);
        assert_eq!(
            publisher.count("homie/mbus-bridge/bus-address-5/datarecord/id-1/$datatype"),
            1
        );
    }

    #[tokio::test]
    async fn property_lookup_and_value_publish() {
        let publisher = Arc::new(MemoryPublisher::new());
        let dev = device(&publisher);
        let node = dev.node("bus-address-5", "Bus address 5");
        assert!(node.property("datarecord/id-1").is_none());

        node.add_property(volume()).await.unwrap();
        node.add_property(PropertyDescriptor {
            key: "information/Manufacturer".into(),
            display_name: "Manufacturer".into(),
            data_type: DataType::String,
            unit: None,
        })
        .await
        .unwrap();
        assert_eq!(
            publisher
                .last_value("homie/mbus-bridge/bus-address-5/$properties")
                .as_deref(),
            Some("datarecord/id-1,information/Manufacturer")
        );
        assert!(publisher
            .last_value("homie/mbus-bridge/bus-address-5/information/Manufacturer/$unit")
            .is_none());

        let handle = node.property("datarecord/id-1").unwrap();
        handle.publish_value("1.5").await.unwrap();
        assert_eq!(
            publisher
                .last_value("homie/mbus-bridge/bus-address-5/datarecord/id-1")
                .as_deref(),
            Some("1.5")
        );
        assert_eq!(
            node.property_keys(),
            vec!["datarecord/id-1", "information/Manufacturer"]
        );
    }
}
