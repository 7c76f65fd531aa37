use crate::{DeviceInfo, DeviceState, Publish, PublishError, Result};
use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, LastWill, MqttOptions, Outgoing, QoS};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Clone, Debug)]
pub struct MqttSettings {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub keep_alive: Duration,
    /// Upper bound for handing one message to the client's request queue.
    pub publish_timeout: Duration,
}

/// Publisher backed by a `rumqttc` client. The event loop runs on a spawned task and
/// reconnects on its own; connection errors are logged, never returned to callers.
///
/// While the broker is unreachable the client's request queue fills up; publishes
/// then fail with [`PublishError::Timeout`] instead of waiting for a reconnect.
pub struct MqttPublisher {
    client: AsyncClient,
    publish_timeout: Duration,
    event_loop: Mutex<Option<JoinHandle<()>>>,
}

impl MqttPublisher {
    /// Must be called from within a tokio runtime. The broker marks the device `lost`
    /// if the connection drops without a clean disconnect.
    pub fn connect(settings: &MqttSettings, device: &DeviceInfo) -> Self {
        let mut opts = MqttOptions::new(&settings.client_id, &settings.host, settings.port);
        opts.set_keep_alive(settings.keep_alive);
        if let (Some(user), Some(pass)) = (&settings.username, &settings.password) {
            opts.set_credentials(user, pass);
        }
        opts.set_last_will(LastWill::new(
            device.state_topic(),
            DeviceState::Lost.as_str(),
            QoS::AtLeastOnce,
            true,
        ));

        let (client, mut event_loop) = AsyncClient::new(opts, 64);
        info!(host = %settings.host, port = settings.port, "connecting to MQTT broker");

        let event_loop = tokio::spawn(async move {
            loop {
                match event_loop.poll().await {
                    Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                        debug!("MQTT disconnect sent, stopping event loop");
                        break;
                    }
                    Ok(Event::Incoming(packet)) => debug!(?packet, "MQTT incoming"),
                    Ok(_) => {}
                    Err(e) => {
                        error!(error = %e, "MQTT connection error");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });

        Self {
            client,
            publish_timeout: settings.publish_timeout,
            event_loop: Mutex::new(Some(event_loop)),
        }
    }

    /// Send DISCONNECT and give the event loop a bounded time to flush it.
    pub async fn disconnect(&self) -> Result<()> {
        self.client
            .disconnect()
            .await
            .map_err(|e| PublishError::Client(e.to_string()))?;
        let handle = self
            .event_loop
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(mut handle) = handle {
            match tokio::time::timeout(FLUSH_TIMEOUT, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(error = %e, "MQTT event loop task failed"),
                Err(_) => {
                    error!("MQTT event loop did not stop in time, aborting");
                    handle.abort();
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Publish for MqttPublisher {
    async fn publish(&self, topic: &str, payload: &str, retain: bool) -> Result<()> {
        let send = self
            .client
            .publish(topic, QoS::AtLeastOnce, retain, payload.as_bytes().to_vec());
        match tokio::time::timeout(self.publish_timeout, send).await {
            Ok(result) => result.map_err(|e| PublishError::Client(e.to_string())),
            Err(_) => {
                warn!(%topic, "MQTT request queue full, message dropped");
                Err(PublishError::Timeout(self.publish_timeout))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unreachable_broker() -> MqttSettings {
        MqttSettings {
            host: "127.0.0.1".into(),
            port: 1,
            client_id: "homie-device-test".into(),
            username: None,
            password: None,
            keep_alive: Duration::from_secs(30),
            publish_timeout: Duration::from_millis(50),
        }
    }

    #[tokio::test]
    async fn publish_fails_fast_while_broker_is_unreachable() {
        let device = DeviceInfo {
            id: "mbus-bridge".into(),
            name: "MBus Bridge".into(),
            base_topic: "homie".into(),
        };
        let publisher = MqttPublisher::connect(&unreachable_broker(), &device);

        let run = async {
            let mut timeouts = 0;
            for i in 0..100 {
                let payload = i.to_string();
                if let Err(PublishError::Timeout(_)) =
                    publisher.publish("homie/mbus-bridge/x", &payload, true).await
                {
                    timeouts += 1;
                }
            }
            timeouts
        };
        let timeouts = tokio::time::timeout(Duration::from_secs(10), run)
            .await
            .expect("publishing must not block while the broker is down");
        assert!(timeouts > 0);
    }
}
