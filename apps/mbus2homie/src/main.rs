use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use homie_device::{HomieDevice, MemoryPublisher, MqttPublisher, MqttSettings, Publish};
use mbus_bridge::{
    load_config_file, BackendKind, BridgeConfig, DeviceSession, MetricsHub, Scheduler,
    TransportHandle,
};
use mbus_transport::{MockMaster, ReplayMaster};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "mbus2homie")]
#[command(version, about = "Poll M-Bus meters and publish their readings as Homie devices")]
struct Args {
    /// Bridge configuration file (YAML)
    #[arg(long, short, default_value = "configs/bridge.yaml")]
    config: PathBuf,

    /// Emit log lines as JSON
    #[arg(long, action = ArgAction::SetTrue)]
    log_json: bool,

    /// Publish to an in-memory sink instead of the configured broker
    #[arg(long, action = ArgAction::SetTrue)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    setup_tracing(args.log_json);

    info!("mbus2homie starting");
    let (config, schedule) = load_config_file(&args.config)?;
    info!(
        backend = ?config.mbus.backend,
        serial_port = config.mbus.serial_port.as_deref().unwrap_or("-"),
        baud_rate = config.mbus.baud_rate,
        addresses = ?config.mbus.bus_addresses,
        "M-Bus options"
    );

    let metrics = MetricsHub::new().context("registering metrics")?;
    metrics
        .bridge
        .devices
        .set(config.mbus.bus_addresses.len() as i64);

    let device_info = config.device_info();
    let (publisher, mqtt): (Arc<dyn Publish>, Option<Arc<MqttPublisher>>) = if args.dry_run {
        warn!("dry run: nothing is sent to the broker");
        (Arc::new(MemoryPublisher::new()) as Arc<dyn Publish>, None)
    } else {
        let mqtt = Arc::new(MqttPublisher::connect(
            &mqtt_settings(&config),
            &device_info,
        ));
        (mqtt.clone() as Arc<dyn Publish>, Some(mqtt))
    };
    let device = HomieDevice::new(device_info, publisher);
    device.init().await.context("announcing device")?;

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    let transport = open_transport(&config)?;
    let mut scheduler = Scheduler::new(schedule, transport.clone());
    let sessions: Vec<_> = config
        .mbus
        .bus_addresses
        .iter()
        .map(|address| {
            DeviceSession::new(
                address.clone(),
                &device,
                transport.clone(),
                metrics.bridge.clone(),
            )
        })
        .collect();
    if scheduler.add_devices(sessions, shutdown.as_mut()).await {
        device.setup().await.context("publishing device layout")?;
        info!(devices = scheduler.device_count(), "bridge running");
        shutdown.await;
    }
    info!("termination signal received, shutting down");

    if let Err(e) = scheduler.shutdown().await {
        error!(error = %e, "closing M-Bus master failed");
    }
    if let Err(e) = device.disconnect().await {
        error!(error = %e, "publishing disconnected state failed");
    }
    if let Some(mqtt) = mqtt {
        if let Err(e) = mqtt.disconnect().await {
            error!(error = %e, "MQTT disconnect failed");
        }
    }
    debug!(metrics = %metrics.encode_text(), "final metrics");
    info!("mbus2homie stopped");
    Ok(())
}

fn open_transport(config: &BridgeConfig) -> Result<TransportHandle> {
    let timeout = config.mbus.request_timeout();
    let handle = match config.mbus.backend {
        BackendKind::Mock => {
            TransportHandle::open(MockMaster::demo(&config.mbus.bus_addresses), timeout)
        }
        BackendKind::Replay => {
            let dir = config
                .mbus
                .replay_dir
                .clone()
                .context("mbus.replay_dir is required for the replay backend")?;
            TransportHandle::open(ReplayMaster::new(dir), timeout)
        }
    };
    handle.context("connecting M-Bus master")
}

fn mqtt_settings(config: &BridgeConfig) -> MqttSettings {
    let mqtt = &config.mqtt;
    MqttSettings {
        host: mqtt.host.clone(),
        port: mqtt.port,
        client_id: mqtt.client_id.clone().unwrap_or_else(|| {
            format!("{}-{}", config.device.id, uuid::Uuid::new_v4().simple())
        }),
        username: mqtt.username.clone(),
        password: mqtt.password.clone(),
        keep_alive: Duration::from_secs(mqtt.keep_alive_secs),
        publish_timeout: Duration::from_millis(mqtt.publish_timeout_ms),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "listening for Ctrl-C failed");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "listening for SIGTERM failed");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

fn setup_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
