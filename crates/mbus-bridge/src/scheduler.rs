//! Per-device recurring polls and coordinated shutdown.
//!
//! Every device gets one task that waits for the next fire time of the shared
//! [`PollSchedule`] and then ticks its session. Shutdown interrupts the wait only, so a
//! poll that is already running completes before its task exits. The transport is
//! closed after all tasks have been joined.

use crate::schedule::PollSchedule;
use crate::session::DeviceSession;
use crate::transport::TransportHandle;
use mbus_transport::{Address, TransportError};
use std::future::Future;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub struct Scheduler {
    schedule: PollSchedule,
    transport: TransportHandle,
    shutdown: watch::Sender<bool>,
    tasks: Vec<(Address, JoinHandle<DeviceSession>)>,
}

impl Scheduler {
    pub fn new(schedule: PollSchedule, transport: TransportHandle) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            schedule,
            transport,
            shutdown,
            tasks: Vec::new(),
        }
    }

    /// Run the device's first poll, then arm its recurring timer.
    ///
    /// A failed first poll does not keep the device from being scheduled; its next
    /// tick tries to create the properties again.
    pub async fn add_device(&mut self, mut session: DeviceSession) {
        let address = session.address().clone();
        match session.first_poll().await {
            Ok(report) => info!(
                %address,
                properties = report.created,
                "device ready"
            ),
            Err(e) => warn!(
                %address,
                error = %e,
                "first poll failed, properties will be created on a later tick"
            ),
        }
        let rx = self.shutdown.subscribe();
        let task = tokio::spawn(run_device(session, self.schedule.clone(), rx));
        self.tasks.push((address, task));
    }

    /// Add devices one after another until `interrupt` completes.
    ///
    /// Returns `false` if startup was interrupted; a first poll in flight at that
    /// moment is abandoned and its device is not scheduled.
    pub async fn add_devices<I, F>(&mut self, sessions: I, interrupt: F) -> bool
    where
        I: IntoIterator<Item = DeviceSession>,
        F: Future<Output = ()>,
    {
        tokio::pin!(interrupt);
        for session in sessions {
            let address = session.address().clone();
            tokio::select! {
                biased;
                _ = &mut interrupt => {
                    warn!(%address, "startup interrupted during first polls");
                    return false;
                }
                _ = self.add_device(session) => {}
            }
        }
        true
    }

    pub fn device_count(&self) -> usize {
        self.tasks.len()
    }

    /// Stop all timers, wait for in-flight polls, then close the transport once.
    ///
    /// Returns the sessions in the order their devices were added.
    pub async fn shutdown(self) -> Result<Vec<DeviceSession>, TransportError> {
        info!(devices = self.tasks.len(), "stopping device timers");
        let _ = self.shutdown.send(true);

        let mut sessions = Vec::with_capacity(self.tasks.len());
        for (address, task) in self.tasks {
            match task.await {
                Ok(session) => sessions.push(session),
                Err(e) => error!(%address, error = %e, "device task failed"),
            }
        }

        info!("closing M-Bus master");
        self.transport.close().await?;
        Ok(sessions)
    }
}

async fn run_device(
    mut session: DeviceSession,
    schedule: PollSchedule,
    mut shutdown: watch::Receiver<bool>,
) -> DeviceSession {
    loop {
        let Some(wait) = schedule.until_next() else {
            warn!(address = %session.address(), "schedule has no upcoming fire time");
            break;
        };
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            _ = tokio::time::sleep(wait) => {}
        }
        if let Ok(report) = session.tick().await {
            debug!(
                address = %session.address(),
                published = report.published,
                skipped = report.skipped,
                "poll finished"
            );
        }
    }
    debug!(address = %session.address(), "device timer stopped");
    session
}
