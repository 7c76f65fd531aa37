//! Single owner of the M-Bus master.
//!
//! The master lives on a dedicated thread and handles one request at a time. Device
//! sessions hold a cloneable [`TransportHandle`] and submit requests through it, so
//! two reads never reach the bus concurrently.

use mbus_transport::{Address, MbusMaster, Reading, TransportError};
use std::thread;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

const QUEUE_DEPTH: usize = 32;

type Reply<T> = oneshot::Sender<Result<T, TransportError>>;

enum Command {
    Read {
        address: Address,
        started: oneshot::Sender<()>,
        reply: Reply<Reading>,
    },
    Close {
        started: oneshot::Sender<()>,
        reply: Reply<()>,
    },
}

#[derive(Clone)]
pub struct TransportHandle {
    tx: mpsc::Sender<Command>,
    request_timeout: Duration,
}

impl TransportHandle {
    /// Connect `master` and move it onto its worker thread.
    ///
    /// `request_timeout` bounds the master call of each request, starting when the
    /// worker picks it up. Time spent queued behind other devices is bounded
    /// separately by the queue depth times `request_timeout`.
    pub fn open<M>(mut master: M, request_timeout: Duration) -> Result<Self, TransportError>
    where
        M: MbusMaster + 'static,
    {
        master.connect()?;
        let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
        thread::Builder::new()
            .name("mbus-master".to_string())
            .spawn(move || run_worker(master, rx))
            .map_err(|e| TransportError::Io(e.to_string()))?;
        info!("M-Bus master connected");
        Ok(Self {
            tx,
            request_timeout,
        })
    }

    pub async fn get_reading(&self, address: &Address) -> Result<Reading, TransportError> {
        let (started, started_rx) = oneshot::channel();
        let (reply, rx) = oneshot::channel();
        let command = Command::Read {
            address: address.clone(),
            started,
            reply,
        };
        self.submit(command, started_rx, rx).await
    }

    /// Close the master after every request queued before this call has been served.
    pub async fn close(&self) -> Result<(), TransportError> {
        let (started, started_rx) = oneshot::channel();
        let (reply, rx) = oneshot::channel();
        self.submit(Command::Close { started, reply }, started_rx, rx)
            .await
    }

    async fn submit<T>(
        &self,
        command: Command,
        started: oneshot::Receiver<()>,
        rx: oneshot::Receiver<Result<T, TransportError>>,
    ) -> Result<T, TransportError> {
        let queued = async {
            self.tx
                .send(command)
                .await
                .map_err(|_| TransportError::Closed)?;
            started.await.map_err(|_| TransportError::Closed)
        };
        let queue_timeout = self.request_timeout.saturating_mul(QUEUE_DEPTH as u32);
        tokio::time::timeout(queue_timeout, queued)
            .await
            .map_err(|_| {
                warn!("M-Bus request was not picked up in time");
                TransportError::Timeout
            })??;

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(TransportError::Closed),
            Err(_) => Err(TransportError::Timeout),
        }
    }
}

fn run_worker<M: MbusMaster>(mut master: M, mut rx: mpsc::Receiver<Command>) {
    while let Some(command) = rx.blocking_recv() {
        match command {
            Command::Read {
                address,
                started,
                reply,
            } => {
                if reply.is_closed() {
                    debug!(%address, "caller gone, skipping read");
                    continue;
                }
                let _ = started.send(());
                debug!(%address, "requesting user data");
                let _ = reply.send(master.get_reading(&address));
            }
            Command::Close { started, reply } => {
                let _ = started.send(());
                let result = master.close();
                if let Err(e) = &result {
                    error!(error = %e, "closing M-Bus master failed");
                }
                let _ = reply.send(result);
                break;
            }
        }
    }
    info!("M-Bus master closed");
}
