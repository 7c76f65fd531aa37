use crate::{Address, MbusMaster, Reading, Result, TransportError};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Serves readings from `<dir>/<address>.json`, one node-mbus document per address.
///
/// The file is re-read on every request, so editing it between polls changes what
/// the next poll sees.
pub struct ReplayMaster {
    dir: PathBuf,
    connected: bool,
}

impl ReplayMaster {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            connected: false,
        }
    }

    pub fn path_for(&self, address: &Address) -> PathBuf {
        self.dir.join(format!("{address}.json"))
    }
}

impl MbusMaster for ReplayMaster {
    fn connect(&mut self) -> Result<()> {
        if !self.dir.is_dir() {
            return Err(TransportError::Io(format!(
                "replay directory not found: {}",
                self.dir.display()
            )));
        }
        tracing::debug!(dir = %self.dir.display(), "replay master connected");
        self.connected = true;
        Ok(())
    }

    fn get_reading(&mut self, address: &Address) -> Result<Reading> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        let path = self.path_for(address);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(TransportError::NoResponse(address.clone()))
            }
            Err(e) => return Err(TransportError::Io(e.to_string())),
        };
        let reading: Reading = serde_json::from_str(&raw)
            .map_err(|e| TransportError::InvalidFrame(format!("{}: {e}", path.display())))?;
        Ok(reading.stamped_now())
    }

    fn close(&mut self) -> Result<()> {
        self.connected = false;
        Ok(())
    }
}
