use crate::{Address, Reading, Result};

/// A minimal blocking M-Bus master.
///
/// One master drives one physical bus and answers one request at a time. Callers that
/// share a master across tasks must serialize access themselves.
pub trait MbusMaster: Send {
    /// Open the underlying connection.
    fn connect(&mut self) -> Result<()>;

    /// Request user data from one slave. Implementations bound the call with their own
    /// timeout and surface it as [`TransportError::Timeout`](crate::TransportError::Timeout).
    fn get_reading(&mut self, address: &Address) -> Result<Reading>;

    /// Close the connection. Further reads fail with `NotConnected`.
    fn close(&mut self) -> Result<()>;
}
