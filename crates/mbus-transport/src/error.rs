use thiserror::Error;

use crate::Address;

pub type Result<T, E = TransportError> = core::result::Result<T, E>;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum TransportError {
    #[error("master is not connected")]
    NotConnected,
    #[error("no response from address {0}")]
    NoResponse(Address),
    #[error("I/O error: {0}")]
    Io(String),
    #[error("timeout")]
    Timeout,
    #[error("invalid frame: {0}")]
    InvalidFrame(String),
    #[error("transport closed")]
    Closed,
}
