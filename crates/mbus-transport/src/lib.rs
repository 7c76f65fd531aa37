//! mbus-transport: reading model and master abstractions for M-Bus meters
//!
//! This crate provides the data a meter returns for one poll and the blocking
//! [`MbusMaster`] interface used to request it. Backends are feature-gated; the default
//! build enables an in-process `mock` master and a file-backed `replay` master so that
//! the bridge can run on any host without a serial adapter attached.

mod types;
pub use types::{Address, AddressParseError, DataRecord, Reading, Scalar, Timestamp};

mod error;
pub use error::{Result, TransportError};

mod traits;
pub use traits::MbusMaster;

#[cfg(feature = "mock")]
mod mock;

#[cfg(feature = "mock")]
pub use mock::{Journal, MasterEvent, MockMaster};

#[cfg(feature = "replay")]
mod replay;

#[cfg(feature = "replay")]
pub use replay::ReplayMaster;
