use thiserror::Error;

pub type Result<T, E = PublishError> = core::result::Result<T, E>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PublishError {
    #[error("client error: {0}")]
    Client(String),
    #[error("publish not accepted within {0:?}")]
    Timeout(std::time::Duration),
    #[error("publisher is closed")]
    Closed,
}
