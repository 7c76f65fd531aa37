use crate::Result;
use async_trait::async_trait;

/// Sink for topic/payload pairs.
#[async_trait]
pub trait Publish: Send + Sync {
    async fn publish(&self, topic: &str, payload: &str, retain: bool) -> Result<()>;
}
