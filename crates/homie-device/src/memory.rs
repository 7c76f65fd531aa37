use crate::{Publish, PublishError, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub topic: String,
    pub payload: String,
    pub retain: bool,
}

/// Records every publish in order. Used for dry runs and tests.
#[derive(Default)]
pub struct MemoryPublisher {
    messages: Mutex<Vec<Message>>,
    closed: AtomicBool,
}

impl MemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn last_value(&self, topic: &str) -> Option<String> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .rev()
            .find(|m| m.topic == topic)
            .map(|m| m.payload.clone())
    }

    pub fn count(&self, topic: &str) -> usize {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|m| m.topic == topic)
            .count()
    }

    /// Reject every later publish with [`PublishError::Closed`].
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Publish for MemoryPublisher {
    async fn publish(&self, topic: &str, payload: &str, retain: bool) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(PublishError::Closed);
        }
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Message {
                topic: topic.to_string(),
                payload: payload.to_string(),
                retain,
            });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_in_order_and_rejects_after_close() {
        let publisher = MemoryPublisher::new();
        publisher.publish("a", "1", true).await.unwrap();
        publisher.publish("a", "2", false).await.unwrap();
        assert_eq!(publisher.last_value("a").as_deref(), Some("2"));
        assert_eq!(publisher.count("a"), 2);
        assert!(!publisher.messages()[1].retain);

        publisher.close();
        assert_eq!(
            publisher.publish("a", "3", true).await,
            Err(PublishError::Closed)
        );
        assert_eq!(publisher.count("a"), 2);
    }
}
