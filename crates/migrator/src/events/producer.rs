use crate::{
    events::InconsistentEvent,
    queue::{QueueError, QueuePublisher},
};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EventError {
    #[error("event serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("queue error: {0}")]
    Queue(#[from] QueueError),
}

/// Single-method capability the validator publishes through, so in-process
/// doubles can stand in for a broker.
#[async_trait]
pub trait EventProducer: Send + Sync {
    async fn publish(&self, evt: InconsistentEvent) -> Result<(), EventError>;
}

/// Serializes events as JSON and publishes them synchronously to one named
/// topic.
pub struct QueueEventProducer {
    queue: Arc<dyn QueuePublisher>,
    topic: String,
}

impl QueueEventProducer {
    pub fn new(queue: Arc<dyn QueuePublisher>, topic: impl Into<String>) -> Self {
        QueueEventProducer {
            queue,
            topic: topic.into(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

#[async_trait]
impl EventProducer for QueueEventProducer {
    async fn publish(&self, evt: InconsistentEvent) -> Result<(), EventError> {
        let payload = serde_json::to_vec(&evt)?;
        self.queue.publish(&self.topic, payload).await?;
        Ok(())
    }
}
