pub mod handler;
pub mod memory;

use async_trait::async_trait;
use thiserror::Error;

/// A message as delivered to a consumer group member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub topic: String,
    pub offset: u64,
    pub payload: Vec<u8>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("queue closed")]
    Closed,

    #[error("unknown topic: {0}")]
    UnknownTopic(String),
}

/// Synchronous publish side of the broker: returns once the message is
/// durably enqueued on the topic.
#[async_trait]
pub trait QueuePublisher: Send + Sync {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), QueueError>;
}

/// A consumer-group claim on a topic.
///
/// `next` blocks until a message is available. An offset only becomes
/// committed through `mark`; `rewind` moves the read position back to the
/// committed offset, which is how a failed delivery gets retried. Delivery is
/// therefore at-least-once, and consumers must be idempotent.
#[async_trait]
pub trait MessageStream: Send {
    async fn next(&mut self) -> Result<Message, QueueError>;

    async fn mark(&mut self, msg: &Message) -> Result<(), QueueError>;

    async fn rewind(&mut self) -> Result<(), QueueError>;
}
