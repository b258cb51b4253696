use super::{Message, MessageStream, QueueError, QueuePublisher};
use async_trait::async_trait;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::{Mutex, Notify};

#[derive(Default)]
struct TopicState {
    messages: Vec<Arc<Vec<u8>>>,
    /// Committed offset per consumer group.
    committed: HashMap<String, u64>,
}

#[derive(Default)]
struct Inner {
    topics: Mutex<HashMap<String, TopicState>>,
    notify: Notify,
}

/// In-process broker with per-group committed offsets. Messages are retained
/// for the process lifetime, so a group re-subscribing resumes from its
/// committed offset and un-marked messages are delivered again.
#[derive(Clone, Default)]
pub struct MemoryQueue {
    inner: Arc<Inner>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn subscribe(&self, topic: &str, group: &str) -> MemoryStream {
        let mut topics = self.inner.topics.lock().await;
        let state = topics.entry(topic.to_string()).or_default();
        let committed = *state.committed.entry(group.to_string()).or_insert(0);
        MemoryStream {
            inner: self.inner.clone(),
            topic: topic.to_string(),
            group: group.to_string(),
            position: committed,
        }
    }

    /// Number of messages ever published on `topic`.
    pub async fn depth(&self, topic: &str) -> usize {
        let topics = self.inner.topics.lock().await;
        topics.get(topic).map(|s| s.messages.len()).unwrap_or(0)
    }

    /// Messages on `topic` not yet committed by `group`.
    pub async fn lag(&self, topic: &str, group: &str) -> u64 {
        let topics = self.inner.topics.lock().await;
        match topics.get(topic) {
            Some(state) => {
                let committed = state.committed.get(group).copied().unwrap_or(0);
                state.messages.len() as u64 - committed.min(state.messages.len() as u64)
            }
            None => 0,
        }
    }
}

#[async_trait]
impl QueuePublisher for MemoryQueue {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), QueueError> {
        let mut topics = self.inner.topics.lock().await;
        topics
            .entry(topic.to_string())
            .or_default()
            .messages
            .push(Arc::new(payload));
        drop(topics);
        self.inner.notify.notify_waiters();
        Ok(())
    }
}

pub struct MemoryStream {
    inner: Arc<Inner>,
    topic: String,
    group: String,
    position: u64,
}

#[async_trait]
impl MessageStream for MemoryStream {
    async fn next(&mut self) -> Result<Message, QueueError> {
        loop {
            // Register the waiter before the emptiness check so a publish
            // racing with the check still wakes us.
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let topics = self.inner.topics.lock().await;
                if let Some(state) = topics.get(&self.topic) {
                    if let Some(payload) = state.messages.get(self.position as usize) {
                        let msg = Message {
                            topic: self.topic.clone(),
                            offset: self.position,
                            payload: payload.as_ref().clone(),
                        };
                        self.position += 1;
                        return Ok(msg);
                    }
                }
            }

            notified.await;
        }
    }

    async fn mark(&mut self, msg: &Message) -> Result<(), QueueError> {
        let mut topics = self.inner.topics.lock().await;
        let state = topics
            .get_mut(&self.topic)
            .ok_or_else(|| QueueError::UnknownTopic(self.topic.clone()))?;
        let committed = state.committed.entry(self.group.clone()).or_insert(0);
        if msg.offset + 1 > *committed {
            *committed = msg.offset + 1;
        }
        Ok(())
    }

    async fn rewind(&mut self) -> Result<(), QueueError> {
        let topics = self.inner.topics.lock().await;
        self.position = topics
            .get(&self.topic)
            .and_then(|state| state.committed.get(&self.group))
            .copied()
            .unwrap_or(0);
        Ok(())
    }
}
