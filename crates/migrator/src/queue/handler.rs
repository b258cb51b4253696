use super::{Message, MessageStream, QueueError};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Callback invoked for every decoded message.
#[async_trait]
pub trait MessageHandler<T>: Send + Sync {
    async fn handle(&self, msg: &Message, evt: T) -> Result<(), HandlerError>;
}

/// Callback invoked per accumulated batch.
#[async_trait]
pub trait BatchMessageHandler<T>: Send + Sync {
    async fn handle_batch(&self, msgs: &[Message], evts: Vec<T>) -> Result<(), HandlerError>;
}

const RETRY_BACKOFF: Duration = Duration::from_millis(100);

/// Single-message consume loop.
///
/// Undecodable payloads are logged, marked and skipped. Handler failures
/// rewind the stream to the committed offset so the message is delivered
/// again; with a backoff so a persistently failing message does not spin.
pub async fn run_handler<T, S, H>(
    mut stream: S,
    handler: H,
    cancel: CancellationToken,
) -> Result<(), QueueError>
where
    T: DeserializeOwned + Send,
    S: MessageStream,
    H: MessageHandler<T>,
{
    loop {
        let msg = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            msg = stream.next() => msg?,
        };

        let evt: T = match serde_json::from_slice(&msg.payload) {
            Ok(evt) => evt,
            Err(err) => {
                warn!(
                    topic = %msg.topic,
                    offset = msg.offset,
                    error = %err,
                    "dropping undecodable message"
                );
                stream.mark(&msg).await?;
                continue;
            }
        };

        match handler.handle(&msg, evt).await {
            Ok(()) => stream.mark(&msg).await?,
            Err(err) => {
                error!(
                    topic = %msg.topic,
                    offset = msg.offset,
                    error = %err,
                    "message handling failed, rewinding for redelivery"
                );
                stream.rewind().await?;
                tokio::select! {
                    _ = cancel.cancelled() => return Ok(()),
                    _ = time::sleep(RETRY_BACKOFF) => {}
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BatchOptions {
    pub batch_size: usize,
    pub batch_timeout: Duration,
}

impl Default for BatchOptions {
    fn default() -> Self {
        BatchOptions {
            batch_size: 10,
            batch_timeout: Duration::from_secs(1),
        }
    }
}

/// Batch consume loop: collects up to `batch_size` messages or until
/// `batch_timeout` elapses, whichever comes first. A timeout with nothing
/// accumulated loops without invoking the callback.
pub async fn run_batch_handler<T, S, H>(
    mut stream: S,
    handler: H,
    opts: BatchOptions,
    cancel: CancellationToken,
) -> Result<(), QueueError>
where
    T: DeserializeOwned + Send,
    S: MessageStream,
    H: BatchMessageHandler<T>,
{
    loop {
        let deadline = time::sleep(opts.batch_timeout);
        tokio::pin!(deadline);

        let mut msgs = Vec::with_capacity(opts.batch_size);
        let mut evts = Vec::with_capacity(opts.batch_size);

        while msgs.len() < opts.batch_size {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                _ = &mut deadline => break,
                next = stream.next() => {
                    let msg = next?;
                    match serde_json::from_slice(&msg.payload) {
                        Ok(evt) => {
                            evts.push(evt);
                            msgs.push(msg);
                        }
                        Err(err) => {
                            warn!(
                                topic = %msg.topic,
                                offset = msg.offset,
                                error = %err,
                                "dropping undecodable message"
                            );
                            stream.mark(&msg).await?;
                        }
                    }
                }
            }
        }

        if msgs.is_empty() {
            continue;
        }

        match handler.handle_batch(&msgs, evts).await {
            Ok(()) => {
                for msg in &msgs {
                    stream.mark(msg).await?;
                }
            }
            Err(err) => {
                error!(error = %err, batch = msgs.len(), "batch handling failed, rewinding");
                stream.rewind().await?;
                tokio::select! {
                    _ = cancel.cancelled() => return Ok(()),
                    _ = time::sleep(RETRY_BACKOFF) => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{QueuePublisher, memory::MemoryQueue};
    use serde::{Deserialize, Serialize};
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };
    use tokio::sync::Mutex;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Ping {
        n: u64,
    }

    struct Collect {
        seen: Arc<Mutex<Vec<u64>>>,
        fail_first: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl MessageHandler<Ping> for Collect {
        async fn handle(&self, _msg: &Message, evt: Ping) -> Result<(), HandlerError> {
            if self.fail_first.load(Ordering::SeqCst) > 0 {
                self.fail_first.fetch_sub(1, Ordering::SeqCst);
                return Err("transient".into());
            }
            self.seen.lock().await.push(evt.n);
            Ok(())
        }
    }

    struct CollectBatch {
        batches: Arc<Mutex<Vec<Vec<u64>>>>,
    }

    #[async_trait]
    impl BatchMessageHandler<Ping> for CollectBatch {
        async fn handle_batch(
            &self,
            _msgs: &[Message],
            evts: Vec<Ping>,
        ) -> Result<(), HandlerError> {
            self.batches
                .lock()
                .await
                .push(evts.into_iter().map(|p| p.n).collect());
            Ok(())
        }
    }

    async fn publish_pings(queue: &MemoryQueue, topic: &str, ns: &[u64]) {
        for n in ns {
            queue
                .publish(topic, serde_json::to_vec(&Ping { n: *n }).unwrap())
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn handler_marks_processed_messages() {
        let queue = MemoryQueue::new();
        publish_pings(&queue, "t", &[1, 2, 3]).await;

        let seen = Arc::new(Mutex::new(Vec::new()));
        let cancel = CancellationToken::new();
        let stream = queue.subscribe("t", "g").await;
        let handler = Collect {
            seen: seen.clone(),
            fail_first: Arc::new(AtomicUsize::new(0)),
        };

        let loop_cancel = cancel.clone();
        let task = tokio::spawn(async move {
            run_handler::<Ping, _, _>(stream, handler, loop_cancel).await
        });

        while queue.lag("t", "g").await > 0 {
            time::sleep(Duration::from_millis(5)).await;
        }
        cancel.cancel();
        task.await.unwrap().unwrap();

        assert_eq!(*seen.lock().await, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn failed_message_is_redelivered() {
        let queue = MemoryQueue::new();
        publish_pings(&queue, "t", &[7]).await;

        let seen = Arc::new(Mutex::new(Vec::new()));
        let cancel = CancellationToken::new();
        let stream = queue.subscribe("t", "g").await;
        let handler = Collect {
            seen: seen.clone(),
            fail_first: Arc::new(AtomicUsize::new(1)),
        };

        let loop_cancel = cancel.clone();
        let task = tokio::spawn(async move {
            run_handler::<Ping, _, _>(stream, handler, loop_cancel).await
        });

        while queue.lag("t", "g").await > 0 {
            time::sleep(Duration::from_millis(5)).await;
        }
        cancel.cancel();
        task.await.unwrap().unwrap();

        // First delivery failed, redelivery succeeded.
        assert_eq!(*seen.lock().await, vec![7]);
    }

    #[tokio::test]
    async fn undecodable_message_is_skipped() {
        let queue = MemoryQueue::new();
        queue.publish("t", b"not json".to_vec()).await.unwrap();
        publish_pings(&queue, "t", &[9]).await;

        let seen = Arc::new(Mutex::new(Vec::new()));
        let cancel = CancellationToken::new();
        let stream = queue.subscribe("t", "g").await;
        let handler = Collect {
            seen: seen.clone(),
            fail_first: Arc::new(AtomicUsize::new(0)),
        };

        let loop_cancel = cancel.clone();
        let task = tokio::spawn(async move {
            run_handler::<Ping, _, _>(stream, handler, loop_cancel).await
        });

        while queue.lag("t", "g").await > 0 {
            time::sleep(Duration::from_millis(5)).await;
        }
        cancel.cancel();
        task.await.unwrap().unwrap();

        assert_eq!(*seen.lock().await, vec![9]);
    }

    #[tokio::test]
    async fn batch_handler_respects_size_and_timeout() {
        let queue = MemoryQueue::new();
        publish_pings(&queue, "t", &[1, 2, 3]).await;

        let batches = Arc::new(Mutex::new(Vec::new()));
        let cancel = CancellationToken::new();
        let stream = queue.subscribe("t", "g").await;
        let handler = CollectBatch {
            batches: batches.clone(),
        };
        let opts = BatchOptions {
            batch_size: 2,
            batch_timeout: Duration::from_millis(50),
        };

        let loop_cancel = cancel.clone();
        let task = tokio::spawn(async move {
            run_batch_handler::<Ping, _, _>(stream, handler, opts, loop_cancel).await
        });

        while queue.lag("t", "g").await > 0 {
            time::sleep(Duration::from_millis(5)).await;
        }
        cancel.cancel();
        task.await.unwrap().unwrap();

        let batches = batches.lock().await.clone();
        // Size-capped first batch, timeout flushes the remainder.
        assert_eq!(batches[0], vec![1, 2]);
        assert_eq!(batches[1], vec![3]);
    }
}
