use crate::{
    events::{Direction, InconsistentEvent},
    fixer::Fixer,
    queue::{
        Message, MessageStream,
        handler::{HandlerError, MessageHandler, run_handler},
    },
};
use async_trait::async_trait;
use connectors::store::EntityStore;
use model::entity::Entity;
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tokio::{task::JoinHandle, time};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Consumer group every fix consumer joins.
pub const FIX_CONSUMER_GROUP: &str = "migrator_fix";

#[derive(Debug, Error)]
pub enum ConsumeError {
    #[error("repair timed out after {0:?}")]
    Timeout(Duration),

    #[error("repair failed: {0}")]
    Db(#[from] connectors::error::DbError),
}

/// Listens for inconsistency events and repairs the named row. One fixer per
/// direction, both long-lived: `src` repairs with base=src/target=dst, `dst`
/// with the pair swapped.
pub struct FixConsumer<T: Entity> {
    src_fixer: Fixer<T>,
    dst_fixer: Fixer<T>,
    timeout: Duration,
}

impl<T: Entity> FixConsumer<T> {
    pub fn new(
        src: Arc<dyn EntityStore<T>>,
        dst: Arc<dyn EntityStore<T>>,
        timeout: Duration,
    ) -> Self {
        FixConsumer {
            src_fixer: Fixer::new(src.clone(), dst.clone()),
            dst_fixer: Fixer::new(dst, src),
            timeout,
        }
    }

    pub async fn consume(&self, evt: InconsistentEvent) -> Result<(), ConsumeError> {
        let fixer = match evt.direction {
            Direction::Src => &self.src_fixer,
            Direction::Dst => &self.dst_fixer,
        };
        match time::timeout(self.timeout, fixer.fix(evt.id)).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(ConsumeError::Timeout(self.timeout)),
        }
    }

    /// Drives the repair loop over `stream` until `cancel` fires. Offsets are
    /// marked only after a successful repair, so failed repairs ride broker
    /// redelivery.
    pub fn start<S>(self: Arc<Self>, stream: S, cancel: CancellationToken) -> JoinHandle<()>
    where
        S: MessageStream + 'static,
    {
        tokio::spawn(async move {
            info!(group = FIX_CONSUMER_GROUP, "fix consumer started");
            if let Err(err) = run_handler::<InconsistentEvent, _, _>(stream, FixHandler(self), cancel).await
            {
                error!(error = %err, "fix consumer exited");
            }
        })
    }
}

struct FixHandler<T: Entity>(Arc<FixConsumer<T>>);

#[async_trait]
impl<T: Entity> MessageHandler<InconsistentEvent> for FixHandler<T> {
    async fn handle(&self, _msg: &Message, evt: InconsistentEvent) -> Result<(), HandlerError> {
        self.0.consume(evt).await.map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        events::InconsistentKind,
        queue::{QueuePublisher, memory::MemoryQueue},
        testutil::{TestUser, seeded_table},
    };
    use connectors::memory::MemTable;

    #[tokio::test]
    async fn src_direction_repairs_dst_from_src() {
        let src = seeded_table(&[TestUser::new(3, "xyz", 100)]).await;
        let dst: Arc<MemTable<TestUser>> = Arc::new(MemTable::new());
        let consumer =
            FixConsumer::new(src.clone(), dst.clone(), Duration::from_secs(5));

        consumer
            .consume(InconsistentEvent {
                typ: InconsistentKind::TargetMissing,
                id: 3,
                direction: Direction::Src,
            })
            .await
            .unwrap();

        assert_eq!(dst.get(3).await, src.get(3).await);
    }

    #[tokio::test]
    async fn dst_direction_repairs_src_from_dst() {
        let src = seeded_table(&[TestUser::new(5, "stale", 1)]).await;
        let dst: Arc<MemTable<TestUser>> = Arc::new(MemTable::new());
        let consumer =
            FixConsumer::new(src.clone(), dst.clone(), Duration::from_secs(5));

        // dst is authoritative and has no row 5: it must go away from src.
        consumer
            .consume(InconsistentEvent {
                typ: InconsistentKind::BaseMissing,
                id: 5,
                direction: Direction::Dst,
            })
            .await
            .unwrap();

        assert!(src.get(5).await.is_none());
    }

    #[tokio::test]
    async fn drains_events_from_the_queue() {
        let src = seeded_table(&[TestUser::new(1, "a", 10), TestUser::new(2, "b", 20)]).await;
        let dst: Arc<MemTable<TestUser>> = Arc::new(MemTable::new());

        let queue = MemoryQueue::new();
        for id in [1, 2] {
            let evt = InconsistentEvent {
                typ: InconsistentKind::TargetMissing,
                id,
                direction: Direction::Src,
            };
            queue
                .publish("fix", serde_json::to_vec(&evt).unwrap())
                .await
                .unwrap();
        }

        let consumer = Arc::new(FixConsumer::new(
            src.clone(),
            dst.clone(),
            Duration::from_secs(5),
        ));
        let cancel = CancellationToken::new();
        let stream = queue.subscribe("fix", FIX_CONSUMER_GROUP).await;
        let task = consumer.start(stream, cancel.clone());

        while queue.lag("fix", FIX_CONSUMER_GROUP).await > 0 {
            time::sleep(Duration::from_millis(5)).await;
        }
        cancel.cancel();
        task.await.unwrap();

        assert_eq!(dst.len().await, 2);
    }
}
