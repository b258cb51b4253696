use crate::events::{Direction, InconsistentEvent, InconsistentKind, producer::EventProducer};
use connectors::{error::DbError, store::EntityStore};
use model::entity::Entity;
use std::{collections::HashSet, future::Future, sync::Arc, time::Duration};
use thiserror::Error;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ValidateError {
    /// The scan was cancelled before reaching the end of the stream.
    #[error("validation cancelled")]
    Cancelled,
}

/// Which rows a scan covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanKind {
    /// Every row, in primary-key order.
    Full,
    /// Only rows with `utime >= since` (millis), in modification-time order.
    Incremental { since: i64 },
}

#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    pub scan: ScanKind,
    /// `None` exits at end of stream; `Some` sleeps that long between empty
    /// polls and keeps tailing.
    pub tail: Option<Duration>,
    pub batch_size: usize,
    pub op_timeout: Duration,
}

pub const DEFAULT_BATCH_SIZE: usize = 100;
pub const DEFAULT_OP_TIMEOUT: Duration = Duration::from_secs(3);

impl ValidatorConfig {
    /// One-shot full sweep.
    pub fn full() -> Self {
        ValidatorConfig {
            scan: ScanKind::Full,
            tail: None,
            batch_size: DEFAULT_BATCH_SIZE,
            op_timeout: DEFAULT_OP_TIMEOUT,
        }
    }

    /// Modification-time bounded sweep that keeps tailing.
    pub fn incremental(since: i64, tail: Duration) -> Self {
        ValidatorConfig {
            scan: ScanKind::Incremental { since },
            tail: Some(tail),
            batch_size: DEFAULT_BATCH_SIZE,
            op_timeout: DEFAULT_OP_TIMEOUT,
        }
    }

    pub fn with_tail(mut self, tail: Duration) -> Self {
        self.tail = Some(tail);
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_op_timeout(mut self, op_timeout: Duration) -> Self {
        self.op_timeout = op_timeout;
        self
    }
}

/// Dual-direction consistency scanner over a `(base, target)` pair of
/// stores. Detected divergences are published as [`InconsistentEvent`]s
/// labelled with `direction`; repairing them is the consumer's job.
pub struct Validator<T: Entity> {
    base: Arc<dyn EntityStore<T>>,
    target: Arc<dyn EntityStore<T>>,
    direction: Direction,
    producer: Arc<dyn EventProducer>,
    config: ValidatorConfig,
}

impl<T: Entity> Validator<T> {
    pub fn new(
        base: Arc<dyn EntityStore<T>>,
        target: Arc<dyn EntityStore<T>>,
        direction: Direction,
        producer: Arc<dyn EventProducer>,
        config: ValidatorConfig,
    ) -> Self {
        Validator {
            base,
            target,
            direction,
            producer,
            config,
        }
    }

    /// Runs both passes concurrently, waits for both to finish and returns
    /// the first error observed. The only terminal error is cancellation:
    /// store failures are logged and the scan moves on.
    pub async fn validate(&self, cancel: &CancellationToken) -> Result<(), ValidateError> {
        let (forward, backward) = tokio::join!(
            self.base_to_target(cancel),
            self.target_to_base(cancel),
        );
        forward.and(backward)
    }

    /// Wraps one store round-trip in the per-op timeout and the cancellation
    /// token, keeping a slow query from delaying a stop request.
    async fn guarded<F, R>(
        &self,
        cancel: &CancellationToken,
        op: F,
    ) -> Result<Result<R, DbError>, ValidateError>
    where
        F: Future<Output = Result<R, DbError>>,
    {
        tokio::select! {
            _ = cancel.cancelled() => Err(ValidateError::Cancelled),
            outcome = time::timeout(self.config.op_timeout, op) => Ok(match outcome {
                Ok(result) => result,
                Err(_) => Err(DbError::Timeout(self.config.op_timeout)),
            }),
        }
    }

    async fn pause(
        &self,
        cancel: &CancellationToken,
        interval: Duration,
    ) -> Result<(), ValidateError> {
        tokio::select! {
            _ = cancel.cancelled() => Err(ValidateError::Cancelled),
            _ = time::sleep(interval) => Ok(()),
        }
    }

    async fn next_base_row(
        &self,
        cancel: &CancellationToken,
        offset: u64,
    ) -> Result<Result<Option<T>, DbError>, ValidateError> {
        match self.config.scan {
            ScanKind::Full => self.guarded(cancel, self.base.nth_by_id(offset)).await,
            ScanKind::Incremental { since } => {
                self.guarded(cancel, self.base.nth_modified_since(since, offset))
                    .await
            }
        }
    }

    /// Walks base one row at a time and checks each row's counterpart in
    /// target by primary key.
    async fn base_to_target(&self, cancel: &CancellationToken) -> Result<(), ValidateError> {
        let mut offset = 0u64;
        loop {
            let row = match self.next_base_row(cancel, offset).await? {
                Ok(row) => row,
                Err(err) => {
                    // A poisoned row must not wedge the sweep: skip past it.
                    error!(offset, error = %err, "base -> target: reading base failed");
                    offset += 1;
                    continue;
                }
            };

            let src = match row {
                Some(src) => src,
                None => match self.config.tail {
                    Some(interval) => {
                        self.pause(cancel, interval).await?;
                        continue;
                    }
                    None => return Ok(()),
                },
            };

            match self.guarded(cancel, self.target.find_by_id(src.id())).await? {
                Ok(None) => {
                    self.notify(src.id(), InconsistentKind::TargetMissing).await;
                }
                Ok(Some(dst)) => {
                    if !src.compare_to(&dst) {
                        self.notify(src.id(), InconsistentKind::Neq).await;
                    }
                }
                Err(err) => {
                    error!(offset, id = src.id(), error = %err, "base -> target: reading target failed");
                }
            }
            offset += 1;
        }
    }

    /// Walks target in id batches and reports ids base no longer has. Value
    /// comparison is the forward pass's job; this pass only finds rows that
    /// should not exist anymore.
    async fn target_to_base(&self, cancel: &CancellationToken) -> Result<(), ValidateError> {
        let mut offset = 0u64;
        loop {
            let ids = match self
                .guarded(cancel, self.target.id_page(offset, self.config.batch_size))
                .await?
            {
                Ok(ids) => ids,
                Err(err) => {
                    error!(offset, error = %err, "target -> base: reading target failed");
                    // Advance past the unreadable page so progress is bounded
                    // from below even when a range of rows keeps failing.
                    offset += self.config.batch_size as u64;
                    continue;
                }
            };

            if ids.is_empty() {
                match self.config.tail {
                    Some(interval) => {
                        self.pause(cancel, interval).await?;
                        continue;
                    }
                    None => return Ok(()),
                }
            }

            match self.guarded(cancel, self.base.find_by_ids(&ids)).await? {
                Ok(rows) => {
                    let base_ids: HashSet<i64> = rows.iter().map(Entity::id).collect();
                    for id in ids.iter().filter(|id| !base_ids.contains(id)) {
                        self.notify(*id, InconsistentKind::BaseMissing).await;
                    }
                }
                Err(err) => {
                    error!(offset, error = %err, "target -> base: reading base failed");
                }
            }

            let end_of_stream = ids.len() < self.config.batch_size;
            offset += ids.len() as u64;
            if end_of_stream {
                match self.config.tail {
                    Some(interval) => self.pause(cancel, interval).await?,
                    None => return Ok(()),
                }
            }
        }
    }

    async fn notify(&self, id: i64, typ: InconsistentKind) {
        let evt = InconsistentEvent {
            typ,
            id,
            direction: self.direction,
        };
        if let Err(err) = self.producer.publish(evt).await {
            // The next pass re-observes the inconsistency; no retry here.
            error!(id, typ = %typ, direction = %self.direction, error = %err, "publishing inconsistency failed");
        }
    }
}
