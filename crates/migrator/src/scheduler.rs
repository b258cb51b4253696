use crate::{
    config::MigratorConfig,
    events::{Direction, producer::EventProducer},
    validator::{Validator, ValidatorConfig},
};
use chrono::Utc;
use connectors::{
    double_write::{DoubleWritePool, Mode},
    store::EntityStore,
};
use model::entity::Entity;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

struct ControlState {
    mode: Mode,
    cancel_full: CancellationToken,
    cancel_incr: CancellationToken,
}

/// Control plane of a live migration: owns the double-write pool's mode and
/// the lifecycle of the full and incremental validators. One mutex serialises
/// every control operation, so mode changes and validator starts are totally
/// ordered. At most one validator of each kind runs at a time; starting a new
/// one cancels its predecessor first.
pub struct Scheduler<T: Entity> {
    pool: Arc<DoubleWritePool>,
    src: Arc<dyn EntityStore<T>>,
    dst: Arc<dyn EntityStore<T>>,
    producer: Arc<dyn EventProducer>,
    config: MigratorConfig,
    state: Mutex<ControlState>,
}

impl<T: Entity> Scheduler<T> {
    pub fn new(
        pool: Arc<DoubleWritePool>,
        src: Arc<dyn EntityStore<T>>,
        dst: Arc<dyn EntityStore<T>>,
        producer: Arc<dyn EventProducer>,
        config: MigratorConfig,
    ) -> Self {
        Scheduler {
            pool,
            src,
            dst,
            producer,
            config,
            // Fresh tokens stand in for "nothing to cancel", so stopping
            // before the first start is a harmless no-op.
            state: Mutex::new(ControlState {
                mode: Mode::SrcOnly,
                cancel_full: CancellationToken::new(),
                cancel_incr: CancellationToken::new(),
            }),
        }
    }

    pub async fn mode(&self) -> Mode {
        self.state.lock().await.mode
    }

    pub async fn set_mode(&self, mode: Mode) {
        let mut state = self.state.lock().await;
        state.mode = mode;
        self.pool.update_mode(mode);
        info!(mode = %mode, "double-write mode updated");
    }

    pub async fn src_only(&self) {
        self.set_mode(Mode::SrcOnly).await;
    }

    pub async fn src_first(&self) {
        self.set_mode(Mode::SrcFirst).await;
    }

    pub async fn dst_first(&self) {
        self.set_mode(Mode::DstFirst).await;
    }

    pub async fn dst_only(&self) {
        self.set_mode(Mode::DstOnly).await;
    }

    /// Starts a full sweep, replacing (and cancelling) any sweep already
    /// running.
    pub async fn start_full(&self) {
        let mut state = self.state.lock().await;
        let validator = self.new_validator(
            state.mode,
            ValidatorConfig::full()
                .with_batch_size(self.config.batch_size)
                .with_op_timeout(self.config.op_timeout),
        );
        let previous = std::mem::replace(&mut state.cancel_full, CancellationToken::new());
        let cancel = state.cancel_full.clone();
        info!("starting full validation");
        tokio::spawn(async move {
            previous.cancel();
            if let Err(err) = validator.validate(&cancel).await {
                error!(error = %err, "full validation exited");
            }
        });
    }

    pub async fn stop_full(&self) {
        let mut state = self.state.lock().await;
        state.cancel_full.cancel();
        state.cancel_full = CancellationToken::new();
        info!("full validation cancelled");
    }

    /// Starts an incremental sweep bounded at "now", replacing any running
    /// one.
    pub async fn start_incr(&self) {
        let mut state = self.state.lock().await;
        let since = Utc::now().timestamp_millis();
        let validator = self.new_validator(
            state.mode,
            ValidatorConfig::incremental(since, self.config.incr_tail)
                .with_batch_size(self.config.batch_size)
                .with_op_timeout(self.config.op_timeout),
        );
        let previous = std::mem::replace(&mut state.cancel_incr, CancellationToken::new());
        let cancel = state.cancel_incr.clone();
        info!(since, "starting incremental validation");
        tokio::spawn(async move {
            previous.cancel();
            if let Err(err) = validator.validate(&cancel).await {
                error!(error = %err, "incremental validation exited");
            }
        });
    }

    pub async fn stop_incr(&self) {
        let mut state = self.state.lock().await;
        state.cancel_incr.cancel();
        state.cancel_incr = CancellationToken::new();
        info!("incremental validation cancelled");
    }

    /// Validation direction follows the mode: whichever store the application
    /// currently trusts is the base.
    fn new_validator(&self, mode: Mode, config: ValidatorConfig) -> Validator<T> {
        match mode {
            Mode::SrcOnly | Mode::SrcFirst => Validator::new(
                self.src.clone(),
                self.dst.clone(),
                Direction::Src,
                self.producer.clone(),
                config,
            ),
            Mode::DstFirst | Mode::DstOnly => Validator::new(
                self.dst.clone(),
                self.src.clone(),
                Direction::Dst,
                self.producer.clone(),
                config,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        events::InconsistentKind,
        testutil::{RecordingProducer, TestUser, null_double_write_pool, seeded_table},
    };
    use connectors::memory::MemTable;
    use std::time::Duration;
    use tokio::time;

    fn scheduler(
        src: Arc<MemTable<TestUser>>,
        dst: Arc<MemTable<TestUser>>,
        producer: Arc<RecordingProducer>,
    ) -> (Scheduler<TestUser>, Arc<DoubleWritePool>) {
        let pool = null_double_write_pool();
        let scheduler = Scheduler::new(
            pool.clone(),
            src,
            dst,
            producer,
            MigratorConfig {
                incr_tail: Duration::from_millis(10),
                ..MigratorConfig::default()
            },
        );
        (scheduler, pool)
    }

    async fn wait_for_events(producer: &RecordingProducer, at_least: usize) {
        for _ in 0..200 {
            if producer.events().await.len() >= at_least {
                return;
            }
            time::sleep(Duration::from_millis(5)).await;
        }
        panic!("validator produced no events in time");
    }

    #[tokio::test]
    async fn mode_changes_propagate_to_the_pool() {
        let producer = Arc::new(RecordingProducer::default());
        let (scheduler, pool) =
            scheduler(Arc::new(MemTable::new()), Arc::new(MemTable::new()), producer);

        scheduler.src_first().await;
        assert_eq!(pool.mode(), Mode::SrcFirst);
        assert_eq!(scheduler.mode().await, Mode::SrcFirst);

        scheduler.dst_only().await;
        assert_eq!(pool.mode(), Mode::DstOnly);
    }

    #[tokio::test]
    async fn full_scan_direction_follows_src_mode() {
        let src = seeded_table(&[TestUser::new(3, "xyz", 100)]).await;
        let dst: Arc<MemTable<TestUser>> = Arc::new(MemTable::new());
        let producer = Arc::new(RecordingProducer::default());
        let (scheduler, _) = scheduler(src, dst, producer.clone());

        scheduler.start_full().await;
        wait_for_events(&producer, 1).await;

        let events = producer.events().await;
        assert_eq!(events[0].typ, InconsistentKind::TargetMissing);
        assert_eq!(events[0].direction, Direction::Src);
    }

    #[tokio::test]
    async fn full_scan_direction_follows_dst_mode() {
        // Under a dst-flavoured mode the pair swaps: dst is base, so a row
        // present only in src is reported missing-in-base.
        let src = seeded_table(&[TestUser::new(4, "xyz", 100)]).await;
        let dst: Arc<MemTable<TestUser>> = Arc::new(MemTable::new());
        let producer = Arc::new(RecordingProducer::default());
        let (scheduler, _) = scheduler(src, dst, producer.clone());

        scheduler.dst_first().await;
        scheduler.start_full().await;
        wait_for_events(&producer, 1).await;

        let events = producer.events().await;
        assert_eq!(events[0].typ, InconsistentKind::BaseMissing);
        assert_eq!(events[0].direction, Direction::Dst);
    }

    #[tokio::test]
    async fn stop_incr_silences_the_tail() {
        let src: Arc<MemTable<TestUser>> = Arc::new(MemTable::new());
        let dst: Arc<MemTable<TestUser>> = Arc::new(MemTable::new());
        let producer = Arc::new(RecordingProducer::default());
        let (scheduler, _) = scheduler(src.clone(), dst, producer.clone());

        scheduler.start_incr().await;
        time::sleep(Duration::from_millis(30)).await;
        scheduler.stop_incr().await;
        time::sleep(Duration::from_millis(30)).await;

        // A row modified after the stop is never reported.
        src.insert(TestUser::with_utime(
            9,
            "late",
            1,
            Utc::now().timestamp_millis() + 1_000,
        ))
        .await;
        time::sleep(Duration::from_millis(50)).await;

        assert!(producer.events().await.is_empty());
    }

    #[tokio::test]
    async fn restart_after_stop_runs_to_completion() {
        let src = seeded_table(&[TestUser::new(1, "a", 10)]).await;
        let dst: Arc<MemTable<TestUser>> = Arc::new(MemTable::new());
        let producer = Arc::new(RecordingProducer::default());
        let (scheduler, _) = scheduler(src, dst, producer.clone());

        scheduler.start_full().await;
        scheduler.stop_full().await;
        scheduler.start_full().await;
        wait_for_events(&producer, 1).await;

        let events = producer.events().await;
        assert!(
            events
                .iter()
                .any(|evt| evt.typ == InconsistentKind::TargetMissing && evt.id == 1)
        );
    }
}
