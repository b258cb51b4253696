//! End-to-end lifecycle: validator -> event queue -> fix consumer, driven by
//! the scheduler's control surface, over in-memory stores.

use async_trait::async_trait;
use chrono::Utc;
use connectors::{
    double_write::DoubleWritePool,
    error::DbError,
    memory::MemTable,
    pool::{ConnPool, ExecResult, PoolTx, StoreKind},
    store::EntityStore,
};
use migrator::{
    config::MigratorConfig,
    control::Controller,
    events::{Direction, InconsistentEvent, InconsistentKind, consumer::FixConsumer, producer::QueueEventProducer},
    queue::{QueuePublisher, memory::MemoryQueue},
    scheduler::Scheduler,
};
use model::{
    core::{row::Row, value::Value},
    entity::Entity,
    errors::ConvertError,
};
use std::{sync::Arc, time::Duration};
use tokio::time;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq)]
struct User {
    id: i64,
    name: String,
    age: i64,
    gender: i64,
    ctime: i64,
    utime: i64,
}

impl User {
    fn new(id: i64, name: &str, age: i64) -> Self {
        User {
            id,
            name: name.to_string(),
            age,
            gender: 1,
            ctime: 0,
            utime: 0,
        }
    }
}

impl Entity for User {
    fn table() -> &'static str {
        "users"
    }

    fn columns() -> &'static [&'static str] {
        &["id", "name", "age", "gender", "ctime", "utime"]
    }

    fn id(&self) -> i64 {
        self.id
    }

    fn utime(&self) -> i64 {
        self.utime
    }

    fn compare_to(&self, other: &Self) -> bool {
        self == other
    }

    fn from_row(row: &Row) -> Result<Self, ConvertError> {
        Ok(User {
            id: row.i64("id")?,
            name: row.text("name")?,
            age: row.i64("age")?,
            gender: row.i64("gender")?,
            ctime: row.i64("ctime")?,
            utime: row.i64("utime")?,
        })
    }

    fn to_row(&self) -> Row {
        let mut row = Row::new();
        row.push("id", Value::Int(self.id));
        row.push("name", Value::Text(self.name.clone()));
        row.push("age", Value::Int(self.age));
        row.push("gender", Value::Int(self.gender));
        row.push("ctime", Value::Int(self.ctime));
        row.push("utime", Value::Int(self.utime));
        row
    }
}

struct NullPool;

#[async_trait]
impl ConnPool for NullPool {
    async fn exec(&self, _sql: &str, _params: Vec<Value>) -> Result<ExecResult, DbError> {
        Err(DbError::Unsupported("null pool"))
    }

    async fn query(&self, _sql: &str, _params: Vec<Value>) -> Result<Vec<Row>, DbError> {
        Err(DbError::Unsupported("null pool"))
    }

    async fn query_one(&self, _sql: &str, _params: Vec<Value>) -> Result<Option<Row>, DbError> {
        Err(DbError::Unsupported("null pool"))
    }

    async fn begin(&self) -> Result<Box<dyn PoolTx>, DbError> {
        Err(DbError::Unsupported("null pool"))
    }

    async fn prepare(&self, _sql: &str) -> Result<(), DbError> {
        Err(DbError::Unsupported("null pool"))
    }

    fn kind(&self) -> StoreKind {
        StoreKind::MySql
    }
}

struct Harness {
    src: Arc<MemTable<User>>,
    dst: Arc<MemTable<User>>,
    queue: MemoryQueue,
    controller: Controller<User>,
    cancel: CancellationToken,
    config: MigratorConfig,
}

impl Harness {
    async fn start() -> Self {
        let src: Arc<MemTable<User>> = Arc::new(MemTable::new());
        let dst: Arc<MemTable<User>> = Arc::new(MemTable::new());

        let config = MigratorConfig {
            incr_tail: Duration::from_millis(10),
            ..MigratorConfig::default()
        };

        let queue = MemoryQueue::new();
        let producer = Arc::new(QueueEventProducer::new(
            Arc::new(queue.clone()),
            config.topic.clone(),
        ));

        let src_store: Arc<dyn EntityStore<User>> = src.clone();
        let dst_store: Arc<dyn EntityStore<User>> = dst.clone();

        let pool = Arc::new(DoubleWritePool::new(Arc::new(NullPool), Arc::new(NullPool)));
        let scheduler = Arc::new(Scheduler::new(
            pool,
            src_store.clone(),
            dst_store.clone(),
            producer,
            config.clone(),
        ));

        let consumer = Arc::new(FixConsumer::new(
            src_store,
            dst_store,
            config.consume_timeout,
        ));
        let cancel = CancellationToken::new();
        let stream = queue.subscribe(&config.topic, &config.group).await;
        consumer.start(stream, cancel.clone());

        Harness {
            src,
            dst,
            queue,
            controller: Controller::new(scheduler),
            cancel,
            config,
        }
    }

    async fn converged(&self) -> bool {
        if self.queue.lag(&self.config.topic, &self.config.group).await > 0 {
            return false;
        }
        let src_ids = self.src.ids().await;
        if src_ids != self.dst.ids().await {
            return false;
        }
        for id in src_ids {
            if self.src.get(id).await != self.dst.get(id).await {
                return false;
            }
        }
        true
    }

    async fn wait_for_convergence(&self) {
        for _ in 0..400 {
            if self.converged().await {
                return;
            }
            time::sleep(Duration::from_millis(5)).await;
        }
        panic!(
            "stores did not converge: src={:?} dst={:?} lag={}",
            self.src.ids().await,
            self.dst.ids().await,
            self.queue.lag(&self.config.topic, &self.config.group).await,
        );
    }
}

#[tokio::test]
async fn full_scan_and_repair_converge_the_stores() {
    let harness = Harness::start().await;

    // src is authoritative: one clean row, one divergent, one missing from
    // dst; dst carries a leftover row that must disappear.
    harness.src.insert(User::new(1, "ann", 30)).await;
    harness.src.insert(User::new(2, "bob", 40)).await;
    harness.src.insert(User::new(3, "eve", 50)).await;
    harness.dst.insert(User::new(1, "ann", 30)).await;
    harness.dst.insert(User::new(2, "bob", 41)).await;
    harness.dst.insert(User::new(9, "zed", 99)).await;

    let response = harness.controller.start_full().await;
    assert_eq!(response.code, 0);

    harness.wait_for_convergence().await;

    assert_eq!(harness.dst.ids().await, vec![1, 2, 3]);
    assert_eq!(harness.dst.get(2).await.unwrap().age, 40);
    harness.cancel.cancel();
}

#[tokio::test]
async fn incremental_scan_picks_up_new_writes() {
    let harness = Harness::start().await;

    let response = harness.controller.start_incr().await;
    assert_eq!(response.code, 0);

    // A write landing on src after the threshold is tailed into dst.
    let late = User {
        utime: Utc::now().timestamp_millis() + 1_000,
        ..User::new(7, "late", 7)
    };
    harness.src.insert(late.clone()).await;

    harness.wait_for_convergence().await;
    assert_eq!(harness.dst.get(7).await, Some(late));

    harness.controller.stop_incr().await;
    harness.cancel.cancel();
}

#[tokio::test]
async fn full_scan_restarts_cleanly_after_cancellation() {
    let harness = Harness::start().await;

    for id in 1..=50 {
        harness.src.insert(User::new(id, "row", id)).await;
    }

    harness.controller.start_full().await;
    harness.controller.stop_full().await;

    // A fresh start after the cancel runs to completion unaffected.
    harness.controller.start_full().await;
    harness.wait_for_convergence().await;

    assert_eq!(harness.dst.len().await, 50);
    harness.cancel.cancel();
}

#[tokio::test]
async fn duplicate_events_are_harmless() {
    let harness = Harness::start().await;
    harness.src.insert(User::new(11, "dup", 1)).await;

    let evt = InconsistentEvent {
        typ: InconsistentKind::TargetMissing,
        id: 11,
        direction: Direction::Src,
    };
    for _ in 0..3 {
        harness
            .queue
            .publish(&harness.config.topic, serde_json::to_vec(&evt).unwrap())
            .await
            .unwrap();
    }

    harness.wait_for_convergence().await;
    assert_eq!(harness.dst.get(11).await, harness.src.get(11).await);
    harness.cancel.cancel();
}
