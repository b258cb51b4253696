use crate::events::{
    InconsistentEvent,
    producer::{EventError, EventProducer},
};
use crate::queue::QueueError;
use async_trait::async_trait;
use connectors::{
    double_write::DoubleWritePool,
    error::DbError,
    memory::MemTable,
    pool::{ConnPool, ExecResult, PoolTx, StoreKind},
};
use model::{
    core::{row::Row, value::Value},
    entity::Entity,
    errors::ConvertError,
};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use tokio::sync::Mutex;

/// The entity the framework's own tests migrate.
#[derive(Debug, Clone, PartialEq)]
pub struct TestUser {
    pub id: i64,
    pub name: String,
    pub age: i64,
    pub gender: i64,
    pub ctime: i64,
    pub utime: i64,
}

impl TestUser {
    pub fn new(id: i64, name: &str, age: i64) -> Self {
        TestUser {
            id,
            name: name.to_string(),
            age,
            gender: 1,
            ctime: 0,
            utime: 0,
        }
    }

    pub fn with_utime(id: i64, name: &str, age: i64, utime: i64) -> Self {
        TestUser {
            utime,
            ..TestUser::new(id, name, age)
        }
    }
}

impl Entity for TestUser {
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
        Ok(TestUser {
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

pub async fn seeded_table(rows: &[TestUser]) -> Arc<MemTable<TestUser>> {
    let table = MemTable::new();
    for row in rows {
        table.insert(row.clone()).await;
    }
    Arc::new(table)
}

/// Producer double that records published events in order; can be switched
/// to fail every publish.
#[derive(Default)]
pub struct RecordingProducer {
    events: Mutex<Vec<InconsistentEvent>>,
    fail: AtomicBool,
}

impl RecordingProducer {
    pub fn failing() -> Self {
        let producer = RecordingProducer::default();
        producer.fail.store(true, Ordering::SeqCst);
        producer
    }

    pub async fn events(&self) -> Vec<InconsistentEvent> {
        self.events.lock().await.clone()
    }
}

#[async_trait]
impl EventProducer for RecordingProducer {
    async fn publish(&self, evt: InconsistentEvent) -> Result<(), EventError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(EventError::Queue(QueueError::Closed));
        }
        self.events.lock().await.push(evt);
        Ok(())
    }
}

/// Pool stub for tests that only exercise mode propagation.
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

pub fn null_double_write_pool() -> Arc<DoubleWritePool> {
    Arc::new(DoubleWritePool::new(Arc::new(NullPool), Arc::new(NullPool)))
}
