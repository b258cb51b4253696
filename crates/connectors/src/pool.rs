use crate::error::DbError;
use async_trait::async_trait;
use model::core::{row::Row, value::Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    MySql,
    Postgres,
}

/// Outcome of a write operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecResult {
    pub rows_affected: u64,
    pub last_insert_id: Option<u64>,
}

/// The connection-pool capability the hosting ORM plugs into: plain SQL
/// execution plus transactions. Both concrete drivers and the double-write
/// facade implement this, so application code never learns which store (or
/// how many stores) sits behind it.
#[async_trait]
pub trait ConnPool: Send + Sync {
    async fn exec(&self, sql: &str, params: Vec<Value>) -> Result<ExecResult, DbError>;

    async fn query(&self, sql: &str, params: Vec<Value>) -> Result<Vec<Row>, DbError>;

    async fn query_one(&self, sql: &str, params: Vec<Value>) -> Result<Option<Row>, DbError>;

    async fn begin(&self) -> Result<Box<dyn PoolTx>, DbError>;

    /// Server-side statement preparation. Facades that cannot bind a prepared
    /// statement to a single store refuse this capability with
    /// [`DbError::Unsupported`].
    async fn prepare(&self, sql: &str) -> Result<(), DbError>;

    /// Dialect of the store answering reads right now.
    fn kind(&self) -> StoreKind;
}

/// An open transaction handed out by [`ConnPool::begin`]. `commit` and
/// `rollback` consume the transaction.
#[async_trait]
pub trait PoolTx: Send {
    async fn exec(&mut self, sql: &str, params: Vec<Value>) -> Result<ExecResult, DbError>;

    async fn query(&mut self, sql: &str, params: Vec<Value>) -> Result<Vec<Row>, DbError>;

    async fn query_one(&mut self, sql: &str, params: Vec<Value>)
    -> Result<Option<Row>, DbError>;

    async fn commit(self: Box<Self>) -> Result<(), DbError>;

    async fn rollback(self: Box<Self>) -> Result<(), DbError>;
}
