use crate::{
    error::DbError,
    pool::{ConnPool, ExecResult, PoolTx, StoreKind},
};
use async_trait::async_trait;
use model::core::{row::Row, value::Value};
use std::{
    fmt,
    str::FromStr,
    sync::{
        Arc,
        atomic::{AtomicU8, Ordering},
    },
};
use thiserror::Error;
use tracing::error;

/// Routing mode of the double-write pool. Exactly one mode is in effect
/// process-wide; the scheduler is the only writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Mode {
    SrcOnly = 0,
    SrcFirst = 1,
    DstFirst = 2,
    DstOnly = 3,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown double-write mode: {0}")]
pub struct UnknownMode(pub String);

impl Mode {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Mode::SrcOnly => "src_only",
            Mode::SrcFirst => "src_first",
            Mode::DstFirst => "dst_first",
            Mode::DstOnly => "dst_only",
        }
    }

    fn from_u8(raw: u8) -> Mode {
        match raw {
            0 => Mode::SrcOnly,
            1 => Mode::SrcFirst,
            2 => Mode::DstFirst,
            _ => Mode::DstOnly,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = UnknownMode;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "src_only" => Ok(Mode::SrcOnly),
            "src_first" => Ok(Mode::SrcFirst),
            "dst_first" => Ok(Mode::DstFirst),
            "dst_only" => Ok(Mode::DstOnly),
            other => Err(UnknownMode(other.to_string())),
        }
    }
}

/// Lock-free mode cell: single writer (the scheduler, under its own lock),
/// many readers (every pool operation).
struct ModeCell(AtomicU8);

impl ModeCell {
    fn new(mode: Mode) -> Self {
        ModeCell(AtomicU8::new(mode as u8))
    }

    fn load(&self) -> Mode {
        Mode::from_u8(self.0.load(Ordering::SeqCst))
    }

    fn store(&self, mode: Mode) {
        self.0.store(mode as u8, Ordering::SeqCst);
    }
}

/// A connection pool that presents one data source to the application while
/// fanning writes out to a source and a destination store under the current
/// [`Mode`]. The primary store's result is the operation's result; mirror
/// failures are logged and reconciled later by validation, never propagated.
pub struct DoubleWritePool {
    src: Arc<dyn ConnPool>,
    dst: Arc<dyn ConnPool>,
    mode: ModeCell,
}

impl DoubleWritePool {
    pub fn new(src: Arc<dyn ConnPool>, dst: Arc<dyn ConnPool>) -> Self {
        Self::with_mode(src, dst, Mode::SrcOnly)
    }

    pub fn with_mode(src: Arc<dyn ConnPool>, dst: Arc<dyn ConnPool>, mode: Mode) -> Self {
        DoubleWritePool {
            src,
            dst,
            mode: ModeCell::new(mode),
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode.load()
    }

    /// Atomically switches routing. In-flight operations keep the mode they
    /// captured; only operations beginning after the store observe the new
    /// one.
    pub fn update_mode(&self, mode: Mode) {
        self.mode.store(mode);
    }

    fn primary(&self, mode: Mode) -> &Arc<dyn ConnPool> {
        match mode {
            Mode::SrcOnly | Mode::SrcFirst => &self.src,
            Mode::DstFirst | Mode::DstOnly => &self.dst,
        }
    }
}

#[async_trait]
impl ConnPool for DoubleWritePool {
    async fn exec(&self, sql: &str, params: Vec<Value>) -> Result<ExecResult, DbError> {
        match self.mode.load() {
            Mode::SrcOnly => self.src.exec(sql, params).await,
            Mode::DstOnly => self.dst.exec(sql, params).await,
            Mode::SrcFirst => {
                let result = self.src.exec(sql, params.clone()).await?;
                if let Err(err) = self.dst.exec(sql, params).await {
                    error!(error = %err, sql, "mirror write to dst failed");
                }
                Ok(result)
            }
            Mode::DstFirst => {
                let result = self.dst.exec(sql, params.clone()).await?;
                if let Err(err) = self.src.exec(sql, params).await {
                    error!(error = %err, sql, "mirror write to src failed");
                }
                Ok(result)
            }
        }
    }

    async fn query(&self, sql: &str, params: Vec<Value>) -> Result<Vec<Row>, DbError> {
        // Reads never fan out.
        self.primary(self.mode.load()).query(sql, params).await
    }

    async fn query_one(&self, sql: &str, params: Vec<Value>) -> Result<Option<Row>, DbError> {
        self.primary(self.mode.load()).query_one(sql, params).await
    }

    async fn begin(&self) -> Result<Box<dyn PoolTx>, DbError> {
        let mode = self.mode.load();
        match mode {
            Mode::SrcOnly => {
                let src = self.src.begin().await?;
                Ok(Box::new(DoubleWriteTx {
                    src: Some(src),
                    dst: None,
                    mode,
                }))
            }
            Mode::DstOnly => {
                let dst = self.dst.begin().await?;
                Ok(Box::new(DoubleWriteTx {
                    src: None,
                    dst: Some(dst),
                    mode,
                }))
            }
            Mode::SrcFirst => {
                let src = self.src.begin().await?;
                let dst = match self.dst.begin().await {
                    Ok(tx) => Some(tx),
                    Err(err) => {
                        error!(error = %err, "failed to open transaction on dst");
                        None
                    }
                };
                Ok(Box::new(DoubleWriteTx {
                    src: Some(src),
                    dst,
                    mode,
                }))
            }
            Mode::DstFirst => {
                let dst = self.dst.begin().await?;
                let src = match self.src.begin().await {
                    Ok(tx) => Some(tx),
                    Err(err) => {
                        error!(error = %err, "failed to open transaction on src");
                        None
                    }
                };
                Ok(Box::new(DoubleWriteTx {
                    src,
                    dst: Some(dst),
                    mode,
                }))
            }
        }
    }

    /// Prepared statements cannot be fanned out across two pools without
    /// binding to one of them, so the facade refuses the capability.
    async fn prepare(&self, _sql: &str) -> Result<(), DbError> {
        Err(DbError::Unsupported(
            "prepare is not available on the double-write pool",
        ))
    }

    fn kind(&self) -> StoreKind {
        self.primary(self.mode.load()).kind()
    }
}

/// A composite transaction. The mode is captured at `begin` and stays fixed
/// for the transaction's lifetime: a concurrent mode switch on the pool must
/// not split a commit across stores.
pub struct DoubleWriteTx {
    src: Option<Box<dyn PoolTx>>,
    dst: Option<Box<dyn PoolTx>>,
    mode: Mode,
}

fn tx_mut<'a>(
    slot: &'a mut Option<Box<dyn PoolTx>>,
    side: &'static str,
) -> Result<&'a mut Box<dyn PoolTx>, DbError> {
    slot.as_mut().ok_or(DbError::Unsupported(side))
}

fn tx_take(
    slot: &mut Option<Box<dyn PoolTx>>,
    side: &'static str,
) -> Result<Box<dyn PoolTx>, DbError> {
    slot.take().ok_or(DbError::Unsupported(side))
}

#[async_trait]
impl PoolTx for DoubleWriteTx {
    async fn exec(&mut self, sql: &str, params: Vec<Value>) -> Result<ExecResult, DbError> {
        match self.mode {
            Mode::SrcOnly => tx_mut(&mut self.src, "src transaction missing")?
                .exec(sql, params)
                .await,
            Mode::DstOnly => tx_mut(&mut self.dst, "dst transaction missing")?
                .exec(sql, params)
                .await,
            Mode::SrcFirst => {
                let result = tx_mut(&mut self.src, "src transaction missing")?
                    .exec(sql, params.clone())
                    .await?;
                if let Some(dst) = self.dst.as_mut() {
                    if let Err(err) = dst.exec(sql, params).await {
                        error!(error = %err, sql, "transactional mirror write to dst failed");
                    }
                }
                Ok(result)
            }
            Mode::DstFirst => {
                let result = tx_mut(&mut self.dst, "dst transaction missing")?
                    .exec(sql, params.clone())
                    .await?;
                if let Some(src) = self.src.as_mut() {
                    if let Err(err) = src.exec(sql, params).await {
                        error!(error = %err, sql, "transactional mirror write to src failed");
                    }
                }
                Ok(result)
            }
        }
    }

    async fn query(&mut self, sql: &str, params: Vec<Value>) -> Result<Vec<Row>, DbError> {
        match self.mode {
            Mode::SrcOnly | Mode::SrcFirst => tx_mut(&mut self.src, "src transaction missing")?
                .query(sql, params)
                .await,
            Mode::DstFirst | Mode::DstOnly => tx_mut(&mut self.dst, "dst transaction missing")?
                .query(sql, params)
                .await,
        }
    }

    async fn query_one(
        &mut self,
        sql: &str,
        params: Vec<Value>,
    ) -> Result<Option<Row>, DbError> {
        match self.mode {
            Mode::SrcOnly | Mode::SrcFirst => tx_mut(&mut self.src, "src transaction missing")?
                .query_one(sql, params)
                .await,
            Mode::DstFirst | Mode::DstOnly => tx_mut(&mut self.dst, "dst transaction missing")?
                .query_one(sql, params)
                .await,
        }
    }

    async fn commit(self: Box<Self>) -> Result<(), DbError> {
        let mut this = *self;
        match this.mode {
            Mode::SrcOnly => tx_take(&mut this.src, "src transaction missing")?.commit().await,
            Mode::DstOnly => tx_take(&mut this.dst, "dst transaction missing")?.commit().await,
            Mode::SrcFirst => {
                // Primary failure fails the whole transaction; the secondary
                // is left uncommitted.
                tx_take(&mut this.src, "src transaction missing")?.commit().await?;
                if let Some(dst) = this.dst.take() {
                    if let Err(err) = dst.commit().await {
                        error!(error = %err, "dst commit failed");
                    }
                }
                Ok(())
            }
            Mode::DstFirst => {
                tx_take(&mut this.dst, "dst transaction missing")?.commit().await?;
                if let Some(src) = this.src.take() {
                    if let Err(err) = src.commit().await {
                        error!(error = %err, "src commit failed");
                    }
                }
                Ok(())
            }
        }
    }

    async fn rollback(self: Box<Self>) -> Result<(), DbError> {
        let mut this = *self;
        match this.mode {
            Mode::SrcOnly => {
                tx_take(&mut this.src, "src transaction missing")?
                    .rollback()
                    .await
            }
            Mode::DstOnly => {
                tx_take(&mut this.dst, "dst transaction missing")?
                    .rollback()
                    .await
            }
            Mode::SrcFirst => {
                tx_take(&mut this.src, "src transaction missing")?
                    .rollback()
                    .await?;
                if let Some(dst) = this.dst.take() {
                    if let Err(err) = dst.rollback().await {
                        error!(error = %err, "dst rollback failed");
                    }
                }
                Ok(())
            }
            Mode::DstFirst => {
                tx_take(&mut this.dst, "dst transaction missing")?
                    .rollback()
                    .await?;
                if let Some(src) = this.src.take() {
                    if let Err(err) = src.rollback().await {
                        error!(error = %err, "src rollback failed");
                    }
                }
                Ok(())
            }
        }
    }
}
