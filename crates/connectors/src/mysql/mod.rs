mod params;

use crate::{
    error::{ConnectorError, DbError},
    pool::{ConnPool, ExecResult, PoolTx, StoreKind},
    row::DbRow,
};
use async_trait::async_trait;
use model::core::{row::Row, value::Value};
use mysql_async::{Pool, Row as MySqlRow, TxOpts, prelude::Queryable};
use params::MySqlParams;

/// MySQL-backed connection pool.
#[derive(Clone)]
pub struct MySqlPool {
    pool: Pool,
}

impl MySqlPool {
    pub fn connect(url: &str) -> Result<Self, ConnectorError> {
        let pool = Pool::from_url(url)?;
        Ok(MySqlPool { pool })
    }
}

#[async_trait]
impl ConnPool for MySqlPool {
    async fn exec(&self, sql: &str, params: Vec<Value>) -> Result<ExecResult, DbError> {
        let mut conn = self.pool.get_conn().await?;
        conn.exec_drop(sql, MySqlParams::from_values(&params).into_params())
            .await?;
        Ok(ExecResult {
            rows_affected: conn.affected_rows(),
            last_insert_id: conn.last_insert_id(),
        })
    }

    async fn query(&self, sql: &str, params: Vec<Value>) -> Result<Vec<Row>, DbError> {
        let mut conn = self.pool.get_conn().await?;
        let rows: Vec<MySqlRow> = conn
            .exec(sql, MySqlParams::from_values(&params).into_params())
            .await?;
        rows.iter().map(|row| DbRow::MySql(row).to_row()).collect()
    }

    async fn query_one(&self, sql: &str, params: Vec<Value>) -> Result<Option<Row>, DbError> {
        let mut conn = self.pool.get_conn().await?;
        let row: Option<MySqlRow> = conn
            .exec_first(sql, MySqlParams::from_values(&params).into_params())
            .await?;
        row.map(|row| DbRow::MySql(&row).to_row()).transpose()
    }

    async fn begin(&self) -> Result<Box<dyn PoolTx>, DbError> {
        let tx = self.pool.start_transaction(TxOpts::default()).await?;
        Ok(Box::new(MySqlTx { tx }))
    }

    async fn prepare(&self, sql: &str) -> Result<(), DbError> {
        let mut conn = self.pool.get_conn().await?;
        conn.prep(sql).await?;
        Ok(())
    }

    fn kind(&self) -> StoreKind {
        StoreKind::MySql
    }
}

pub struct MySqlTx {
    tx: mysql_async::Transaction<'static>,
}

#[async_trait]
impl PoolTx for MySqlTx {
    async fn exec(&mut self, sql: &str, params: Vec<Value>) -> Result<ExecResult, DbError> {
        self.tx
            .exec_drop(sql, MySqlParams::from_values(&params).into_params())
            .await?;
        Ok(ExecResult {
            rows_affected: self.tx.affected_rows(),
            last_insert_id: self.tx.last_insert_id(),
        })
    }

    async fn query(&mut self, sql: &str, params: Vec<Value>) -> Result<Vec<Row>, DbError> {
        let rows: Vec<MySqlRow> = self
            .tx
            .exec(sql, MySqlParams::from_values(&params).into_params())
            .await?;
        rows.iter().map(|row| DbRow::MySql(row).to_row()).collect()
    }

    async fn query_one(
        &mut self,
        sql: &str,
        params: Vec<Value>,
    ) -> Result<Option<Row>, DbError> {
        let row: Option<MySqlRow> = self
            .tx
            .exec_first(sql, MySqlParams::from_values(&params).into_params())
            .await?;
        row.map(|row| DbRow::MySql(&row).to_row()).transpose()
    }

    async fn commit(self: Box<Self>) -> Result<(), DbError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), DbError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
