mod params;

use crate::{
    error::{ConnectorError, DbError},
    pool::{ConnPool, ExecResult, PoolTx, StoreKind},
    row::DbRow,
};
use async_trait::async_trait;
use model::core::{row::Row, value::Value};
use params::PgParams;
use std::sync::Arc;
use tokio_postgres::{Client, NoTls};
use tracing::error;

/// Postgres-backed connection pool. Pool-level operations share one
/// pipelined client; every transaction gets a dedicated connection so its
/// session state cannot leak into concurrent work.
pub struct PgPool {
    client: Arc<Client>,
    url: String,
}

impl PgPool {
    pub async fn connect(url: &str) -> Result<Self, ConnectorError> {
        let client = connect_client(url).await?;
        Ok(PgPool {
            client: Arc::new(client),
            url: url.to_string(),
        })
    }
}

async fn connect_client(url: &str) -> Result<Client, tokio_postgres::Error> {
    let (client, connection) = tokio_postgres::connect(url, NoTls).await?;
    tokio::spawn(async move {
        if let Err(err) = connection.await {
            error!(error = %err, "postgres connection task ended");
        }
    });
    Ok(client)
}

#[async_trait]
impl ConnPool for PgPool {
    async fn exec(&self, sql: &str, params: Vec<Value>) -> Result<ExecResult, DbError> {
        let bindings = PgParams::from_values(&params);
        let rows_affected = self.client.execute(sql, &bindings.as_refs()).await?;
        Ok(ExecResult {
            rows_affected,
            last_insert_id: None,
        })
    }

    async fn query(&self, sql: &str, params: Vec<Value>) -> Result<Vec<Row>, DbError> {
        let bindings = PgParams::from_values(&params);
        let rows = self.client.query(sql, &bindings.as_refs()).await?;
        rows.iter().map(|row| DbRow::Pg(row).to_row()).collect()
    }

    async fn query_one(&self, sql: &str, params: Vec<Value>) -> Result<Option<Row>, DbError> {
        let bindings = PgParams::from_values(&params);
        let row = self.client.query_opt(sql, &bindings.as_refs()).await?;
        row.map(|row| DbRow::Pg(&row).to_row()).transpose()
    }

    async fn begin(&self) -> Result<Box<dyn PoolTx>, DbError> {
        let client = connect_client(&self.url).await?;
        client.batch_execute("BEGIN").await?;
        Ok(Box::new(PgTx { client }))
    }

    async fn prepare(&self, sql: &str) -> Result<(), DbError> {
        self.client.prepare(sql).await?;
        Ok(())
    }

    fn kind(&self) -> StoreKind {
        StoreKind::Postgres
    }
}

/// A transaction on its own connection. If the handle is dropped without
/// commit, closing the connection rolls the server back.
pub struct PgTx {
    client: Client,
}

#[async_trait]
impl PoolTx for PgTx {
    async fn exec(&mut self, sql: &str, params: Vec<Value>) -> Result<ExecResult, DbError> {
        let bindings = PgParams::from_values(&params);
        let rows_affected = self.client.execute(sql, &bindings.as_refs()).await?;
        Ok(ExecResult {
            rows_affected,
            last_insert_id: None,
        })
    }

    async fn query(&mut self, sql: &str, params: Vec<Value>) -> Result<Vec<Row>, DbError> {
        let bindings = PgParams::from_values(&params);
        let rows = self.client.query(sql, &bindings.as_refs()).await?;
        rows.iter().map(|row| DbRow::Pg(row).to_row()).collect()
    }

    async fn query_one(
        &mut self,
        sql: &str,
        params: Vec<Value>,
    ) -> Result<Option<Row>, DbError> {
        let bindings = PgParams::from_values(&params);
        let row = self.client.query_opt(sql, &bindings.as_refs()).await?;
        row.map(|row| DbRow::Pg(&row).to_row()).transpose()
    }

    async fn commit(self: Box<Self>) -> Result<(), DbError> {
        self.client.batch_execute("COMMIT").await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), DbError> {
        self.client.batch_execute("ROLLBACK").await?;
        Ok(())
    }
}
