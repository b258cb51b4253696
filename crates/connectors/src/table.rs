use crate::{
    error::DbError,
    pool::ConnPool,
    query,
    store::EntityStore,
};
use async_trait::async_trait;
use model::{core::value::Value, entity::Entity};
use std::{marker::PhantomData, sync::Arc};

/// SQL-backed [`EntityStore`]: renders the per-dialect statements for one
/// entity's table over any [`ConnPool`]. The validator and fixer hold one of
/// these per direct store handle.
pub struct SqlTable<T: Entity> {
    pool: Arc<dyn ConnPool>,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity> SqlTable<T> {
    pub fn new(pool: Arc<dyn ConnPool>) -> Self {
        SqlTable {
            pool,
            _entity: PhantomData,
        }
    }
}

#[async_trait]
impl<T: Entity> EntityStore<T> for SqlTable<T> {
    async fn find_by_id(&self, id: i64) -> Result<Option<T>, DbError> {
        let sql = query::select_by_id(self.pool.kind(), T::table(), T::columns(), T::id_column());
        let row = self.pool.query_one(&sql, vec![Value::Int(id)]).await?;
        Ok(row.map(|row| T::from_row(&row)).transpose()?)
    }

    async fn nth_by_id(&self, offset: u64) -> Result<Option<T>, DbError> {
        let sql = query::select_nth(
            self.pool.kind(),
            T::table(),
            T::columns(),
            T::id_column(),
            offset,
        );
        let row = self.pool.query_one(&sql, Vec::new()).await?;
        Ok(row.map(|row| T::from_row(&row)).transpose()?)
    }

    async fn nth_modified_since(&self, since: i64, offset: u64) -> Result<Option<T>, DbError> {
        let sql = query::select_nth_modified(
            self.pool.kind(),
            T::table(),
            T::columns(),
            T::utime_column(),
            T::id_column(),
            offset,
        );
        let row = self.pool.query_one(&sql, vec![Value::Int(since)]).await?;
        Ok(row.map(|row| T::from_row(&row)).transpose()?)
    }

    async fn id_page(&self, offset: u64, limit: usize) -> Result<Vec<i64>, DbError> {
        let sql = query::select_id_page(self.pool.kind(), T::table(), T::id_column(), limit, offset);
        let rows = self.pool.query(&sql, Vec::new()).await?;
        rows.iter()
            .map(|row| row.i64(T::id_column()).map_err(DbError::from))
            .collect()
    }

    async fn find_by_ids(&self, ids: &[i64]) -> Result<Vec<T>, DbError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = query::select_by_ids(
            self.pool.kind(),
            T::table(),
            T::columns(),
            T::id_column(),
            ids.len(),
        );
        let params = ids.iter().map(|id| Value::Int(*id)).collect();
        let rows = self.pool.query(&sql, params).await?;
        rows.iter()
            .map(|row| T::from_row(row).map_err(DbError::from))
            .collect()
    }

    async fn upsert(&self, entity: &T, overwrite: &[String]) -> Result<(), DbError> {
        let sql = query::upsert(
            self.pool.kind(),
            T::table(),
            T::columns(),
            T::id_column(),
            overwrite,
        );
        let params = entity.to_row().values_for(T::columns())?;
        self.pool.exec(&sql, params).await?;
        Ok(())
    }

    async fn delete_by_id(&self, id: i64) -> Result<(), DbError> {
        let sql = query::delete_by_id(self.pool.kind(), T::table(), T::id_column());
        self.pool.exec(&sql, vec![Value::Int(id)]).await?;
        Ok(())
    }
}
