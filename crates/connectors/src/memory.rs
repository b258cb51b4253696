use crate::{error::DbError, store::EntityStore};
use async_trait::async_trait;
use model::entity::Entity;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

/// In-memory [`EntityStore`] keyed by primary key. Stands in for a live
/// database in tests and single-process demos; ordering matches the SQL
/// implementation because the map iterates in ascending key order.
pub struct MemTable<T: Entity> {
    rows: RwLock<BTreeMap<i64, T>>,
}

impl<T: Entity> Default for MemTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Entity> MemTable<T> {
    pub fn new() -> Self {
        MemTable {
            rows: RwLock::new(BTreeMap::new()),
        }
    }

    pub async fn insert(&self, entity: T) {
        self.rows.write().await.insert(entity.id(), entity);
    }

    pub async fn get(&self, id: i64) -> Option<T> {
        self.rows.read().await.get(&id).cloned()
    }

    pub async fn ids(&self) -> Vec<i64> {
        self.rows.read().await.keys().copied().collect()
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }
}

#[async_trait]
impl<T: Entity> EntityStore<T> for MemTable<T> {
    async fn find_by_id(&self, id: i64) -> Result<Option<T>, DbError> {
        Ok(self.rows.read().await.get(&id).cloned())
    }

    async fn nth_by_id(&self, offset: u64) -> Result<Option<T>, DbError> {
        Ok(self
            .rows
            .read()
            .await
            .values()
            .nth(offset as usize)
            .cloned())
    }

    async fn nth_modified_since(&self, since: i64, offset: u64) -> Result<Option<T>, DbError> {
        let rows = self.rows.read().await;
        let mut modified: Vec<&T> = rows.values().filter(|row| row.utime() >= since).collect();
        modified.sort_by_key(|row| (row.utime(), row.id()));
        Ok(modified.get(offset as usize).map(|row| (*row).clone()))
    }

    async fn id_page(&self, offset: u64, limit: usize) -> Result<Vec<i64>, DbError> {
        Ok(self
            .rows
            .read()
            .await
            .keys()
            .skip(offset as usize)
            .take(limit)
            .copied()
            .collect())
    }

    async fn find_by_ids(&self, ids: &[i64]) -> Result<Vec<T>, DbError> {
        let rows = self.rows.read().await;
        Ok(ids.iter().filter_map(|id| rows.get(id).cloned()).collect())
    }

    async fn upsert(&self, entity: &T, _overwrite: &[String]) -> Result<(), DbError> {
        self.rows
            .write()
            .await
            .insert(entity.id(), entity.clone());
        Ok(())
    }

    async fn delete_by_id(&self, id: i64) -> Result<(), DbError> {
        self.rows.write().await.remove(&id);
        Ok(())
    }
}
