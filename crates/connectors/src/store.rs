use crate::error::DbError;
use async_trait::async_trait;
use model::entity::Entity;

/// Entity-level operations the validation and repair machinery needs from a
/// single store. Implemented over plain SQL by [`crate::table::SqlTable`]
/// and in memory by [`crate::memory::MemTable`], which stands in for a live
/// database in tests.
///
/// `offset`-based accessors page in ascending primary-key order (or ascending
/// modification time for `nth_modified_since`), so a monotonically advancing
/// offset walks the whole table exactly once while it is quiescent.
#[async_trait]
pub trait EntityStore<T: Entity>: Send + Sync {
    async fn find_by_id(&self, id: i64) -> Result<Option<T>, DbError>;

    /// The `offset`-th row in primary-key order, `None` past the end.
    async fn nth_by_id(&self, offset: u64) -> Result<Option<T>, DbError>;

    /// The `offset`-th row with `utime >= since` in modification-time order.
    async fn nth_modified_since(&self, since: i64, offset: u64) -> Result<Option<T>, DbError>;

    /// One page of primary keys in ascending order.
    async fn id_page(&self, offset: u64, limit: usize) -> Result<Vec<i64>, DbError>;

    async fn find_by_ids(&self, ids: &[i64]) -> Result<Vec<T>, DbError>;

    /// Insert, overwriting `overwrite` columns when the key already exists.
    async fn upsert(&self, entity: &T, overwrite: &[String]) -> Result<(), DbError>;

    async fn delete_by_id(&self, id: i64) -> Result<(), DbError>;
}
