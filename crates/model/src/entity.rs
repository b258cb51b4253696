use crate::{core::row::Row, errors::ConvertError};

/// Contract every migrated row type satisfies.
///
/// The schema accessors (`table`, `columns`, key/modification column names)
/// let the storage layer generate SQL without ORM reflection, and
/// `compare_to` defines value equality over exactly the migrated columns:
/// anything it ignores is tacitly considered ignorable by the whole
/// framework.
pub trait Entity: Clone + Send + Sync + Sized + 'static {
    fn table() -> &'static str;

    /// Column names in insert order. Must include the primary key and the
    /// modification-time column.
    fn columns() -> &'static [&'static str];

    fn id_column() -> &'static str {
        "id"
    }

    fn utime_column() -> &'static str {
        "utime"
    }

    /// Stable primary key.
    fn id(&self) -> i64;

    /// Last-modification time in milliseconds.
    fn utime(&self) -> i64;

    /// Value-level equality across all migrated columns. Expected to be pure.
    fn compare_to(&self, other: &Self) -> bool;

    fn from_row(row: &Row) -> Result<Self, ConvertError>;

    fn to_row(&self) -> Row;
}
