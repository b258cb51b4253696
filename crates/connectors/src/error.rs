use std::time::Duration;
use thiserror::Error;

/// All errors coming from the database/query layer.
#[derive(Debug, Error)]
pub enum DbError {
    /// Any MySQL driver error.
    #[error("MySQL error: {0}")]
    MySql(#[from] mysql_async::Error),

    /// Any Pg driver error.
    #[error("Pg error: {0}")]
    Pg(#[from] tokio_postgres::Error),

    /// A decoded row could not be converted into the entity type.
    #[error("row conversion error: {0}")]
    Convert(#[from] model::errors::ConvertError),

    /// A per-operation deadline elapsed before the store answered.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// The requested capability is not available on this pool.
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),

    /// An unknown error occurred.
    #[error("unknown error: {0}")]
    Unknown(String),
}

/// Errors happening during adapter or connection setup.
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// The MySQL driver failed to build the connection or pool.
    #[error("MySQL connector creation failed: {0}")]
    MySql(#[from] mysql_async::Error),

    /// Connection error.
    #[error("Connection error: {0}")]
    Connection(#[from] tokio_postgres::Error),

    /// An invalid database URL was provided.
    #[error("Invalid database URL: {0}")]
    InvalidUrl(String),
}
