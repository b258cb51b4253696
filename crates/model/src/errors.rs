use thiserror::Error;

/// Errors raised while converting a decoded row into an entity.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConvertError {
    /// The row is missing a column the entity requires.
    #[error("missing column `{0}`")]
    MissingColumn(String),

    /// The column is present but holds an incompatible value.
    #[error("column `{column}`: expected {expected}, got {actual}")]
    TypeMismatch {
        column: String,
        expected: &'static str,
        actual: &'static str,
    },
}
