use sea_orm::{DbErr, SqlErr};

use modelgate_provider_core::StoreError;

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("db error: {0}")]
    Db(#[from] DbErr),
    #[error("serde json error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl From<StorageError> for StoreError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Db(err) => store_error(err),
            StorageError::Serde(err) => StoreError::Serde(err),
        }
    }
}

/// Maps a database failure onto the repository error vocabulary.
pub(crate) fn store_error(err: DbErr) -> StoreError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(message)) => return StoreError::Conflict(message),
        Some(SqlErr::ForeignKeyConstraintViolation(message)) => {
            return StoreError::NotFound(message);
        }
        _ => {}
    }
    match err {
        DbErr::RecordNotFound(message) => StoreError::NotFound(message),
        DbErr::RecordNotUpdated => StoreError::NotFound("record not updated".to_string()),
        other => StoreError::Backend(other.to_string()),
    }
}
