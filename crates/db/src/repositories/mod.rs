use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;

use poolcalc_core::persistence::StorageError;
use poolcalc_core::sync::RemoteError;

pub mod kv_store;
pub mod products;
pub mod remote_estimates;

pub use kv_store::SqlKeyValueStore;
pub use products::SqlProductSource;
pub use remote_estimates::SqlRemoteEstimateStore;

const SQLITE_FULL: &str = "13";

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl RepositoryError {
    fn is_storage_full(&self) -> bool {
        match self {
            Self::Database(error) => error
                .as_database_error()
                .and_then(|db_error| db_error.code())
                .is_some_and(|code| code == SQLITE_FULL),
            Self::Decode(_) => false,
        }
    }
}

impl From<RepositoryError> for StorageError {
    fn from(value: RepositoryError) -> Self {
        if value.is_storage_full() {
            Self::QuotaExceeded(value.to_string())
        } else {
            Self::Backend(value.to_string())
        }
    }
}

impl From<RepositoryError> for RemoteError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::Database(error) => Self::Unavailable(error.to_string()),
            RepositoryError::Decode(message) => Self::Rejected(message),
        }
    }
}

/// Fixed-width timestamps so text ordering matches time ordering.
pub(crate) fn timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("invalid timestamp `{raw}`: {error}")))
}

pub(crate) fn decode<T>(result: Result<T, sqlx::Error>) -> Result<T, RepositoryError> {
    result.map_err(|error| RepositoryError::Decode(error.to_string()))
}
