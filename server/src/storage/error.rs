use thiserror::Error;

/// SQLSTATE codes the store gives a meaning to.
const UNIQUE_VIOLATION: &str = "23505";
const CHECK_VIOLATION: &str = "23514";
const NUMERIC_VALUE_OUT_OF_RANGE: &str = "22003";
const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";
const LOCK_NOT_AVAILABLE: &str = "55P03";
const QUERY_CANCELED: &str = "57014";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unique constraint '{0}' violated")]
    UniqueViolation(String),

    #[error("check constraint '{0}' violated")]
    CheckViolation(String),

    /// A value does not fit its column, e.g. a balance past `NUMERIC(14, 2)`.
    #[error("value out of range for {0}")]
    OutOfRange(String),

    /// A lock or connection could not be obtained in time. Nothing was
    /// written, so the caller may retry.
    #[error("store busy: lock not acquired before timeout")]
    Busy,

    #[error("transaction already finished")]
    Finished,

    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[error("database error: {0}")]
    Database(sqlx::Error),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Busy)
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::PoolTimedOut = err {
            return StoreError::Busy;
        }

        if let sqlx::Error::Database(db_err) = &err {
            let constraint = db_err.constraint().unwrap_or_default().to_string();
            match db_err.code().as_deref() {
                Some(UNIQUE_VIOLATION) => return StoreError::UniqueViolation(constraint),
                Some(CHECK_VIOLATION) => return StoreError::CheckViolation(constraint),
                Some(NUMERIC_VALUE_OUT_OF_RANGE) => {
                    return StoreError::OutOfRange(db_err.message().to_string())
                }
                Some(LOCK_NOT_AVAILABLE)
                | Some(QUERY_CANCELED)
                | Some(DEADLOCK_DETECTED)
                | Some(SERIALIZATION_FAILURE) => return StoreError::Busy,
                _ => {}
            }
        }

        StoreError::Database(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_timeout_is_transient() {
        let err = StoreError::from(sqlx::Error::PoolTimedOut);
        assert!(matches!(err, StoreError::Busy));
        assert!(err.is_transient());
    }

    #[test]
    fn missing_row_is_a_plain_database_error() {
        let err = StoreError::from(sqlx::Error::RowNotFound);
        assert!(matches!(err, StoreError::Database(_)));
        assert!(!err.is_transient());
    }
}
