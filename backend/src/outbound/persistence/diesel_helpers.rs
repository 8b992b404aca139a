//! Error mapping shared by the Diesel repositories.
//!
//! Every port error enum exposes `connection` and `query` constructors, so the
//! mapping is written once against [`StoreError`] and reused per adapter.

use diesel::result::{DatabaseErrorKind, Error as DieselError};
use tracing::debug;

use crate::domain::ports::{
    HabitRepositoryError, PenaltyRepositoryError, UserProfileRepositoryError,
    VerificationRepositoryError,
};

use super::pool::PoolError;

/// Port errors a Diesel failure can be folded into.
pub(crate) trait StoreError: Sized {
    fn connection(message: String) -> Self;
    fn query(message: String) -> Self;

    /// Unique violations are plain query failures unless the port models them.
    fn duplicate_key(message: String) -> Self {
        Self::query(message)
    }
}

macro_rules! store_error {
    ($name:ty) => {
        impl StoreError for $name {
            fn connection(message: String) -> Self {
                <$name>::connection(message)
            }

            fn query(message: String) -> Self {
                <$name>::query(message)
            }
        }
    };
}

store_error!(HabitRepositoryError);
store_error!(VerificationRepositoryError);
store_error!(UserProfileRepositoryError);

impl StoreError for PenaltyRepositoryError {
    fn connection(message: String) -> Self {
        PenaltyRepositoryError::connection(message)
    }

    fn query(message: String) -> Self {
        PenaltyRepositoryError::query(message)
    }

    fn duplicate_key(message: String) -> Self {
        PenaltyRepositoryError::duplicate_key(message)
    }
}

/// Pool failures always mean the database is unreachable.
pub(crate) fn map_pool_error<E: StoreError>(error: PoolError) -> E {
    E::connection(error.into_message())
}

/// Map a Diesel error, logging the driver detail at debug level.
pub(crate) fn map_diesel_error<E: StoreError>(error: DieselError) -> E {
    match &error {
        DieselError::DatabaseError(kind, info) => {
            debug!(?kind, message = info.message(), "diesel operation failed");
        }
        _ => debug!(
            error_type = %std::any::type_name_of_val(&error),
            "diesel operation failed"
        ),
    }

    match error {
        DieselError::NotFound => E::query("record not found".to_owned()),
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
            E::duplicate_key("concurrent insert".to_owned())
        }
        DieselError::DatabaseError(DatabaseErrorKind::ClosedConnection, _) => {
            E::connection("database connection error".to_owned())
        }
        DieselError::QueryBuilderError(_) => E::query("database query error".to_owned()),
        _ => E::query("database error".to_owned()),
    }
}

/// Convert a stored non-negative counter, clamping corrupt negatives to zero.
pub(crate) fn counter_from_db(value: i32) -> u32 {
    u32::try_from(value).unwrap_or(0)
}

/// Convert a row limit to the `i64` Diesel expects.
pub(crate) fn limit_for_db(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}
