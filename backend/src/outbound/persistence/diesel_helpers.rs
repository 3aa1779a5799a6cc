//! Error mapping shared by the Diesel adapters.

use diesel::result::{DatabaseErrorKind, Error as DieselError};
use tracing::debug;

use crate::domain::ports::RecordStoreError;

use super::pool::PoolError;

/// Pool exhaustion and connection failures mean the store is unreachable.
pub(super) fn map_pool_error(error: PoolError) -> RecordStoreError {
    let message = error.into_message();
    debug!(%message, "database pool checkout failed");
    RecordStoreError::unavailable(message)
}

/// Map a Diesel failure onto the store's error vocabulary.
///
/// Connection loss is reported as unavailability so callers can retry; all
/// other failures become opaque query errors.
pub(super) fn map_diesel_error(error: DieselError) -> RecordStoreError {
    match &error {
        DieselError::DatabaseError(kind, info) => {
            debug!(?kind, message = info.message(), "diesel operation failed");
        }
        _ => debug!(%error, "diesel operation failed"),
    }

    match error {
        DieselError::DatabaseError(DatabaseErrorKind::ClosedConnection, _)
        | DieselError::BrokenTransactionManager => {
            RecordStoreError::unavailable("database connection error")
        }
        DieselError::DatabaseError(DatabaseErrorKind::SerializationFailure, _) => {
            RecordStoreError::unavailable("database serialization failure")
        }
        DieselError::NotFound => RecordStoreError::query("record not found"),
        DieselError::QueryBuilderError(_) => RecordStoreError::query("database query error"),
        DieselError::DeserializationError(_) | DieselError::SerializationError(_) => {
            RecordStoreError::query("database value conversion error")
        }
        _ => RecordStoreError::query("database error"),
    }
}
