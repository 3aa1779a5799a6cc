//! Port abstraction for the document store behind every collection.
//!
//! The store is the source of truth. Adapters must apply each `update` and
//! each `batch` atomically and must never turn a failure into an empty
//! result.

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::domain::Error;
use crate::domain::record::{
    Collection, Document, FieldFilter, FieldUpdate, Precondition, WriteOp,
};

use super::define_port_error;

define_port_error! {
    /// Errors raised by record store adapters.
    pub enum RecordStoreError {
        /// The addressed document does not exist.
        NotFound { collection: String, id: String } =>
            "{collection}/{id} not found",
        /// A create targeted an id that is already taken.
        AlreadyExists { collection: String, id: String } =>
            "{collection}/{id} already exists",
        /// A conditional update found the document in the wrong state.
        PreconditionFailed { collection: String, id: String } =>
            "precondition failed for {collection}/{id}",
        /// The store could not be reached or timed out.
        Unavailable { message: String } =>
            "record store unavailable: {message}",
        /// The operation failed or a stored document is malformed.
        Query { message: String } =>
            "record store query failed: {message}",
    }
}

impl RecordStoreError {
    pub fn not_found_in(collection: Collection, id: impl Into<String>) -> Self {
        Self::not_found(collection.as_str(), id)
    }

    pub fn already_exists_in(collection: Collection, id: impl Into<String>) -> Self {
        Self::already_exists(collection.as_str(), id)
    }

    pub fn precondition_failed_in(collection: Collection, id: impl Into<String>) -> Self {
        Self::precondition_failed(collection.as_str(), id)
    }
}

impl From<RecordStoreError> for Error {
    fn from(err: RecordStoreError) -> Self {
        match err {
            RecordStoreError::NotFound { collection, id } => {
                Error::not_found(format!("{collection}/{id} not found"))
            }
            RecordStoreError::AlreadyExists { collection, id } => {
                Error::conflict(format!("{collection}/{id} already exists"))
            }
            RecordStoreError::PreconditionFailed { collection, id } => {
                Error::conflict(format!("{collection}/{id} was modified concurrently"))
            }
            RecordStoreError::Unavailable { message } => Error::service_unavailable(message),
            RecordStoreError::Query { message } => Error::internal(message),
        }
    }
}

/// Lazily produced documents of one collection.
pub type DocumentStream = BoxStream<'static, Result<Document, RecordStoreError>>;

/// Port for reading and mutating documents.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Fetch one document; `Ok(None)` when it does not exist.
    async fn get(
        &self,
        collection: Collection,
        id: &str,
    ) -> Result<Option<Document>, RecordStoreError>;

    /// Documents matching `filter`, ordered by id.
    async fn find(
        &self,
        collection: Collection,
        filter: FieldFilter,
    ) -> Result<Vec<Document>, RecordStoreError>;

    /// Every document of the collection, ordered by id.
    ///
    /// Each document is yielded exactly once. Adapters may read the
    /// collection in several steps rather than from one point-in-time view:
    /// a document then reflects its state when its step ran, and documents
    /// created or deleted during the pull may be missing or included.
    ///
    /// The stream yields an error item and ends if the store fails mid-pull.
    fn stream_all(&self, collection: Collection) -> DocumentStream;

    /// Insert a document, failing with `AlreadyExists` if the id is taken.
    async fn create(
        &self,
        collection: Collection,
        document: Document,
    ) -> Result<(), RecordStoreError>;

    /// Insert or replace a document.
    async fn set(&self, collection: Collection, document: Document)
    -> Result<(), RecordStoreError>;

    /// Apply `updates` in one atomic step, after checking `precondition`
    /// against the current document inside the same step.
    async fn update(
        &self,
        collection: Collection,
        id: &str,
        updates: Vec<FieldUpdate>,
        precondition: Option<Precondition>,
    ) -> Result<(), RecordStoreError>;

    /// Remove a document. Removing a missing document succeeds.
    async fn delete(&self, collection: Collection, id: &str) -> Result<(), RecordStoreError>;

    /// Apply every operation or none of them.
    async fn batch(&self, ops: Vec<WriteOp>) -> Result<(), RecordStoreError>;
}

#[cfg(test)]
mod tests {
    //! Error mapping coverage.
    use super::*;
    use crate::domain::ErrorCode;
    use rstest::rstest;

    #[rstest]
    #[case(RecordStoreError::not_found_in(Collection::Lists, "l1"), ErrorCode::NotFound)]
    #[case(RecordStoreError::already_exists_in(Collection::Users, "ada"), ErrorCode::Conflict)]
    #[case(
        RecordStoreError::precondition_failed_in(Collection::Lists, "l1"),
        ErrorCode::Conflict
    )]
    #[case(RecordStoreError::unavailable("timeout"), ErrorCode::ServiceUnavailable)]
    #[case(RecordStoreError::query("bad row"), ErrorCode::InternalError)]
    fn maps_store_errors_to_api_codes(#[case] err: RecordStoreError, #[case] code: ErrorCode) {
        assert_eq!(Error::from(err).code(), code);
    }

    #[rstest]
    fn messages_name_the_document() {
        let err = RecordStoreError::not_found_in(Collection::Restaurants, "p1");
        assert_eq!(err.to_string(), "restaurants/p1 not found");
    }
}
