//! Port for persisting the restaurant snapshot between restarts.

use async_trait::async_trait;

use crate::domain::Snapshot;

use super::define_port_error;

define_port_error! {
    /// Errors raised while loading or saving a persisted snapshot.
    pub enum SnapshotStoreError {
        /// Reading or writing the backing file failed.
        Io { message: String } => "snapshot io failed: {message}",
        /// The persisted document could not be encoded or decoded.
        Format { message: String } => "snapshot format invalid: {message}",
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Last persisted snapshot, or `Ok(None)` when nothing was saved yet.
    async fn load(&self) -> Result<Option<Snapshot>, SnapshotStoreError>;

    /// Replace the persisted snapshot as a whole.
    async fn save(&self, snapshot: &Snapshot) -> Result<(), SnapshotStoreError>;
}

/// Fixture implementation that never persists anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct FixtureSnapshotStore;

#[async_trait]
impl SnapshotStore for FixtureSnapshotStore {
    async fn load(&self) -> Result<Option<Snapshot>, SnapshotStoreError> {
        Ok(None)
    }

    async fn save(&self, _snapshot: &Snapshot) -> Result<(), SnapshotStoreError> {
        Ok(())
    }
}
