//! Domain ports and supporting types for the hexagonal boundary.

mod macros;
pub(crate) use macros::define_port_error;

mod record_store;
mod snapshot_store;

#[cfg(test)]
pub use record_store::MockRecordStore;
pub use record_store::{DocumentStream, RecordStore, RecordStoreError};
#[cfg(test)]
pub use snapshot_store::MockSnapshotStore;
pub use snapshot_store::{FixtureSnapshotStore, SnapshotStore, SnapshotStoreError};
