//! Builders for HTTP state from server configuration.

use std::sync::Arc;

use mockable::{Clock, DefaultClock};

use platelist::domain::ports::{RecordStore, SnapshotStore};
use platelist::inbound::http::state::{HttpState, HttpStatePorts};
use platelist::outbound::memory::InMemoryRecordStore;
use platelist::outbound::persistence::DieselRecordStore;
use platelist::outbound::snapshot_file::JsonSnapshotFile;

use super::ServerConfig;

/// Pick the record store: PostgreSQL when a pool is configured, otherwise
/// an in-memory store that lives as long as the process.
fn build_record_store(config: &ServerConfig, clock: &Arc<dyn Clock>) -> Arc<dyn RecordStore> {
    match &config.db_pool {
        Some(pool) => Arc::new(DieselRecordStore::new(pool.clone(), Arc::clone(clock))),
        None => {
            tracing::warn!("no database configured; records are kept in memory only");
            Arc::new(InMemoryRecordStore::with_clock(Arc::clone(clock)))
        }
    }
}

/// Build the shared HTTP state from the configured adapters.
pub(super) fn build_http_state(config: &ServerConfig) -> HttpState {
    let clock: Arc<dyn Clock> = Arc::new(DefaultClock);
    let store = build_record_store(config, &clock);
    let snapshot_store: Arc<dyn SnapshotStore> =
        Arc::new(JsonSnapshotFile::new(config.snapshot_path.clone()));
    HttpState::new(HttpStatePorts {
        store,
        snapshot_store,
        clock,
        refresh_timeout: config.refresh_timeout,
        admin_token: config.admin_token.clone(),
    })
}
