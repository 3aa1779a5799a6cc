//! PostgreSQL persistence via Diesel.
//!
//! Every collection lives in one `documents` table as JSONB keyed by
//! `(collection, id)`. Row types and the schema stay private to this module;
//! the rest of the crate sees only [`DieselRecordStore`] and the pool.
//!
//! ```ignore
//! use platelist::outbound::persistence::{DbPool, DieselRecordStore, PoolConfig};
//!
//! let pool = DbPool::new(PoolConfig::new("postgres://localhost/platelist")).await?;
//! let store = DieselRecordStore::new(pool, Arc::new(mockable::DefaultClock));
//! ```

mod diesel_helpers;
mod diesel_record_store;
mod migrations;
mod models;
mod pool;
mod schema;

pub use diesel_record_store::DieselRecordStore;
pub use migrations::{MigrationError, run_pending_migrations};
pub use pool::{DbPool, PoolConfig, PoolError};
