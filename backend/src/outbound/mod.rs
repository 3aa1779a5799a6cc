//! Adapters implementing the domain ports.
//!
//! - **memory**: in-process record store for local runs and tests.
//! - **persistence**: PostgreSQL record store via Diesel.
//! - **snapshot_file**: JSON file holding the last published snapshot.

pub mod memory;
pub mod persistence;
pub mod snapshot_file;
