//! JSON file persistence for the restaurant snapshot.
//!
//! Saves are staged under a unique temporary name in the target directory and
//! renamed into place, so a crash mid-write leaves the previous file intact.

use std::io::{self, Write};

use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs::Dir};
use tracing::debug;
use uuid::Uuid;

use crate::domain::Snapshot;
use crate::domain::ports::{SnapshotStore, SnapshotStoreError};

/// Snapshot store writing one JSON document to `path`.
#[derive(Debug, Clone)]
pub struct JsonSnapshotFile {
    path: Utf8PathBuf,
}

impl JsonSnapshotFile {
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    fn split(&self) -> Result<(Utf8PathBuf, String), SnapshotStoreError> {
        let file_name = self
            .path
            .file_name()
            .ok_or_else(|| SnapshotStoreError::io(format!("{} has no file name", self.path)))?
            .to_owned();
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_str().is_empty() => parent.to_owned(),
            _ => Utf8PathBuf::from("."),
        };
        Ok((parent, file_name))
    }
}

fn io_error(path: &Utf8Path, err: &io::Error) -> SnapshotStoreError {
    SnapshotStoreError::io(format!("{path}: {err}"))
}

fn read_snapshot(path: &Utf8Path, parent: &Utf8Path, file_name: &str) -> Result<Option<Snapshot>, SnapshotStoreError> {
    let dir = match Dir::open_ambient_dir(parent, ambient_authority()) {
        Ok(dir) => dir,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(io_error(path, &err)),
    };
    let raw = match dir.read_to_string(file_name) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(io_error(path, &err)),
    };
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|err| SnapshotStoreError::format(format!("{path}: {err}")))
}

fn write_staged(dir: &Dir, staged: &str, encoded: &[u8]) -> io::Result<()> {
    let mut file = dir.create(staged)?;
    file.write_all(encoded)?;
    file.sync_all()
}

fn write_snapshot(
    path: &Utf8Path,
    parent: &Utf8Path,
    file_name: &str,
    encoded: &[u8],
) -> Result<(), SnapshotStoreError> {
    Dir::create_ambient_dir_all(parent, ambient_authority()).map_err(|err| io_error(path, &err))?;
    let dir = Dir::open_ambient_dir(parent, ambient_authority()).map_err(|err| io_error(path, &err))?;
    let staged = format!(".{file_name}.{}.tmp", Uuid::new_v4().simple());
    let renamed = write_staged(&dir, &staged, encoded)
        .and_then(|()| dir.rename(&staged, &dir, file_name));
    if let Err(err) = renamed {
        // The staged name is unique, so a leftover after a failed cleanup is harmless.
        let _ignored = dir.remove_file(&staged);
        return Err(io_error(path, &err));
    }
    // Persist the rename itself. Some platforms cannot sync directories.
    if let Err(err) = dir.into_std_file().sync_all() {
        debug!(%path, error = %err, "snapshot directory sync skipped");
    }
    Ok(())
}

#[async_trait]
impl SnapshotStore for JsonSnapshotFile {
    async fn load(&self) -> Result<Option<Snapshot>, SnapshotStoreError> {
        let (parent, file_name) = self.split()?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || read_snapshot(&path, &parent, &file_name))
            .await
            .map_err(|err| SnapshotStoreError::io(format!("snapshot load task failed: {err}")))?
    }

    async fn save(&self, snapshot: &Snapshot) -> Result<(), SnapshotStoreError> {
        let (parent, file_name) = self.split()?;
        let encoded = serde_json::to_vec(snapshot)
            .map_err(|err| SnapshotStoreError::format(err.to_string()))?;
        let path = self.path.clone();
        let bytes = encoded.len();
        tokio::task::spawn_blocking(move || write_snapshot(&path, &parent, &file_name, &encoded))
            .await
            .map_err(|err| SnapshotStoreError::io(format!("snapshot save task failed: {err}")))??;
        debug!(path = %self.path, bytes, "snapshot persisted");
        Ok(())
    }
}
