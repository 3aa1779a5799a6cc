//! In-process record store.
//!
//! Used when no database URL is configured and as the store behind the
//! integration tests. Every operation runs under one `RwLock`, so `update`
//! and `batch` are atomic with respect to each other. A batch records the
//! prior state of each document it touches and restores them if a later
//! operation fails.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::{StreamExt, stream};
use mockable::{Clock, DefaultClock};
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use crate::domain::ports::{DocumentStream, RecordStore, RecordStoreError};
use crate::domain::record::{
    Collection, Document, FieldFilter, FieldUpdate, Precondition, WriteOp, apply_updates,
};

type Fields = Map<String, Value>;
type Collections = BTreeMap<Collection, BTreeMap<String, Fields>>;

/// Record store backed by ordered in-memory maps.
///
/// # Examples
/// ```
/// use platelist::domain::ports::RecordStore;
/// use platelist::domain::record::{Collection, Document};
/// use platelist::outbound::memory::InMemoryRecordStore;
/// use serde_json::json;
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let store = InMemoryRecordStore::default();
/// let doc = Document::from_value("p1", json!({ "name": "Pho 99" })).unwrap();
/// store.create(Collection::Restaurants, doc).await.unwrap();
/// assert!(store.get(Collection::Restaurants, "p1").await.unwrap().is_some());
/// # });
/// ```
#[derive(Clone)]
pub struct InMemoryRecordStore {
    collections: Arc<RwLock<Collections>>,
    clock: Arc<dyn Clock>,
    available: Arc<AtomicBool>,
}

impl Default for InMemoryRecordStore {
    fn default() -> Self {
        Self::with_clock(Arc::new(DefaultClock))
    }
}

impl InMemoryRecordStore {
    /// Store that stamps server timestamps from `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            collections: Arc::new(RwLock::new(Collections::new())),
            clock,
            available: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Simulate an outage: while unavailable every operation fails with
    /// `RecordStoreError::Unavailable`.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Release);
    }

    fn ensure_available(&self) -> Result<(), RecordStoreError> {
        if self.available.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(RecordStoreError::unavailable("in-memory store marked unavailable"))
        }
    }
}

fn create_in(
    collections: &mut Collections,
    collection: Collection,
    document: Document,
) -> Result<(), RecordStoreError> {
    let (id, fields) = document.into_parts();
    let documents = collections.entry(collection).or_default();
    if documents.contains_key(&id) {
        return Err(RecordStoreError::already_exists_in(collection, id));
    }
    documents.insert(id, fields);
    Ok(())
}

fn update_in(
    collections: &mut Collections,
    collection: Collection,
    id: &str,
    updates: &[FieldUpdate],
    precondition: Option<&Precondition>,
    now: DateTime<Utc>,
) -> Result<(), RecordStoreError> {
    let fields = collections
        .get_mut(&collection)
        .and_then(|documents| documents.get_mut(id))
        .ok_or_else(|| RecordStoreError::not_found_in(collection, id))?;
    if let Some(precondition) = precondition {
        if !precondition.holds(fields) {
            return Err(RecordStoreError::precondition_failed_in(collection, id));
        }
    }
    let mut staged = fields.clone();
    apply_updates(&mut staged, updates, now)
        .map_err(|err| RecordStoreError::query(format!("{collection}/{id}: {err}")))?;
    *fields = staged;
    Ok(())
}

fn apply_op(
    collections: &mut Collections,
    op: WriteOp,
    now: DateTime<Utc>,
) -> Result<(), RecordStoreError> {
    match op {
        WriteOp::Create(collection, document) => create_in(collections, collection, document),
        WriteOp::Set(collection, document) => {
            let (id, fields) = document.into_parts();
            collections.entry(collection).or_default().insert(id, fields);
            Ok(())
        }
        WriteOp::Update {
            collection,
            id,
            updates,
            precondition,
        } => update_in(
            collections,
            collection,
            &id,
            &updates,
            precondition.as_ref(),
            now,
        ),
        WriteOp::Delete(collection, id) => {
            if let Some(documents) = collections.get_mut(&collection) {
                documents.remove(&id);
            }
            Ok(())
        }
    }
}

/// State of one document before a batch touched it.
struct Undo {
    collection: Collection,
    id: String,
    previous: Option<Fields>,
}

fn op_target(op: &WriteOp) -> (Collection, &str) {
    match op {
        WriteOp::Create(collection, document) | WriteOp::Set(collection, document) => {
            (*collection, document.id())
        }
        WriteOp::Update { collection, id, .. } | WriteOp::Delete(collection, id) => {
            (*collection, id.as_str())
        }
    }
}

/// Restore every document an aborted batch changed, newest change first.
/// A failing op leaves its own document untouched, so only earlier ops
/// need undoing.
fn rollback(collections: &mut Collections, undo: Vec<Undo>) {
    for Undo {
        collection,
        id,
        previous,
    } in undo.into_iter().rev()
    {
        let documents = collections.entry(collection).or_default();
        match previous {
            Some(fields) => {
                documents.insert(id, fields);
            }
            None => {
                documents.remove(&id);
            }
        }
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn get(
        &self,
        collection: Collection,
        id: &str,
    ) -> Result<Option<Document>, RecordStoreError> {
        self.ensure_available()?;
        let collections = self.collections.read().await;
        Ok(collections
            .get(&collection)
            .and_then(|documents| documents.get(id))
            .map(|fields| Document::new(id, fields.clone())))
    }

    async fn find(
        &self,
        collection: Collection,
        filter: FieldFilter,
    ) -> Result<Vec<Document>, RecordStoreError> {
        self.ensure_available()?;
        let collections = self.collections.read().await;
        Ok(collections
            .get(&collection)
            .into_iter()
            .flatten()
            .map(|(id, fields)| Document::new(id.clone(), fields.clone()))
            .filter(|document| filter.matches(document))
            .collect())
    }

    fn stream_all(&self, collection: Collection) -> DocumentStream {
        let collections = Arc::clone(&self.collections);
        let availability = self.ensure_available();
        stream::once(async move {
            if let Err(err) = availability {
                return vec![Err(err)];
            }
            let collections = collections.read().await;
            collections
                .get(&collection)
                .into_iter()
                .flatten()
                .map(|(id, fields)| Ok(Document::new(id.clone(), fields.clone())))
                .collect::<Vec<_>>()
        })
        .flat_map(stream::iter)
        .boxed()
    }

    async fn create(
        &self,
        collection: Collection,
        document: Document,
    ) -> Result<(), RecordStoreError> {
        self.ensure_available()?;
        let mut collections = self.collections.write().await;
        create_in(&mut collections, collection, document)
    }

    async fn set(&self, collection: Collection, document: Document) -> Result<(), RecordStoreError> {
        self.ensure_available()?;
        let mut collections = self.collections.write().await;
        apply_op(&mut collections, WriteOp::Set(collection, document), self.clock.utc())
    }

    async fn update(
        &self,
        collection: Collection,
        id: &str,
        updates: Vec<FieldUpdate>,
        precondition: Option<Precondition>,
    ) -> Result<(), RecordStoreError> {
        self.ensure_available()?;
        let mut collections = self.collections.write().await;
        update_in(
            &mut collections,
            collection,
            id,
            &updates,
            precondition.as_ref(),
            self.clock.utc(),
        )
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<(), RecordStoreError> {
        self.ensure_available()?;
        let mut collections = self.collections.write().await;
        apply_op(
            &mut collections,
            WriteOp::Delete(collection, id.to_owned()),
            self.clock.utc(),
        )
    }

    async fn batch(&self, ops: Vec<WriteOp>) -> Result<(), RecordStoreError> {
        self.ensure_available()?;
        let now = self.clock.utc();
        let mut collections = self.collections.write().await;
        let mut undo: Vec<Undo> = Vec::with_capacity(ops.len());
        for op in ops {
            let (collection, target) = op_target(&op);
            let id = target.to_owned();
            let previous = collections
                .get(&collection)
                .and_then(|documents| documents.get(&id))
                .cloned();
            if let Err(err) = apply_op(&mut collections, op, now) {
                rollback(&mut collections, undo);
                return Err(err);
            }
            undo.push(Undo {
                collection,
                id,
                previous,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests;
