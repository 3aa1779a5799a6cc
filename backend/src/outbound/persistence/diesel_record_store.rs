//! PostgreSQL record store.
//!
//! All collections share the `documents` table. Single-document updates and
//! batches run inside one transaction that locks the touched rows with
//! `SELECT ... FOR UPDATE`, so preconditions are evaluated against the same
//! state the write replaces. Field updates are applied in Rust with the same
//! rules the in-memory store uses.
//!
//! `stream_all` pages by keyset on `id`, one pooled checkout per page, so a
//! long pull never pins a connection or holds a snapshot transaction open.
//! Each row is read once at its state when its page ran; rows committed
//! between pages are seen only if their id sorts after the cursor.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::sql_query;
use diesel::sql_types::{Jsonb, Text};
use diesel::upsert::excluded;
use diesel_async::scoped_futures::ScopedFutureExt as _;
use diesel_async::{AsyncConnection as _, AsyncPgConnection, RunQueryDsl};
use futures_util::{StreamExt, TryStreamExt, stream};
use mockable::Clock;
use serde_json::{Map, Value};

use crate::domain::ports::{DocumentStream, RecordStore, RecordStoreError};
use crate::domain::record::{
    Collection, Document, FieldFilter, FieldUpdate, FilterOp, Precondition, WriteOp,
    apply_updates,
};

use super::diesel_helpers::{map_diesel_error, map_pool_error};
use super::models::{DocumentRow, NewDocumentRow};
use super::pool::DbPool;
use super::schema::documents;

const DEFAULT_PAGE_SIZE: usize = 500;

const FIND_SQL: &str = r"
SELECT id, data
FROM documents
WHERE collection = $1 AND data @> $2
ORDER BY id
";

/// Diesel-backed implementation of [`RecordStore`].
#[derive(Clone)]
pub struct DieselRecordStore {
    pool: DbPool,
    clock: Arc<dyn Clock>,
    page_size: usize,
}

impl DieselRecordStore {
    pub fn new(pool: DbPool, clock: Arc<dyn Clock>) -> Self {
        Self {
            pool,
            clock,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Rows fetched per round trip by [`RecordStore::stream_all`].
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }
}

/// Failure inside a transaction body: either Diesel's or one we raise.
#[derive(Debug)]
enum TxError {
    Diesel(diesel::result::Error),
    Store(RecordStoreError),
}

impl From<diesel::result::Error> for TxError {
    fn from(err: diesel::result::Error) -> Self {
        Self::Diesel(err)
    }
}

impl From<RecordStoreError> for TxError {
    fn from(err: RecordStoreError) -> Self {
        Self::Store(err)
    }
}

impl From<TxError> for RecordStoreError {
    fn from(err: TxError) -> Self {
        match err {
            TxError::Diesel(err) => map_diesel_error(err),
            TxError::Store(err) => err,
        }
    }
}

/// Build a JSON containment document equivalent to `filter`, when one exists.
///
/// Ordering comparisons have no containment form and yield `None`; the
/// caller then scans the collection and evaluates the filter itself.
fn containment_document(filter: &FieldFilter) -> Option<Value> {
    let leaf = match (filter.op, &filter.value) {
        (FilterOp::Eq, Value::Array(_) | Value::Object(_)) => return None,
        (FilterOp::Eq, value) => value.clone(),
        (FilterOp::ArrayContains, value) => Value::Array(vec![value.clone()]),
        _ => return None,
    };
    let segments = filter.path.segments();
    if segments.is_empty() {
        return None;
    }
    Some(segments.iter().rev().fold(leaf, |inner, segment| {
        let mut wrapper = Map::new();
        wrapper.insert(segment.clone(), inner);
        Value::Object(wrapper)
    }))
}

fn rows_to_documents(rows: Vec<DocumentRow>) -> Result<Vec<Document>, RecordStoreError> {
    rows.into_iter().map(DocumentRow::into_document).collect()
}

async fn load_page(
    pool: &DbPool,
    collection: Collection,
    after: &str,
    limit: usize,
) -> Result<Vec<DocumentRow>, RecordStoreError> {
    let mut conn = pool.get().await.map_err(map_pool_error)?;
    documents::table
        .filter(documents::collection.eq(collection.as_str()))
        .filter(documents::id.gt(after))
        .order_by(documents::id.asc())
        .limit(i64::try_from(limit).unwrap_or(i64::MAX))
        .select(DocumentRow::as_select())
        .load(&mut conn)
        .await
        .map_err(map_diesel_error)
}

async fn insert_document(
    conn: &mut AsyncPgConnection,
    collection: Collection,
    document: Document,
    now: DateTime<Utc>,
) -> Result<(), TxError> {
    let (id, fields) = document.into_parts();
    let row = NewDocumentRow::new(collection, id, fields, now);
    let inserted = diesel::insert_into(documents::table)
        .values(&row)
        .on_conflict_do_nothing()
        .execute(conn)
        .await?;
    if inserted == 0 {
        return Err(RecordStoreError::already_exists_in(collection, row.id).into());
    }
    Ok(())
}

async fn upsert_document(
    conn: &mut AsyncPgConnection,
    collection: Collection,
    document: Document,
    now: DateTime<Utc>,
) -> Result<(), TxError> {
    let (id, fields) = document.into_parts();
    let row = NewDocumentRow::new(collection, id, fields, now);
    diesel::insert_into(documents::table)
        .values(&row)
        .on_conflict((documents::collection, documents::id))
        .do_update()
        .set((
            documents::data.eq(excluded(documents::data)),
            documents::updated_at.eq(now),
        ))
        .execute(conn)
        .await?;
    Ok(())
}

async fn update_document(
    conn: &mut AsyncPgConnection,
    collection: Collection,
    id: &str,
    updates: &[FieldUpdate],
    precondition: Option<&Precondition>,
    now: DateTime<Utc>,
) -> Result<(), TxError> {
    let current: Option<Value> = documents::table
        .filter(documents::collection.eq(collection.as_str()))
        .filter(documents::id.eq(id))
        .select(documents::data)
        .for_update()
        .get_result(conn)
        .await
        .optional()?;
    let Some(current) = current else {
        return Err(RecordStoreError::not_found_in(collection, id).into());
    };
    let Value::Object(mut fields) = current else {
        return Err(RecordStoreError::query(format!("{collection}/{id} is not an object")).into());
    };
    if let Some(precondition) = precondition {
        if !precondition.holds(&fields) {
            return Err(RecordStoreError::precondition_failed_in(collection, id).into());
        }
    }
    apply_updates(&mut fields, updates, now)
        .map_err(|err| RecordStoreError::query(format!("{collection}/{id}: {err}")))?;

    diesel::update(
        documents::table
            .filter(documents::collection.eq(collection.as_str()))
            .filter(documents::id.eq(id)),
    )
    .set((
        documents::data.eq(Value::Object(fields)),
        documents::updated_at.eq(now),
    ))
    .execute(conn)
    .await?;
    Ok(())
}

async fn delete_document(
    conn: &mut AsyncPgConnection,
    collection: Collection,
    id: &str,
) -> Result<(), TxError> {
    diesel::delete(
        documents::table
            .filter(documents::collection.eq(collection.as_str()))
            .filter(documents::id.eq(id)),
    )
    .execute(conn)
    .await?;
    Ok(())
}

async fn apply_op(
    conn: &mut AsyncPgConnection,
    op: WriteOp,
    now: DateTime<Utc>,
) -> Result<(), TxError> {
    match op {
        WriteOp::Create(collection, document) => {
            insert_document(conn, collection, document, now).await
        }
        WriteOp::Set(collection, document) => upsert_document(conn, collection, document, now).await,
        WriteOp::Update {
            collection,
            id,
            updates,
            precondition,
        } => update_document(conn, collection, &id, &updates, precondition.as_ref(), now).await,
        WriteOp::Delete(collection, id) => delete_document(conn, collection, &id).await,
    }
}

#[async_trait]
impl RecordStore for DieselRecordStore {
    async fn get(
        &self,
        collection: Collection,
        id: &str,
    ) -> Result<Option<Document>, RecordStoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row: Option<DocumentRow> = documents::table
            .filter(documents::collection.eq(collection.as_str()))
            .filter(documents::id.eq(id))
            .select(DocumentRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;
        row.map(DocumentRow::into_document).transpose()
    }

    async fn find(
        &self,
        collection: Collection,
        filter: FieldFilter,
    ) -> Result<Vec<Document>, RecordStoreError> {
        let Some(contains) = containment_document(&filter) else {
            let documents: Vec<Document> = self.stream_all(collection).try_collect().await?;
            return Ok(documents
                .into_iter()
                .filter(|document| filter.matches(document))
                .collect());
        };

        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows: Vec<DocumentRow> = sql_query(FIND_SQL)
            .bind::<Text, _>(collection.as_str())
            .bind::<Jsonb, _>(contains)
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        // Containment is looser than equality for nested arrays; re-check.
        Ok(rows_to_documents(rows)?
            .into_iter()
            .filter(|document| filter.matches(document))
            .collect())
    }

    fn stream_all(&self, collection: Collection) -> DocumentStream {
        let pool = self.pool.clone();
        let page_size = self.page_size;
        stream::try_unfold(Some(String::new()), move |cursor| {
            let pool = pool.clone();
            async move {
                let Some(after) = cursor else {
                    return Ok::<_, RecordStoreError>(None);
                };
                let rows = load_page(&pool, collection, &after, page_size).await?;
                let next = if rows.len() < page_size {
                    None
                } else {
                    rows.last().map(|row| row.id.clone())
                };
                let page: Vec<_> = rows.into_iter().map(DocumentRow::into_document).collect();
                Ok(Some((stream::iter(page), next)))
            }
        })
        .try_flatten()
        .boxed()
    }

    async fn create(
        &self,
        collection: Collection,
        document: Document,
    ) -> Result<(), RecordStoreError> {
        let now = self.clock.utc();
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        insert_document(&mut conn, collection, document, now)
            .await
            .map_err(RecordStoreError::from)
    }

    async fn set(&self, collection: Collection, document: Document) -> Result<(), RecordStoreError> {
        let now = self.clock.utc();
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        upsert_document(&mut conn, collection, document, now)
            .await
            .map_err(RecordStoreError::from)
    }

    async fn update(
        &self,
        collection: Collection,
        id: &str,
        updates: Vec<FieldUpdate>,
        precondition: Option<Precondition>,
    ) -> Result<(), RecordStoreError> {
        let now = self.clock.utc();
        let id = id.to_owned();
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        conn.transaction::<_, TxError, _>(|conn| {
            async move {
                update_document(conn, collection, &id, &updates, precondition.as_ref(), now).await
            }
            .scope_boxed()
        })
        .await
        .map_err(RecordStoreError::from)
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<(), RecordStoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        delete_document(&mut conn, collection, id)
            .await
            .map_err(RecordStoreError::from)
    }

    async fn batch(&self, ops: Vec<WriteOp>) -> Result<(), RecordStoreError> {
        if ops.is_empty() {
            return Ok(());
        }
        let now = self.clock.utc();
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        conn.transaction::<_, TxError, _>(|conn| {
            async move {
                for op in ops {
                    apply_op(conn, op, now).await?;
                }
                Ok(())
            }
            .scope_boxed()
        })
        .await
        .map_err(RecordStoreError::from)
    }
}
