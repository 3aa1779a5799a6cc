//! Behaviour of the in-memory record store.

use super::*;
use crate::domain::record::FieldPath;
use chrono::{Local, TimeZone};
use futures_util::TryStreamExt;
use rstest::{fixture, rstest};
use serde_json::json;

struct FixtureClock;

impl Clock for FixtureClock {
    fn local(&self) -> DateTime<Local> {
        self.utc().with_timezone(&Local)
    }

    fn utc(&self) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 1, 9, 0, 0)
            .single()
            .expect("valid fixture timestamp")
    }
}

#[fixture]
fn store() -> InMemoryRecordStore {
    InMemoryRecordStore::with_clock(Arc::new(FixtureClock))
}

fn doc(id: &str, value: Value) -> Document {
    Document::from_value(id, value).expect("object document")
}

#[rstest]
#[tokio::test]
async fn create_rejects_duplicates(store: InMemoryRecordStore) {
    store
        .create(Collection::Users, doc("alice", json!({})))
        .await
        .expect("first create");
    let err = store
        .create(Collection::Users, doc("alice", json!({})))
        .await
        .expect_err("duplicate");
    assert_eq!(err, RecordStoreError::already_exists_in(Collection::Users, "alice"));
}

#[rstest]
#[tokio::test]
async fn update_of_missing_document_is_not_found(store: InMemoryRecordStore) {
    let err = store
        .update(
            Collection::Lists,
            "nope",
            vec![FieldUpdate::Increment(FieldPath::new("numLikes"), 1)],
            None,
        )
        .await
        .expect_err("missing");
    assert_eq!(err, RecordStoreError::not_found_in(Collection::Lists, "nope"));
}

#[rstest]
#[tokio::test]
async fn precondition_guards_the_update(store: InMemoryRecordStore) {
    store
        .create(Collection::Lists, doc("l1", json!({ "favoritedBy": ["bob"], "numLikes": 1 })))
        .await
        .expect("create");
    let like = || {
        (
            vec![
                FieldUpdate::ArrayUnion(FieldPath::new("favoritedBy"), vec![json!("bob")]),
                FieldUpdate::Increment(FieldPath::new("numLikes"), 1),
            ],
            Some(Precondition::ArrayExcludes(FieldPath::new("favoritedBy"), json!("bob"))),
        )
    };

    let (updates, precondition) = like();
    let err = store
        .update(Collection::Lists, "l1", updates, precondition)
        .await
        .expect_err("already liked");
    assert_eq!(err, RecordStoreError::precondition_failed_in(Collection::Lists, "l1"));

    let stored = store
        .get(Collection::Lists, "l1")
        .await
        .expect("get")
        .expect("present");
    assert_eq!(stored.fields()["numLikes"], json!(1));
}

#[rstest]
#[tokio::test]
async fn failed_batches_leave_no_trace(store: InMemoryRecordStore) {
    store
        .create(Collection::UserUids, doc("uid-1", json!({ "username": "bob" })))
        .await
        .expect("claim");

    let err = store
        .batch(vec![
            WriteOp::Create(Collection::Users, doc("alice", json!({ "uid": "uid-1" }))),
            WriteOp::Create(Collection::UserUids, doc("uid-1", json!({ "username": "alice" }))),
        ])
        .await
        .expect_err("uid taken");

    assert!(matches!(err, RecordStoreError::AlreadyExists { .. }));
    assert!(
        store
            .get(Collection::Users, "alice")
            .await
            .expect("get")
            .is_none()
    );
}

#[rstest]
#[tokio::test]
async fn failed_batches_restore_overwritten_and_deleted_documents(store: InMemoryRecordStore) {
    store
        .create(Collection::Lists, doc("l1", json!({ "name": "Before" })))
        .await
        .expect("seed list");
    store
        .create(Collection::Lists, doc("l2", json!({ "name": "Kept" })))
        .await
        .expect("seed list");
    store
        .create(Collection::Users, doc("alice", json!({ "uid": "u1" })))
        .await
        .expect("seed user");

    let err = store
        .batch(vec![
            WriteOp::Set(Collection::Lists, doc("l1", json!({ "name": "After" }))),
            WriteOp::Delete(Collection::Lists, "l2".into()),
            WriteOp::Create(Collection::Reviews, doc("r1", json!({ "rating": 4 }))),
            WriteOp::Update {
                collection: Collection::Lists,
                id: "l1".into(),
                updates: vec![FieldUpdate::Increment(FieldPath::new("numLikes"), 1)],
                precondition: None,
            },
            WriteOp::Create(Collection::Users, doc("alice", json!({ "uid": "u2" }))),
        ])
        .await
        .expect_err("username taken");

    assert!(matches!(err, RecordStoreError::AlreadyExists { .. }));
    let l1 = store
        .get(Collection::Lists, "l1")
        .await
        .expect("get")
        .expect("l1 present");
    assert_eq!(Value::Object(l1.fields().clone()), json!({ "name": "Before" }));
    assert!(store.get(Collection::Lists, "l2").await.expect("get").is_some());
    assert!(store.get(Collection::Reviews, "r1").await.expect("get").is_none());
    let alice = store
        .get(Collection::Users, "alice")
        .await
        .expect("get")
        .expect("alice present");
    assert_eq!(alice.fields()["uid"], json!("u1"));
}

#[rstest]
#[tokio::test]
async fn server_timestamps_use_the_clock(store: InMemoryRecordStore) {
    store
        .batch(vec![
            WriteOp::Create(Collection::Reviews, doc("r1", json!({ "rating": 5 }))),
            WriteOp::Update {
                collection: Collection::Reviews,
                id: "r1".into(),
                updates: vec![FieldUpdate::ServerTimestamp(FieldPath::new("createdAt"))],
                precondition: None,
            },
        ])
        .await
        .expect("batch");

    let stored = store
        .get(Collection::Reviews, "r1")
        .await
        .expect("get")
        .expect("present");
    assert_eq!(stored.fields()["createdAt"], json!("2026-05-01T09:00:00.000Z"));
}

#[rstest]
#[tokio::test]
async fn stream_and_find_are_ordered_by_id(store: InMemoryRecordStore) {
    for (id, owner) in [("c", "alice"), ("a", "alice"), ("b", "bob")] {
        store
            .create(Collection::Lists, doc(id, json!({ "owner": owner })))
            .await
            .expect("create");
    }

    let all: Vec<Document> = store
        .stream_all(Collection::Lists)
        .try_collect()
        .await
        .expect("stream");
    let ids: Vec<&str> = all.iter().map(Document::id).collect();
    assert_eq!(ids, ["a", "b", "c"]);

    let owned = store
        .find(Collection::Lists, FieldFilter::equals("owner", "alice"))
        .await
        .expect("find");
    let ids: Vec<&str> = owned.iter().map(Document::id).collect();
    assert_eq!(ids, ["a", "c"]);
}

#[rstest]
#[tokio::test]
async fn outage_surfaces_as_unavailable(store: InMemoryRecordStore) {
    store.set_available(false);
    let err = store
        .get(Collection::Restaurants, "p1")
        .await
        .expect_err("unavailable");
    assert!(matches!(err, RecordStoreError::Unavailable { .. }));

    let streamed: Result<Vec<Document>, _> = store
        .stream_all(Collection::Restaurants)
        .try_collect()
        .await;
    assert!(matches!(streamed, Err(RecordStoreError::Unavailable { .. })));
}
