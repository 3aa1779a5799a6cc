//! Round trips through the PostgreSQL record store.
//!
//! These tests need a disposable database. Point
//! `PLATELIST_TEST_DATABASE_URL` at one to run them; without it every test
//! returns early. Each test writes ids under a fresh UUID prefix so runs can
//! share a database.

use std::env;
use std::sync::{Arc, OnceLock};

use futures::TryStreamExt;
use mockable::DefaultClock;
use platelist::domain::ports::{RecordStore, RecordStoreError};
use platelist::domain::record::{
    Collection, Document, FieldFilter, FieldUpdate, FilterOp, Precondition, WriteOp,
};
use platelist::outbound::persistence::{
    DbPool, DieselRecordStore, PoolConfig, run_pending_migrations,
};
use serde_json::{Value, json};
use uuid::Uuid;

const DATABASE_URL_VAR: &str = "PLATELIST_TEST_DATABASE_URL";

static MIGRATED: OnceLock<Result<usize, String>> = OnceLock::new();

async fn store() -> Option<DieselRecordStore> {
    let url = env::var(DATABASE_URL_VAR).ok()?;
    MIGRATED
        .get_or_init(|| run_pending_migrations(&url).map_err(|err| err.to_string()))
        .as_ref()
        .expect("migrations apply");
    let pool = DbPool::new(PoolConfig::new(url).with_max_size(4))
        .await
        .expect("pool builds");
    Some(DieselRecordStore::new(pool, Arc::new(DefaultClock)))
}

fn prefix() -> String {
    Uuid::new_v4().simple().to_string()
}

fn doc(id: &str, value: Value) -> Document {
    Document::from_value(id, value).expect("object document")
}

fn field(document: &Document, name: &str) -> Value {
    document.fields().get(name).cloned().unwrap_or(Value::Null)
}

#[tokio::test]
async fn failed_precondition_leaves_the_document_untouched() {
    let Some(store) = store().await else {
        return;
    };
    let id = format!("{}-list", prefix());
    store
        .create(
            Collection::Lists,
            doc(&id, json!({ "favoritedBy": [], "numLikes": 0 })),
        )
        .await
        .expect("create list");

    let err = store
        .update(
            Collection::Lists,
            &id,
            vec![
                FieldUpdate::ArrayRemove("favoritedBy".into(), vec![json!("ada")]),
                FieldUpdate::Increment("numLikes".into(), -1),
            ],
            Some(Precondition::ArrayContains("favoritedBy".into(), json!("ada"))),
        )
        .await
        .expect_err("ada has not liked the list");
    assert_eq!(
        err,
        RecordStoreError::precondition_failed_in(Collection::Lists, id.clone())
    );

    store
        .update(
            Collection::Lists,
            &id,
            vec![
                FieldUpdate::ArrayUnion("favoritedBy".into(), vec![json!("ada")]),
                FieldUpdate::Increment("numLikes".into(), 1),
            ],
            Some(Precondition::ArrayExcludes("favoritedBy".into(), json!("ada"))),
        )
        .await
        .expect("like applies");

    let stored = store
        .get(Collection::Lists, &id)
        .await
        .expect("read list")
        .expect("list exists");
    assert_eq!(field(&stored, "favoritedBy"), json!(["ada"]));
    assert_eq!(field(&stored, "numLikes"), json!(1));
}

#[tokio::test]
async fn updating_a_missing_document_is_not_found() {
    let Some(store) = store().await else {
        return;
    };
    let id = format!("{}-missing", prefix());

    let err = store
        .update(
            Collection::Lists,
            &id,
            vec![FieldUpdate::Increment("numLikes".into(), 1)],
            None,
        )
        .await
        .expect_err("document does not exist");

    assert_eq!(err, RecordStoreError::not_found_in(Collection::Lists, id));
}

#[tokio::test]
async fn batch_rolls_back_when_a_later_create_collides() {
    let Some(store) = store().await else {
        return;
    };
    let run = prefix();
    let username = format!("{run}-ada");
    let uid = format!("{run}-uid");

    let err = store
        .batch(vec![
            WriteOp::Create(Collection::Users, doc(&username, json!({ "uid": &uid }))),
            WriteOp::Create(
                Collection::UserUids,
                doc(&uid, json!({ "username": &username })),
            ),
            WriteOp::Create(Collection::Users, doc(&username, json!({ "uid": "other" }))),
        ])
        .await
        .expect_err("duplicate username aborts the batch");

    assert_eq!(
        err,
        RecordStoreError::already_exists_in(Collection::Users, username.clone())
    );
    assert!(
        store
            .get(Collection::Users, &username)
            .await
            .expect("read user")
            .is_none()
    );
    assert!(
        store
            .get(Collection::UserUids, &uid)
            .await
            .expect("read uid claim")
            .is_none()
    );
}

#[tokio::test]
async fn stream_all_pages_through_the_whole_collection() {
    let Some(store) = store().await else {
        return;
    };
    let store = store.with_page_size(2);
    let run = prefix();
    let expected: Vec<String> = (0..5).map(|n| format!("{run}-{n}")).collect();
    // Insert out of order; the stream orders by id.
    for id in expected.iter().rev() {
        store
            .set(Collection::Reviews, doc(id, json!({ "text": "ok" })))
            .await
            .expect("seed review");
    }

    let streamed: Vec<Document> = store
        .stream_all(Collection::Reviews)
        .try_collect()
        .await
        .expect("stream completes");

    let ours: Vec<String> = streamed
        .iter()
        .map(Document::id)
        .filter(|id| id.starts_with(&run))
        .map(str::to_owned)
        .collect();
    assert_eq!(ours, expected);
}

#[tokio::test]
async fn find_matches_nested_paths_and_ordering_filters() {
    let Some(store) = store().await else {
        return;
    };
    let run = prefix();
    for (suffix, points) in [("low", 10), ("high", 20)] {
        store
            .set(
                Collection::Users,
                doc(
                    &format!("{run}-{suffix}"),
                    json!({ "run": &run, "points": { "general": points } }),
                ),
            )
            .await
            .expect("seed user");
    }

    let exact = store
        .find(Collection::Users, FieldFilter::equals("points.general", 10))
        .await
        .expect("containment query");
    let exact_ids: Vec<&str> = exact
        .iter()
        .map(Document::id)
        .filter(|id| id.starts_with(&run))
        .collect();
    assert_eq!(exact_ids, vec![format!("{run}-low")]);

    let ranged = store
        .find(
            Collection::Users,
            FieldFilter::new("points.general", FilterOp::Gt, 15),
        )
        .await
        .expect("scan query");
    let ranged_ids: Vec<&str> = ranged
        .iter()
        .map(Document::id)
        .filter(|id| id.starts_with(&run))
        .collect();
    assert_eq!(ranged_ids, vec![format!("{run}-high")]);
}
