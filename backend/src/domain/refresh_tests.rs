//! Tests for the snapshot refresh scheduler.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, TimeZone, Utc};
use futures_util::StreamExt;
use futures_util::stream;
use mockable::Clock;
use rstest::{fixture, rstest};
use serde_json::json;
use tokio::sync::Notify;

use super::*;
use crate::domain::ports::{FixtureSnapshotStore, MockRecordStore, MockSnapshotStore, SnapshotStoreError};
use crate::domain::record::Document;

struct FixtureClock {
    utc_now: DateTime<Utc>,
}

impl Clock for FixtureClock {
    fn local(&self) -> DateTime<Local> {
        self.utc_now.with_timezone(&Local)
    }

    fn utc(&self) -> DateTime<Utc> {
        self.utc_now
    }
}

#[fixture]
fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 14, 12, 0, 0)
        .single()
        .expect("valid fixture timestamp")
}

fn restaurant_doc(place_id: &str, name: &str) -> Document {
    Document::from_value(
        place_id,
        json!({
            "name": name,
            "rating": 4.2,
            "userRatingsTotal": 10,
            "location": { "latitude": 51.5, "longitude": -0.12 },
            "types": ["ramen"],
        }),
    )
    .expect("object document")
}

fn scheduler_with(
    store: MockRecordStore,
    persistence: Arc<dyn SnapshotStore>,
    now: DateTime<Utc>,
    timeout: Duration,
) -> RefreshScheduler {
    RefreshScheduler::new(
        Arc::new(store),
        Arc::new(SnapshotCache::new()),
        persistence,
        Arc::new(FixtureClock { utc_now: now }),
        timeout,
    )
}

fn store_yielding(docs: Vec<Result<Document, RecordStoreError>>) -> MockRecordStore {
    let mut store = MockRecordStore::new();
    store
        .expect_stream_all()
        .returning(move |_| stream::iter(docs.clone()).boxed());
    store
}

#[rstest]
#[tokio::test]
async fn refresh_publishes_snapshot_with_clock_time(now: DateTime<Utc>) {
    let store = store_yielding(vec![
        Ok(restaurant_doc("p1", "Ramen Bar")),
        Ok(restaurant_doc("p2", "Noodle House")),
    ]);
    let scheduler = scheduler_with(store, Arc::new(FixtureSnapshotStore), now, Duration::from_secs(5));

    let outcome = scheduler.refresh_now().await.expect("refresh succeeds");

    assert_eq!(outcome.restaurant_count, 2);
    assert_eq!(outcome.generated_at, now);
    let snapshot = scheduler.cache().read().expect("snapshot published");
    assert_eq!(snapshot.generated_at(), now);
    assert!(!scheduler.is_refreshing());
}

#[rstest]
#[tokio::test]
async fn malformed_documents_are_skipped(now: DateTime<Utc>) {
    let broken = Document::from_value("p9", json!({ "name": "" })).expect("object");
    let store = store_yielding(vec![Ok(restaurant_doc("p1", "Ramen Bar")), Ok(broken)]);
    let scheduler = scheduler_with(store, Arc::new(FixtureSnapshotStore), now, Duration::from_secs(5));

    let outcome = scheduler.refresh_now().await.expect("refresh succeeds");
    assert_eq!(outcome.restaurant_count, 1);
}

#[rstest]
#[tokio::test]
async fn failed_pull_keeps_previous_snapshot(now: DateTime<Utc>) {
    let store = store_yielding(vec![
        Ok(restaurant_doc("p1", "Ramen Bar")),
        Err(RecordStoreError::unavailable("connection reset")),
    ]);
    let scheduler = scheduler_with(store, Arc::new(FixtureSnapshotStore), now, Duration::from_secs(5));
    let previous = scheduler
        .cache()
        .publish(Snapshot::new(now, Vec::new()));

    let err = scheduler.refresh_now().await.expect_err("pull fails");

    assert!(matches!(err, RefreshError::Store(RecordStoreError::Unavailable { .. })));
    let current = scheduler.cache().read().expect("previous snapshot kept");
    assert!(Arc::ptr_eq(&previous, &current));
    assert!(scheduler.status().last_error.is_some());
}

#[rstest]
#[tokio::test]
async fn slow_pull_times_out(now: DateTime<Utc>) {
    let mut store = MockRecordStore::new();
    store
        .expect_stream_all()
        .returning(|_| stream::pending().boxed());
    let scheduler = scheduler_with(store, Arc::new(FixtureSnapshotStore), now, Duration::from_millis(20));

    let err = scheduler.refresh_now().await.expect_err("pull times out");
    assert_eq!(err, RefreshError::TimedOut { seconds: 0 });
    assert!(scheduler.cache().read().is_none());
}

#[rstest]
#[tokio::test]
async fn persistence_failure_does_not_unpublish(now: DateTime<Utc>) {
    let store = store_yielding(vec![Ok(restaurant_doc("p1", "Ramen Bar"))]);
    let mut persistence = MockSnapshotStore::new();
    persistence
        .expect_save()
        .times(1)
        .returning(|_| Err(SnapshotStoreError::io("disk full")));
    let scheduler = scheduler_with(store, Arc::new(persistence), now, Duration::from_secs(5));

    scheduler.refresh_now().await.expect("refresh succeeds");
    assert_eq!(scheduler.cache().read().map(|s| s.len()), Some(1));
}

#[rstest]
#[tokio::test]
async fn only_one_refresh_runs_at_a_time(now: DateTime<Utc>) {
    let gate = Arc::new(Notify::new());
    let mut store = MockRecordStore::new();
    let release = Arc::clone(&gate);
    store.expect_stream_all().returning(move |_| {
        let release = Arc::clone(&release);
        stream::once(async move {
            release.notified().await;
            Ok(restaurant_doc("p1", "Ramen Bar"))
        })
        .boxed()
    });
    let scheduler = scheduler_with(store, Arc::new(FixtureSnapshotStore), now, Duration::from_secs(5));

    assert_eq!(scheduler.trigger_refresh(), RefreshTrigger::Accepted);
    assert_eq!(scheduler.trigger_refresh(), RefreshTrigger::AlreadyInProgress);
    assert_eq!(
        scheduler.refresh_now().await,
        Err(RefreshError::AlreadyInProgress)
    );
    assert!(scheduler.status().in_progress);

    gate.notify_one();
    for _ in 0..100 {
        if !scheduler.is_refreshing() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(!scheduler.is_refreshing());
    assert_eq!(scheduler.cache().read().map(|s| s.len()), Some(1));
    assert_eq!(scheduler.trigger_refresh(), RefreshTrigger::Accepted);
    gate.notify_one();
}

#[rstest]
#[tokio::test]
async fn failed_background_refresh_releases_the_flag(now: DateTime<Utc>) {
    let store = store_yielding(vec![Err(RecordStoreError::unavailable("connection reset"))]);
    let scheduler = scheduler_with(store, Arc::new(FixtureSnapshotStore), now, Duration::from_secs(5));
    let previous = scheduler.cache().publish(Snapshot::new(now, Vec::new()));

    assert_eq!(scheduler.trigger_refresh(), RefreshTrigger::Accepted);
    for _ in 0..100 {
        if !scheduler.is_refreshing() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    assert!(!scheduler.is_refreshing());
    let status = scheduler.status();
    assert!(status.last_error.is_some());
    let current = scheduler.cache().read().expect("previous snapshot kept");
    assert!(Arc::ptr_eq(&previous, &current));
}

#[rstest]
#[tokio::test]
async fn warm_start_publishes_persisted_snapshot(now: DateTime<Utc>) {
    let mut persistence = MockSnapshotStore::new();
    persistence
        .expect_load()
        .times(1)
        .returning(move || Ok(Some(Snapshot::new(now, Vec::new()))));
    let scheduler = scheduler_with(MockRecordStore::new(), Arc::new(persistence), now, Duration::from_secs(5));

    assert!(scheduler.warm_start().await);
    assert_eq!(scheduler.status().generated_at, Some(now));
}

#[rstest]
#[tokio::test]
async fn periodic_refresh_runs_immediately_and_stops(now: DateTime<Utc>) {
    let store = store_yielding(vec![Ok(restaurant_doc("p1", "Ramen Bar"))]);
    let scheduler = scheduler_with(store, Arc::new(FixtureSnapshotStore), now, Duration::from_secs(5));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let handle = scheduler.spawn_periodic(Duration::from_secs(3600), shutdown_rx);
    for _ in 0..100 {
        if scheduler.cache().read().is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(scheduler.cache().read().is_some());

    shutdown_tx.send(true).expect("receiver alive");
    handle.await.expect("periodic task exits");
}
