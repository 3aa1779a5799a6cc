//! Background refresh of the restaurant snapshot.
//!
//! A refresh pulls the whole `restaurants` collection, builds a new
//! [`Snapshot`], publishes it to the [`SnapshotCache`] and then persists it.
//! At most one refresh runs at a time; a pull that fails or exceeds the
//! timeout leaves the previous snapshot in place.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use mockable::Clock;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use utoipa::ToSchema;

use super::ports::{RecordStore, RecordStoreError, SnapshotStore};
use super::record::Collection;
use super::restaurant::{PLACE_ID_FIELD, Restaurant};
use super::{Error, Snapshot, SnapshotCache, TraceId};

/// Result of asking for a background refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum RefreshTrigger {
    Accepted,
    AlreadyInProgress,
}

/// Summary of a completed refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RefreshOutcome {
    pub restaurant_count: usize,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RefreshError {
    #[error("a snapshot refresh is already in progress")]
    AlreadyInProgress,
    #[error("snapshot pull failed: {0}")]
    Store(#[from] RecordStoreError),
    #[error("snapshot pull exceeded {seconds}s")]
    TimedOut { seconds: u64 },
}

impl From<RefreshError> for Error {
    fn from(err: RefreshError) -> Self {
        match err {
            RefreshError::AlreadyInProgress => Error::conflict(err.to_string()),
            RefreshError::Store(inner) => inner.into(),
            RefreshError::TimedOut { .. } => Error::service_unavailable(err.to_string()),
        }
    }
}

/// Operator-facing view of the cache and scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RefreshStatus {
    pub in_progress: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restaurant_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Pull every restaurant from the store within `timeout`.
///
/// Documents that fail validation are skipped with a warning. Store errors
/// and the timeout abort the pull and discard what was read so far.
pub async fn pull_restaurants(
    store: &dyn RecordStore,
    timeout: Duration,
) -> Result<Vec<Restaurant>, RefreshError> {
    let pull = async {
        let mut documents = store.stream_all(Collection::Restaurants);
        let mut restaurants = Vec::new();
        while let Some(item) = documents.next().await {
            let document = item?;
            match document.decode_with_id::<Restaurant>(PLACE_ID_FIELD) {
                Ok(restaurant) => restaurants.push(restaurant),
                Err(err) => warn!(
                    place_id = document.id(),
                    error = %err,
                    "skipping malformed restaurant document"
                ),
            }
        }
        Ok::<_, RecordStoreError>(restaurants)
    };
    match tokio::time::timeout(timeout, pull).await {
        Ok(result) => result.map_err(RefreshError::from),
        Err(_) => Err(RefreshError::TimedOut {
            seconds: timeout.as_secs(),
        }),
    }
}

struct RefreshInner {
    store: Arc<dyn RecordStore>,
    cache: Arc<SnapshotCache>,
    persistence: Arc<dyn SnapshotStore>,
    clock: Arc<dyn Clock>,
    timeout: Duration,
    in_flight: AtomicBool,
    last_error: ArcSwapOption<String>,
}

/// Clears the in-flight flag when the refresh finishes or is dropped.
struct InFlight(Arc<RefreshInner>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.in_flight.store(false, Ordering::Release);
    }
}

impl RefreshInner {
    fn acquire(self: &Arc<Self>) -> Option<InFlight> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlight(Arc::clone(self)))
    }

    async fn run(&self) -> Result<RefreshOutcome, RefreshError> {
        let restaurants = match pull_restaurants(self.store.as_ref(), self.timeout).await {
            Ok(restaurants) => restaurants,
            Err(err) => {
                warn!(error = %err, "snapshot refresh failed; keeping previous snapshot");
                self.last_error.store(Some(Arc::new(err.to_string())));
                return Err(err);
            }
        };

        let published = self
            .cache
            .publish(Snapshot::new(self.clock.utc(), restaurants));
        self.last_error.store(None);
        info!(
            restaurants = published.len(),
            generated_at = %published.generated_at(),
            "restaurant snapshot published"
        );

        if let Err(err) = self.persistence.save(&published).await {
            warn!(error = %err, "failed to persist restaurant snapshot");
        }

        Ok(RefreshOutcome {
            restaurant_count: published.len(),
            generated_at: published.generated_at(),
        })
    }
}

/// Owner of the refresh flag; cheap to clone.
#[derive(Clone)]
pub struct RefreshScheduler {
    inner: Arc<RefreshInner>,
}

impl RefreshScheduler {
    pub fn new(
        store: Arc<dyn RecordStore>,
        cache: Arc<SnapshotCache>,
        persistence: Arc<dyn SnapshotStore>,
        clock: Arc<dyn Clock>,
        timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(RefreshInner {
                store,
                cache,
                persistence,
                clock,
                timeout,
                in_flight: AtomicBool::new(false),
                last_error: ArcSwapOption::empty(),
            }),
        }
    }

    pub fn cache(&self) -> &Arc<SnapshotCache> {
        &self.inner.cache
    }

    pub fn timeout(&self) -> Duration {
        self.inner.timeout
    }

    pub fn is_refreshing(&self) -> bool {
        self.inner.in_flight.load(Ordering::Acquire)
    }

    /// Start a refresh in the background unless one is already running.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn trigger_refresh(&self) -> RefreshTrigger {
        let Some(guard) = self.inner.acquire() else {
            debug!("refresh requested while another is in flight");
            return RefreshTrigger::AlreadyInProgress;
        };
        let trace_id = TraceId::current().unwrap_or_else(TraceId::generate);
        tokio::spawn(TraceId::scope(trace_id, async move {
            if let Err(err) = guard.0.run().await {
                debug!(error = %err, "background refresh left the previous snapshot in place");
            }
            drop(guard);
        }));
        RefreshTrigger::Accepted
    }

    /// Run a refresh on the current task and wait for it.
    pub async fn refresh_now(&self) -> Result<RefreshOutcome, RefreshError> {
        let guard = self.inner.acquire().ok_or(RefreshError::AlreadyInProgress)?;
        let outcome = guard.0.run().await;
        drop(guard);
        outcome
    }

    /// Publish the persisted snapshot, if any, so queries are warm before the
    /// first pull completes. Returns whether a snapshot was loaded.
    pub async fn warm_start(&self) -> bool {
        match self.inner.persistence.load().await {
            Ok(Some(snapshot)) => {
                info!(
                    restaurants = snapshot.len(),
                    generated_at = %snapshot.generated_at(),
                    "loaded persisted restaurant snapshot"
                );
                self.inner.cache.publish(snapshot);
                true
            }
            Ok(None) => false,
            Err(err) => {
                warn!(error = %err, "ignoring unreadable persisted snapshot");
                false
            }
        }
    }

    pub fn status(&self) -> RefreshStatus {
        let current = self.inner.cache.read();
        RefreshStatus {
            in_progress: self.is_refreshing(),
            generated_at: current.as_ref().map(|s| s.generated_at()),
            restaurant_count: current.as_ref().map(|s| s.len()),
            last_error: self.inner.last_error.load_full().map(|e| e.as_ref().clone()),
        }
    }

    /// Refresh every `interval` until `shutdown` flips to `true`.
    ///
    /// The first tick fires immediately. Ticks that land while a refresh is
    /// still running are skipped.
    pub fn spawn_periodic(
        &self,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let scheduler = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let trace_id = TraceId::generate();
                        let result = TraceId::scope(trace_id, scheduler.refresh_now()).await;
                        if let Err(RefreshError::AlreadyInProgress) = result {
                            debug!("periodic refresh skipped; another refresh is running");
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            debug!("periodic snapshot refresh stopped");
                            break;
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
#[path = "refresh_tests.rs"]
mod tests;
