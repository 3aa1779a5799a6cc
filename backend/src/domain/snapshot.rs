//! Immutable restaurant snapshots and the cache that publishes them.
//!
//! A [`Snapshot`] is the full materialisation of the restaurant collection
//! from exactly one pull. [`SnapshotCache`] holds the current snapshot behind
//! an atomically swapped pointer: readers clone an `Arc` and never observe a
//! snapshot while it is being built, and publishing never waits for readers.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::restaurant::{PlaceId, Restaurant};

/// Materialised restaurant collection plus the time the pull completed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    generated_at: DateTime<Utc>,
    restaurants: Vec<Restaurant>,
}

impl Snapshot {
    pub fn new(generated_at: DateTime<Utc>, restaurants: Vec<Restaurant>) -> Self {
        Self {
            generated_at,
            restaurants,
        }
    }

    pub fn generated_at(&self) -> DateTime<Utc> {
        self.generated_at
    }

    /// Restaurants in the order they were pulled.
    pub fn restaurants(&self) -> &[Restaurant] {
        &self.restaurants
    }

    pub fn len(&self) -> usize {
        self.restaurants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.restaurants.is_empty()
    }

    /// Linear lookup by identity.
    pub fn find(&self, place_id: &PlaceId) -> Option<&Restaurant> {
        self.restaurants.iter().find(|r| r.place_id() == place_id)
    }
}

/// Holder of the current [`Snapshot`], absent until the first publish.
///
/// # Examples
/// ```
/// use chrono::Utc;
/// use platelist::domain::{Snapshot, SnapshotCache};
///
/// let cache = SnapshotCache::default();
/// assert!(cache.read().is_none());
/// cache.publish(Snapshot::new(Utc::now(), Vec::new()));
/// assert!(cache.read().is_some());
/// ```
#[derive(Debug, Default)]
pub struct SnapshotCache {
    current: ArcSwapOption<Snapshot>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current snapshot, or `None` before any refresh has completed.
    pub fn read(&self) -> Option<Arc<Snapshot>> {
        self.current.load_full()
    }

    /// Replace the current snapshot in a single pointer swap.
    pub fn publish(&self, snapshot: Snapshot) -> Arc<Snapshot> {
        let published = Arc::new(snapshot);
        self.current.store(Some(Arc::clone(&published)));
        published
    }
}
