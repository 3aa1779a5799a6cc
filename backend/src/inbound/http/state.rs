//! Shared HTTP adapter state.
//!
//! Handlers receive this bundle through `web::Data`. Every service talks to
//! the same record store and snapshot cache.

use std::sync::Arc;
use std::time::Duration;

use mockable::Clock;

use crate::domain::ports::{RecordStore, SnapshotStore};
use crate::domain::{
    AchievementService, ListService, RefreshScheduler, RestaurantCatalogueService, ReviewService,
    SnapshotCache, UserService,
};

/// Port implementations and settings the services are built from.
pub struct HttpStatePorts {
    pub store: Arc<dyn RecordStore>,
    pub snapshot_store: Arc<dyn SnapshotStore>,
    pub clock: Arc<dyn Clock>,
    /// Upper bound for a snapshot pull, also applied to cold-start reads.
    pub refresh_timeout: Duration,
    /// Token expected in `X-Admin-Token`; `None` disables admin routes.
    pub admin_token: Option<String>,
}

/// Dependency bundle for HTTP handlers.
#[derive(Clone)]
pub struct HttpState {
    pub catalogue: RestaurantCatalogueService,
    pub users: UserService,
    pub lists: ListService,
    pub reviews: ReviewService,
    pub achievements: AchievementService,
    pub refresh: RefreshScheduler,
    pub admin_token: Option<Arc<str>>,
}

impl HttpState {
    /// Wire the services around one store and one snapshot cache.
    ///
    /// # Examples
    /// ```
    /// use std::sync::Arc;
    /// use std::time::Duration;
    ///
    /// use platelist::domain::ports::FixtureSnapshotStore;
    /// use platelist::inbound::http::state::{HttpState, HttpStatePorts};
    /// use platelist::outbound::memory::InMemoryRecordStore;
    ///
    /// let state = HttpState::new(HttpStatePorts {
    ///     store: Arc::new(InMemoryRecordStore::default()),
    ///     snapshot_store: Arc::new(FixtureSnapshotStore),
    ///     clock: Arc::new(mockable::DefaultClock),
    ///     refresh_timeout: Duration::from_secs(30),
    ///     admin_token: None,
    /// });
    /// assert!(state.refresh.cache().read().is_none());
    /// ```
    pub fn new(ports: HttpStatePorts) -> Self {
        let HttpStatePorts {
            store,
            snapshot_store,
            clock,
            refresh_timeout,
            admin_token,
        } = ports;
        let cache = Arc::new(SnapshotCache::new());
        let achievements = AchievementService::new(Arc::clone(&store));
        Self {
            catalogue: RestaurantCatalogueService::new(
                Arc::clone(&store),
                Arc::clone(&cache),
                refresh_timeout,
            ),
            users: UserService::new(Arc::clone(&store)),
            lists: ListService::new(Arc::clone(&store), achievements.clone()),
            reviews: ReviewService::new(Arc::clone(&store), achievements.clone()),
            achievements,
            refresh: RefreshScheduler::new(store, cache, snapshot_store, clock, refresh_timeout),
            admin_token: admin_token
                .filter(|token| !token.is_empty())
                .map(Arc::from),
        }
    }

    pub fn snapshot_cache(&self) -> &Arc<SnapshotCache> {
        self.refresh.cache()
    }
}
