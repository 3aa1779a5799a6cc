//! Restaurant reads and writes.
//!
//! Queries are answered from the published snapshot. Before the first
//! snapshot exists the service pulls the collection directly for that one
//! request. Single-restaurant reads and all writes go to the record store.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};
use utoipa::ToSchema;

use super::ports::RecordStore;
use super::query::{RestaurantMatch, RestaurantQuery};
use super::record::{Collection, Document, FieldPath, FieldUpdate, WriteOp};
use super::refresh::pull_restaurants;
use super::restaurant::{PLACE_ID_FIELD, PlaceId, Restaurant, RestaurantDraft, RestaurantPatch};
use super::{Error, SnapshotCache};

/// Where a query result was computed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum ResultSource {
    Snapshot,
    Store,
}

/// One restaurant in a query result.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RestaurantHit {
    #[serde(flatten)]
    pub restaurant: Restaurant,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_km: Option<f64>,
}

impl From<RestaurantMatch<'_>> for RestaurantHit {
    fn from(value: RestaurantMatch<'_>) -> Self {
        Self {
            restaurant: value.restaurant.clone(),
            distance_km: value.distance_km,
        }
    }
}

/// Query response including its provenance.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RestaurantResults {
    pub source: ResultSource,
    /// Time the snapshot was built; absent for direct store reads.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<DateTime<Utc>>,
    pub restaurants: Vec<RestaurantHit>,
}

fn invalid(err: impl std::fmt::Display) -> Error {
    Error::invalid_request(err.to_string())
}

pub(crate) fn parse_place_id(raw: &str) -> Result<PlaceId, Error> {
    PlaceId::new(raw).map_err(invalid)
}

#[derive(Clone)]
pub struct RestaurantCatalogueService {
    store: Arc<dyn RecordStore>,
    cache: Arc<SnapshotCache>,
    cold_start_timeout: Duration,
}

impl RestaurantCatalogueService {
    pub fn new(
        store: Arc<dyn RecordStore>,
        cache: Arc<SnapshotCache>,
        cold_start_timeout: Duration,
    ) -> Self {
        Self {
            store,
            cache,
            cold_start_timeout,
        }
    }

    /// Evaluate `query` against the snapshot, or the store on a cold start.
    pub async fn query(&self, query: &RestaurantQuery) -> Result<RestaurantResults, Error> {
        if let Some(snapshot) = self.cache.read() {
            let restaurants = query
                .apply(snapshot.restaurants())
                .into_iter()
                .map(RestaurantHit::from)
                .collect();
            return Ok(RestaurantResults {
                source: ResultSource::Snapshot,
                generated_at: Some(snapshot.generated_at()),
                restaurants,
            });
        }

        debug!("no snapshot published; querying the record store directly");
        let pulled = pull_restaurants(self.store.as_ref(), self.cold_start_timeout).await?;
        let restaurants = query
            .apply(&pulled)
            .into_iter()
            .map(RestaurantHit::from)
            .collect();
        Ok(RestaurantResults {
            source: ResultSource::Store,
            generated_at: None,
            restaurants,
        })
    }

    /// Authoritative read of one restaurant.
    pub async fn get(&self, place_id: &PlaceId) -> Result<Restaurant, Error> {
        self.find(place_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("restaurant {place_id} not found")))
    }

    pub(crate) async fn find(&self, place_id: &PlaceId) -> Result<Option<Restaurant>, Error> {
        let Some(document) = self
            .store
            .get(Collection::Restaurants, place_id.as_str())
            .await?
        else {
            return Ok(None);
        };
        Ok(Some(document.decode_with_id(PLACE_ID_FIELD)?))
    }

    pub async fn create(&self, draft: RestaurantDraft) -> Result<Restaurant, Error> {
        let restaurant = Restaurant::try_from(draft).map_err(invalid)?;
        let id = restaurant.place_id().as_str().to_owned();
        let document = Document::encode(id.clone(), &restaurant)?;
        self.store
            .batch(vec![
                WriteOp::Create(Collection::Restaurants, document),
                WriteOp::Update {
                    collection: Collection::Restaurants,
                    id,
                    updates: vec![
                        FieldUpdate::ServerTimestamp(FieldPath::new("createdAt")),
                        FieldUpdate::ServerTimestamp(FieldPath::new("updatedAt")),
                    ],
                    precondition: None,
                },
            ])
            .await?;
        info!(place_id = %restaurant.place_id(), "restaurant created");
        self.get(restaurant.place_id()).await
    }

    pub async fn update(&self, place_id: &PlaceId, patch: RestaurantPatch) -> Result<Restaurant, Error> {
        let updates = patch.into_updates().map_err(invalid)?;
        self.store
            .update(Collection::Restaurants, place_id.as_str(), updates, None)
            .await?;
        self.get(place_id).await
    }

    /// Remove a restaurant. Lists keep their references to it.
    pub async fn delete(&self, place_id: &PlaceId) -> Result<(), Error> {
        self.get(place_id).await?;
        self.store
            .delete(Collection::Restaurants, place_id.as_str())
            .await?;
        info!(place_id = %place_id, "restaurant deleted");
        Ok(())
    }
}
