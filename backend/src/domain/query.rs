//! Read-only restaurant query engine.
//!
//! Every predicate is a pure function over one [`Restaurant`], so a
//! [`RestaurantQuery`] evaluates them as a logical AND in a single scan and
//! the order in which filters are specified never changes the result.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::restaurant::{DietaryRequirement, PriceLevel, Restaurant};

/// Mean Earth radius used by the haversine formula.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Validation errors for query parameters.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum QueryValidationError {
    #[error("latitude {latitude} must be between -90 and 90")]
    Latitude { latitude: f64 },
    #[error("longitude {longitude} must be between -180 and 180")]
    Longitude { longitude: f64 },
    #[error("radius {radius_km} km must be a non-negative number")]
    Radius { radius_km: f64 },
    #[error("limit must be greater than zero")]
    ZeroLimit,
}

/// Great-circle distance between two coordinates in kilometres.
///
/// # Examples
/// ```
/// use platelist::domain::query::haversine_km;
///
/// let d = haversine_km(0.0, 0.0, 0.0, 1.0);
/// assert!((d - 111.195).abs() < 0.01);
/// ```
pub fn haversine_km(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let half_dlat = (lat2 - lat1).to_radians() / 2.0;
    let half_dlng = (lng2 - lng1).to_radians() / 2.0;
    let a = half_dlat.sin().powi(2) + phi1.cos() * phi2.cos() * half_dlng.sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().min(1.0).asin()
}

/// Centre and radius for geographic queries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NearbyQuery {
    latitude: f64,
    longitude: f64,
    radius_km: f64,
}

impl NearbyQuery {
    pub fn new(latitude: f64, longitude: f64, radius_km: f64) -> Result<Self, QueryValidationError> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(QueryValidationError::Latitude { latitude });
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(QueryValidationError::Longitude { longitude });
        }
        if !radius_km.is_finite() || radius_km < 0.0 {
            return Err(QueryValidationError::Radius { radius_km });
        }
        Ok(Self {
            latitude,
            longitude,
            radius_km,
        })
    }

    pub fn radius_km(&self) -> f64 {
        self.radius_km
    }

    /// Distance from the centre to the restaurant.
    pub fn distance_to(&self, restaurant: &Restaurant) -> f64 {
        let location = restaurant.location();
        haversine_km(
            self.latitude,
            self.longitude,
            location.latitude,
            location.longitude,
        )
    }

    /// Distance when the restaurant lies within the radius (inclusive).
    pub fn within(&self, restaurant: &Restaurant) -> Option<f64> {
        let distance = self.distance_to(restaurant);
        (distance <= self.radius_km).then_some(distance)
    }
}

/// Case-insensitive substring match against the name or any tag.
/// `needle` must already be lower-cased.
fn matches_search(restaurant: &Restaurant, needle: &str) -> bool {
    needle.is_empty()
        || restaurant.name().to_lowercase().contains(needle)
        || restaurant.types().iter().any(|tag| tag.contains(needle))
}

fn matches_cuisine(restaurant: &Restaurant, tag: &str) -> bool {
    restaurant.types().iter().any(|t| t == tag)
}

/// A restaurant without a price level never matches a price filter.
fn matches_price(restaurant: &Restaurant, wanted: PriceLevel) -> bool {
    restaurant
        .price_level()
        .is_some_and(|level| level.overlaps(wanted))
}

/// Ordering for popularity: rating descending, review count descending, then
/// `place_id` ascending so equal pairs have a deterministic order.
pub fn compare_popularity(a: &Restaurant, b: &Restaurant) -> Ordering {
    b.rating()
        .total_cmp(&a.rating())
        .then_with(|| b.user_ratings_total().cmp(&a.user_ratings_total()))
        .then_with(|| a.place_id().cmp(b.place_id()))
}

/// Restaurants whose name or tags contain `text`, ignoring case.
pub fn search<'a>(restaurants: &'a [Restaurant], text: &str) -> Vec<&'a Restaurant> {
    let needle = text.trim().to_lowercase();
    restaurants
        .iter()
        .filter(|r| matches_search(r, &needle))
        .collect()
}

/// Restaurants tagged with `tag` (case-insensitive, exact tag match).
pub fn filter_by_cuisine<'a>(restaurants: &'a [Restaurant], tag: &str) -> Vec<&'a Restaurant> {
    let tag = tag.trim().to_lowercase();
    restaurants
        .iter()
        .filter(|r| matches_cuisine(r, &tag))
        .collect()
}

/// Restaurants whose price band overlaps `level`.
pub fn filter_by_price_level(restaurants: &[Restaurant], level: PriceLevel) -> Vec<&Restaurant> {
    restaurants
        .iter()
        .filter(|r| matches_price(r, level))
        .collect()
}

/// Restaurants satisfying a dietary requirement.
pub fn filter_by_dietary(
    restaurants: &[Restaurant],
    requirement: DietaryRequirement,
) -> Vec<&Restaurant> {
    restaurants
        .iter()
        .filter(|r| r.dietary().satisfies(requirement))
        .collect()
}

/// Restaurants within the radius, nearest first.
pub fn nearby<'a>(restaurants: &'a [Restaurant], centre: &NearbyQuery) -> Vec<RestaurantMatch<'a>> {
    let mut matches: Vec<_> = restaurants
        .iter()
        .filter_map(|restaurant| {
            centre.within(restaurant).map(|distance| RestaurantMatch {
                restaurant,
                distance_km: Some(distance),
            })
        })
        .collect();
    matches.sort_by(compare_distance);
    matches
}

/// At most `limit` restaurants ordered by [`compare_popularity`].
pub fn popular(restaurants: &[Restaurant], limit: usize) -> Vec<&Restaurant> {
    let mut ranked: Vec<&Restaurant> = restaurants.iter().collect();
    ranked.sort_by(|a, b| compare_popularity(a, b));
    ranked.truncate(limit);
    ranked
}

fn compare_distance(a: &RestaurantMatch<'_>, b: &RestaurantMatch<'_>) -> Ordering {
    let left = a.distance_km.unwrap_or(f64::INFINITY);
    let right = b.distance_km.unwrap_or(f64::INFINITY);
    left.total_cmp(&right)
        .then_with(|| a.restaurant.place_id().cmp(b.restaurant.place_id()))
}

/// Result ordering for [`RestaurantQuery`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum QuerySort {
    /// Snapshot order, or distance when a geographic filter is present.
    #[default]
    Default,
    Popular,
    Distance,
}

/// A restaurant selected by a query, with its distance when a geographic
/// filter applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RestaurantMatch<'a> {
    pub restaurant: &'a Restaurant,
    pub distance_km: Option<f64>,
}

/// Composable set of filters evaluated in one pass.
///
/// # Examples
/// ```
/// use platelist::domain::query::RestaurantQuery;
///
/// let query = RestaurantQuery::default()
///     .with_search("pho")
///     .with_cuisine("vietnamese")
///     .with_limit(10);
/// assert!(query.apply(&[]).is_empty());
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RestaurantQuery {
    search: Option<String>,
    cuisine: Option<String>,
    price: Option<PriceLevel>,
    dietary: Vec<DietaryRequirement>,
    near: Option<NearbyQuery>,
    sort: QuerySort,
    limit: Option<usize>,
}

impl RestaurantQuery {
    #[must_use]
    pub fn with_search(mut self, text: impl AsRef<str>) -> Self {
        let needle = text.as_ref().trim().to_lowercase();
        self.search = (!needle.is_empty()).then_some(needle);
        self
    }

    #[must_use]
    pub fn with_cuisine(mut self, tag: impl AsRef<str>) -> Self {
        let tag = tag.as_ref().trim().to_lowercase();
        self.cuisine = (!tag.is_empty()).then_some(tag);
        self
    }

    #[must_use]
    pub fn with_price(mut self, level: PriceLevel) -> Self {
        self.price = Some(level);
        self
    }

    #[must_use]
    pub fn with_dietary(mut self, requirement: DietaryRequirement) -> Self {
        if !self.dietary.contains(&requirement) {
            self.dietary.push(requirement);
        }
        self
    }

    #[must_use]
    pub fn with_near(mut self, near: NearbyQuery) -> Self {
        self.near = Some(near);
        self
    }

    #[must_use]
    pub fn with_sort(mut self, sort: QuerySort) -> Self {
        self.sort = sort;
        self
    }

    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Popularity ranking limited to `limit` results.
    pub fn popular(limit: usize) -> Self {
        Self::default().with_sort(QuerySort::Popular).with_limit(limit)
    }

    /// Whether every configured predicate accepts the restaurant. Returns the
    /// distance from the query centre when a geographic filter applies.
    pub fn evaluate(&self, restaurant: &Restaurant) -> Option<Option<f64>> {
        if self
            .search
            .as_deref()
            .is_some_and(|needle| !matches_search(restaurant, needle))
        {
            return None;
        }
        if self
            .cuisine
            .as_deref()
            .is_some_and(|tag| !matches_cuisine(restaurant, tag))
        {
            return None;
        }
        if self
            .price
            .is_some_and(|level| !matches_price(restaurant, level))
        {
            return None;
        }
        if !self
            .dietary
            .iter()
            .all(|requirement| restaurant.dietary().satisfies(*requirement))
        {
            return None;
        }
        match &self.near {
            Some(near) => near.within(restaurant).map(Some),
            None => Some(None),
        }
    }

    pub fn matches(&self, restaurant: &Restaurant) -> bool {
        self.evaluate(restaurant).is_some()
    }

    /// Run the query over `restaurants`.
    pub fn apply<'a>(&self, restaurants: &'a [Restaurant]) -> Vec<RestaurantMatch<'a>> {
        let mut matches: Vec<RestaurantMatch<'a>> = restaurants
            .iter()
            .filter_map(|restaurant| {
                self.evaluate(restaurant)
                    .map(|distance_km| RestaurantMatch {
                        restaurant,
                        distance_km,
                    })
            })
            .collect();
        match self.sort {
            QuerySort::Popular => matches.sort_by(|a, b| compare_popularity(a.restaurant, b.restaurant)),
            QuerySort::Distance => matches.sort_by(compare_distance),
            QuerySort::Default if self.near.is_some() => matches.sort_by(compare_distance),
            QuerySort::Default => {}
        }
        if let Some(limit) = self.limit {
            matches.truncate(limit);
        }
        matches
    }
}
