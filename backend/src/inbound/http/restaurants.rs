//! Restaurant catalogue handlers.
//!
//! ```text
//! GET    /api/v1/restaurants?search&cuisine&priceLevel&priceMin&priceMax&dietary&lat&lng&radiusKm&sort&limit
//! GET    /api/v1/restaurants/popular?limit
//! GET    /api/v1/restaurants/nearby?lat&lng&radiusKm
//! GET    /api/v1/restaurants/{placeId}
//! POST   /api/v1/restaurants
//! PATCH  /api/v1/restaurants/{placeId}
//! DELETE /api/v1/restaurants/{placeId}
//! ```
//!
//! Query endpoints read the published snapshot, falling back to a direct
//! store pull before the first refresh. Single-restaurant reads and all
//! writes go to the store.

use actix_web::{HttpResponse, delete, get, patch, post, web};
use serde::Deserialize;
use serde_json::json;
use utoipa::IntoParams;

use crate::domain::query::{NearbyQuery, QuerySort, QueryValidationError, RestaurantQuery};
use crate::domain::restaurant::{DietaryRequirement, MAX_PRICE_LEVEL, PriceLevel};
use crate::domain::{
    Error, Restaurant, RestaurantDraft, RestaurantPatch, RestaurantResults, parse_place_id,
};
use crate::inbound::http::ApiResult;
use crate::inbound::http::session::SessionContext;
use crate::inbound::http::state::HttpState;

/// Default result count for `GET /restaurants/popular`.
pub const DEFAULT_POPULAR_LIMIT: usize = 20;

/// Default radius for `GET /restaurants/nearby` when none is given.
pub const DEFAULT_NEARBY_RADIUS_KM: f64 = 5.0;

/// Query-string filters for `GET /restaurants`. Every supplied filter must
/// hold for a restaurant to be returned.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct RestaurantQueryParams {
    /// Case-insensitive substring of the name or any tag.
    pub search: Option<String>,
    /// Exact tag, e.g. `vietnamese`.
    pub cuisine: Option<String>,
    /// Single price level (0-4). Excludes `priceMin`/`priceMax`.
    pub price_level: Option<u8>,
    pub price_min: Option<u8>,
    pub price_max: Option<u8>,
    /// Comma-separated requirements, e.g. `vegan,glutenFree`.
    pub dietary: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub radius_km: Option<f64>,
    pub sort: Option<QuerySort>,
    pub limit: Option<usize>,
}

fn invalid_param(field: &str, message: impl Into<String>) -> Error {
    Error::invalid_request(message).with_details(json!({ "field": field }))
}

fn map_query_error(err: &QueryValidationError) -> Error {
    let field = match err {
        QueryValidationError::Latitude { .. } => "lat",
        QueryValidationError::Longitude { .. } => "lng",
        QueryValidationError::Radius { .. } => "radiusKm",
        QueryValidationError::ZeroLimit => "limit",
    };
    invalid_param(field, err.to_string())
}

fn parse_limit(limit: Option<usize>) -> Result<Option<usize>, Error> {
    match limit {
        Some(0) => Err(map_query_error(&QueryValidationError::ZeroLimit)),
        other => Ok(other),
    }
}

fn parse_price(
    level: Option<u8>,
    min: Option<u8>,
    max: Option<u8>,
) -> Result<Option<PriceLevel>, Error> {
    let price = match (level, min, max) {
        (None, None, None) => return Ok(None),
        (Some(level), None, None) => PriceLevel::exact(level),
        (Some(_), _, _) => {
            return Err(invalid_param(
                "priceLevel",
                "use either priceLevel or priceMin/priceMax",
            ));
        }
        (None, min, max) => PriceLevel::range(min.unwrap_or(0), max.unwrap_or(MAX_PRICE_LEVEL)),
    };
    price
        .map(Some)
        .map_err(|err| invalid_param("priceLevel", err.to_string()))
}

fn parse_dietary(raw: &str) -> Result<Vec<DietaryRequirement>, Error> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| {
            item.parse::<DietaryRequirement>()
                .map_err(|err| invalid_param("dietary", err.to_string()))
        })
        .collect()
}

fn parse_near(
    lat: Option<f64>,
    lng: Option<f64>,
    radius_km: Option<f64>,
    default_radius: Option<f64>,
) -> Result<Option<NearbyQuery>, Error> {
    let radius_km = radius_km.or(default_radius);
    match (lat, lng, radius_km) {
        (None, None, None) => Ok(None),
        (Some(lat), Some(lng), Some(radius)) => NearbyQuery::new(lat, lng, radius)
            .map(Some)
            .map_err(|err| map_query_error(&err)),
        _ => Err(invalid_param(
            "lat",
            "lat, lng and radiusKm must be supplied together",
        )),
    }
}

impl RestaurantQueryParams {
    /// Validate the parameters into a [`RestaurantQuery`].
    ///
    /// # Errors
    ///
    /// `invalid_request` naming the offending parameter.
    pub fn into_query(self) -> Result<RestaurantQuery, Error> {
        let mut query = RestaurantQuery::default();
        if let Some(search) = self.search {
            query = query.with_search(search);
        }
        if let Some(cuisine) = self.cuisine {
            query = query.with_cuisine(cuisine);
        }
        if let Some(price) = parse_price(self.price_level, self.price_min, self.price_max)? {
            query = query.with_price(price);
        }
        for requirement in parse_dietary(self.dietary.as_deref().unwrap_or_default())? {
            query = query.with_dietary(requirement);
        }
        if let Some(near) = parse_near(self.lat, self.lng, self.radius_km, None)? {
            query = query.with_near(near);
        }
        if let Some(sort) = self.sort {
            query = query.with_sort(sort);
        }
        if let Some(limit) = parse_limit(self.limit)? {
            query = query.with_limit(limit);
        }
        Ok(query)
    }
}

/// Parameters for `GET /restaurants/popular`.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PopularParams {
    /// Defaults to 20.
    pub limit: Option<usize>,
}

/// Parameters for `GET /restaurants/nearby`.
#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct NearbyParams {
    pub lat: f64,
    pub lng: f64,
    /// Defaults to 5 km. Restaurants exactly on the boundary are included.
    pub radius_km: Option<f64>,
    pub limit: Option<usize>,
}

/// Search and filter restaurants.
#[utoipa::path(
    get,
    path = "/api/v1/restaurants",
    params(RestaurantQueryParams),
    responses(
        (status = 200, description = "Matching restaurants", body = RestaurantResults),
        (status = 400, description = "Invalid query", body = Error),
        (status = 503, description = "Store unavailable during a cold start", body = Error)
    ),
    tags = ["restaurants"],
    operation_id = "queryRestaurants",
    security([])
)]
#[get("/restaurants")]
pub async fn query_restaurants(
    state: web::Data<HttpState>,
    params: web::Query<RestaurantQueryParams>,
) -> ApiResult<web::Json<RestaurantResults>> {
    let query = params.into_inner().into_query()?;
    Ok(web::Json(state.catalogue.query(&query).await?))
}

/// Highest rated restaurants; ties broken by review count then place id.
#[utoipa::path(
    get,
    path = "/api/v1/restaurants/popular",
    params(PopularParams),
    responses(
        (status = 200, description = "Popular restaurants", body = RestaurantResults),
        (status = 400, description = "Invalid limit", body = Error)
    ),
    tags = ["restaurants"],
    operation_id = "popularRestaurants",
    security([])
)]
#[get("/restaurants/popular")]
pub async fn popular_restaurants(
    state: web::Data<HttpState>,
    params: web::Query<PopularParams>,
) -> ApiResult<web::Json<RestaurantResults>> {
    let limit = parse_limit(params.limit)?.unwrap_or(DEFAULT_POPULAR_LIMIT);
    let query = RestaurantQuery::popular(limit);
    Ok(web::Json(state.catalogue.query(&query).await?))
}

/// Restaurants within a great-circle radius, nearest first.
#[utoipa::path(
    get,
    path = "/api/v1/restaurants/nearby",
    params(NearbyParams),
    responses(
        (status = 200, description = "Nearby restaurants with distances", body = RestaurantResults),
        (status = 400, description = "Invalid coordinates or radius", body = Error)
    ),
    tags = ["restaurants"],
    operation_id = "nearbyRestaurants",
    security([])
)]
#[get("/restaurants/nearby")]
pub async fn nearby_restaurants(
    state: web::Data<HttpState>,
    params: web::Query<NearbyParams>,
) -> ApiResult<web::Json<RestaurantResults>> {
    let NearbyParams {
        lat,
        lng,
        radius_km,
        limit,
    } = params.into_inner();
    let mut query = RestaurantQuery::default().with_sort(QuerySort::Distance);
    if let Some(near) = parse_near(Some(lat), Some(lng), radius_km, Some(DEFAULT_NEARBY_RADIUS_KM))? {
        query = query.with_near(near);
    }
    if let Some(limit) = parse_limit(limit)? {
        query = query.with_limit(limit);
    }
    Ok(web::Json(state.catalogue.query(&query).await?))
}

/// Authoritative read of one restaurant.
#[utoipa::path(
    get,
    path = "/api/v1/restaurants/{placeId}",
    params(("placeId" = String, Path, description = "Google place id")),
    responses(
        (status = 200, description = "Restaurant", body = Restaurant),
        (status = 404, description = "Unknown restaurant", body = Error)
    ),
    tags = ["restaurants"],
    operation_id = "getRestaurant",
    security([])
)]
#[get("/restaurants/{place_id}")]
pub async fn get_restaurant(
    state: web::Data<HttpState>,
    path: web::Path<String>,
) -> ApiResult<web::Json<Restaurant>> {
    let place_id = parse_place_id(&path.into_inner())?;
    Ok(web::Json(state.catalogue.get(&place_id).await?))
}

/// Add a restaurant. Visible to queries after the next snapshot refresh.
#[utoipa::path(
    post,
    path = "/api/v1/restaurants",
    request_body = RestaurantDraft,
    responses(
        (status = 201, description = "Created", body = Restaurant),
        (status = 400, description = "Invalid restaurant", body = Error),
        (status = 401, description = "Login required", body = Error),
        (status = 409, description = "Place id already exists", body = Error)
    ),
    tags = ["restaurants"],
    operation_id = "createRestaurant"
)]
#[post("/restaurants")]
pub async fn create_restaurant(
    state: web::Data<HttpState>,
    session: SessionContext,
    payload: web::Json<RestaurantDraft>,
) -> ApiResult<HttpResponse> {
    session.require_username()?;
    let restaurant = state.catalogue.create(payload.into_inner()).await?;
    Ok(HttpResponse::Created().json(restaurant))
}

/// Update selected restaurant fields.
#[utoipa::path(
    patch,
    path = "/api/v1/restaurants/{placeId}",
    params(("placeId" = String, Path, description = "Google place id")),
    request_body = RestaurantPatch,
    responses(
        (status = 200, description = "Updated restaurant", body = Restaurant),
        (status = 400, description = "Invalid patch", body = Error),
        (status = 401, description = "Login required", body = Error),
        (status = 404, description = "Unknown restaurant", body = Error)
    ),
    tags = ["restaurants"],
    operation_id = "updateRestaurant"
)]
#[patch("/restaurants/{place_id}")]
pub async fn update_restaurant(
    state: web::Data<HttpState>,
    session: SessionContext,
    path: web::Path<String>,
    payload: web::Json<RestaurantPatch>,
) -> ApiResult<web::Json<Restaurant>> {
    session.require_username()?;
    let place_id = parse_place_id(&path.into_inner())?;
    let restaurant = state
        .catalogue
        .update(&place_id, payload.into_inner())
        .await?;
    Ok(web::Json(restaurant))
}

/// Remove a restaurant. Lists keep the id and skip it when resolved.
#[utoipa::path(
    delete,
    path = "/api/v1/restaurants/{placeId}",
    params(("placeId" = String, Path, description = "Google place id")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 401, description = "Login required", body = Error),
        (status = 404, description = "Unknown restaurant", body = Error)
    ),
    tags = ["restaurants"],
    operation_id = "deleteRestaurant"
)]
#[delete("/restaurants/{place_id}")]
pub async fn delete_restaurant(
    state: web::Data<HttpState>,
    session: SessionContext,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    session.require_username()?;
    let place_id = parse_place_id(&path.into_inner())?;
    state.catalogue.delete(&place_id).await?;
    Ok(HttpResponse::NoContent().finish())
}
