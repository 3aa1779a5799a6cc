//! Restaurant records and their value objects.
//!
//! A [`Restaurant`] is only ever constructed through [`RestaurantDraft`]
//! validation, including when decoded from the record store, so the query
//! engine can rely on coordinates, ratings and tags being well formed.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use utoipa::ToSchema;

use super::record::{FieldPath, FieldUpdate};

/// Document field holding the restaurant identity.
pub const PLACE_ID_FIELD: &str = "placeId";

const MAX_PLACE_ID_LEN: usize = 128;
const MAX_NAME_LEN: usize = 200;
/// Highest price level accepted (four price symbols).
pub const MAX_PRICE_LEVEL: u8 = 4;

/// Validation errors returned when building restaurants.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RestaurantValidationError {
    #[error("place id must not be empty")]
    EmptyPlaceId,
    #[error("place id must be at most {max} characters")]
    PlaceIdTooLong { max: usize },
    #[error("place id must not contain whitespace, '/' or control characters")]
    InvalidPlaceId,
    #[error("restaurant name must not be empty")]
    EmptyName,
    #[error("restaurant name must be at most {max} characters")]
    NameTooLong { max: usize },
    #[error("rating {rating} must be between 0 and 5")]
    RatingOutOfRange { rating: f64 },
    #[error("latitude {latitude} must be between -90 and 90")]
    LatitudeOutOfRange { latitude: f64 },
    #[error("longitude {longitude} must be between -180 and 180")]
    LongitudeOutOfRange { longitude: f64 },
    #[error("price level {level} must be at most {max}", max = MAX_PRICE_LEVEL)]
    PriceLevelOutOfRange { level: u8 },
    #[error("price range minimum {min} exceeds maximum {max}")]
    InvertedPriceRange { min: u8, max: u8 },
    #[error("unknown dietary option {value}")]
    UnknownDietaryOption { value: String },
}

/// Externally assigned, stable restaurant identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PlaceId(String);

impl PlaceId {
    pub fn new(raw: impl Into<String>) -> Result<Self, RestaurantValidationError> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(RestaurantValidationError::EmptyPlaceId);
        }
        if raw.chars().count() > MAX_PLACE_ID_LEN {
            return Err(RestaurantValidationError::PlaceIdTooLong {
                max: MAX_PLACE_ID_LEN,
            });
        }
        if raw
            .chars()
            .any(|c| c.is_whitespace() || c.is_control() || c == '/')
        {
            return Err(RestaurantValidationError::InvalidPlaceId);
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for PlaceId {
    type Error = RestaurantValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PlaceId> for String {
    fn from(value: PlaceId) -> Self {
        value.0
    }
}

impl AsRef<str> for PlaceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// WGS84 coordinates with an optional free-text address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl Location {
    /// Check both coordinates are finite and in range.
    pub fn validate(&self) -> Result<(), RestaurantValidationError> {
        if !self.latitude.is_finite() || !(-90.0..=90.0).contains(&self.latitude) {
            return Err(RestaurantValidationError::LatitudeOutOfRange {
                latitude: self.latitude,
            });
        }
        if !self.longitude.is_finite() || !(-180.0..=180.0).contains(&self.longitude) {
            return Err(RestaurantValidationError::LongitudeOutOfRange {
                longitude: self.longitude,
            });
        }
        Ok(())
    }
}

/// Inclusive price band. A single level is stored as `min == max` and
/// serialised as a bare integer; a band serialises as `{ "min", "max" }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(try_from = "PriceLevelRepr", into = "PriceLevelRepr")]
pub struct PriceLevel {
    min: u8,
    max: u8,
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum PriceLevelRepr {
    Single(u8),
    Range { min: u8, max: u8 },
}

impl PriceLevel {
    /// Single price level.
    pub fn exact(level: u8) -> Result<Self, RestaurantValidationError> {
        Self::range(level, level)
    }

    /// Inclusive range of price levels.
    pub fn range(min: u8, max: u8) -> Result<Self, RestaurantValidationError> {
        for level in [min, max] {
            if level > MAX_PRICE_LEVEL {
                return Err(RestaurantValidationError::PriceLevelOutOfRange { level });
            }
        }
        if min > max {
            return Err(RestaurantValidationError::InvertedPriceRange { min, max });
        }
        Ok(Self { min, max })
    }

    pub fn min(self) -> u8 {
        self.min
    }

    pub fn max(self) -> u8 {
        self.max
    }

    /// Whether two bands share at least one level.
    pub fn overlaps(self, other: Self) -> bool {
        self.min <= other.max && other.min <= self.max
    }
}

impl TryFrom<PriceLevelRepr> for PriceLevel {
    type Error = RestaurantValidationError;

    fn try_from(value: PriceLevelRepr) -> Result<Self, Self::Error> {
        match value {
            PriceLevelRepr::Single(level) => Self::exact(level),
            PriceLevelRepr::Range { min, max } => Self::range(min, max),
        }
    }
}

impl From<PriceLevel> for PriceLevelRepr {
    fn from(value: PriceLevel) -> Self {
        if value.min == value.max {
            Self::Single(value.min)
        } else {
            Self::Range {
                min: value.min,
                max: value.max,
            }
        }
    }
}

/// Optional contact channels.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
}

/// Dietary accommodations advertised by a restaurant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct DietaryOptions {
    pub vegetarian: bool,
    pub vegan: bool,
    pub gluten_free: bool,
    pub halal: bool,
    pub kosher: bool,
}

/// Single dietary requirement used by the dietary filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum DietaryRequirement {
    Vegetarian,
    Vegan,
    GlutenFree,
    Halal,
    Kosher,
}

impl DietaryOptions {
    pub fn satisfies(self, requirement: DietaryRequirement) -> bool {
        match requirement {
            DietaryRequirement::Vegetarian => self.vegetarian,
            DietaryRequirement::Vegan => self.vegan,
            DietaryRequirement::GlutenFree => self.gluten_free,
            DietaryRequirement::Halal => self.halal,
            DietaryRequirement::Kosher => self.kosher,
        }
    }
}

impl FromStr for DietaryRequirement {
    type Err = RestaurantValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace(['_', '-'], "").as_str() {
            "vegetarian" => Ok(Self::Vegetarian),
            "vegan" => Ok(Self::Vegan),
            "glutenfree" => Ok(Self::GlutenFree),
            "halal" => Ok(Self::Halal),
            "kosher" => Ok(Self::Kosher),
            _ => Err(RestaurantValidationError::UnknownDietaryOption {
                value: s.to_owned(),
            }),
        }
    }
}

/// Unvalidated restaurant payload as received from clients, the importer or
/// the record store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RestaurantDraft {
    pub place_id: String,
    pub name: String,
    #[serde(default)]
    pub rating: f64,
    #[serde(default)]
    pub user_ratings_total: u32,
    #[serde(default)]
    pub address: String,
    pub location: Location,
    #[serde(default)]
    pub price_level: Option<PriceLevel>,
    #[serde(default)]
    pub types: Vec<String>,
    #[serde(default)]
    pub contact: Option<Contact>,
    #[serde(default)]
    pub dietary: DietaryOptions,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Validated restaurant record.
///
/// ## Invariants
/// - `rating` is within `0.0..=5.0`.
/// - `location` coordinates are finite and in range.
/// - `types` are trimmed, lower-cased, non-empty and unique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", try_from = "RestaurantDraft")]
pub struct Restaurant {
    #[schema(value_type = String)]
    place_id: PlaceId,
    name: String,
    rating: f64,
    user_ratings_total: u32,
    address: String,
    location: Location,
    #[serde(skip_serializing_if = "Option::is_none")]
    price_level: Option<PriceLevel>,
    types: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    contact: Option<Contact>,
    dietary: DietaryOptions,
    #[serde(skip_serializing_if = "Option::is_none")]
    created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    updated_at: Option<DateTime<Utc>>,
}

fn validate_name(name: &str) -> Result<String, RestaurantValidationError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(RestaurantValidationError::EmptyName);
    }
    if trimmed.chars().count() > MAX_NAME_LEN {
        return Err(RestaurantValidationError::NameTooLong { max: MAX_NAME_LEN });
    }
    Ok(trimmed.to_owned())
}

fn validate_rating(rating: f64) -> Result<f64, RestaurantValidationError> {
    if !rating.is_finite() || !(0.0..=5.0).contains(&rating) {
        return Err(RestaurantValidationError::RatingOutOfRange { rating });
    }
    Ok(rating)
}

/// Lower-case, trim and de-duplicate tags, keeping first-seen order.
pub fn normalise_types<I, S>(types: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut normalised: Vec<String> = Vec::new();
    for tag in types {
        let tag = tag.as_ref().trim().to_lowercase();
        if !tag.is_empty() && !normalised.contains(&tag) {
            normalised.push(tag);
        }
    }
    normalised
}

impl TryFrom<RestaurantDraft> for Restaurant {
    type Error = RestaurantValidationError;

    fn try_from(draft: RestaurantDraft) -> Result<Self, Self::Error> {
        let RestaurantDraft {
            place_id,
            name,
            rating,
            user_ratings_total,
            address,
            location,
            price_level,
            types,
            contact,
            dietary,
            created_at,
            updated_at,
        } = draft;
        location.validate()?;
        Ok(Self {
            place_id: PlaceId::new(place_id)?,
            name: validate_name(&name)?,
            rating: validate_rating(rating)?,
            user_ratings_total,
            address: address.trim().to_owned(),
            location,
            price_level,
            types: normalise_types(types),
            contact,
            dietary,
            created_at,
            updated_at,
        })
    }
}

impl Restaurant {
    pub fn place_id(&self) -> &PlaceId {
        &self.place_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rating(&self) -> f64 {
        self.rating
    }

    pub fn user_ratings_total(&self) -> u32 {
        self.user_ratings_total
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn price_level(&self) -> Option<PriceLevel> {
        self.price_level
    }

    /// Normalised category tags.
    pub fn types(&self) -> &[String] {
        &self.types
    }

    pub fn contact(&self) -> Option<&Contact> {
        self.contact.as_ref()
    }

    pub fn dietary(&self) -> DietaryOptions {
        self.dietary
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }
}

/// Partial update accepted by `PATCH /restaurants/{placeId}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RestaurantPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub user_ratings_total: Option<u32>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub location: Option<Location>,
    #[serde(default)]
    pub price_level: Option<PriceLevel>,
    #[serde(default)]
    pub types: Option<Vec<String>>,
    #[serde(default)]
    pub contact: Option<Contact>,
    #[serde(default)]
    pub dietary: Option<DietaryOptions>,
}

impl RestaurantPatch {
    /// Validate the patch and translate it into store updates. The result
    /// always stamps `updatedAt`.
    pub fn into_updates(self) -> Result<Vec<FieldUpdate>, RestaurantValidationError> {
        let Self {
            name,
            rating,
            user_ratings_total,
            address,
            location,
            price_level,
            types,
            contact,
            dietary,
        } = self;
        let mut updates = Vec::new();
        let mut set = |field: &str, value: Value| {
            updates.push(FieldUpdate::Set(FieldPath::new(field), value));
        };
        if let Some(name) = name {
            set("name", json!(validate_name(&name)?));
        }
        if let Some(rating) = rating {
            set("rating", json!(validate_rating(rating)?));
        }
        if let Some(total) = user_ratings_total {
            set("userRatingsTotal", json!(total));
        }
        if let Some(address) = address {
            set("address", json!(address.trim()));
        }
        if let Some(location) = location {
            location.validate()?;
            set("location", json!(location));
        }
        if let Some(price_level) = price_level {
            set("priceLevel", json!(price_level));
        }
        if let Some(types) = types {
            set("types", json!(normalise_types(types)));
        }
        if let Some(contact) = contact {
            set("contact", json!(contact));
        }
        if let Some(dietary) = dietary {
            set("dietary", json!(dietary));
        }
        updates.push(FieldUpdate::ServerTimestamp(FieldPath::new("updatedAt")));
        Ok(updates)
    }
}
