//! Restaurant reviews.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::restaurant::PlaceId;
use super::user::Username;

pub const REVIEW_ID_FIELD: &str = "reviewId";
pub const REVIEW_PLACE_FIELD: &str = "placeId";

const TEXT_MAX: usize = 2000;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReviewValidationError {
    #[error("review rating {rating} must be between 1 and 5")]
    RatingOutOfRange { rating: u8 },
    #[error("review text must be at most {max} characters", max = TEXT_MAX)]
    TextTooLong,
}

/// Where a review was collected from. Imported reviews keep their origin.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReviewSource {
    #[default]
    App,
    GoogleMaps,
    Reddit,
    Instagram,
    Yelp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    review_id: Uuid,
    #[schema(value_type = String)]
    place_id: PlaceId,
    #[schema(value_type = String)]
    author: Username,
    rating: u8,
    #[serde(default)]
    text: String,
    #[serde(default)]
    source: ReviewSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    created_at: Option<DateTime<Utc>>,
}

impl Review {
    pub fn id(&self) -> Uuid {
        self.review_id
    }

    pub fn place_id(&self) -> &PlaceId {
        &self.place_id
    }

    pub fn author(&self) -> &Username {
        &self.author
    }

    pub fn rating(&self) -> u8 {
        self.rating
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn source(&self) -> ReviewSource {
        self.source
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }
}

/// Payload for `POST /restaurants/{placeId}/reviews`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewReview {
    pub rating: u8,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub source: ReviewSource,
}

impl NewReview {
    pub fn into_review(
        self,
        review_id: Uuid,
        place_id: PlaceId,
        author: Username,
    ) -> Result<Review, ReviewValidationError> {
        if !(1..=5).contains(&self.rating) {
            return Err(ReviewValidationError::RatingOutOfRange {
                rating: self.rating,
            });
        }
        let text = self.text.trim().to_owned();
        if text.chars().count() > TEXT_MAX {
            return Err(ReviewValidationError::TextTooLong);
        }
        Ok(Review {
            review_id,
            place_id,
            author,
            rating: self.rating,
            text,
            source: self.source,
            created_at: None,
        })
    }
}
