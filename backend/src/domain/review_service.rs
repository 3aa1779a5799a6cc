//! Restaurant reviews.

use std::sync::Arc;

use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use super::achievement::{AchievementId, FIRST_REVIEW};
use super::achievement_service::AchievementService;
use super::ports::{RecordStore, RecordStoreError};
use super::record::{Collection, Document, FieldFilter, FieldPath, FieldUpdate, WriteOp};
use super::restaurant::PlaceId;
use super::review::{NewReview, REVIEW_ID_FIELD, REVIEW_PLACE_FIELD, Review};
use super::user::{REVIEW_POINTS_FIELD, Username};
use super::Error;

/// Points credited to the author for each review posted.
pub const REVIEW_POINTS: i64 = 10;

pub(crate) fn parse_review_id(raw: &str) -> Result<Uuid, Error> {
    Uuid::parse_str(raw).map_err(|_| Error::invalid_request("review id must be a UUID"))
}

#[derive(Clone)]
pub struct ReviewService {
    store: Arc<dyn RecordStore>,
    achievements: AchievementService,
}

impl ReviewService {
    pub fn new(store: Arc<dyn RecordStore>, achievements: AchievementService) -> Self {
        Self {
            store,
            achievements,
        }
    }

    /// Store the review and credit the author's review points in one batch,
    /// then grant `first_review`.
    pub async fn create(
        &self,
        author: &Username,
        place_id: PlaceId,
        new_review: NewReview,
    ) -> Result<Review, Error> {
        if self
            .store
            .get(Collection::Restaurants, place_id.as_str())
            .await?
            .is_none()
        {
            return Err(Error::not_found(format!("restaurant {place_id} not found")));
        }
        let review = new_review
            .into_review(Uuid::new_v4(), place_id, author.clone())
            .map_err(|err| Error::invalid_request(err.to_string()))?;
        let id = review.id().to_string();
        let document = Document::encode(id.clone(), &review)?;

        self.store
            .batch(vec![
                WriteOp::Create(Collection::Reviews, document),
                WriteOp::Update {
                    collection: Collection::Reviews,
                    id: id.clone(),
                    updates: vec![FieldUpdate::ServerTimestamp(FieldPath::new("createdAt"))],
                    precondition: None,
                },
                WriteOp::Update {
                    collection: Collection::Users,
                    id: author.as_str().to_owned(),
                    updates: vec![FieldUpdate::Increment(
                        FieldPath::new(REVIEW_POINTS_FIELD),
                        REVIEW_POINTS,
                    )],
                    precondition: None,
                },
            ])
            .await
            .map_err(|err| match err {
                RecordStoreError::NotFound { .. } => {
                    Error::not_found(format!("user {author} not found"))
                }
                other => other.into(),
            })?;
        info!(review_id = %id, place_id = %review.place_id(), %author, "review posted");

        match AchievementId::new(FIRST_REVIEW) {
            Ok(achievement) => {
                if let Err(err) = self.achievements.grant(author, &achievement).await {
                    warn!(%author, error = %err, "first review grant failed");
                }
            }
            Err(err) => warn!(error = %err, "invalid built-in achievement id"),
        }
        self.get(review.id()).await
    }

    pub async fn get(&self, review_id: Uuid) -> Result<Review, Error> {
        let document = self
            .store
            .get(Collection::Reviews, &review_id.to_string())
            .await?
            .ok_or_else(|| Error::not_found(format!("review {review_id} not found")))?;
        Ok(document.decode_with_id(REVIEW_ID_FIELD)?)
    }

    /// Reviews of one restaurant, newest first.
    pub async fn for_restaurant(&self, place_id: &PlaceId) -> Result<Vec<Review>, Error> {
        let documents = self
            .store
            .find(
                Collection::Reviews,
                FieldFilter::equals(REVIEW_PLACE_FIELD, json!(place_id.as_str())),
            )
            .await?;
        let mut reviews = documents
            .iter()
            .map(|document| document.decode_with_id::<Review>(REVIEW_ID_FIELD))
            .collect::<Result<Vec<_>, _>>()?;
        reviews.sort_by(|a, b| {
            b.created_at()
                .cmp(&a.created_at())
                .then_with(|| a.id().cmp(&b.id()))
        });
        Ok(reviews)
    }

    pub async fn delete(&self, actor: &Username, review_id: Uuid) -> Result<(), Error> {
        let review = self.get(review_id).await?;
        if review.author() != actor {
            return Err(Error::forbidden("only the author may delete a review"));
        }
        self.store
            .delete(Collection::Reviews, &review_id.to_string())
            .await?;
        info!(%review_id, "review deleted");
        Ok(())
    }
}
