//! Review handlers.
//!
//! ```text
//! GET    /api/v1/restaurants/{placeId}/reviews
//! POST   /api/v1/restaurants/{placeId}/reviews
//! DELETE /api/v1/reviews/{reviewId}
//! ```

use actix_web::{HttpResponse, delete, get, post, web};

use crate::domain::{Error, NewReview, Review, parse_place_id, parse_review_id};
use crate::inbound::http::ApiResult;
use crate::inbound::http::session::SessionContext;
use crate::inbound::http::state::HttpState;

/// Reviews of a restaurant, newest first.
#[utoipa::path(
    get,
    path = "/api/v1/restaurants/{placeId}/reviews",
    params(("placeId" = String, Path, description = "Google place id")),
    responses(
        (status = 200, description = "Reviews", body = [Review]),
        (status = 400, description = "Invalid place id", body = Error)
    ),
    tags = ["reviews"],
    operation_id = "listRestaurantReviews",
    security([])
)]
#[get("/restaurants/{place_id}/reviews")]
pub async fn list_reviews(
    state: web::Data<HttpState>,
    path: web::Path<String>,
) -> ApiResult<web::Json<Vec<Review>>> {
    let place_id = parse_place_id(&path.into_inner())?;
    Ok(web::Json(state.reviews.for_restaurant(&place_id).await?))
}

/// Post a review as the logged-in user.
#[utoipa::path(
    post,
    path = "/api/v1/restaurants/{placeId}/reviews",
    params(("placeId" = String, Path, description = "Google place id")),
    request_body = NewReview,
    responses(
        (status = 201, description = "Review stored", body = Review),
        (status = 400, description = "Rating or text invalid", body = Error),
        (status = 401, description = "Login required", body = Error),
        (status = 404, description = "Unknown restaurant", body = Error)
    ),
    tags = ["reviews"],
    operation_id = "createReview"
)]
#[post("/restaurants/{place_id}/reviews")]
pub async fn create_review(
    state: web::Data<HttpState>,
    session: SessionContext,
    path: web::Path<String>,
    payload: web::Json<NewReview>,
) -> ApiResult<HttpResponse> {
    let author = session.require_username()?;
    let place_id = parse_place_id(&path.into_inner())?;
    let review = state
        .reviews
        .create(&author, place_id, payload.into_inner())
        .await?;
    Ok(HttpResponse::Created().json(review))
}

/// Delete one of the caller's reviews.
#[utoipa::path(
    delete,
    path = "/api/v1/reviews/{reviewId}",
    params(("reviewId" = String, Path, description = "Review UUID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 401, description = "Login required", body = Error),
        (status = 403, description = "Not the author", body = Error),
        (status = 404, description = "Unknown review", body = Error)
    ),
    tags = ["reviews"],
    operation_id = "deleteReview"
)]
#[delete("/reviews/{review_id}")]
pub async fn delete_review(
    state: web::Data<HttpState>,
    session: SessionContext,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let actor = session.require_username()?;
    let review_id = parse_review_id(&path.into_inner())?;
    state.reviews.delete(&actor, review_id).await?;
    Ok(HttpResponse::NoContent().finish())
}
