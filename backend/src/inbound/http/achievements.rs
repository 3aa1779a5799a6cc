//! Achievement catalogue.
//!
//! ```text
//! GET /api/v1/achievements
//! ```

use actix_web::{get, web};

use crate::domain::{Achievement, Error};
use crate::inbound::http::ApiResult;
use crate::inbound::http::state::HttpState;

#[utoipa::path(
    get,
    path = "/api/v1/achievements",
    responses(
        (status = 200, description = "Achievement definitions", body = [Achievement]),
        (status = 503, description = "Store unavailable", body = Error)
    ),
    tags = ["achievements"],
    operation_id = "listAchievements",
    security([])
)]
#[get("/achievements")]
pub async fn list_achievements(
    state: web::Data<HttpState>,
) -> ApiResult<web::Json<Vec<Achievement>>> {
    Ok(web::Json(state.achievements.list().await?))
}
