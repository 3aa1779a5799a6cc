//! Operator endpoints guarded by a shared token.
//!
//! ```text
//! POST /api/v1/admin/snapshot/refresh
//! GET  /api/v1/admin/snapshot
//! POST /api/v1/admin/achievements
//! POST /api/v1/admin/users/{username}/achievements/{achievementId}
//! ```
//!
//! Callers send the token in `X-Admin-Token`. A missing header is `401`; a
//! wrong token, or a server started without one, is `403`.

use actix_web::{FromRequest, HttpRequest, HttpResponse, dev::Payload, get, post, web};
use futures_util::future::{Ready, ready};
use serde::Serialize;
use subtle::ConstantTimeEq;
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::domain::{
    Achievement, AchievementDraft, Error, GrantOutcome, RefreshStatus, RefreshTrigger,
    parse_achievement_id, parse_username,
};
use crate::inbound::http::ApiResult;
use crate::inbound::http::state::HttpState;

/// Header carrying the operator token.
pub const ADMIN_TOKEN_HEADER: &str = "X-Admin-Token";

/// Proof that the request carried the configured admin token.
#[derive(Debug, Clone, Copy)]
pub struct AdminAccess;

fn tokens_match(expected: &[u8], presented: &[u8]) -> bool {
    presented.ct_eq(expected).into()
}

fn authorise(req: &HttpRequest) -> Result<AdminAccess, Error> {
    let presented = req
        .headers()
        .get(ADMIN_TOKEN_HEADER)
        .ok_or_else(|| Error::unauthorized("admin token required"))?;
    let expected = req
        .app_data::<web::Data<HttpState>>()
        .and_then(|state| state.admin_token.clone());
    match expected {
        Some(expected) if tokens_match(expected.as_bytes(), presented.as_bytes()) => {
            Ok(AdminAccess)
        }
        Some(_) => {
            warn!(path = %req.path(), "rejected admin request with wrong token");
            Err(Error::forbidden("admin token rejected"))
        }
        None => Err(Error::forbidden("admin endpoints are disabled")),
    }
}

impl FromRequest for AdminAccess {
    type Error = Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(authorise(req))
    }
}

/// Outcome of a refresh trigger.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub status: RefreshTrigger,
}

/// Start a background snapshot refresh.
#[utoipa::path(
    post,
    path = "/api/v1/admin/snapshot/refresh",
    params(("X-Admin-Token" = String, Header, description = "Operator token")),
    responses(
        (status = 202, description = "Refresh started", body = RefreshResponse),
        (status = 401, description = "Token missing", body = Error),
        (status = 403, description = "Token rejected", body = Error),
        (status = 409, description = "A refresh is already running", body = RefreshResponse)
    ),
    tags = ["admin"],
    operation_id = "triggerSnapshotRefresh"
)]
#[post("/admin/snapshot/refresh")]
pub async fn trigger_refresh(_admin: AdminAccess, state: web::Data<HttpState>) -> HttpResponse {
    let status = state.refresh.trigger_refresh();
    info!(?status, "snapshot refresh requested");
    let body = RefreshResponse { status };
    match status {
        RefreshTrigger::Accepted => HttpResponse::Accepted().json(body),
        RefreshTrigger::AlreadyInProgress => HttpResponse::Conflict().json(body),
    }
}

/// Current snapshot age, size and the last refresh failure, if any.
#[utoipa::path(
    get,
    path = "/api/v1/admin/snapshot",
    params(("X-Admin-Token" = String, Header, description = "Operator token")),
    responses(
        (status = 200, description = "Snapshot status", body = RefreshStatus),
        (status = 401, description = "Token missing", body = Error),
        (status = 403, description = "Token rejected", body = Error)
    ),
    tags = ["admin"],
    operation_id = "snapshotStatus"
)]
#[get("/admin/snapshot")]
pub async fn snapshot_status(
    _admin: AdminAccess,
    state: web::Data<HttpState>,
) -> web::Json<RefreshStatus> {
    web::Json(state.refresh.status())
}

/// Create or replace an achievement definition.
#[utoipa::path(
    post,
    path = "/api/v1/admin/achievements",
    params(("X-Admin-Token" = String, Header, description = "Operator token")),
    request_body = AchievementDraft,
    responses(
        (status = 200, description = "Stored definition", body = Achievement),
        (status = 400, description = "Invalid definition", body = Error),
        (status = 401, description = "Token missing", body = Error),
        (status = 403, description = "Token rejected", body = Error)
    ),
    tags = ["admin"],
    operation_id = "upsertAchievement"
)]
#[post("/admin/achievements")]
pub async fn upsert_achievement(
    _admin: AdminAccess,
    state: web::Data<HttpState>,
    payload: web::Json<AchievementDraft>,
) -> ApiResult<web::Json<Achievement>> {
    let achievement = state.achievements.upsert(payload.into_inner()).await?;
    Ok(web::Json(achievement))
}

/// Award an achievement. Non-repeatable achievements are granted at most once.
#[utoipa::path(
    post,
    path = "/api/v1/admin/users/{username}/achievements/{achievementId}",
    params(
        ("X-Admin-Token" = String, Header, description = "Operator token"),
        ("username" = String, Path),
        ("achievementId" = String, Path)
    ),
    responses(
        (status = 200, description = "Grant outcome", body = GrantOutcome),
        (status = 401, description = "Token missing", body = Error),
        (status = 403, description = "Token rejected", body = Error),
        (status = 404, description = "Unknown user or achievement", body = Error)
    ),
    tags = ["admin"],
    operation_id = "grantAchievement"
)]
#[post("/admin/users/{username}/achievements/{achievement_id}")]
pub async fn grant_achievement(
    _admin: AdminAccess,
    state: web::Data<HttpState>,
    path: web::Path<(String, String)>,
) -> ApiResult<web::Json<GrantOutcome>> {
    let (username, achievement_id) = path.into_inner();
    let username = parse_username(&username)?;
    let achievement_id = parse_achievement_id(&achievement_id)?;
    let outcome = state
        .achievements
        .grant(&username, &achievement_id)
        .await?;
    Ok(web::Json(outcome))
}
