//! Session and user account handlers.
//!
//! ```text
//! POST   /api/v1/login {"uid":"firebase-uid-123"}
//! POST   /api/v1/logout
//! POST   /api/v1/users
//! GET    /api/v1/users
//! GET    /api/v1/users/me
//! GET    /api/v1/users/by-uid/{uid}
//! GET    /api/v1/users/{username}
//! PATCH  /api/v1/users/{username}
//! DELETE /api/v1/users/{username}
//! GET    /api/v1/users/{username}/lists
//! ```

use actix_web::{HttpResponse, delete, get, patch, post, web};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::domain::{
    Error, NewUser, RestaurantList, User, UserPatch, parse_uid, parse_username,
};
use crate::inbound::http::ApiResult;
use crate::inbound::http::session::SessionContext;
use crate::inbound::http::state::HttpState;

/// Login request body for `POST /api/v1/login`.
///
/// The uid is issued by the identity provider the mobile app signs in with.
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    #[schema(example = "firebase-uid-123")]
    pub uid: String,
}

/// Establish a session for the user registered under `uid`.
#[utoipa::path(
    post,
    path = "/api/v1/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = User,
            headers(("Set-Cookie" = String, description = "Session cookie"))),
        (status = 400, description = "Invalid uid", body = Error),
        (status = 404, description = "No user for this uid", body = Error)
    ),
    tags = ["users"],
    operation_id = "login",
    security([])
)]
#[post("/login")]
pub async fn login(
    state: web::Data<HttpState>,
    session: SessionContext,
    payload: web::Json<LoginRequest>,
) -> ApiResult<web::Json<User>> {
    let uid = parse_uid(&payload.uid)
        .map_err(|err| err.with_details(json!({ "field": "uid" })))?;
    let user = state.users.get_by_uid(&uid).await?;
    session.persist_user(user.username())?;
    info!(username = %user.username(), "user logged in");
    Ok(web::Json(user))
}

/// Drop the session cookie.
#[utoipa::path(
    post,
    path = "/api/v1/logout",
    responses((status = 204, description = "Logged out")),
    tags = ["users"],
    operation_id = "logout"
)]
#[post("/logout")]
pub async fn logout(session: SessionContext) -> HttpResponse {
    session.clear();
    HttpResponse::NoContent().finish()
}

/// Register a user. The username and uid must both be unused.
#[utoipa::path(
    post,
    path = "/api/v1/users",
    request_body = NewUser,
    responses(
        (status = 201, description = "Registered", body = User),
        (status = 400, description = "Invalid user", body = Error),
        (status = 409, description = "Username or uid already taken", body = Error)
    ),
    tags = ["users"],
    operation_id = "createUser",
    security([])
)]
#[post("/users")]
pub async fn create_user(
    state: web::Data<HttpState>,
    payload: web::Json<NewUser>,
) -> ApiResult<HttpResponse> {
    let user = state.users.create(payload.into_inner()).await?;
    Ok(HttpResponse::Created().json(user))
}

#[utoipa::path(
    get,
    path = "/api/v1/users",
    responses(
        (status = 200, description = "Users ordered by username", body = [User]),
        (status = 503, description = "Store unavailable", body = Error)
    ),
    tags = ["users"],
    operation_id = "listUsers",
    security([])
)]
#[get("/users")]
pub async fn list_users(state: web::Data<HttpState>) -> ApiResult<web::Json<Vec<User>>> {
    Ok(web::Json(state.users.list().await?))
}

/// The logged-in user's profile.
#[utoipa::path(
    get,
    path = "/api/v1/users/me",
    responses(
        (status = 200, description = "Current user", body = User),
        (status = 401, description = "Login required", body = Error)
    ),
    tags = ["users"],
    operation_id = "currentUser"
)]
#[get("/users/me")]
pub async fn current_user(
    state: web::Data<HttpState>,
    session: SessionContext,
) -> ApiResult<web::Json<User>> {
    let username = session.require_username()?;
    Ok(web::Json(state.users.get(&username).await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/users/by-uid/{uid}",
    params(("uid" = String, Path, description = "Identity provider uid")),
    responses(
        (status = 200, description = "User", body = User),
        (status = 404, description = "Unknown uid", body = Error)
    ),
    tags = ["users"],
    operation_id = "getUserByUid",
    security([])
)]
#[get("/users/by-uid/{uid}")]
pub async fn get_user_by_uid(
    state: web::Data<HttpState>,
    path: web::Path<String>,
) -> ApiResult<web::Json<User>> {
    let uid = parse_uid(&path.into_inner())?;
    Ok(web::Json(state.users.get_by_uid(&uid).await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/users/{username}",
    params(("username" = String, Path)),
    responses(
        (status = 200, description = "User", body = User),
        (status = 404, description = "Unknown user", body = Error)
    ),
    tags = ["users"],
    operation_id = "getUser",
    security([])
)]
#[get("/users/{username}")]
pub async fn get_user(
    state: web::Data<HttpState>,
    path: web::Path<String>,
) -> ApiResult<web::Json<User>> {
    let username = parse_username(&path.into_inner())?;
    Ok(web::Json(state.users.get(&username).await?))
}

/// Update profile fields of the caller's own account.
#[utoipa::path(
    patch,
    path = "/api/v1/users/{username}",
    params(("username" = String, Path)),
    request_body = UserPatch,
    responses(
        (status = 200, description = "Updated user", body = User),
        (status = 400, description = "Invalid profile fields", body = Error),
        (status = 401, description = "Login required", body = Error),
        (status = 403, description = "Not the account owner", body = Error),
        (status = 404, description = "Unknown user", body = Error)
    ),
    tags = ["users"],
    operation_id = "updateUser"
)]
#[patch("/users/{username}")]
pub async fn update_user(
    state: web::Data<HttpState>,
    session: SessionContext,
    path: web::Path<String>,
    payload: web::Json<UserPatch>,
) -> ApiResult<web::Json<User>> {
    let actor = session.require_username()?;
    let username = parse_username(&path.into_inner())?;
    let user = state
        .users
        .update(&actor, &username, payload.into_inner())
        .await?;
    Ok(web::Json(user))
}

/// Delete the caller's own account and end the session.
#[utoipa::path(
    delete,
    path = "/api/v1/users/{username}",
    params(("username" = String, Path)),
    responses(
        (status = 204, description = "Deleted"),
        (status = 401, description = "Login required", body = Error),
        (status = 403, description = "Not the account owner", body = Error),
        (status = 404, description = "Unknown user", body = Error)
    ),
    tags = ["users"],
    operation_id = "deleteUser"
)]
#[delete("/users/{username}")]
pub async fn delete_user(
    state: web::Data<HttpState>,
    session: SessionContext,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let actor = session.require_username()?;
    let username = parse_username(&path.into_inner())?;
    state.users.delete(&actor, &username).await?;
    session.clear();
    Ok(HttpResponse::NoContent().finish())
}

/// Lists owned by a user. Private lists are included only for the owner.
#[utoipa::path(
    get,
    path = "/api/v1/users/{username}/lists",
    params(("username" = String, Path)),
    responses(
        (status = 200, description = "Lists", body = [RestaurantList]),
        (status = 400, description = "Invalid username", body = Error)
    ),
    tags = ["lists"],
    operation_id = "listsForUser",
    security([])
)]
#[get("/users/{username}/lists")]
pub async fn user_lists(
    state: web::Data<HttpState>,
    session: SessionContext,
    path: web::Path<String>,
) -> ApiResult<web::Json<Vec<RestaurantList>>> {
    let owner = parse_username(&path.into_inner())?;
    let viewer = session.username()?;
    let lists = state.lists.lists_for_owner(&owner, viewer.as_ref()).await?;
    Ok(web::Json(lists))
}
