//! Restaurant list handlers.
//!
//! ```text
//! POST   /api/v1/lists
//! GET    /api/v1/lists
//! GET    /api/v1/lists/{listId}
//! PATCH  /api/v1/lists/{listId}
//! DELETE /api/v1/lists/{listId}
//! PUT    /api/v1/lists/{listId}/restaurants/{placeId}
//! DELETE /api/v1/lists/{listId}/restaurants/{placeId}
//! POST   /api/v1/lists/{listId}/like
//! ```
//!
//! Private lists answer `404` to anyone but their owner so their existence
//! is not revealed.

use actix_web::{HttpResponse, delete, get, patch, post, put, web};

use crate::domain::{
    Error, LikeOutcome, ListDetail, ListPatch, NewList, RestaurantList, parse_list_id,
    parse_place_id,
};
use crate::inbound::http::ApiResult;
use crate::inbound::http::session::SessionContext;
use crate::inbound::http::state::HttpState;

/// Create a list owned by the caller. Awards post points.
#[utoipa::path(
    post,
    path = "/api/v1/lists",
    request_body = NewList,
    responses(
        (status = 201, description = "Created", body = RestaurantList),
        (status = 400, description = "Invalid list", body = Error),
        (status = 401, description = "Login required", body = Error)
    ),
    tags = ["lists"],
    operation_id = "createList"
)]
#[post("/lists")]
pub async fn create_list(
    state: web::Data<HttpState>,
    session: SessionContext,
    payload: web::Json<NewList>,
) -> ApiResult<HttpResponse> {
    let owner = session.require_username()?;
    let list = state.lists.create(&owner, payload.into_inner()).await?;
    Ok(HttpResponse::Created().json(list))
}

/// Every public list, most liked first.
#[utoipa::path(
    get,
    path = "/api/v1/lists",
    responses((status = 200, description = "Public lists", body = [RestaurantList])),
    tags = ["lists"],
    operation_id = "publicLists",
    security([])
)]
#[get("/lists")]
pub async fn public_lists(
    state: web::Data<HttpState>,
) -> ApiResult<web::Json<Vec<RestaurantList>>> {
    Ok(web::Json(state.lists.public_index().await?))
}

/// A list with its restaurants resolved. Deleted restaurants are omitted.
#[utoipa::path(
    get,
    path = "/api/v1/lists/{listId}",
    params(("listId" = String, Path, description = "List UUID")),
    responses(
        (status = 200, description = "List detail", body = ListDetail),
        (status = 404, description = "Unknown or private list", body = Error)
    ),
    tags = ["lists"],
    operation_id = "getList",
    security([])
)]
#[get("/lists/{list_id}")]
pub async fn get_list(
    state: web::Data<HttpState>,
    session: SessionContext,
    path: web::Path<String>,
) -> ApiResult<web::Json<ListDetail>> {
    let list_id = parse_list_id(&path.into_inner())?;
    let viewer = session.username()?;
    Ok(web::Json(state.lists.detail(list_id, viewer.as_ref()).await?))
}

#[utoipa::path(
    patch,
    path = "/api/v1/lists/{listId}",
    params(("listId" = String, Path, description = "List UUID")),
    request_body = ListPatch,
    responses(
        (status = 200, description = "Updated list", body = RestaurantList),
        (status = 400, description = "Invalid patch", body = Error),
        (status = 401, description = "Login required", body = Error),
        (status = 403, description = "Not the owner", body = Error),
        (status = 404, description = "Unknown list", body = Error)
    ),
    tags = ["lists"],
    operation_id = "updateList"
)]
#[patch("/lists/{list_id}")]
pub async fn update_list(
    state: web::Data<HttpState>,
    session: SessionContext,
    path: web::Path<String>,
    payload: web::Json<ListPatch>,
) -> ApiResult<web::Json<RestaurantList>> {
    let actor = session.require_username()?;
    let list_id = parse_list_id(&path.into_inner())?;
    let list = state
        .lists
        .update(&actor, list_id, payload.into_inner())
        .await?;
    Ok(web::Json(list))
}

#[utoipa::path(
    delete,
    path = "/api/v1/lists/{listId}",
    params(("listId" = String, Path, description = "List UUID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 401, description = "Login required", body = Error),
        (status = 403, description = "Not the owner", body = Error),
        (status = 404, description = "Unknown list", body = Error)
    ),
    tags = ["lists"],
    operation_id = "deleteList"
)]
#[delete("/lists/{list_id}")]
pub async fn delete_list(
    state: web::Data<HttpState>,
    session: SessionContext,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let actor = session.require_username()?;
    let list_id = parse_list_id(&path.into_inner())?;
    state.lists.delete(&actor, list_id).await?;
    Ok(HttpResponse::NoContent().finish())
}

/// Add a restaurant to the caller's list. Adding twice is a no-op.
#[utoipa::path(
    put,
    path = "/api/v1/lists/{listId}/restaurants/{placeId}",
    params(
        ("listId" = String, Path, description = "List UUID"),
        ("placeId" = String, Path, description = "Google place id")
    ),
    responses(
        (status = 200, description = "Updated list", body = RestaurantList),
        (status = 401, description = "Login required", body = Error),
        (status = 403, description = "Not the owner", body = Error),
        (status = 404, description = "Unknown list or restaurant", body = Error)
    ),
    tags = ["lists"],
    operation_id = "addRestaurantToList"
)]
#[put("/lists/{list_id}/restaurants/{place_id}")]
pub async fn add_restaurant(
    state: web::Data<HttpState>,
    session: SessionContext,
    path: web::Path<(String, String)>,
) -> ApiResult<web::Json<RestaurantList>> {
    let actor = session.require_username()?;
    let (list_id, place_id) = path.into_inner();
    let list_id = parse_list_id(&list_id)?;
    let place_id = parse_place_id(&place_id)?;
    let list = state
        .lists
        .add_restaurant(&actor, list_id, &place_id)
        .await?;
    Ok(web::Json(list))
}

/// Remove a restaurant from the caller's list. Removing twice is a no-op.
#[utoipa::path(
    delete,
    path = "/api/v1/lists/{listId}/restaurants/{placeId}",
    params(
        ("listId" = String, Path, description = "List UUID"),
        ("placeId" = String, Path, description = "Google place id")
    ),
    responses(
        (status = 200, description = "Updated list", body = RestaurantList),
        (status = 401, description = "Login required", body = Error),
        (status = 403, description = "Not the owner", body = Error),
        (status = 404, description = "Unknown list", body = Error)
    ),
    tags = ["lists"],
    operation_id = "removeRestaurantFromList"
)]
#[delete("/lists/{list_id}/restaurants/{place_id}")]
pub async fn remove_restaurant(
    state: web::Data<HttpState>,
    session: SessionContext,
    path: web::Path<(String, String)>,
) -> ApiResult<web::Json<RestaurantList>> {
    let actor = session.require_username()?;
    let (list_id, place_id) = path.into_inner();
    let list_id = parse_list_id(&list_id)?;
    let place_id = parse_place_id(&place_id)?;
    let list = state
        .lists
        .remove_restaurant(&actor, list_id, &place_id)
        .await?;
    Ok(web::Json(list))
}

/// Like the list, or unlike it if the caller already does.
#[utoipa::path(
    post,
    path = "/api/v1/lists/{listId}/like",
    params(("listId" = String, Path, description = "List UUID")),
    responses(
        (status = 200, description = "New like state", body = LikeOutcome),
        (status = 401, description = "Login required", body = Error),
        (status = 404, description = "Unknown or private list", body = Error),
        (status = 409, description = "Too much contention, retry", body = Error)
    ),
    tags = ["lists"],
    operation_id = "toggleListLike"
)]
#[post("/lists/{list_id}/like")]
pub async fn toggle_like(
    state: web::Data<HttpState>,
    session: SessionContext,
    path: web::Path<String>,
) -> ApiResult<web::Json<LikeOutcome>> {
    let username = session.require_username()?;
    let list_id = parse_list_id(&path.into_inner())?;
    Ok(web::Json(state.lists.toggle_like(list_id, &username).await?))
}
