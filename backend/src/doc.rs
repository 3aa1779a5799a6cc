//! OpenAPI documentation configuration.
//!
//! [`ApiDoc`] registers every handler under `/api/v1`, the health checks and
//! the domain schemas they exchange. Two security schemes are declared: the
//! session cookie set by `POST /api/v1/login` and the `X-Admin-Token` header
//! guarding the operator routes.
//!
//! The document is served by Swagger UI in debug builds and exported with
//! `cargo run --bin openapi-dump`.

use utoipa::openapi::security::{ApiKey, ApiKeyValue, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::domain::{
    Achievement, AchievementDraft, Error, ErrorCode, GrantOutcome, LikeOutcome, ListDetail,
    ListPatch, NewList, NewReview, NewUser, RefreshStatus, RefreshTrigger, Restaurant,
    RestaurantDraft, RestaurantHit, RestaurantList, RestaurantPatch, RestaurantResults,
    ResultSource, Review, User, UserPatch, Visibility,
};
use crate::domain::query::QuerySort;
use crate::inbound::http::admin::RefreshResponse;
use crate::inbound::http::health::ReadinessReport;
use crate::inbound::http::users::LoginRequest;

/// Adds the cookie and admin token security schemes.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi
            .components
            .get_or_insert_with(utoipa::openapi::Components::default);

        components.add_security_scheme(
            "SessionCookie",
            SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::with_description(
                "session",
                "Session cookie issued by POST /api/v1/login.",
            ))),
        );
        components.add_security_scheme(
            "AdminToken",
            SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::with_description(
                "X-Admin-Token",
                "Operator token configured with PLATELIST_ADMIN_TOKEN.",
            ))),
        );
    }
}

/// OpenAPI document for the REST API.
#[derive(OpenApi)]
#[openapi(
    modifiers(&SecurityAddon),
    info(
        title = "Platelist API",
        description = "Restaurant discovery, curated lists, reviews and achievements."
    ),
    servers(
        (url = "/", description = "Relative to the deployment base URL")
    ),
    security(("SessionCookie" = [])),
    paths(
        crate::inbound::http::users::login,
        crate::inbound::http::users::logout,
        crate::inbound::http::users::create_user,
        crate::inbound::http::users::list_users,
        crate::inbound::http::users::current_user,
        crate::inbound::http::users::get_user_by_uid,
        crate::inbound::http::users::get_user,
        crate::inbound::http::users::update_user,
        crate::inbound::http::users::delete_user,
        crate::inbound::http::users::user_lists,
        crate::inbound::http::restaurants::query_restaurants,
        crate::inbound::http::restaurants::popular_restaurants,
        crate::inbound::http::restaurants::nearby_restaurants,
        crate::inbound::http::restaurants::get_restaurant,
        crate::inbound::http::restaurants::create_restaurant,
        crate::inbound::http::restaurants::update_restaurant,
        crate::inbound::http::restaurants::delete_restaurant,
        crate::inbound::http::reviews::list_reviews,
        crate::inbound::http::reviews::create_review,
        crate::inbound::http::reviews::delete_review,
        crate::inbound::http::lists::create_list,
        crate::inbound::http::lists::public_lists,
        crate::inbound::http::lists::get_list,
        crate::inbound::http::lists::update_list,
        crate::inbound::http::lists::delete_list,
        crate::inbound::http::lists::add_restaurant,
        crate::inbound::http::lists::remove_restaurant,
        crate::inbound::http::lists::toggle_like,
        crate::inbound::http::achievements::list_achievements,
        crate::inbound::http::admin::trigger_refresh,
        crate::inbound::http::admin::snapshot_status,
        crate::inbound::http::admin::upsert_achievement,
        crate::inbound::http::admin::grant_achievement,
        crate::inbound::http::health::ready,
        crate::inbound::http::health::live,
    ),
    components(schemas(
        Error,
        ErrorCode,
        LoginRequest,
        User,
        NewUser,
        UserPatch,
        Restaurant,
        RestaurantDraft,
        RestaurantPatch,
        RestaurantResults,
        RestaurantHit,
        ResultSource,
        QuerySort,
        Review,
        NewReview,
        RestaurantList,
        NewList,
        ListPatch,
        ListDetail,
        LikeOutcome,
        Visibility,
        Achievement,
        AchievementDraft,
        GrantOutcome,
        RefreshResponse,
        RefreshTrigger,
        RefreshStatus,
        ReadinessReport,
    )),
    tags(
        (name = "users", description = "Accounts and sessions"),
        (name = "restaurants", description = "Snapshot-backed restaurant queries and record edits"),
        (name = "reviews", description = "Restaurant reviews"),
        (name = "lists", description = "Curated restaurant lists and likes"),
        (name = "achievements", description = "Achievement catalogue"),
        (name = "admin", description = "Operator endpoints guarded by X-Admin-Token"),
        (name = "health", description = "Endpoints for health checks")
    )
)]
pub struct ApiDoc;
