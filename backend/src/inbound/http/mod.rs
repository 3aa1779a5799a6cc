//! HTTP inbound adapter exposing the REST API.

pub mod achievements;
pub mod admin;
pub mod error;
pub mod health;
pub mod lists;
pub mod restaurants;
pub mod reviews;
pub mod session;
pub mod state;
#[cfg(test)]
pub mod test_utils;
pub mod users;

use actix_web::web;

pub use error::ApiResult;

/// Register every `/api/v1` handler plus the extractor error mappings.
///
/// Literal segments are registered ahead of the `{param}` routes they would
/// otherwise be captured by (`/users/me`, `/restaurants/popular`).
///
/// # Examples
/// ```
/// use actix_web::{App, web};
/// use platelist::inbound::http::api_services;
///
/// let app = App::new().service(web::scope("/api/v1").configure(api_services));
/// ```
pub fn api_services(cfg: &mut web::ServiceConfig) {
    cfg.app_data(error::json_config())
        .app_data(error::query_config())
        .app_data(error::path_config())
        .service(users::login)
        .service(users::logout)
        .service(users::create_user)
        .service(users::list_users)
        .service(users::current_user)
        .service(users::get_user_by_uid)
        .service(users::user_lists)
        .service(users::get_user)
        .service(users::update_user)
        .service(users::delete_user)
        .service(restaurants::query_restaurants)
        .service(restaurants::popular_restaurants)
        .service(restaurants::nearby_restaurants)
        .service(reviews::list_reviews)
        .service(reviews::create_review)
        .service(restaurants::get_restaurant)
        .service(restaurants::create_restaurant)
        .service(restaurants::update_restaurant)
        .service(restaurants::delete_restaurant)
        .service(reviews::delete_review)
        .service(lists::create_list)
        .service(lists::public_lists)
        .service(lists::get_list)
        .service(lists::update_list)
        .service(lists::delete_list)
        .service(lists::add_restaurant)
        .service(lists::remove_restaurant)
        .service(lists::toggle_like)
        .service(achievements::list_achievements)
        .service(admin::trigger_refresh)
        .service(admin::snapshot_status)
        .service(admin::upsert_achievement)
        .service(admin::grant_achievement);
}
