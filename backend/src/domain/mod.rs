//! Domain entities, ports and services.
//!
//! Entities validate on construction and describe their serialisation
//! contract in their own Rustdoc. Services depend only on the ports in
//! [`ports`] and report failures as [`Error`].
//!
//! Public surface:
//! - Error / ErrorCode: API error payload and its stable code.
//! - Snapshot / SnapshotCache: the published restaurant snapshot.
//! - RefreshScheduler: single-flight background refresh.
//! - The catalogue, user, list, review and achievement services.

pub mod achievement;
mod achievement_service;
mod catalogue_service;
pub mod error;
mod list_service;
pub mod ports;
pub mod query;
pub mod record;
mod refresh;
pub mod restaurant;
pub mod restaurant_list;
pub mod review;
mod review_service;
mod snapshot;
mod trace_id;
pub mod user;
mod user_service;

pub use self::achievement::{Achievement, AchievementDraft, AchievementId, GrantOutcome};
pub(crate) use self::achievement_service::parse_achievement_id;
pub use self::achievement_service::AchievementService;
pub(crate) use self::catalogue_service::parse_place_id;
pub use self::catalogue_service::{
    RestaurantCatalogueService, RestaurantHit, RestaurantResults, ResultSource,
};
pub use self::error::{Error, ErrorCode, ErrorValidationError, TRACE_ID_HEADER};
pub(crate) use self::list_service::parse_list_id;
pub use self::list_service::{LIST_POST_POINTS, ListDetail, ListService};
pub use self::refresh::{
    RefreshError, RefreshOutcome, RefreshScheduler, RefreshStatus, RefreshTrigger,
    pull_restaurants,
};
pub use self::restaurant::{PlaceId, Restaurant, RestaurantDraft, RestaurantPatch};
pub use self::restaurant_list::{LikeOutcome, ListId, ListPatch, NewList, RestaurantList, Visibility};
pub use self::review::{NewReview, Review, ReviewSource};
pub(crate) use self::review_service::parse_review_id;
pub use self::review_service::{REVIEW_POINTS, ReviewService};
pub use self::snapshot::{Snapshot, SnapshotCache};
pub use self::trace_id::TraceId;
pub use self::user::{NewUser, Points, Uid, User, UserPatch, Username};
pub(crate) use self::user_service::{parse_uid, parse_username};
pub use self::user_service::UserService;

/// Convenient API result alias.
///
/// # Examples
/// ```
/// use actix_web::HttpResponse;
/// use platelist::domain::{ApiResult, Error};
///
/// fn handler() -> ApiResult<HttpResponse> {
///     Err(Error::forbidden("nope"))
/// }
/// ```
pub type ApiResult<T> = Result<T, Error>;
