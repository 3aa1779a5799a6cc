//! User-owned restaurant lists.
//!
//! A list is one document with an `owner` field. Public lists make up the
//! global index, which is a query over `visibility` rather than a second copy
//! of the list.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use utoipa::ToSchema;
use uuid::Uuid;

use super::record::{FieldPath, FieldUpdate};
use super::restaurant::PlaceId;
use super::user::Username;

pub const LIST_ID_FIELD: &str = "listId";
pub const OWNER_FIELD: &str = "owner";
pub const VISIBILITY_FIELD: &str = "visibility";
pub const RESTAURANTS_FIELD: &str = "restaurants";
pub const FAVORITED_BY_FIELD: &str = "favoritedBy";
pub const NUM_LIKES_FIELD: &str = "numLikes";

const NAME_MAX: usize = 80;
const DESCRIPTION_MAX: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ListValidationError {
    #[error("list name must not be empty")]
    EmptyName,
    #[error("list name must be at most {max} characters", max = NAME_MAX)]
    NameTooLong,
    #[error("list description must be at most {max} characters", max = DESCRIPTION_MAX)]
    DescriptionTooLong,
    #[error("list id must be a UUID")]
    InvalidId,
}

/// Identifier assigned when a list is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ListId(Uuid);

impl ListId {
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(raw: &str) -> Result<Self, ListValidationError> {
        Uuid::parse_str(raw)
            .map(Self)
            .map_err(|_| ListValidationError::InvalidId)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for ListId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Whether a list appears in the global index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    Private,
}

impl Visibility {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
        }
    }
}

/// A named, ordered set of restaurant references.
///
/// ## Invariants
/// - `num_likes == favorited_by.len()` after every like or unlike.
/// - `restaurants` holds each place id at most once, in insertion order.
///   References are weak: a referenced restaurant may no longer exist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RestaurantList {
    #[schema(value_type = String, format = Uuid)]
    list_id: ListId,
    #[schema(value_type = String)]
    owner: Username,
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    visibility: Visibility,
    #[serde(default)]
    #[schema(value_type = Vec<String>)]
    restaurants: Vec<PlaceId>,
    #[serde(default)]
    #[schema(value_type = Vec<String>)]
    favorited_by: Vec<Username>,
    #[serde(default)]
    num_likes: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    updated_at: Option<DateTime<Utc>>,
}

impl RestaurantList {
    pub fn id(&self) -> ListId {
        self.list_id
    }

    pub fn owner(&self) -> &Username {
        &self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    pub fn restaurants(&self) -> &[PlaceId] {
        &self.restaurants
    }

    pub fn favorited_by(&self) -> &[Username] {
        &self.favorited_by
    }

    pub fn num_likes(&self) -> i64 {
        self.num_likes
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    pub fn is_owned_by(&self, username: &Username) -> bool {
        &self.owner == username
    }

    /// Owners see every list; everyone else sees public lists only.
    pub fn is_visible_to(&self, viewer: Option<&Username>) -> bool {
        self.visibility == Visibility::Public || viewer.is_some_and(|v| self.is_owned_by(v))
    }
}

fn validate_name(name: &str) -> Result<String, ListValidationError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ListValidationError::EmptyName);
    }
    if name.chars().count() > NAME_MAX {
        return Err(ListValidationError::NameTooLong);
    }
    Ok(name.to_owned())
}

fn validate_description(description: &str) -> Result<String, ListValidationError> {
    let description = description.trim();
    if description.chars().count() > DESCRIPTION_MAX {
        return Err(ListValidationError::DescriptionTooLong);
    }
    Ok(description.to_owned())
}

/// Payload for `POST /lists`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewList {
    #[schema(example = "Late night noodles")]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub visibility: Visibility,
}

impl NewList {
    /// Validate and build an empty list owned by `owner`.
    pub fn into_list(self, list_id: ListId, owner: Username) -> Result<RestaurantList, ListValidationError> {
        Ok(RestaurantList {
            list_id,
            owner,
            name: validate_name(&self.name)?,
            description: validate_description(&self.description)?,
            visibility: self.visibility,
            restaurants: Vec::new(),
            favorited_by: Vec::new(),
            num_likes: 0,
            created_at: None,
            updated_at: None,
        })
    }
}

/// Payload for `PATCH /lists/{id}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ListPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub visibility: Option<Visibility>,
}

impl ListPatch {
    pub fn into_updates(self) -> Result<Vec<FieldUpdate>, ListValidationError> {
        let mut updates = Vec::new();
        if let Some(name) = self.name {
            updates.push(FieldUpdate::Set(
                FieldPath::new("name"),
                Value::String(validate_name(&name)?),
            ));
        }
        if let Some(description) = self.description {
            updates.push(FieldUpdate::Set(
                FieldPath::new("description"),
                Value::String(validate_description(&description)?),
            ));
        }
        if let Some(visibility) = self.visibility {
            updates.push(FieldUpdate::Set(
                FieldPath::new(VISIBILITY_FIELD),
                json!(visibility.as_str()),
            ));
        }
        updates.push(FieldUpdate::ServerTimestamp(FieldPath::new("updatedAt")));
        Ok(updates)
    }
}

/// State after a like toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LikeOutcome {
    pub liked: bool,
    pub num_likes: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn owner() -> Username {
        Username::new("alice").expect("valid username")
    }

    #[rstest]
    fn new_list_starts_empty(owner: Username) {
        let list = NewList {
            name: " Brunch ".into(),
            description: String::new(),
            visibility: Visibility::Private,
        }
        .into_list(ListId::random(), owner.clone())
        .expect("valid list");

        assert_eq!(list.name(), "Brunch");
        assert_eq!(list.num_likes(), 0);
        assert!(list.restaurants().is_empty());
        assert!(list.is_visible_to(Some(&owner)));
        assert!(!list.is_visible_to(None));
    }

    #[rstest]
    fn rejects_blank_names(owner: Username) {
        let result = NewList {
            name: "   ".into(),
            description: String::new(),
            visibility: Visibility::Public,
        }
        .into_list(ListId::random(), owner);
        assert_eq!(result, Err(ListValidationError::EmptyName));
    }

    #[rstest]
    fn decodes_stored_documents() {
        let list: RestaurantList = serde_json::from_value(json!({
            "listId": "3fa85f64-5717-4562-b3fc-2c963f66afa6",
            "owner": "alice",
            "name": "Noodles",
            "restaurants": ["p1", "p2"],
            "favoritedBy": ["bob"],
            "numLikes": 1
        }))
        .expect("list decodes");
        assert_eq!(list.visibility(), Visibility::Public);
        assert_eq!(list.favorited_by().len(), 1);
        assert_eq!(list.num_likes(), 1);
    }

    #[rstest]
    fn patch_serialises_visibility() {
        let updates = ListPatch {
            visibility: Some(Visibility::Private),
            ..ListPatch::default()
        }
        .into_updates()
        .expect("valid patch");
        assert_eq!(
            updates.first(),
            Some(&FieldUpdate::Set("visibility".into(), json!("private")))
        );
    }

    #[rstest]
    fn parse_rejects_non_uuid() {
        assert_eq!(ListId::parse("nope"), Err(ListValidationError::InvalidId));
    }
}
