//! User data model.

use std::fmt;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use utoipa::ToSchema;

use super::achievement::AchievementId;
use super::record::{FieldPath, FieldUpdate};

/// Document field holding the username inside `users` documents.
pub const USERNAME_FIELD: &str = "username";
/// Document field of a uid claim pointing back at its owner.
pub const UID_OWNER_FIELD: &str = "username";
/// Path of the general points counter.
pub const GENERAL_POINTS_FIELD: &str = "points.general";
/// Path of the points counter fed by list creation.
pub const POST_POINTS_FIELD: &str = "points.post";
/// Path of the points counter fed by reviews.
pub const REVIEW_POINTS_FIELD: &str = "points.review";
/// Array of granted achievement ids.
pub const ACHIEVEMENTS_FIELD: &str = "achievements";

/// Minimum allowed length for a username.
pub const USERNAME_MIN: usize = 3;
/// Maximum allowed length for a username.
pub const USERNAME_MAX: usize = 32;
const UID_MAX: usize = 128;
const PROFILE_FIELD_MAX: usize = 100;

/// Validation errors returned by user constructors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserValidationError {
    UsernameTooShort { min: usize },
    UsernameTooLong { max: usize },
    UsernameInvalidCharacters,
    EmptyUid,
    InvalidUid,
    UidTooLong { max: usize },
    InvalidEmail,
    ProfileFieldTooLong { field: &'static str, max: usize },
}

impl fmt::Display for UserValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UsernameTooShort { min } => {
                write!(f, "username must be at least {min} characters")
            }
            Self::UsernameTooLong { max } => {
                write!(f, "username must be at most {max} characters")
            }
            Self::UsernameInvalidCharacters => write!(
                f,
                "username may only contain letters, numbers, '.', '_' or '-'",
            ),
            Self::EmptyUid => write!(f, "uid must not be empty"),
            Self::InvalidUid => write!(f, "uid must not contain '/' or surrounding whitespace"),
            Self::UidTooLong { max } => write!(f, "uid must be at most {max} characters"),
            Self::InvalidEmail => write!(f, "email address is malformed"),
            Self::ProfileFieldTooLong { field, max } => {
                write!(f, "{field} must be at most {max} characters")
            }
        }
    }
}

impl std::error::Error for UserValidationError {}

static USERNAME_RE: OnceLock<Regex> = OnceLock::new();
static EMAIL_RE: OnceLock<Regex> = OnceLock::new();

fn username_regex() -> &'static Regex {
    USERNAME_RE.get_or_init(|| {
        // Length is enforced separately; this regex constrains allowed characters.
        Regex::new("^[A-Za-z0-9_.-]+$")
            .unwrap_or_else(|error| panic!("username regex failed to compile: {error}"))
    })
}

fn email_regex() -> &'static Regex {
    EMAIL_RE.get_or_init(|| {
        Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$")
            .unwrap_or_else(|error| panic!("email regex failed to compile: {error}"))
    })
}

/// Stable, user-chosen handle. Doubles as the `users` document id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Username(String);

impl Username {
    pub fn new(raw: impl Into<String>) -> Result<Self, UserValidationError> {
        let raw = raw.into();
        let length = raw.chars().count();
        if length < USERNAME_MIN {
            return Err(UserValidationError::UsernameTooShort { min: USERNAME_MIN });
        }
        if length > USERNAME_MAX {
            return Err(UserValidationError::UsernameTooLong { max: USERNAME_MAX });
        }
        if !username_regex().is_match(&raw) {
            return Err(UserValidationError::UsernameInvalidCharacters);
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for Username {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Username {
    type Error = UserValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Username> for String {
    fn from(value: Username) -> Self {
        value.0
    }
}

/// External authentication identity. Unique across users.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Uid(String);

impl Uid {
    pub fn new(raw: impl Into<String>) -> Result<Self, UserValidationError> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(UserValidationError::EmptyUid);
        }
        if raw.trim() != raw || raw.contains('/') {
            return Err(UserValidationError::InvalidUid);
        }
        if raw.chars().count() > UID_MAX {
            return Err(UserValidationError::UidTooLong { max: UID_MAX });
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Uid {
    type Error = UserValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Uid> for String {
    fn from(value: Uid) -> Self {
        value.0
    }
}

/// Independent point counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct Points {
    pub general: i64,
    pub post: i64,
    pub review: i64,
}

/// Registered user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[schema(value_type = String, example = "alice")]
    username: Username,
    #[schema(value_type = String)]
    uid: Uid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_name: Option<String>,
    #[serde(default)]
    points: Points,
    #[serde(default)]
    #[schema(value_type = Vec<String>)]
    achievements: Vec<AchievementId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    created_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn username(&self) -> &Username {
        &self.username
    }

    pub fn uid(&self) -> &Uid {
        &self.uid
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    pub fn first_name(&self) -> Option<&str> {
        self.first_name.as_deref()
    }

    pub fn last_name(&self) -> Option<&str> {
        self.last_name.as_deref()
    }

    pub fn points(&self) -> Points {
        self.points
    }

    /// Achievements granted so far, in grant order.
    pub fn achievements(&self) -> &[AchievementId] {
        &self.achievements
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }
}

fn normalise_profile_field(
    field: &'static str,
    value: Option<String>,
) -> Result<Option<String>, UserValidationError> {
    let Some(value) = value else {
        return Ok(None);
    };
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    if trimmed.chars().count() > PROFILE_FIELD_MAX {
        return Err(UserValidationError::ProfileFieldTooLong {
            field,
            max: PROFILE_FIELD_MAX,
        });
    }
    Ok(Some(trimmed.to_owned()))
}

fn normalise_email(value: Option<String>) -> Result<Option<String>, UserValidationError> {
    let email = normalise_profile_field("email", value)?;
    match email {
        Some(email) if !email_regex().is_match(&email) => Err(UserValidationError::InvalidEmail),
        other => Ok(other),
    }
}

/// Registration payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    #[schema(example = "alice")]
    pub username: String,
    #[schema(example = "firebase-uid-123")]
    pub uid: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

impl NewUser {
    /// Validate the payload into a fresh [`User`] with zeroed counters.
    pub fn validate(self) -> Result<User, UserValidationError> {
        let Self {
            username,
            uid,
            email,
            first_name,
            last_name,
        } = self;
        Ok(User {
            username: Username::new(username)?,
            uid: Uid::new(uid)?,
            email: normalise_email(email)?,
            first_name: normalise_profile_field("firstName", first_name)?,
            last_name: normalise_profile_field("lastName", last_name)?,
            points: Points::default(),
            achievements: Vec::new(),
            created_at: None,
        })
    }
}

/// Profile changes accepted by `PATCH /users/{username}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UserPatch {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

impl UserPatch {
    /// Translate into store updates. Blank strings clear the field.
    pub fn into_updates(self) -> Result<Vec<FieldUpdate>, UserValidationError> {
        let Self {
            email,
            first_name,
            last_name,
        } = self;
        let mut updates = Vec::new();
        let mut apply = |field: &str, present: bool, value: Option<String>| {
            if !present {
                return;
            }
            updates.push(match value {
                Some(value) => FieldUpdate::Set(FieldPath::new(field), Value::String(value)),
                None => FieldUpdate::Remove(FieldPath::new(field)),
            });
        };
        apply("email", email.is_some(), normalise_email(email)?);
        apply(
            "firstName",
            first_name.is_some(),
            normalise_profile_field("firstName", first_name)?,
        );
        apply(
            "lastName",
            last_name.is_some(),
            normalise_profile_field("lastName", last_name)?,
        );
        Ok(updates)
    }
}

/// Document stored in `user_uids/{uid}` to claim a uid for one username.
pub fn uid_claim(username: &Username) -> Value {
    let mut claim = serde_json::Map::new();
    claim.insert(UID_OWNER_FIELD.to_owned(), json!(username.as_str()));
    Value::Object(claim)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn new_user() -> NewUser {
        NewUser {
            username: "alice".into(),
            uid: "u1".into(),
            email: Some(" alice@example.com ".into()),
            first_name: Some("Alice".into()),
            last_name: None,
        }
    }

    #[rstest]
    fn validate_trims_profile_fields(new_user: NewUser) {
        let user = new_user.validate().expect("valid user");
        assert_eq!(user.username().as_str(), "alice");
        assert_eq!(user.email(), Some("alice@example.com"));
        assert_eq!(user.points(), Points::default());
        assert!(user.achievements().is_empty());
    }

    #[rstest]
    #[case("al")]
    #[case("has space")]
    #[case("slash/name")]
    #[case("a-very-long-username-that-exceeds-limits")]
    fn rejects_invalid_usernames(#[case] raw: &str) {
        assert!(Username::new(raw).is_err());
    }

    #[rstest]
    #[case("")]
    #[case(" u1")]
    #[case("a/b")]
    fn rejects_invalid_uids(#[case] raw: &str) {
        assert!(Uid::new(raw).is_err());
    }

    #[rstest]
    fn rejects_malformed_email(mut new_user: NewUser) {
        new_user.email = Some("not-an-email".into());
        assert_eq!(new_user.validate(), Err(UserValidationError::InvalidEmail));
    }

    #[rstest]
    fn user_decodes_with_missing_counters() {
        let user: User = serde_json::from_value(json!({
            "username": "bob",
            "uid": "u2",
            "points": {"general": 5}
        }))
        .expect("user decodes");
        assert_eq!(user.points().general, 5);
        assert_eq!(user.points().review, 0);
    }

    #[rstest]
    fn patch_sets_and_clears_fields() {
        let patch = UserPatch {
            email: Some("bob@example.com".into()),
            first_name: Some("  ".into()),
            last_name: None,
        };
        assert_eq!(
            patch.into_updates().expect("valid patch"),
            vec![
                FieldUpdate::Set("email".into(), json!("bob@example.com")),
                FieldUpdate::Remove("firstName".into()),
            ]
        );
    }
}
