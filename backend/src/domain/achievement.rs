//! Achievement definitions.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Document field holding the achievement identity.
pub const ACHIEVEMENT_ID_FIELD: &str = "achievementId";

/// Granted the first time a user creates a list.
pub const FIRST_LIST: &str = "first_list";
/// Granted the first time a user posts a review.
pub const FIRST_REVIEW: &str = "first_review";

const ID_MAX: usize = 64;
const TITLE_MAX: usize = 120;

/// Validation errors for achievement definitions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AchievementValidationError {
    #[error("achievement id must be 1-{max} characters of [a-z0-9_]", max = ID_MAX)]
    InvalidId,
    #[error("achievement title must not be empty")]
    EmptyTitle,
    #[error("achievement title must be at most {max} characters", max = TITLE_MAX)]
    TitleTooLong,
}

static ID_RE: OnceLock<Regex> = OnceLock::new();

fn id_regex() -> &'static Regex {
    ID_RE.get_or_init(|| {
        Regex::new("^[a-z0-9_]+$")
            .unwrap_or_else(|error| panic!("achievement id regex failed to compile: {error}"))
    })
}

/// Slug identifying an achievement.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AchievementId(String);

impl AchievementId {
    pub fn new(raw: impl Into<String>) -> Result<Self, AchievementValidationError> {
        let raw = raw.into();
        if raw.is_empty() || raw.len() > ID_MAX || !id_regex().is_match(&raw) {
            return Err(AchievementValidationError::InvalidId);
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AchievementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for AchievementId {
    type Error = AchievementValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<AchievementId> for String {
    fn from(value: AchievementId) -> Self {
        value.0
    }
}

/// An achievement users can earn. Non-repeatable achievements are granted at
/// most once per user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Achievement {
    #[schema(value_type = String, example = "first_list")]
    achievement_id: AchievementId,
    title: String,
    points: u32,
    #[serde(default)]
    repeatable: bool,
}

impl Achievement {
    pub fn new(
        achievement_id: AchievementId,
        title: impl Into<String>,
        points: u32,
        repeatable: bool,
    ) -> Result<Self, AchievementValidationError> {
        let title = title.into().trim().to_owned();
        if title.is_empty() {
            return Err(AchievementValidationError::EmptyTitle);
        }
        if title.chars().count() > TITLE_MAX {
            return Err(AchievementValidationError::TitleTooLong);
        }
        Ok(Self {
            achievement_id,
            title,
            points,
            repeatable,
        })
    }

    pub fn id(&self) -> &AchievementId {
        &self.achievement_id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn points(&self) -> u32 {
        self.points
    }

    pub fn repeatable(&self) -> bool {
        self.repeatable
    }

    /// Definitions seeded when the catalogue is empty.
    pub fn builtin() -> Vec<Self> {
        [
            (FIRST_LIST, "Created your first list", 50),
            (FIRST_REVIEW, "Posted your first review", 25),
        ]
        .into_iter()
        .map(|(id, title, points)| Self {
            achievement_id: AchievementId(id.to_owned()),
            title: title.to_owned(),
            points,
            repeatable: false,
        })
        .collect()
    }
}

/// Definition payload for `POST /admin/achievements`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AchievementDraft {
    pub achievement_id: String,
    pub title: String,
    pub points: u32,
    #[serde(default)]
    pub repeatable: bool,
}

impl TryFrom<AchievementDraft> for Achievement {
    type Error = AchievementValidationError;

    fn try_from(draft: AchievementDraft) -> Result<Self, Self::Error> {
        Self::new(
            AchievementId::new(draft.achievement_id)?,
            draft.title,
            draft.points,
            draft.repeatable,
        )
    }
}

/// Result of a grant attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", rename_all_fields = "camelCase", tag = "status")]
pub enum GrantOutcome {
    Granted { points_awarded: u32 },
    AlreadyGranted,
}
