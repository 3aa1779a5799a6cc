//! Achievement catalogue and at-most-once grants.

use std::sync::Arc;

use futures_util::TryStreamExt;
use serde_json::json;
use tracing::{debug, info};

use super::achievement::{ACHIEVEMENT_ID_FIELD, Achievement, AchievementDraft, AchievementId, GrantOutcome};
use super::ports::{RecordStore, RecordStoreError};
use super::record::{Collection, Document, FieldPath, FieldUpdate, Precondition};
use super::user::{ACHIEVEMENTS_FIELD, GENERAL_POINTS_FIELD, Username};
use super::Error;

pub(crate) fn parse_achievement_id(raw: &str) -> Result<AchievementId, Error> {
    AchievementId::new(raw).map_err(|err| Error::invalid_request(err.to_string()))
}

#[derive(Clone)]
pub struct AchievementService {
    store: Arc<dyn RecordStore>,
}

impl AchievementService {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Create the built-in definitions that are not stored yet. Existing
    /// definitions are left untouched. Returns how many were created.
    pub async fn seed_builtin(&self) -> Result<usize, Error> {
        let mut created = 0;
        for achievement in Achievement::builtin() {
            let document = Document::encode(achievement.id().as_str(), &achievement)?;
            match self.store.create(Collection::Achievements, document).await {
                Ok(()) => created += 1,
                Err(RecordStoreError::AlreadyExists { .. }) => {}
                Err(err) => return Err(err.into()),
            }
        }
        debug!(created, "built-in achievements seeded");
        Ok(created)
    }

    pub async fn list(&self) -> Result<Vec<Achievement>, Error> {
        let documents: Vec<Document> = self
            .store
            .stream_all(Collection::Achievements)
            .try_collect()
            .await?;
        documents
            .iter()
            .map(|document| Ok(document.decode_with_id(ACHIEVEMENT_ID_FIELD)?))
            .collect()
    }

    pub async fn get(&self, id: &AchievementId) -> Result<Achievement, Error> {
        let document = self
            .store
            .get(Collection::Achievements, id.as_str())
            .await?
            .ok_or_else(|| Error::not_found(format!("achievement {id} not found")))?;
        Ok(document.decode_with_id(ACHIEVEMENT_ID_FIELD)?)
    }

    /// Create or replace a definition.
    pub async fn upsert(&self, draft: AchievementDraft) -> Result<Achievement, Error> {
        let achievement =
            Achievement::try_from(draft).map_err(|err| Error::invalid_request(err.to_string()))?;
        let document = Document::encode(achievement.id().as_str(), &achievement)?;
        self.store.set(Collection::Achievements, document).await?;
        info!(achievement_id = %achievement.id(), "achievement definition stored");
        Ok(achievement)
    }

    /// Grant `id` to `username`.
    ///
    /// Non-repeatable achievements are added and their points credited in
    /// one conditional update, so concurrent grants award points once.
    pub async fn grant(&self, username: &Username, id: &AchievementId) -> Result<GrantOutcome, Error> {
        let achievement = self.get(id).await?;
        let value = json!(id.as_str());
        let updates = vec![
            FieldUpdate::ArrayUnion(FieldPath::new(ACHIEVEMENTS_FIELD), vec![value.clone()]),
            FieldUpdate::Increment(
                FieldPath::new(GENERAL_POINTS_FIELD),
                i64::from(achievement.points()),
            ),
        ];
        let precondition = (!achievement.repeatable())
            .then(|| Precondition::ArrayExcludes(FieldPath::new(ACHIEVEMENTS_FIELD), value));

        match self
            .store
            .update(Collection::Users, username.as_str(), updates, precondition)
            .await
        {
            Ok(()) => {
                info!(%username, achievement_id = %id, points = achievement.points(), "achievement granted");
                Ok(GrantOutcome::Granted {
                    points_awarded: achievement.points(),
                })
            }
            Err(RecordStoreError::PreconditionFailed { .. }) => {
                debug!(%username, achievement_id = %id, "achievement already granted");
                Ok(GrantOutcome::AlreadyGranted)
            }
            Err(RecordStoreError::NotFound { .. }) => {
                Err(Error::not_found(format!("user {username} not found")))
            }
            Err(err) => Err(err.into()),
        }
    }
}
