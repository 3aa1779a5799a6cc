//! Restaurant lists and likes.
//!
//! Every mutation is a single store `update` or `batch`, so list membership
//! and like counters stay consistent under concurrent requests.

use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};
use utoipa::ToSchema;

use super::achievement::{AchievementId, FIRST_LIST};
use super::achievement_service::AchievementService;
use super::ports::{RecordStore, RecordStoreError};
use super::record::{Collection, Document, FieldFilter, FieldPath, FieldUpdate, Precondition, WriteOp};
use super::restaurant::{PLACE_ID_FIELD, PlaceId, Restaurant};
use super::restaurant_list::{
    FAVORITED_BY_FIELD, LIST_ID_FIELD, LikeOutcome, ListId, ListPatch, NUM_LIKES_FIELD, NewList,
    OWNER_FIELD, RESTAURANTS_FIELD, RestaurantList, VISIBILITY_FIELD, Visibility,
};
use super::user::{POST_POINTS_FIELD, Username};
use super::Error;

/// Points credited to the owner for each list created.
pub const LIST_POST_POINTS: i64 = 10;

/// Conditional like/unlike attempts before giving up on a contended list.
const LIKE_ATTEMPTS: usize = 5;

pub(crate) fn parse_list_id(raw: &str) -> Result<ListId, Error> {
    ListId::parse(raw).map_err(|err| Error::invalid_request(err.to_string()))
}

/// A list together with the restaurants it still references.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListDetail {
    #[serde(flatten)]
    pub list: RestaurantList,
    /// Referenced restaurants that still exist, in list order.
    pub restaurant_details: Vec<Restaurant>,
}

#[derive(Clone)]
pub struct ListService {
    store: Arc<dyn RecordStore>,
    achievements: AchievementService,
}

impl ListService {
    pub fn new(store: Arc<dyn RecordStore>, achievements: AchievementService) -> Self {
        Self {
            store,
            achievements,
        }
    }

    /// Create a list and credit the owner's post points in one batch, then
    /// grant `first_list`.
    pub async fn create(&self, owner: &Username, new_list: NewList) -> Result<RestaurantList, Error> {
        let list = new_list
            .into_list(ListId::random(), owner.clone())
            .map_err(|err| Error::invalid_request(err.to_string()))?;
        let id = list.id().to_string();
        let document = Document::encode(id.clone(), &list)?;

        self.store
            .batch(vec![
                WriteOp::Create(Collection::Lists, document),
                WriteOp::Update {
                    collection: Collection::Lists,
                    id: id.clone(),
                    updates: vec![
                        FieldUpdate::ServerTimestamp(FieldPath::new("createdAt")),
                        FieldUpdate::ServerTimestamp(FieldPath::new("updatedAt")),
                    ],
                    precondition: None,
                },
                WriteOp::Update {
                    collection: Collection::Users,
                    id: owner.as_str().to_owned(),
                    updates: vec![FieldUpdate::Increment(
                        FieldPath::new(POST_POINTS_FIELD),
                        LIST_POST_POINTS,
                    )],
                    precondition: None,
                },
            ])
            .await
            .map_err(|err| match err {
                RecordStoreError::NotFound { .. } => {
                    Error::not_found(format!("user {owner} not found"))
                }
                other => other.into(),
            })?;
        info!(list_id = %id, %owner, "list created");

        self.grant_quietly(owner, FIRST_LIST).await;
        self.load(list.id()).await
    }

    async fn grant_quietly(&self, username: &Username, achievement: &str) {
        let result = match AchievementId::new(achievement) {
            Ok(id) => self.achievements.grant(username, &id).await.map(|_| ()),
            Err(err) => Err(Error::internal(err.to_string())),
        };
        if let Err(err) = result {
            warn!(%username, achievement, error = %err, "achievement grant failed");
        }
    }

    async fn load(&self, list_id: ListId) -> Result<RestaurantList, Error> {
        let document = self
            .store
            .get(Collection::Lists, &list_id.to_string())
            .await?
            .ok_or_else(|| Self::not_found(list_id))?;
        Ok(document.decode_with_id(LIST_ID_FIELD)?)
    }

    fn not_found(list_id: ListId) -> Error {
        Error::not_found(format!("list {list_id} not found"))
    }

    async fn load_owned(&self, actor: &Username, list_id: ListId) -> Result<RestaurantList, Error> {
        let list = self.load_visible(list_id, Some(actor)).await?;
        if !list.is_owned_by(actor) {
            return Err(Error::forbidden("only the list owner may modify it"));
        }
        Ok(list)
    }

    /// Load a list the viewer may see. Private lists of other users are
    /// reported as missing.
    async fn load_visible(
        &self,
        list_id: ListId,
        viewer: Option<&Username>,
    ) -> Result<RestaurantList, Error> {
        let list = self.load(list_id).await?;
        if list.is_visible_to(viewer) {
            Ok(list)
        } else {
            Err(Self::not_found(list_id))
        }
    }

    pub async fn get(
        &self,
        list_id: ListId,
        viewer: Option<&Username>,
    ) -> Result<RestaurantList, Error> {
        self.load_visible(list_id, viewer).await
    }

    /// Resolve the list's restaurants, omitting ids that no longer exist.
    pub async fn detail(&self, list_id: ListId, viewer: Option<&Username>) -> Result<ListDetail, Error> {
        let list = self.load_visible(list_id, viewer).await?;
        let mut restaurant_details: Vec<Restaurant> = Vec::with_capacity(list.restaurants().len());
        for place_id in list.restaurants() {
            match self
                .store
                .get(Collection::Restaurants, place_id.as_str())
                .await?
            {
                Some(document) => restaurant_details.push(document.decode_with_id(PLACE_ID_FIELD)?),
                None => debug!(%place_id, list_id = %list_id, "list references a missing restaurant"),
            }
        }
        Ok(ListDetail {
            list,
            restaurant_details,
        })
    }

    pub async fn update(
        &self,
        actor: &Username,
        list_id: ListId,
        patch: ListPatch,
    ) -> Result<RestaurantList, Error> {
        self.load_owned(actor, list_id).await?;
        let updates = patch
            .into_updates()
            .map_err(|err| Error::invalid_request(err.to_string()))?;
        self.store
            .update(Collection::Lists, &list_id.to_string(), updates, None)
            .await?;
        self.load(list_id).await
    }

    pub async fn delete(&self, actor: &Username, list_id: ListId) -> Result<(), Error> {
        self.load_owned(actor, list_id).await?;
        self.store
            .delete(Collection::Lists, &list_id.to_string())
            .await?;
        info!(list_id = %list_id, owner = %actor, "list deleted");
        Ok(())
    }

    /// Add a restaurant to the list. Adding an id that is already present
    /// leaves the list unchanged.
    pub async fn add_restaurant(
        &self,
        actor: &Username,
        list_id: ListId,
        place_id: &PlaceId,
    ) -> Result<RestaurantList, Error> {
        self.load_owned(actor, list_id).await?;
        if self
            .store
            .get(Collection::Restaurants, place_id.as_str())
            .await?
            .is_none()
        {
            return Err(Error::not_found(format!("restaurant {place_id} not found")));
        }
        self.store
            .update(
                Collection::Lists,
                &list_id.to_string(),
                vec![
                    FieldUpdate::ArrayUnion(
                        FieldPath::new(RESTAURANTS_FIELD),
                        vec![json!(place_id.as_str())],
                    ),
                    FieldUpdate::ServerTimestamp(FieldPath::new("updatedAt")),
                ],
                None,
            )
            .await?;
        self.load(list_id).await
    }

    /// Remove a restaurant from the list; removing an absent id succeeds.
    pub async fn remove_restaurant(
        &self,
        actor: &Username,
        list_id: ListId,
        place_id: &PlaceId,
    ) -> Result<RestaurantList, Error> {
        self.load_owned(actor, list_id).await?;
        self.store
            .update(
                Collection::Lists,
                &list_id.to_string(),
                vec![
                    FieldUpdate::ArrayRemove(
                        FieldPath::new(RESTAURANTS_FIELD),
                        vec![json!(place_id.as_str())],
                    ),
                    FieldUpdate::ServerTimestamp(FieldPath::new("updatedAt")),
                ],
                None,
            )
            .await?;
        self.load(list_id).await
    }

    /// Like the list if `username` has not liked it yet, otherwise unlike it.
    ///
    /// Each branch is one conditional update that changes `favoritedBy` and
    /// `numLikes` together. When a concurrent toggle invalidates both
    /// preconditions the attempt is repeated.
    pub async fn toggle_like(&self, list_id: ListId, username: &Username) -> Result<LikeOutcome, Error> {
        self.load_visible(list_id, Some(username)).await?;
        let id = list_id.to_string();
        let member = json!(username.as_str());

        for attempt in 1..=LIKE_ATTEMPTS {
            let unlike = self
                .conditional(
                    &id,
                    vec![
                        FieldUpdate::ArrayRemove(FieldPath::new(FAVORITED_BY_FIELD), vec![member.clone()]),
                        FieldUpdate::Increment(FieldPath::new(NUM_LIKES_FIELD), -1),
                    ],
                    Precondition::ArrayContains(FieldPath::new(FAVORITED_BY_FIELD), member.clone()),
                )
                .await?;
            if unlike {
                return self.like_outcome(list_id, false).await;
            }

            let like = self
                .conditional(
                    &id,
                    vec![
                        FieldUpdate::ArrayUnion(FieldPath::new(FAVORITED_BY_FIELD), vec![member.clone()]),
                        FieldUpdate::Increment(FieldPath::new(NUM_LIKES_FIELD), 1),
                    ],
                    Precondition::ArrayExcludes(FieldPath::new(FAVORITED_BY_FIELD), member.clone()),
                )
                .await?;
            if like {
                return self.like_outcome(list_id, true).await;
            }
            debug!(list_id = %list_id, attempt, "like toggle raced; retrying");
        }
        Err(Error::conflict("list likes changed concurrently; try again"))
    }

    /// Apply a guarded update. `Ok(false)` means the precondition did not hold.
    async fn conditional(
        &self,
        id: &str,
        updates: Vec<FieldUpdate>,
        precondition: Precondition,
    ) -> Result<bool, Error> {
        match self
            .store
            .update(Collection::Lists, id, updates, Some(precondition))
            .await
        {
            Ok(()) => Ok(true),
            Err(RecordStoreError::PreconditionFailed { .. }) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    async fn like_outcome(&self, list_id: ListId, liked: bool) -> Result<LikeOutcome, Error> {
        let list = self.load(list_id).await?;
        Ok(LikeOutcome {
            liked,
            num_likes: list.num_likes(),
        })
    }

    /// Lists owned by `owner` that `viewer` may see.
    pub async fn lists_for_owner(
        &self,
        owner: &Username,
        viewer: Option<&Username>,
    ) -> Result<Vec<RestaurantList>, Error> {
        let documents = self
            .store
            .find(
                Collection::Lists,
                FieldFilter::equals(OWNER_FIELD, owner.as_str()),
            )
            .await?;
        let mut lists = Vec::with_capacity(documents.len());
        for document in &documents {
            let list: RestaurantList = document.decode_with_id(LIST_ID_FIELD)?;
            if list.is_visible_to(viewer) {
                lists.push(list);
            }
        }
        Ok(lists)
    }

    /// Every public list, most liked first.
    pub async fn public_index(&self) -> Result<Vec<RestaurantList>, Error> {
        let documents = self
            .store
            .find(
                Collection::Lists,
                FieldFilter::equals(VISIBILITY_FIELD, Visibility::Public.as_str()),
            )
            .await?;
        let mut lists = documents
            .iter()
            .map(|document| document.decode_with_id::<RestaurantList>(LIST_ID_FIELD))
            .collect::<Result<Vec<_>, _>>()?;
        lists.sort_by(|a, b| {
            b.num_likes()
                .cmp(&a.num_likes())
                .then_with(|| a.id().as_uuid().cmp(b.id().as_uuid()))
        });
        Ok(lists)
    }
}

#[cfg(test)]
mod tests {
    //! Conditional update sequencing; behaviour against a real store is
    //! covered by the integration tests.
    use super::*;
    use crate::domain::ErrorCode;
    use crate::domain::ports::MockRecordStore;
    use rstest::rstest;

    const LIST: &str = "3fa85f64-5717-4562-b3fc-2c963f66afa6";

    fn list_document(favorited_by: &[&str]) -> Document {
        Document::from_value(
            LIST,
            json!({
                "owner": "alice",
                "name": "Noodles",
                "favoritedBy": favorited_by,
                "numLikes": favorited_by.len(),
            }),
        )
        .expect("object document")
    }

    fn bob() -> Username {
        Username::new("bob").expect("valid username")
    }

    fn service(store: MockRecordStore) -> ListService {
        let store: Arc<dyn RecordStore> = Arc::new(store);
        ListService::new(Arc::clone(&store), AchievementService::new(store))
    }

    #[rstest]
    #[tokio::test]
    async fn like_falls_through_to_array_excludes_branch() {
        let mut store = MockRecordStore::new();
        let mut reads = 0;
        store.expect_get().returning(move |_, _| {
            reads += 1;
            Ok(Some(if reads == 1 {
                list_document(&[])
            } else {
                list_document(&["bob"])
            }))
        });
        store
            .expect_update()
            .withf(|_, _, _, precondition| matches!(precondition, Some(Precondition::ArrayContains(_, _))))
            .times(1)
            .returning(|_, id, _, _| Err(RecordStoreError::precondition_failed_in(Collection::Lists, id.to_owned())));
        store
            .expect_update()
            .withf(|_, _, _, precondition| matches!(precondition, Some(Precondition::ArrayExcludes(_, _))))
            .times(1)
            .returning(|_, _, _, _| Ok(()));

        let outcome = service(store)
            .toggle_like(ListId::parse(LIST).expect("uuid"), &bob())
            .await
            .expect("toggle succeeds");
        assert_eq!(outcome, LikeOutcome { liked: true, num_likes: 1 });
    }

    #[rstest]
    #[tokio::test]
    async fn persistent_races_surface_as_conflict() {
        let mut store = MockRecordStore::new();
        store
            .expect_get()
            .returning(|_, _| Ok(Some(list_document(&[]))));
        store
            .expect_update()
            .times(2 * LIKE_ATTEMPTS)
            .returning(|_, id, _, _| Err(RecordStoreError::precondition_failed_in(Collection::Lists, id.to_owned())));

        let err = service(store)
            .toggle_like(ListId::parse(LIST).expect("uuid"), &bob())
            .await
            .expect_err("contended");
        assert_eq!(err.code(), ErrorCode::Conflict);
    }

    #[rstest]
    #[tokio::test]
    async fn non_owners_cannot_add_restaurants() {
        let mut store = MockRecordStore::new();
        store
            .expect_get()
            .returning(|_, _| Ok(Some(list_document(&[]))));
        let place_id = PlaceId::new("p1").expect("valid id");

        let err = service(store)
            .add_restaurant(&bob(), ListId::parse(LIST).expect("uuid"), &place_id)
            .await
            .expect_err("forbidden");
        assert_eq!(err.code(), ErrorCode::Forbidden);
    }
}
