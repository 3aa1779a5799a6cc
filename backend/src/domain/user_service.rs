//! User registration, lookup and profile management.
//!
//! Usernames are document ids in `users`; external uids are claimed in
//! `user_uids` within the same batch so neither can be registered twice.

use std::sync::Arc;

use futures_util::TryStreamExt;
use tracing::info;

use super::ports::{RecordStore, RecordStoreError};
use super::record::{Collection, Document, FieldPath, FieldUpdate, WriteOp};
use super::user::{NewUser, UID_OWNER_FIELD, USERNAME_FIELD, Uid, User, UserPatch, Username, uid_claim};
use super::Error;

pub(crate) fn parse_username(raw: &str) -> Result<Username, Error> {
    Username::new(raw).map_err(|err| Error::invalid_request(err.to_string()))
}

pub(crate) fn parse_uid(raw: &str) -> Result<Uid, Error> {
    Uid::new(raw).map_err(|err| Error::invalid_request(err.to_string()))
}

fn require_self(actor: &Username, target: &Username) -> Result<(), Error> {
    if actor == target {
        Ok(())
    } else {
        Err(Error::forbidden("users may only modify their own account"))
    }
}

#[derive(Clone)]
pub struct UserService {
    store: Arc<dyn RecordStore>,
}

impl UserService {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Register a user, claiming both the username and the uid atomically.
    pub async fn create(&self, new_user: NewUser) -> Result<User, Error> {
        let user = new_user
            .validate()
            .map_err(|err| Error::invalid_request(err.to_string()))?;
        let username = user.username().as_str().to_owned();
        let document = Document::encode(username.clone(), &user)?;
        let claim = Document::from_value(user.uid().as_str(), uid_claim(user.username()))?;

        let result = self
            .store
            .batch(vec![
                WriteOp::Create(Collection::Users, document),
                WriteOp::Update {
                    collection: Collection::Users,
                    id: username,
                    updates: vec![FieldUpdate::ServerTimestamp(FieldPath::new("createdAt"))],
                    precondition: None,
                },
                WriteOp::Create(Collection::UserUids, claim),
            ])
            .await;
        match result {
            Ok(()) => {}
            Err(RecordStoreError::AlreadyExists { collection, .. })
                if collection == Collection::UserUids.as_str() =>
            {
                return Err(Error::conflict("uid is already registered"));
            }
            Err(RecordStoreError::AlreadyExists { .. }) => {
                return Err(Error::conflict(format!(
                    "username {} is already taken",
                    user.username()
                )));
            }
            Err(err) => return Err(err.into()),
        }
        info!(username = %user.username(), "user registered");
        self.get(user.username()).await
    }

    pub async fn get(&self, username: &Username) -> Result<User, Error> {
        self.find(username)
            .await?
            .ok_or_else(|| Error::not_found(format!("user {username} not found")))
    }

    async fn find(&self, username: &Username) -> Result<Option<User>, Error> {
        match self.store.get(Collection::Users, username.as_str()).await? {
            Some(document) => Ok(Some(document.decode_with_id(USERNAME_FIELD)?)),
            None => Ok(None),
        }
    }

    /// Resolve the user holding an external uid.
    pub async fn get_by_uid(&self, uid: &Uid) -> Result<User, Error> {
        let not_found = || Error::not_found("no user is registered for this uid");
        let claim = self
            .store
            .get(Collection::UserUids, uid.as_str())
            .await?
            .ok_or_else(not_found)?;
        let owner = claim
            .fields()
            .get(UID_OWNER_FIELD)
            .and_then(|value| value.as_str())
            .ok_or_else(|| Error::internal(format!("uid claim {uid} has no owner")))?;
        let username =
            Username::new(owner).map_err(|err| Error::internal(format!("uid claim {uid}: {err}")))?;
        self.find(&username).await?.ok_or_else(not_found)
    }

    pub async fn list(&self) -> Result<Vec<User>, Error> {
        let documents: Vec<Document> = self
            .store
            .stream_all(Collection::Users)
            .try_collect()
            .await?;
        documents
            .iter()
            .map(|document| Ok(document.decode_with_id(USERNAME_FIELD)?))
            .collect()
    }

    pub async fn update(
        &self,
        actor: &Username,
        username: &Username,
        patch: UserPatch,
    ) -> Result<User, Error> {
        require_self(actor, username)?;
        let updates = patch
            .into_updates()
            .map_err(|err| Error::invalid_request(err.to_string()))?;
        if !updates.is_empty() {
            self.store
                .update(Collection::Users, username.as_str(), updates, None)
                .await?;
        }
        self.get(username).await
    }

    /// Delete the account and release its uid claim.
    pub async fn delete(&self, actor: &Username, username: &Username) -> Result<(), Error> {
        require_self(actor, username)?;
        let user = self.get(username).await?;
        self.store
            .batch(vec![
                WriteOp::Delete(Collection::Users, username.as_str().to_owned()),
                WriteOp::Delete(Collection::UserUids, user.uid().as_str().to_owned()),
            ])
            .await?;
        info!(%username, "user deleted");
        Ok(())
    }
}
