use std::sync::Arc;

use pulse_api_types::{FollowDocument, FollowWrite, attributes};
use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::entities::FollowRecord;
use crate::domain::error::{DomainError, require_id};
use crate::infra::remote::{Backend, Collection, Query};

use super::documents::{self, Op};
use super::error::ApiError;

const LIST_FOLLOWS: Op = Op::new("list_follows", "follow");
const CREATE_FOLLOW: Op = Op::new("follow_user", "follow");
const DELETE_FOLLOW: Op = Op::new("unfollow_user", "follow");

/// Follow graph addressed by (follower, followed) user id pairs.
#[derive(Clone)]
pub struct SocialService {
    backend: Arc<dyn Backend>,
}

impl SocialService {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    /// Follow `followed_id`. Following twice returns the existing record.
    ///
    /// The record id is derived from the pair, so when two follows race the
    /// backend rejects the second create and the winner's record is returned.
    pub async fn follow_user(
        &self,
        follower_id: &str,
        followed_id: &str,
    ) -> Result<FollowRecord, ApiError> {
        let (follower_id, followed_id) = pair(follower_id, followed_id)?;
        if let Some(existing) = self.find(follower_id, followed_id).await? {
            return Ok(existing);
        }

        let created = documents::create::<_, FollowDocument>(
            self.backend.as_ref(),
            CREATE_FOLLOW,
            Collection::Follows,
            &follow_id(follower_id, followed_id),
            &FollowWrite {
                follower: follower_id.to_string(),
                followed: followed_id.to_string(),
            },
        )
        .await;

        match created {
            Ok(doc) => {
                info!(follower_id, followed_id, "followed user");
                Ok(FollowRecord::from(doc))
            }
            Err(err) => match self.find(follower_id, followed_id).await? {
                Some(existing) => {
                    debug!(follower_id, followed_id, "follow created concurrently");
                    Ok(existing)
                }
                None => Err(err),
            },
        }
    }

    pub async fn unfollow_user(&self, follower_id: &str, followed_id: &str) -> Result<(), ApiError> {
        let (follower_id, followed_id) = pair(follower_id, followed_id)?;
        let record = self
            .find(follower_id, followed_id)
            .await?
            .ok_or(ApiError::NotFound { entity: "follow" })?;
        self.unfollow_record(&record.id).await?;
        info!(follower_id, followed_id, "unfollowed user");
        Ok(())
    }

    /// Delete a follow record by its own id.
    pub async fn unfollow_record(&self, record_id: &str) -> Result<(), ApiError> {
        let record_id = require_id("follow_record_id", record_id)?;
        documents::delete(
            self.backend.as_ref(),
            DELETE_FOLLOW,
            Collection::Follows,
            record_id,
        )
        .await
    }

    /// Users `user_id` follows.
    pub async fn get_following(&self, user_id: &str) -> Result<Vec<FollowRecord>, ApiError> {
        let user_id = require_id("user_id", user_id)?;
        self.list(&[Query::equal(attributes::FOLLOWER, user_id)])
            .await
    }

    /// Users following `user_id`.
    pub async fn get_followers(&self, user_id: &str) -> Result<Vec<FollowRecord>, ApiError> {
        let user_id = require_id("user_id", user_id)?;
        self.list(&[Query::equal(attributes::FOLLOWED, user_id)])
            .await
    }

    pub async fn is_following(&self, follower_id: &str, followed_id: &str) -> Result<bool, ApiError> {
        let (follower_id, followed_id) = pair(follower_id, followed_id)?;
        Ok(self.find(follower_id, followed_id).await?.is_some())
    }

    async fn find(
        &self,
        follower_id: &str,
        followed_id: &str,
    ) -> Result<Option<FollowRecord>, ApiError> {
        let (_, docs) = documents::list::<FollowDocument>(
            self.backend.as_ref(),
            LIST_FOLLOWS,
            Collection::Follows,
            &[
                Query::equal(attributes::FOLLOWER, follower_id),
                Query::equal(attributes::FOLLOWED, followed_id),
                Query::limit(1),
            ],
        )
        .await?;
        Ok(docs.into_iter().next().map(FollowRecord::from))
    }

    async fn list(&self, filters: &[Query]) -> Result<Vec<FollowRecord>, ApiError> {
        let docs: Vec<FollowDocument> = documents::list_all(
            self.backend.as_ref(),
            LIST_FOLLOWS,
            Collection::Follows,
            filters,
        )
        .await?;
        Ok(docs.into_iter().map(FollowRecord::from).collect())
    }
}

fn pair<'a>(follower_id: &'a str, followed_id: &'a str) -> Result<(&'a str, &'a str), ApiError> {
    let follower_id = require_id("follower_id", follower_id)?;
    let followed_id = require_id("followed_id", followed_id)?;
    if follower_id == followed_id {
        return Err(DomainError::SelfFollow.into());
    }
    Ok((follower_id, followed_id))
}

/// Stable record id for a follow pair. User ids never contain ':'.
fn follow_id(follower_id: &str, followed_id: &str) -> String {
    Uuid::new_v5(
        &Uuid::NAMESPACE_OID,
        format!("{follower_id}:{followed_id}").as_bytes(),
    )
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::remote::MemoryBackend;

    fn service() -> (Arc<MemoryBackend>, SocialService) {
        let backend = Arc::new(MemoryBackend::new());
        (backend.clone(), SocialService::new(backend))
    }

    #[tokio::test]
    async fn follow_is_idempotent() -> Result<(), ApiError> {
        let (backend, social) = service();
        let first = social.follow_user("u1", "u2").await?;
        let second = social.follow_user("u1", "u2").await?;

        assert_eq!(first.id, second.id);
        assert_eq!(backend.document_count(Collection::Follows), 1);
        assert!(social.is_following("u1", "u2").await?);
        assert!(!social.is_following("u2", "u1").await?);
        Ok(())
    }

    #[tokio::test]
    async fn racing_follow_returns_the_stored_record() -> Result<(), ApiError> {
        let (backend, social) = service();
        let first = social.follow_user("u1", "u2").await?;
        assert_eq!(first.id, follow_id("u1", "u2"));

        backend.empty_next_list();
        let second = social.follow_user("u1", "u2").await?;
        assert_eq!(second.id, first.id);
        assert_eq!(backend.document_count(Collection::Follows), 1);
        assert_eq!(backend.count_calls("create_document"), 2);
        Ok(())
    }

    #[test]
    fn follow_ids_depend_on_direction() {
        assert_eq!(follow_id("u1", "u2"), follow_id("u1", "u2"));
        assert_ne!(follow_id("u1", "u2"), follow_id("u2", "u1"));
        assert_eq!(follow_id("u1", "u2").len(), 36);
    }

    #[tokio::test]
    async fn unfollow_by_pair() -> Result<(), ApiError> {
        let (_, social) = service();
        social.follow_user("u1", "u2").await?;
        social.follow_user("u1", "u3").await?;
        social.follow_user("u4", "u2").await?;

        social.unfollow_user("u1", "u2").await?;
        let following: Vec<String> = social
            .get_following("u1")
            .await?
            .into_iter()
            .map(|record| record.followed_id)
            .collect();
        assert_eq!(following, vec!["u3"]);

        let followers = social.get_followers("u2").await?;
        assert_eq!(followers.len(), 1);
        assert_eq!(followers[0].follower_id, "u4");

        assert_eq!(
            social.unfollow_user("u1", "u2").await,
            Err(ApiError::NotFound { entity: "follow" })
        );
        Ok(())
    }

    #[tokio::test]
    async fn self_follow_and_blank_ids_are_rejected() {
        let (backend, social) = service();
        assert!(matches!(
            social.follow_user("u1", "u1").await,
            Err(ApiError::Validation(_))
        ));
        assert_eq!(
            social.follow_user("", "u2").await,
            Err(ApiError::Precondition("follower_id"))
        );
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn unfollow_record_deletes_raw_record() -> Result<(), ApiError> {
        let (backend, social) = service();
        let record = social.follow_user("u1", "u2").await?;
        social.unfollow_record(&record.id).await?;
        assert_eq!(backend.document_count(Collection::Follows), 0);
        Ok(())
    }
}
