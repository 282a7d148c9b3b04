//! Cached reads and invalidating writes over the API services.
//!
//! Reads go through [`QueryClient::fetch`]; a read whose identifier is blank
//! comes back [`QueryState::Disabled`] without touching the backend. Writes
//! call the service first and publish their mutation event only on success.

use std::sync::Arc;

use tracing::instrument;

use crate::application::Services;
use crate::application::accounts::{NewUser, UpdateUser};
use crate::application::error::ApiError;
use crate::application::pagination::{Page, PageRequest};
use crate::application::posts::{NewPost, UpdatePost};
use crate::config::FeedSettings;
use crate::domain::entities::{FollowRecord, Post, SavedPost, Session, User};

use super::client::{QueryClient, QueryState};
use super::infinite::InfiniteQuery;
use super::keys::QueryKey;

fn present(value: &str) -> bool {
    !value.trim().is_empty()
}

#[derive(Clone)]
pub struct Queries {
    services: Services,
    client: Arc<QueryClient>,
    page_size: u32,
    users_limit: u32,
}

impl Queries {
    pub fn new(services: Services, client: Arc<QueryClient>, feed: &FeedSettings) -> Self {
        Self {
            services,
            client,
            page_size: feed.page_size.get(),
            users_limit: feed.users_limit.get(),
        }
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn client(&self) -> &QueryClient {
        &self.client
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    // Reads

    pub async fn current_user(&self) -> Result<QueryState<User>, ApiError> {
        let accounts = self.services.accounts.clone();
        self.client
            .fetch(QueryKey::current_user(), true, move || async move {
                accounts.get_current_user().await
            })
            .await
    }

    /// Newest users; `None` uses the configured limit.
    pub async fn users(&self, limit: Option<u32>) -> Result<QueryState<Vec<User>>, ApiError> {
        let limit = limit.unwrap_or(self.users_limit);
        let accounts = self.services.accounts.clone();
        self.client
            .fetch(QueryKey::users(limit), true, move || async move {
                accounts.get_users(limit).await
            })
            .await
    }

    pub async fn user_by_id(&self, user_id: &str) -> Result<QueryState<User>, ApiError> {
        let accounts = self.services.accounts.clone();
        let id = user_id.to_string();
        self.client
            .fetch(QueryKey::user_by_id(user_id), present(user_id), move || async move {
                accounts.get_user_by_id(&id).await
            })
            .await
    }

    pub async fn user_posts(&self, user_id: &str) -> Result<QueryState<Vec<Post>>, ApiError> {
        let posts = self.services.posts.clone();
        let id = user_id.to_string();
        self.client
            .fetch(QueryKey::user_posts(user_id), present(user_id), move || async move {
                posts.get_user_posts(&id).await
            })
            .await
    }

    pub async fn user_following(
        &self,
        user_id: &str,
    ) -> Result<QueryState<Vec<FollowRecord>>, ApiError> {
        let social = self.services.social.clone();
        let id = user_id.to_string();
        self.client
            .fetch(
                QueryKey::user_following(user_id),
                present(user_id),
                move || async move { social.get_following(&id).await },
            )
            .await
    }

    pub async fn user_followers(
        &self,
        user_id: &str,
    ) -> Result<QueryState<Vec<FollowRecord>>, ApiError> {
        let social = self.services.social.clone();
        let id = user_id.to_string();
        self.client
            .fetch(
                QueryKey::user_followers(user_id),
                present(user_id),
                move || async move { social.get_followers(&id).await },
            )
            .await
    }

    pub async fn post_by_id(&self, post_id: &str) -> Result<QueryState<Post>, ApiError> {
        let posts = self.services.posts.clone();
        let id = post_id.to_string();
        self.client
            .fetch(QueryKey::post_by_id(post_id), present(post_id), move || async move {
                posts.get_post_by_id(&id).await
            })
            .await
    }

    /// One page of the merged feed of `user_id` and the users they follow.
    pub async fn home_feed(
        &self,
        user_id: &str,
        request: PageRequest,
    ) -> Result<QueryState<Page<Post>>, ApiError> {
        let feed = self.services.feed.clone();
        let id = user_id.to_string();
        let key = QueryKey::home_feed(user_id, request.page(), request.page_size());
        self.client
            .fetch(key, present(user_id), move || async move {
                feed.home_feed(&id, request).await
            })
            .await
    }

    pub async fn recent_posts(&self) -> Result<QueryState<Vec<Post>>, ApiError> {
        let posts = self.services.posts.clone();
        self.client
            .fetch(QueryKey::recent_posts(), true, move || async move {
                posts.get_recent_posts().await
            })
            .await
    }

    /// Empty explore query sized by the feed settings.
    pub fn explore_query(&self) -> InfiniteQuery<Post> {
        InfiniteQuery::new(self.page_size, QueryKey::explore_page)
    }

    /// Append the next explore page to `query`. Returns false once exhausted.
    pub async fn explore_feed(&self, query: &mut InfiniteQuery<Post>) -> Result<bool, ApiError> {
        let feed = self.services.feed.clone();
        query
            .fetch_next(&self.client, move |request| async move {
                feed.explore_feed(request).await
            })
            .await
    }

    pub async fn search_posts(&self, term: &str) -> Result<QueryState<Vec<Post>>, ApiError> {
        let posts = self.services.posts.clone();
        let term = term.trim().to_string();
        let key = QueryKey::search_posts(&term);
        let enabled = !term.is_empty();
        self.client
            .fetch(key, enabled, move || async move { posts.search_posts(&term).await })
            .await
    }

    pub async fn saved_posts(&self, user_id: &str) -> Result<QueryState<Vec<Post>>, ApiError> {
        let posts = self.services.posts.clone();
        let id = user_id.to_string();
        self.client
            .fetch(QueryKey::saved_posts(user_id), present(user_id), move || async move {
                posts.get_saved_posts(&id).await
            })
            .await
    }

    pub async fn liked_posts(&self, user_id: &str) -> Result<QueryState<Vec<Post>>, ApiError> {
        let posts = self.services.posts.clone();
        let id = user_id.to_string();
        self.client
            .fetch(QueryKey::liked_posts(user_id), present(user_id), move || async move {
                posts.get_liked_posts(&id).await
            })
            .await
    }

    // Mutations

    pub async fn create_user_account(&self, new_user: NewUser) -> Result<User, ApiError> {
        self.services.accounts.create_user_account(new_user).await
    }

    /// Cached reads belong to the previous identity and are dropped.
    #[instrument(skip(self, password))]
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session, ApiError> {
        let session = self.services.accounts.sign_in_account(email, password).await?;
        self.client.clear();
        Ok(session)
    }

    /// Clears the cache even when the remote sign-out fails.
    #[instrument(skip(self))]
    pub async fn sign_out(&self) -> Result<(), ApiError> {
        let result = self.services.accounts.sign_out_account().await;
        self.client.clear();
        result
    }

    pub async fn create_post(&self, new_post: NewPost) -> Result<Post, ApiError> {
        let post = self.services.posts.create_post(new_post).await?;
        self.client.trigger().post_created(&post.id);
        Ok(post)
    }

    pub async fn update_post(&self, update: UpdatePost) -> Result<Post, ApiError> {
        let post = self.services.posts.update_post(update).await?;
        self.client.trigger().post_updated(&post.id);
        Ok(post)
    }

    pub async fn delete_post(&self, post_id: &str, image_id: &str) -> Result<(), ApiError> {
        self.services.posts.delete_post(post_id, image_id).await?;
        self.client.trigger().post_deleted(post_id);
        Ok(())
    }

    /// Replace the like list of `post_id` with `likes`.
    pub async fn like_post(&self, post_id: &str, likes: Vec<String>) -> Result<Post, ApiError> {
        let post = self.services.posts.like_post(post_id, likes).await?;
        self.client.trigger().post_liked(&post.id);
        Ok(post)
    }

    pub async fn save_post(&self, user_id: &str, post_id: &str) -> Result<SavedPost, ApiError> {
        let saved = self.services.posts.save_post(user_id, post_id).await?;
        self.client.trigger().post_saved(&saved.post_id);
        Ok(saved)
    }

    pub async fn delete_saved_post(&self, saved_record_id: &str) -> Result<(), ApiError> {
        self.services.posts.delete_saved_post(saved_record_id).await?;
        self.client.trigger().save_deleted(saved_record_id);
        Ok(())
    }

    pub async fn update_user(&self, update: UpdateUser) -> Result<User, ApiError> {
        let user = self.services.accounts.update_user(update).await?;
        self.client.trigger().user_updated(&user.id);
        Ok(user)
    }

    pub async fn follow_user(
        &self,
        follower_id: &str,
        followed_id: &str,
    ) -> Result<FollowRecord, ApiError> {
        let record = self.services.social.follow_user(follower_id, followed_id).await?;
        self.client.trigger().follow_changed(follower_id, followed_id);
        Ok(record)
    }

    pub async fn unfollow_user(&self, follower_id: &str, followed_id: &str) -> Result<(), ApiError> {
        self.services.social.unfollow_user(follower_id, followed_id).await?;
        self.client.trigger().follow_changed(follower_id, followed_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests;
